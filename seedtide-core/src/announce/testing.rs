//! Shared fixtures for announce engine unit tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{AnnounceDelegate, TrackerAnnouncer};
use crate::config::AnnounceConfig;
use crate::torrent::InfoHash;
use crate::torrent::tracker::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, ResponseConfig, SimulatedTrackerProvider,
    TrackerClientProvider, TrackerError,
};

/// Delegate that records outcomes as `(url, succeeded)` pairs.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    pub(crate) outcomes: Mutex<Vec<(String, bool)>>,
}

impl AnnounceDelegate for RecordingDelegate {
    fn announce_request(&self, event: AnnounceEvent) -> AnnounceRequest {
        AnnounceRequest {
            info_hash: InfoHash::new([9; 20]),
            peer_id: *b"-SD0100-abcdefghijkl",
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event,
            ip: None,
            key: "ABCD".to_string(),
            port: 6881,
            num_want: 50,
        }
    }

    fn on_announce_success(&self, url: &str, _: AnnounceEvent, _: &AnnounceResponse) {
        self.outcomes.lock().push((url.to_string(), true));
    }

    fn on_announce_error(&self, url: &str, _: AnnounceEvent, _: &TrackerError) {
        self.outcomes.lock().push((url.to_string(), false));
    }
}

pub(crate) fn ok(interval_secs: u64) -> ResponseConfig {
    ResponseConfig::success(Duration::from_secs(interval_secs), 10, 10)
}

pub(crate) fn fail() -> ResponseConfig {
    ResponseConfig::failure("unreachable")
}

/// Builds announcers for `urls` from `provider`.
pub(crate) fn trackers(
    provider: &SimulatedTrackerProvider,
    urls: &[&str],
    delegate: &Arc<RecordingDelegate>,
) -> Vec<Arc<TrackerAnnouncer>> {
    urls.iter()
        .map(|url| {
            let client = provider.tracker_client(url).unwrap();
            let delegate: Arc<dyn AnnounceDelegate> = delegate.clone();
            Arc::new(TrackerAnnouncer::new(client, delegate, AnnounceConfig::default()))
        })
        .collect()
}
