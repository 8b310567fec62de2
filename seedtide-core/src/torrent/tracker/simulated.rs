//! Scripted in-process trackers for tests and offline dry runs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::types::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, TrackerClient, TrackerClientProvider,
    TrackerError,
};
use crate::announce::AnnounceError;

/// Outcome a simulated tracker produces for one announce.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseConfig {
    Success {
        interval: Duration,
        seeders: u32,
        leechers: u32,
    },
    Failure {
        reason: String,
    },
}

impl ResponseConfig {
    pub fn success(interval: Duration, seeders: u32, leechers: u32) -> Self {
        Self::Success {
            interval,
            seeders,
            leechers,
        }
    }

    pub fn failure(reason: &str) -> Self {
        Self::Failure {
            reason: reason.to_string(),
        }
    }

    fn to_result(&self) -> Result<AnnounceResponse, TrackerError> {
        match self {
            Self::Success {
                interval,
                seeders,
                leechers,
            } => Ok(AnnounceResponse {
                interval: *interval,
                min_interval: None,
                tracker_id: None,
                seeders: *seeders,
                leechers: *leechers,
                peers: Vec::new(),
            }),
            Self::Failure { reason } => Err(TrackerError::FailureReason {
                reason: reason.clone(),
            }),
        }
    }
}

/// One announce observed by a simulated tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAnnounce {
    pub tracker_url: String,
    pub event: AnnounceEvent,
    pub uploaded: u64,
}

/// Shared, append-only record of simulated announces.
#[derive(Debug, Clone, Default)]
pub struct AnnounceLog {
    entries: Arc<Mutex<Vec<RecordedAnnounce>>>,
}

impl AnnounceLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, request: &AnnounceRequest, tracker_url: &str) {
        self.entries.lock().push(RecordedAnnounce {
            tracker_url: tracker_url.to_string(),
            event: request.event,
            uploaded: request.uploaded,
        });
    }

    /// Snapshot of every announce in arrival order.
    pub fn entries(&self) -> Vec<RecordedAnnounce> {
        self.entries.lock().clone()
    }

    /// Events received by one tracker, in arrival order.
    pub fn events_for(&self, tracker_url: &str) -> Vec<AnnounceEvent> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.tracker_url == tracker_url)
            .map(|entry| entry.event)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Tracker client answering from a script.
///
/// Scripted responses are consumed in order; once exhausted every further
/// announce gets the fallback response.
pub struct SimulatedTrackerClient {
    announce_url: String,
    script: Mutex<VecDeque<ResponseConfig>>,
    fallback: ResponseConfig,
    latency: Duration,
    log: AnnounceLog,
}

impl SimulatedTrackerClient {
    pub fn new(announce_url: &str, fallback: ResponseConfig, log: AnnounceLog) -> Self {
        Self {
            announce_url: announce_url.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            log,
        }
    }

    /// Responses served before falling back.
    pub fn with_script(self, script: Vec<ResponseConfig>) -> Self {
        *self.script.lock() = script.into();
        self
    }

    /// Delay applied before every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl TrackerClient for SimulatedTrackerClient {
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        self.log.record(&request, &self.announce_url);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.script.lock().pop_front();
        scripted.as_ref().unwrap_or(&self.fallback).to_result()
    }

    fn tracker_url(&self) -> &str {
        &self.announce_url
    }
}

#[derive(Debug, Clone)]
struct TrackerScript {
    fallback: ResponseConfig,
    script: Vec<ResponseConfig>,
}

/// Provider handing out [`SimulatedTrackerClient`]s.
///
/// URLs without an explicit script answer with the default response, or
/// with a per-URL random swarm when built through [`Self::randomized`].
pub struct SimulatedTrackerProvider {
    default: ResponseConfig,
    trackers: HashMap<String, TrackerScript>,
    latency: Duration,
    latencies: HashMap<String, Duration>,
    log: AnnounceLog,
    rng: Option<Mutex<ChaCha8Rng>>,
}

impl SimulatedTrackerProvider {
    pub fn new(default: ResponseConfig) -> Self {
        Self {
            default,
            trackers: HashMap::new(),
            latency: Duration::ZERO,
            latencies: HashMap::new(),
            log: AnnounceLog::new(),
            rng: None,
        }
    }

    /// Every tracker succeeds with its own deterministic random swarm.
    pub fn randomized(seed: u64) -> Self {
        Self {
            rng: Some(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            ..Self::new(ResponseConfig::success(Duration::from_secs(1800), 10, 5))
        }
    }

    /// Scripts the responses of one tracker URL.
    pub fn with_tracker(
        mut self,
        url: &str,
        fallback: ResponseConfig,
        script: Vec<ResponseConfig>,
    ) -> Self {
        self.trackers
            .insert(url.to_string(), TrackerScript { fallback, script });
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Overrides the latency of one tracker URL.
    pub fn with_tracker_latency(mut self, url: &str, latency: Duration) -> Self {
        self.latencies.insert(url.to_string(), latency);
        self
    }

    /// Log shared by every client this provider creates.
    pub fn log(&self) -> AnnounceLog {
        self.log.clone()
    }

    fn default_response(&self) -> ResponseConfig {
        match &self.rng {
            Some(rng) => {
                let mut rng = rng.lock();
                ResponseConfig::success(
                    Duration::from_secs(rng.random_range(1200..=2400)),
                    rng.random_range(1..=50),
                    rng.random_range(0..=80),
                )
            }
            None => self.default.clone(),
        }
    }
}

impl TrackerClientProvider for SimulatedTrackerProvider {
    fn tracker_client(&self, url: &str) -> Result<Arc<dyn TrackerClient>, AnnounceError> {
        url::Url::parse(url).map_err(|source| AnnounceError::InvalidTrackerUrl {
            url: url.to_string(),
            source,
        })?;

        let client = match self.trackers.get(url) {
            Some(scripted) => {
                SimulatedTrackerClient::new(url, scripted.fallback.clone(), self.log.clone())
                    .with_script(scripted.script.clone())
            }
            None => SimulatedTrackerClient::new(url, self.default_response(), self.log.clone()),
        };

        let latency = self.latencies.get(url).copied().unwrap_or(self.latency);
        Ok(Arc::new(client.with_latency(latency)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::InfoHash;

    fn request(event: AnnounceEvent) -> AnnounceRequest {
        AnnounceRequest {
            info_hash: InfoHash::new([7; 20]),
            peer_id: [0; 20],
            uploaded: 42,
            downloaded: 0,
            left: 0,
            event,
            ip: None,
            key: "KEY".to_string(),
            port: 6881,
            num_want: 50,
        }
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let log = AnnounceLog::new();
        let client = SimulatedTrackerClient::new(
            "http://a/announce",
            ResponseConfig::success(Duration::from_secs(60), 3, 4),
            log.clone(),
        )
        .with_script(vec![ResponseConfig::failure("down")]);

        let first = client.announce(request(AnnounceEvent::Started)).await;
        assert_eq!(
            first.unwrap_err(),
            TrackerError::FailureReason {
                reason: "down".to_string()
            }
        );

        let second = client.announce(request(AnnounceEvent::Regular)).await.unwrap();
        assert_eq!(second.interval, Duration::from_secs(60));
        assert_eq!(second.seeders, 3);
        assert_eq!(second.leechers, 4);

        assert_eq!(
            log.events_for("http://a/announce"),
            vec![AnnounceEvent::Started, AnnounceEvent::Regular]
        );
        assert_eq!(log.entries()[0].uploaded, 42);
    }

    #[test]
    fn test_randomized_provider_is_deterministic() {
        let first = SimulatedTrackerProvider::randomized(7);
        let second = SimulatedTrackerProvider::randomized(7);
        assert_eq!(first.default_response(), second.default_response());
    }

    #[test]
    fn test_provider_rejects_invalid_url() {
        let provider =
            SimulatedTrackerProvider::new(ResponseConfig::success(Duration::from_secs(1), 1, 1));
        assert!(provider.tracker_client("::nope").is_err());
        assert!(provider.tracker_client("http://ok/announce").is_ok());
    }
}
