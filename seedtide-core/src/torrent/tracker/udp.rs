//! UDP tracker placeholder (BEP 15 is not implemented)

use async_trait::async_trait;

use super::types::{AnnounceRequest, AnnounceResponse, TrackerClient, TrackerError};

/// Stand-in for `udp://` trackers.
///
/// Satisfies the [`TrackerClient`] contract so UDP entries can sit in a
/// tier next to HTTP ones; every announce fails, which the tier logic
/// treats like any other dead tracker.
pub struct UdpTrackerClient {
    announce_url: String,
}

impl UdpTrackerClient {
    pub fn new(announce_url: String) -> Self {
        Self { announce_url }
    }
}

#[async_trait]
impl TrackerClient for UdpTrackerClient {
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        tracing::debug!(
            "Skipping {} announce to UDP tracker {}",
            request.event,
            self.announce_url
        );
        Err(TrackerError::UnsupportedProtocol {
            url: self.announce_url.clone(),
        })
    }

    fn tracker_url(&self) -> &str {
        &self.announce_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::InfoHash;
    use crate::torrent::tracker::AnnounceEvent;

    #[tokio::test]
    async fn test_udp_announce_is_unsupported() {
        let client = UdpTrackerClient::new("udp://tracker.example.com:1337".to_string());
        let request = AnnounceRequest {
            info_hash: InfoHash::new([1; 20]),
            peer_id: [0; 20],
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: AnnounceEvent::Started,
            ip: None,
            key: String::new(),
            port: 6881,
            num_want: 50,
        };

        let result = client.announce(request).await;
        assert!(matches!(
            result,
            Err(TrackerError::UnsupportedProtocol { url }) if url == "udp://tracker.example.com:1337"
        ));
    }
}
