//! Core types and enumerations for BitTorrent tracker communication

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::announce::AnnounceError;
use crate::torrent::InfoHash;

/// Tracker announce request.
///
/// Contains the statistics a genuine client would report for a torrent.
/// Built fresh for every attempt so `uploaded` reflects the dispatcher's
/// latest credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    /// Unique identifier for the torrent being announced
    pub info_hash: InfoHash,
    /// Emulated client's 20-byte peer identifier
    pub peer_id: [u8; 20],
    /// Total bytes reported as uploaded
    pub uploaded: u64,
    /// Total bytes reported as downloaded
    pub downloaded: u64,
    /// Bytes remaining to download (0 while seeding)
    pub left: u64,
    /// Announce event for this attempt
    pub event: AnnounceEvent,
    /// Optional public address to report
    pub ip: Option<String>,
    /// Per-session client key
    pub key: String,
    /// TCP port the emulated client claims to listen on
    pub port: u16,
    /// Number of peers requested from the tracker
    pub num_want: u32,
}

/// BitTorrent announce events.
///
/// `Started` opens an announce session, `Regular` is the periodic
/// update carrying no event parameter and `Stopped` closes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnounceEvent {
    Started,
    Regular,
    Stopped,
}

impl AnnounceEvent {
    /// Wire value of the `event` query parameter, `None` for regular announces.
    pub fn as_query_value(self) -> Option<&'static str> {
        match self {
            AnnounceEvent::Started => Some("started"),
            AnnounceEvent::Regular => None,
            AnnounceEvent::Stopped => Some("stopped"),
        }
    }
}

impl std::fmt::Display for AnnounceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnounceEvent::Started => write!(f, "started"),
            AnnounceEvent::Regular => write!(f, "regular"),
            AnnounceEvent::Stopped => write!(f, "stopped"),
        }
    }
}

/// Seeder and leecher counts of a torrent's swarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Swarm {
    pub seeders: u32,
    pub leechers: u32,
}

impl Swarm {
    pub fn new(seeders: u32, leechers: u32) -> Self {
        Self { seeders, leechers }
    }

    /// Swarm reported when a torrent can no longer reach its trackers.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Tracker announce response.
///
/// Contains peer list and swarm statistics returned by tracker
/// in response to announce requests.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceResponse {
    /// Delay the tracker asks for before the next regular announce
    pub interval: Duration,
    /// Minimum allowed interval between announces
    pub min_interval: Option<Duration>,
    /// Tracker-specific identifier for subsequent requests
    pub tracker_id: Option<String>,
    /// Number of seeders in the swarm (`complete`)
    pub seeders: u32,
    /// Number of leechers in the swarm (`incomplete`)
    pub leechers: u32,
    /// IPv4 and IPv6 peers merged
    pub peers: Vec<SocketAddr>,
}

impl AnnounceResponse {
    pub fn swarm(&self) -> Swarm {
        Swarm::new(self.seeders, self.leechers)
    }
}

/// Failure of a single announce attempt.
///
/// Network and protocol failures are treated alike by the schedulers;
/// `Cancelled` only signals that the attempt was abandoned on shutdown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Tracker connection failed: {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Tracker {url} timed out")]
    Timeout { url: String },

    #[error("Tracker {url} returned HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Tracker refused announce: {reason}")]
    FailureReason { reason: String },

    #[error("Tracker protocol not implemented for {url}")]
    UnsupportedProtocol { url: String },

    #[error("Announce cancelled")]
    Cancelled,
}

/// Abstract tracker communication interface.
///
/// Implementations handle protocol-specific details (HTTP/UDP) while the
/// announce engine above them stays protocol-agnostic. Dropping the
/// returned future abandons the request.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Announces the torrent to the tracker.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` / `Timeout` - Network failure
    /// - `TrackerError::HttpStatus` - Non-2xx response
    /// - `TrackerError::Protocol` - Undecodable response
    /// - `TrackerError::FailureReason` - Tracker rejected the announce
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError>;

    /// Returns tracker URL for debugging and logging purposes.
    fn tracker_url(&self) -> &str;
}

/// Builds tracker clients for the URLs found in a torrent's announce list.
pub trait TrackerClientProvider: Send + Sync {
    /// Returns a client able to announce to `url`.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::InvalidTrackerUrl` - URL does not parse
    /// - `AnnounceError::UnsupportedScheme` - Scheme is neither HTTP(S) nor UDP
    fn tracker_client(&self, url: &str) -> Result<Arc<dyn TrackerClient>, AnnounceError>;
}
