//! Tier announcers: one announce-list tier, aggregated into a single state.

mod all;
mod fallback;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use all::AllTierAnnouncer;
pub use fallback::FallbackTierAnnouncer;

use super::{AnnounceError, TierState};
use crate::torrent::tracker::AnnounceEvent;

/// Strategy for announcing to the trackers of one tier.
pub enum TierAnnouncer {
    /// Every tracker loops concurrently.
    All(AllTierAnnouncer),
    /// One tracker at a time, falling through on failure.
    Fallback(FallbackTierAnnouncer),
}

impl TierAnnouncer {
    /// Starts the tier loop; the receiver yields only state edges.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::AlreadyRunning` - The tier loop is already active
    pub fn start_loop(
        &self,
        event: AnnounceEvent,
    ) -> Result<mpsc::Receiver<TierState>, AnnounceError> {
        match self {
            Self::All(tier) => tier.start_loop(event),
            Self::Fallback(tier) => tier.start_loop(event),
        }
    }

    /// Stops the tier loop and every tracker loop under it.
    pub async fn stop_loop(&self) {
        match self {
            Self::All(tier) => tier.stop_loop().await,
            Self::Fallback(tier) => tier.stop_loop().await,
        }
    }

    /// One synchronous announce, used for the final `Stopped` event.
    pub async fn announce_once(&self, cancel: &CancellationToken, event: AnnounceEvent) -> TierState {
        match self {
            Self::All(tier) => tier.announce_once(cancel, event).await,
            Self::Fallback(tier) => tier.announce_once(cancel, event).await,
        }
    }

    pub fn last_known_interval(&self) -> Option<Duration> {
        match self {
            Self::All(tier) => tier.last_known_interval(),
            Self::Fallback(tier) => tier.last_known_interval(),
        }
    }

    /// Tracker URLs in current order.
    pub fn tracker_urls(&self) -> Vec<String> {
        match self {
            Self::All(tier) => tier.tracker_urls(),
            Self::Fallback(tier) => tier.tracker_urls(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::All(tier) => tier.is_running(),
            Self::Fallback(tier) => tier.is_running(),
        }
    }
}
