//! Orchestrators: cascade announces across the tiers of a torrent.

mod all;
mod fallback;

use std::time::Duration;

pub use all::AllOrchestrator;
pub use fallback::FallbackOrchestrator;

use super::AnnounceError;

/// Tier cascading strategy for one torrent.
pub enum Orchestrator {
    /// Every tier announces concurrently and permanently.
    All(AllOrchestrator),
    /// One tier active at a time, preferring the primary tier.
    Fallback(FallbackOrchestrator),
}

impl Orchestrator {
    /// Starts announcing with `Started`.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::AlreadyRunning` - Already started
    pub fn start(&self) -> Result<(), AnnounceError> {
        match self {
            Self::All(orchestrator) => orchestrator.start(),
            Self::Fallback(orchestrator) => orchestrator.start(),
        }
    }

    /// Stops announcing and sends a best-effort `Stopped`.
    ///
    /// Waiting on child loops and on the final announce is each bounded by
    /// `deadline`. Stopping an orchestrator that is not running is a no-op.
    pub async fn stop(&self, deadline: Duration) {
        match self {
            Self::All(orchestrator) => orchestrator.stop(deadline).await,
            Self::Fallback(orchestrator) => orchestrator.stop(deadline).await,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::All(orchestrator) => orchestrator.is_running(),
            Self::Fallback(orchestrator) => orchestrator.is_running(),
        }
    }

    pub fn tier_count(&self) -> usize {
        match self {
            Self::All(orchestrator) => orchestrator.tier_count(),
            Self::Fallback(orchestrator) => orchestrator.tier_count(),
        }
    }

    /// Tracker URLs per tier, in current order.
    pub fn tiers(&self) -> Vec<Vec<String>> {
        match self {
            Self::All(orchestrator) => orchestrator.tiers(),
            Self::Fallback(orchestrator) => orchestrator.tiers(),
        }
    }
}
