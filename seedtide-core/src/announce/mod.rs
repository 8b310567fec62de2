//! Announce orchestration engine.
//!
//! Layered leaf to root: [`TrackerAnnouncer`] owns one tracker URL and its
//! announce loop, [`TierAnnouncer`] aggregates the trackers of one
//! announce-list tier, and [`Orchestrator`] cascades between tiers. Each layer
//! runs as a tokio task and reports to its parent over a bounded channel.
//! Cancellation flows down through a [`CancellationToken`] handed to every
//! loop and every one-shot announce.

pub mod factory;
pub mod orchestrator;
pub mod rotating;
pub mod tier;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use factory::AnnouncerFactory;
pub use orchestrator::{AllOrchestrator, FallbackOrchestrator, Orchestrator};
pub use rotating::RotatingList;
pub use tier::{AllTierAnnouncer, FallbackTierAnnouncer, TierAnnouncer};
pub use tracker::TrackerAnnouncer;

use crate::torrent::tracker::{AnnounceEvent, AnnounceRequest, AnnounceResponse, TrackerError};

/// Liveness derived from announce outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceState {
    Alive,
    Dead,
}

/// Liveness of a single tracker, derived from its latest announce.
pub type TrackerState = AnnounceState;

/// Aggregate liveness of a tier.
pub type TierState = AnnounceState;

/// Outcome of one announce attempt against one tracker.
#[derive(Debug, Clone)]
pub struct AnnounceResult {
    pub tracker_url: String,
    pub event: AnnounceEvent,
    pub outcome: Result<AnnounceResponse, TrackerError>,
    pub completed_at: DateTime<Utc>,
}

impl AnnounceResult {
    pub fn state(&self) -> TrackerState {
        if self.outcome.is_ok() {
            AnnounceState::Alive
        } else {
            AnnounceState::Dead
        }
    }

    /// Interval granted by the tracker, if the attempt succeeded.
    pub fn interval(&self) -> Option<Duration> {
        self.outcome.as_ref().ok().map(|response| response.interval)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Err(TrackerError::Cancelled))
    }
}

/// Construction-time announce errors.
///
/// Individual tracker failures never surface here; they only move
/// tracker and tier state.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("Tier {tier} has no trackers")]
    EmptyTrackerList { tier: usize },

    #[error("Torrent has no announce tiers")]
    EmptyTierList,

    #[error("Unsupported tracker URL scheme: {url}")]
    UnsupportedScheme { url: String },

    #[error("Invalid tracker URL {url}: {source}")]
    InvalidTrackerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP client setup failed: {reason}")]
    HttpClient { reason: String },

    #[error("{what} is already running")]
    AlreadyRunning { what: String },
}

/// Narrow interface through which a seed feeds live request data into the
/// engine and observes per-tracker outcomes.
pub trait AnnounceDelegate: Send + Sync {
    /// Builds the request for the next announce with current counters.
    fn announce_request(&self, event: AnnounceEvent) -> AnnounceRequest;

    fn on_announce_success(&self, tracker_url: &str, event: AnnounceEvent, response: &AnnounceResponse);

    fn on_announce_error(&self, tracker_url: &str, event: AnnounceEvent, error: &TrackerError);
}

/// Handle to a spawned announce loop.
pub(crate) struct RunningLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningLoop {
    pub(crate) fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(body(cancel.clone()));
        Self { cancel, task }
    }

    /// Cancels the loop and waits for its task to exit.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        Self::join(self.task).await;
    }

    /// Cancels the loop, returning the join handle for a bounded wait.
    pub(crate) fn cancel(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task
    }

    async fn join(task: JoinHandle<()>) {
        if let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!("Announce loop panicked: {}", e);
        }
    }
}

/// Emits state edges to a parent, suppressing repeats of the last state.
pub(crate) struct StateReporter {
    states: mpsc::Sender<AnnounceState>,
    last: Option<AnnounceState>,
}

impl StateReporter {
    pub(crate) fn new(states: mpsc::Sender<AnnounceState>) -> Self {
        Self { states, last: None }
    }

    /// Sends `state` if it differs from the last one sent.
    ///
    /// Returns early without recording the edge if `cancel` fires first.
    pub(crate) async fn report(&mut self, cancel: &CancellationToken, state: AnnounceState) {
        if self.last == Some(state) {
            return;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            sent = self.states.send(state) => {
                if sent.is_err() {
                    tracing::debug!("State receiver dropped, discarding {:?}", state);
                }
                self.last = Some(state);
            }
        }
    }
}

/// Sleeps for `duration` unless cancelled. Returns `false` on cancellation.
pub(crate) async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Wait after `consecutive_errors` failures when no interval is known yet.
///
/// Grows quadratically from ten seconds and is capped at `ceiling`.
pub fn error_backoff(consecutive_errors: u32, ceiling: Duration) -> Duration {
    let errors = u64::from(consecutive_errors);
    let secs = 10u64.saturating_mul(errors.saturating_mul(errors));
    Duration::from_secs(secs).min(ceiling)
}
