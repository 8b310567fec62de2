use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::announce::{
    AnnounceError, AnnounceResult, AnnounceState, RunningLoop, StateReporter, TierState,
    TrackerAnnouncer,
};
use crate::config::AnnounceConfig;
use crate::torrent::tracker::AnnounceEvent;

/// Tier that keeps every tracker's loop running regardless of siblings.
///
/// The tier is `Alive` while at least one tracker's latest announce
/// succeeded. It turns `Dead` only once every tracker has answered at least
/// once and none of the latest answers succeeded.
pub struct AllTierAnnouncer {
    inner: Arc<AllTierInner>,
    running: Mutex<Option<RunningLoop>>,
}

struct AllTierInner {
    trackers: Vec<Arc<TrackerAnnouncer>>,
    config: AnnounceConfig,
}

impl AllTierAnnouncer {
    /// # Errors
    ///
    /// - `AnnounceError::EmptyTrackerList` - `trackers` is empty
    pub fn new(
        tier: usize,
        trackers: Vec<Arc<TrackerAnnouncer>>,
        config: AnnounceConfig,
    ) -> Result<Self, AnnounceError> {
        if trackers.is_empty() {
            return Err(AnnounceError::EmptyTrackerList { tier });
        }
        Ok(Self {
            inner: Arc::new(AllTierInner { trackers, config }),
            running: Mutex::new(None),
        })
    }

    pub fn start_loop(
        &self,
        event: AnnounceEvent,
    ) -> Result<mpsc::Receiver<TierState>, AnnounceError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(AnnounceError::AlreadyRunning {
                what: "All-trackers tier loop".to_string(),
            });
        }

        let (states_tx, states_rx) = mpsc::channel(self.inner.config.result_buffer.max(1));
        let inner = Arc::clone(&self.inner);
        *running = Some(RunningLoop::spawn(move |cancel| {
            run_all_tier(inner, cancel, event, states_tx)
        }));
        Ok(states_rx)
    }

    pub async fn stop_loop(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.shutdown().await;
        }
    }

    /// Announces to every tracker concurrently.
    pub async fn announce_once(&self, cancel: &CancellationToken, event: AnnounceEvent) -> TierState {
        let results = join_all(
            self.inner
                .trackers
                .iter()
                .map(|tracker| tracker.announce_once(cancel, event)),
        )
        .await;

        aggregate(results.iter().map(|result| Some(result.state())))
            .unwrap_or(AnnounceState::Dead)
    }

    pub fn last_known_interval(&self) -> Option<Duration> {
        self.inner
            .trackers
            .iter()
            .find_map(|tracker| tracker.last_interval())
    }

    pub fn tracker_urls(&self) -> Vec<String> {
        self.inner
            .trackers
            .iter()
            .map(|tracker| tracker.url().to_string())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

/// Tier state from the latest state of each tracker, `None` meaning the
/// tracker has not answered yet. Undecided while nothing is alive and some
/// tracker is still silent.
fn aggregate(states: impl IntoIterator<Item = Option<AnnounceState>>) -> Option<TierState> {
    let mut undecided = false;
    for state in states {
        match state {
            Some(AnnounceState::Alive) => return Some(AnnounceState::Alive),
            Some(AnnounceState::Dead) => {}
            None => undecided = true,
        }
    }
    (!undecided).then_some(AnnounceState::Dead)
}

fn indexed(index: usize, results: mpsc::Receiver<AnnounceResult>) -> BoxStream<'static, (usize, AnnounceResult)> {
    stream::unfold(results, move |mut results| async move {
        results.recv().await.map(|result| ((index, result), results))
    })
    .boxed()
}

async fn run_all_tier(
    inner: Arc<AllTierInner>,
    cancel: CancellationToken,
    event: AnnounceEvent,
    states: mpsc::Sender<TierState>,
) {
    let mut reporter = StateReporter::new(states);
    let mut streams = Vec::with_capacity(inner.trackers.len());
    for (index, tracker) in inner.trackers.iter().enumerate() {
        tracker.stop_loop().await;
        match tracker.start_loop(event) {
            Ok(results) => streams.push(indexed(index, results)),
            Err(e) => tracing::warn!("Could not start tracker {}: {}", tracker.url(), e),
        }
    }

    let mut merged = stream::select_all(streams);
    let mut tracker_states: Vec<Option<AnnounceState>> = vec![None; inner.trackers.len()];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some((index, result)) = merged.next() => {
                if result.is_cancelled() {
                    continue;
                }
                tracker_states[index] = Some(result.state());
                if let Some(tier_state) = aggregate(tracker_states.iter().copied()) {
                    reporter.report(&cancel, tier_state).await;
                }
            }
        }
    }

    join_all(inner.trackers.iter().map(|tracker| tracker.stop_loop())).await;
}
