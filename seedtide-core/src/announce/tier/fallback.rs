use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::announce::{
    AnnounceError, AnnounceResult, AnnounceState, RotatingList, RunningLoop, StateReporter,
    TierState, TrackerAnnouncer, pause,
};
use crate::config::AnnounceConfig;
use crate::torrent::tracker::AnnounceEvent;

/// Tier that announces to one tracker at a time.
///
/// A failing tracker hands over to the next one immediately. The tracker
/// that succeeds is promoted to the front so it is preferred next time.
/// When a full rotation fails the tier reports `Dead` once and pauses
/// before starting over from the front.
pub struct FallbackTierAnnouncer {
    inner: Arc<FallbackTierInner>,
    running: Mutex<Option<RunningLoop>>,
}

struct FallbackTierInner {
    trackers: RotatingList<Arc<TrackerAnnouncer>>,
    config: AnnounceConfig,
    event: Mutex<AnnounceEvent>,
}

impl FallbackTierAnnouncer {
    /// # Errors
    ///
    /// - `AnnounceError::EmptyTrackerList` - `trackers` is empty
    pub fn new(
        tier: usize,
        trackers: Vec<Arc<TrackerAnnouncer>>,
        config: AnnounceConfig,
    ) -> Result<Self, AnnounceError> {
        let trackers = RotatingList::new(trackers).ok_or(AnnounceError::EmptyTrackerList { tier })?;
        Ok(Self {
            inner: Arc::new(FallbackTierInner {
                trackers,
                config,
                event: Mutex::new(AnnounceEvent::Started),
            }),
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
                what: "Fallback tier loop".to_string(),
            });
        }

        *self.inner.event.lock() = event;
        self.inner.trackers.rewind_to_first();

        let (states_tx, states_rx) = mpsc::channel(self.inner.config.result_buffer.max(1));
        let inner = Arc::clone(&self.inner);
        *running = Some(RunningLoop::spawn(move |cancel| {
            run_fallback_tier(inner, cancel, states_tx)
        }));
        Ok(states_rx)
    }

    pub async fn stop_loop(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.shutdown().await;
        }
    }

    /// Walks the rotation once, stopping at the first tracker that answers.
    pub async fn announce_once(&self, cancel: &CancellationToken, event: AnnounceEvent) -> TierState {
        for _ in 0..self.inner.trackers.len() {
            if cancel.is_cancelled() {
                break;
            }
            let tracker = self.inner.trackers.current();
            let result = tracker.announce_once(cancel, event).await;
            if result.state() == AnnounceState::Alive {
                self.inner.trackers.promote_current();
                return AnnounceState::Alive;
            }
            self.inner.trackers.next();
        }
        AnnounceState::Dead
    }

    pub fn last_known_interval(&self) -> Option<Duration> {
        self.inner.last_known_interval()
    }

    pub fn tracker_urls(&self) -> Vec<String> {
        self.inner
            .trackers
            .snapshot()
            .iter()
            .map(|tracker| tracker.url().to_string())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl FallbackTierInner {
    fn last_known_interval(&self) -> Option<Duration> {
        self.trackers
            .snapshot()
            .iter()
            .find_map(|tracker| tracker.last_interval())
    }

    fn event(&self) -> AnnounceEvent {
        *self.event.lock()
    }
}

async fn start_tracker(
    tracker: &TrackerAnnouncer,
    event: AnnounceEvent,
) -> mpsc::Receiver<AnnounceResult> {
    tracker.stop_loop().await;
    match tracker.start_loop(event) {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!("Could not start tracker {}: {}", tracker.url(), e);
            mpsc::channel(1).1
        }
    }
}

async fn run_fallback_tier(
    inner: Arc<FallbackTierInner>,
    cancel: CancellationToken,
    states: mpsc::Sender<TierState>,
) {
    let mut reporter = StateReporter::new(states);
    let mut current = inner.trackers.current();
    let mut results = start_tracker(&current, inner.event()).await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(result) = results.recv() => {
                if result.is_cancelled() {
                    continue;
                }

                if result.state() == AnnounceState::Alive {
                    inner.trackers.promote_current();
                    *inner.event.lock() = AnnounceEvent::Regular;
                    reporter.report(&cancel, AnnounceState::Alive).await;
                    continue;
                }

                current.stop_loop().await;
                let wrapped = inner.trackers.is_last();
                inner.trackers.next();

                if wrapped {
                    tracing::info!("Every tracker in tier failed, pausing before retry");
                    reporter.report(&cancel, AnnounceState::Dead).await;
                    let wait = inner
                        .last_known_interval()
                        .unwrap_or(inner.config.default_interval);
                    if !pause(&cancel, wait).await {
                        break;
                    }
                }

                current = inner.trackers.current();
                tracing::debug!("Falling back to tracker {}", current.url());
                results = start_tracker(&current, inner.event()).await;
            }
        }
    }

    current.stop_loop().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::testing::{RecordingDelegate, fail, ok, trackers};
    use crate::torrent::tracker::{ResponseConfig, SimulatedTrackerProvider};

    fn tier(provider: &SimulatedTrackerProvider, urls: &[&str]) -> FallbackTierAnnouncer {
        let delegate = Arc::new(RecordingDelegate::default());
        FallbackTierAnnouncer::new(0, trackers(provider, urls, &delegate), AnnounceConfig::default())
            .unwrap()
    }

    #[test]
    fn test_empty_tier_rejected() {
        assert!(matches!(
            FallbackTierAnnouncer::new(3, Vec::new(), AnnounceConfig::default()),
            Err(AnnounceError::EmptyTrackerList { tier: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotes_first_working_tracker() {
        let provider = SimulatedTrackerProvider::new(ok(1800))
            .with_tracker("http://a/announce", fail(), vec![])
            .with_tracker("http://b/announce", fail(), vec![]);
        let log = provider.log();
        let tier = tier(&provider, &["http://a/announce", "http://b/announce", "http://c/announce"]);

        let mut states = tier.start_loop(AnnounceEvent::Started).unwrap();
        assert_eq!(states.recv().await, Some(AnnounceState::Alive));
        assert_eq!(
            tier.tracker_urls(),
            vec!["http://c/announce", "http://a/announce", "http://b/announce"]
        );
        tier.stop_loop().await;

        // The fallback target still receives the session's first event
        assert_eq!(log.events_for("http://c/announce"), vec![AnnounceEvent::Started]);
        assert_eq!(tier.last_known_interval(), Some(Duration::from_secs(1800)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_failed_rotation_reports_dead_once() {
        let provider = SimulatedTrackerProvider::new(fail());
        let log = provider.log();
        let tier = tier(&provider, &["http://a/announce", "http://b/announce", "http://c/announce"]);

        let mut states = tier.start_loop(AnnounceEvent::Started).unwrap();
        assert_eq!(states.recv().await, Some(AnnounceState::Dead));

        // One full rotation: each tracker tried exactly once before the pause
        assert_eq!(log.len(), 3);
        let pending = tokio::time::timeout(Duration::from_secs(60), states.recv()).await;
        assert!(pending.is_err());

        tier.stop_loop().await;
        assert!(!tier.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_pause() {
        let provider = SimulatedTrackerProvider::new(ok(1800)).with_tracker(
            "http://a/announce",
            ok(900),
            vec![fail()],
        );
        let log = provider.log();
        let tier = tier(&provider, &["http://a/announce"]);

        let mut states = tier.start_loop(AnnounceEvent::Started).unwrap();
        assert_eq!(states.recv().await, Some(AnnounceState::Dead));
        assert_eq!(states.recv().await, Some(AnnounceState::Alive));
        tier.stop_loop().await;

        // Started is kept until a success is observed
        assert_eq!(
            log.events_for("http://a/announce"),
            vec![AnnounceEvent::Started, AnnounceEvent::Started]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_once_single_dead_tracker() {
        let provider = SimulatedTrackerProvider::new(fail());
        let tier = tier(&provider, &["http://a/announce"]);
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            assert_eq!(
                tier.announce_once(&cancel, AnnounceEvent::Stopped).await,
                AnnounceState::Dead
            );
            assert_eq!(tier.tracker_urls(), vec!["http://a/announce"]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_once_promotes_on_success() {
        let provider = SimulatedTrackerProvider::new(ResponseConfig::success(
            Duration::from_secs(60),
            1,
            1,
        ))
        .with_tracker("http://a/announce", fail(), vec![]);
        let tier = tier(&provider, &["http://a/announce", "http://b/announce"]);

        let state = tier
            .announce_once(&CancellationToken::new(), AnnounceEvent::Stopped)
            .await;
        assert_eq!(state, AnnounceState::Alive);
        assert_eq!(tier.tracker_urls(), vec!["http://b/announce", "http://a/announce"]);
    }
}
