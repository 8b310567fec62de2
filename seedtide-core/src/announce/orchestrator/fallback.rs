use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::announce::{
    AnnounceError, AnnounceState, RotatingList, RunningLoop, TierAnnouncer, TierState, pause,
};
use crate::config::AnnounceConfig;
use crate::torrent::tracker::AnnounceEvent;

/// Orchestrator that keeps exactly one tier active.
///
/// A dead tier hands over to the next one without delay. Once every tier
/// failed the orchestrator pauses and starts over from the primary tier.
/// When a secondary tier comes alive it is stopped after one interval and
/// the primary tier is tried again. `Stopped` goes to the tier that last
/// answered, which holds the session even after the cursor moved on.
pub struct FallbackOrchestrator {
    inner: Arc<FallbackOrchestratorInner>,
    running: Mutex<Option<RunningLoop>>,
}

struct FallbackOrchestratorInner {
    tiers: RotatingList<Arc<TierAnnouncer>>,
    config: AnnounceConfig,
    event: Mutex<AnnounceEvent>,
    session: Mutex<Option<Arc<TierAnnouncer>>>,
}

impl FallbackOrchestrator {
    /// # Errors
    ///
    /// - `AnnounceError::EmptyTierList` - `tiers` is empty
    pub fn new(tiers: Vec<Arc<TierAnnouncer>>, config: AnnounceConfig) -> Result<Self, AnnounceError> {
        let tiers = RotatingList::new(tiers).ok_or(AnnounceError::EmptyTierList)?;
        Ok(Self {
            inner: Arc::new(FallbackOrchestratorInner {
                tiers,
                config,
                event: Mutex::new(AnnounceEvent::Started),
                session: Mutex::new(None),
            }),
            running: Mutex::new(None),
        })
    }

    pub fn start(&self) -> Result<(), AnnounceError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(AnnounceError::AlreadyRunning {
                what: "Fallback orchestrator".to_string(),
            });
        }

        *self.inner.event.lock() = AnnounceEvent::Started;
        *self.inner.session.lock() = None;
        self.inner.tiers.rewind_to_first();

        let inner = Arc::clone(&self.inner);
        *running = Some(RunningLoop::spawn(move |cancel| {
            run_fallback_orchestrator(inner, cancel)
        }));
        Ok(())
    }

    pub async fn stop(&self, deadline: Duration) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        let task = running.cancel();
        if tokio::time::timeout(deadline, task).await.is_err() {
            tracing::warn!("Orchestrator loop did not exit within {:?}", deadline);
        }

        let session = self.inner.session.lock().take();
        let tier = session.unwrap_or_else(|| self.inner.tiers.current());
        let cancel = CancellationToken::new();
        let stopped = tokio::time::timeout(deadline, tier.announce_once(&cancel, AnnounceEvent::Stopped)).await;
        match stopped {
            Ok(AnnounceState::Alive) => tracing::debug!("Stopped announce delivered"),
            Ok(AnnounceState::Dead) => tracing::warn!("Stopped announce failed on every tracker"),
            Err(_) => {
                cancel.cancel();
                tracing::warn!("Stopped announce timed out after {:?}", deadline);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn tier_count(&self) -> usize {
        self.inner.tiers.len()
    }

    pub fn tiers(&self) -> Vec<Vec<String>> {
        self.inner
            .tiers
            .snapshot()
            .iter()
            .map(|tier| tier.tracker_urls())
            .collect()
    }
}

impl FallbackOrchestratorInner {
    fn event(&self) -> AnnounceEvent {
        *self.event.lock()
    }

    fn retry_wait(&self, tier: &TierAnnouncer) -> Duration {
        tier.last_known_interval()
            .unwrap_or(self.config.default_interval)
    }
}

async fn start_tier(tier: &TierAnnouncer, event: AnnounceEvent) -> mpsc::Receiver<TierState> {
    tier.stop_loop().await;
    match tier.start_loop(event) {
        Ok(states) => states,
        Err(e) => {
            tracing::warn!("Could not start tier: {}", e);
            mpsc::channel(1).1
        }
    }
}

async fn run_fallback_orchestrator(inner: Arc<FallbackOrchestratorInner>, cancel: CancellationToken) {
    let mut current = inner.tiers.current();
    let mut states = start_tier(&current, inner.event()).await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            state = states.recv() => {
                if state == Some(AnnounceState::Alive) {
                    *inner.event.lock() = AnnounceEvent::Regular;
                    *inner.session.lock() = Some(Arc::clone(&current));
                    if inner.tiers.is_first() {
                        continue;
                    }

                    current.stop_loop().await;
                    let wait = inner.retry_wait(&current);
                    inner.tiers.rewind_to_first();
                    tracing::info!("Backup tier alive, retrying primary tier in {:?}", wait);
                    if !pause(&cancel, wait).await {
                        break;
                    }
                } else {
                    current.stop_loop().await;
                    let exhausted = inner.tiers.is_last();
                    inner.tiers.next();

                    if exhausted {
                        let wait = inner.retry_wait(&inner.tiers.current());
                        tracing::info!("Every tier failed, retrying in {:?}", wait);
                        if !pause(&cancel, wait).await {
                            break;
                        }
                    }
                }

                current = inner.tiers.current();
                tracing::debug!("Activating tier {}", inner.tiers.current_index());
                states = start_tier(&current, inner.event()).await;
            }
        }
    }

    current.stop_loop().await;
}
