use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::announce::{AnnounceError, AnnounceState, RunningLoop, TierAnnouncer};
use crate::torrent::tracker::AnnounceEvent;

/// Orchestrator that announces to every tier concurrently.
///
/// Tier states are drained but never acted upon.
pub struct AllOrchestrator {
    tiers: Arc<Vec<Arc<TierAnnouncer>>>,
    running: Mutex<Option<RunningLoop>>,
}

impl AllOrchestrator {
    /// # Errors
    ///
    /// - `AnnounceError::EmptyTierList` - `tiers` is empty
    pub fn new(tiers: Vec<Arc<TierAnnouncer>>) -> Result<Self, AnnounceError> {
        if tiers.is_empty() {
            return Err(AnnounceError::EmptyTierList);
        }
        Ok(Self {
            tiers: Arc::new(tiers),
            running: Mutex::new(None),
        })
    }

    pub fn start(&self) -> Result<(), AnnounceError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(AnnounceError::AlreadyRunning {
                what: "All-tiers orchestrator".to_string(),
            });
        }

        let tiers = Arc::clone(&self.tiers);
        *running = Some(RunningLoop::spawn(move |cancel| run_all_orchestrator(tiers, cancel)));
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

        let cancel = CancellationToken::new();
        let stopped = join_all(
            self.tiers
                .iter()
                .map(|tier| tier.announce_once(&cancel, AnnounceEvent::Stopped)),
        );
        match tokio::time::timeout(deadline, stopped).await {
            Ok(states) => {
                let delivered = states
                    .iter()
                    .filter(|state| **state == AnnounceState::Alive)
                    .count();
                tracing::debug!("Stopped announce delivered to {}/{} tiers", delivered, states.len());
            }
            Err(_) => {
                cancel.cancel();
                tracing::warn!("Stopped announces timed out after {:?}", deadline);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    pub fn tiers(&self) -> Vec<Vec<String>> {
        self.tiers.iter().map(|tier| tier.tracker_urls()).collect()
    }
}

async fn run_all_orchestrator(tiers: Arc<Vec<Arc<TierAnnouncer>>>, cancel: CancellationToken) {
    let mut streams = Vec::with_capacity(tiers.len());
    for (index, tier) in tiers.iter().enumerate() {
        tier.stop_loop().await;
        match tier.start_loop(AnnounceEvent::Started) {
            Ok(states) => streams.push(
                stream::unfold(states, move |mut states| async move {
                    states.recv().await.map(|state| ((index, state), states))
                })
                .boxed(),
            ),
            Err(e) => tracing::warn!("Could not start tier {}: {}", index, e),
        }
    }
    let mut merged = stream::select_all(streams);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some((index, state)) = merged.next() => {
                tracing::debug!("Tier {} is now {:?}", index, state);
            }
        }
    }

    join_all(tiers.iter().map(|tier| tier.stop_loop())).await;
}
