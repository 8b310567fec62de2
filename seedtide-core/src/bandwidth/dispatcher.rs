use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::BandwidthError;
use super::weight::calculate_weight;
use crate::config::BandwidthConfig;
use crate::torrent::InfoHash;
use crate::torrent::tracker::Swarm;

/// Torrent competing for the simulated upload budget.
pub trait BandwidthClaimant: Send + Sync {
    fn claimant_id(&self) -> InfoHash;

    /// Swarm the weight is derived from.
    fn current_swarm(&self) -> Swarm;

    /// Credits bytes assigned by a distribute tick.
    fn add_uploaded(&self, bytes: u64);
}

struct Claim {
    claimant: Arc<dyn BandwidthClaimant>,
    weight: f64,
}

#[derive(Default)]
struct ClaimRegistry {
    claims: HashMap<InfoHash, Claim>,
    total_weight: f64,
}

struct DispatcherInner {
    config: BandwidthConfig,
    registry: RwLock<ClaimRegistry>,
    current_rate: AtomicU64,
    rng: Mutex<ChaCha8Rng>,
}

/// Splits a randomized global upload rate between registered claimants.
///
/// The registry is read-mostly: speed snapshots and distribution take a
/// shared lock, claim and release are exclusive. The current rate is an
/// atomic rolled on its own refresh tick.
pub struct BandwidthDispatcher {
    inner: Arc<DispatcherInner>,
    ticker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl BandwidthDispatcher {
    /// Creates a dispatcher and rolls the initial rate.
    ///
    /// # Errors
    ///
    /// - `BandwidthError::InvalidRateRange` - `min > max`
    /// - `BandwidthError::ZeroInterval` - A tick interval is zero
    pub fn new(config: BandwidthConfig) -> Result<Self, BandwidthError> {
        if config.min_bytes_per_second > config.max_bytes_per_second {
            return Err(BandwidthError::InvalidRateRange {
                min: config.min_bytes_per_second,
                max: config.max_bytes_per_second,
            });
        }
        for (name, interval) in [
            ("global_refresh_interval", config.global_refresh_interval),
            ("distribute_tick_interval", config.distribute_tick_interval),
        ] {
            if interval.is_zero() {
                return Err(BandwidthError::ZeroInterval {
                    name: name.to_string(),
                });
            }
        }

        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(rand::random()),
        };

        let dispatcher = Self {
            inner: Arc::new(DispatcherInner {
                config,
                registry: RwLock::new(ClaimRegistry::default()),
                current_rate: AtomicU64::new(0),
                rng: Mutex::new(rng),
            }),
            ticker: Mutex::new(None),
        };
        dispatcher.refresh_rate();
        Ok(dispatcher)
    }

    /// Registers `claimant` or recomputes its weight from its current swarm.
    pub fn claim_or_update(&self, claimant: Arc<dyn BandwidthClaimant>) {
        self.inner.claim_or_update(claimant);
    }

    /// Removes a claimant. Unknown ids are ignored.
    pub fn release(&self, claimant_id: &InfoHash) {
        let mut registry = self.inner.registry.write();
        if let Some(claim) = registry.claims.remove(claimant_id) {
            registry.total_weight -= claim.weight;
            if registry.claims.is_empty() {
                registry.total_weight = 0.0;
            }
            tracing::debug!("Released bandwidth claim for {}", claimant_id.short());
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.inner.registry.read().total_weight
    }

    pub fn weight_of(&self, claimant_id: &InfoHash) -> Option<f64> {
        self.inner
            .registry
            .read()
            .claims
            .get(claimant_id)
            .map(|claim| claim.weight)
    }

    pub fn claimant_count(&self) -> usize {
        self.inner.registry.read().claims.len()
    }

    /// Current global rate in bytes per second.
    pub fn current_rate(&self) -> u64 {
        self.inner.current_rate.load(Ordering::Relaxed)
    }

    /// Rolls a new global rate within the configured bounds.
    pub fn refresh_rate(&self) -> u64 {
        self.inner.refresh_rate()
    }

    /// Splits `current_rate * elapsed` bytes by weight. Returns bytes handed out.
    pub fn distribute(&self, elapsed: Duration) -> u64 {
        self.inner.distribute(elapsed)
    }

    /// Share of the current rate assigned to each claimant, in bytes per second.
    pub fn speeds(&self) -> HashMap<InfoHash, u64> {
        let rate = self.current_rate() as f64;
        let registry = self.inner.registry.read();
        registry
            .claims
            .iter()
            .map(|(id, claim)| {
                let speed = if registry.total_weight > 0.0 {
                    (rate * claim.weight / registry.total_weight) as u64
                } else {
                    0
                };
                (*id, speed)
            })
            .collect()
    }

    /// Spawns the refresh and distribute tick task. No-op when already started.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_ticks(Arc::clone(&self.inner), cancel.clone()));
        *ticker = Some((cancel, task));
        tracing::info!(
            "Bandwidth dispatcher started at {} B/s",
            self.current_rate()
        );
    }

    /// Stops the tick task and waits for it to exit.
    pub async fn stop(&self) {
        let ticker = self.ticker.lock().take();
        if let Some((cancel, task)) = ticker {
            cancel.cancel();
            if let Err(e) = task.await
                && e.is_panic()
            {
                tracing::error!("Bandwidth tick task panicked: {}", e);
            }
            tracing::info!("Bandwidth dispatcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }
}

impl DispatcherInner {
    fn claim_or_update(&self, claimant: Arc<dyn BandwidthClaimant>) {
        let id = claimant.claimant_id();
        let swarm = claimant.current_swarm();
        let weight = calculate_weight(swarm);

        let mut registry = self.registry.write();
        if let Some(previous) = registry.claims.remove(&id) {
            registry.total_weight -= previous.weight;
        }
        registry.total_weight += weight;
        registry.claims.insert(id, Claim { claimant, weight });

        tracing::trace!(
            "Claim {} updated: {} seeders, {} leechers, weight {:.3}",
            id.short(),
            swarm.seeders,
            swarm.leechers,
            weight
        );
    }

    fn refresh_rate(&self) -> u64 {
        let rate = self.rng.lock().random_range(
            self.config.min_bytes_per_second..=self.config.max_bytes_per_second,
        );
        self.current_rate.store(rate, Ordering::Relaxed);
        tracing::debug!("Global upload rate set to {} B/s", rate);
        rate
    }

    fn distribute(&self, elapsed: Duration) -> u64 {
        let bytes_to_distribute = self.current_rate.load(Ordering::Relaxed) as f64 * elapsed.as_secs_f64();

        let registry = self.registry.read();
        if registry.total_weight <= 0.0 || bytes_to_distribute <= 0.0 {
            return 0;
        }

        let mut distributed = 0;
        for claim in registry.claims.values() {
            let share = (bytes_to_distribute * claim.weight / registry.total_weight) as u64;
            if share > 0 {
                claim.claimant.add_uploaded(share);
                distributed += share;
            }
        }
        distributed
    }
}

async fn run_ticks(inner: Arc<DispatcherInner>, cancel: CancellationToken) {
    let start = Instant::now();
    let mut refresh = tokio::time::interval_at(
        start + inner.config.global_refresh_interval,
        inner.config.global_refresh_interval,
    );
    let mut distribute = tokio::time::interval_at(
        start + inner.config.distribute_tick_interval,
        inner.config.distribute_tick_interval,
    );
    distribute.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_distribution = start;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = refresh.tick() => {
                inner.refresh_rate();
            }
            now = distribute.tick() => {
                let elapsed = now.duration_since(last_distribution);
                last_distribution = now;
                let distributed = inner.distribute(elapsed);
                tracing::trace!("Distributed {} bytes over {:?}", distributed, elapsed);
            }
        }
    }
}
