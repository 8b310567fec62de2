//! Per-torrent seed controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;

use super::{ClientProfile, SeedIdentity};
use crate::announce::{AnnounceDelegate, AnnounceError, AnnouncerFactory, Orchestrator};
use crate::bandwidth::{BandwidthClaimant, BandwidthDispatcher};
use crate::torrent::tracker::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, Swarm, TrackerError,
};
use crate::torrent::{InfoHash, TorrentMetadata};

/// Consecutive failures after which the seed stops claiming bandwidth.
const SWARM_RESET_ERRORS: u32 = 2;

/// Counters the bandwidth dispatcher reads and credits.
pub(crate) struct SeedCounters {
    info_hash: InfoHash,
    uploaded: AtomicU64,
    swarm: RwLock<Swarm>,
}

impl BandwidthClaimant for SeedCounters {
    fn claimant_id(&self) -> InfoHash {
        self.info_hash
    }

    fn current_swarm(&self) -> Swarm {
        *self.swarm.read()
    }

    fn add_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct AnnounceBook {
    consecutive_errors: u32,
    interval: Option<Duration>,
    last_success: Option<DateTime<Utc>>,
}

/// Snapshot of one seed for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedStatus {
    pub info_hash: InfoHash,
    pub name: String,
    pub uploaded: u64,
    pub swarm: Swarm,
    /// Current share of the global upload rate in bytes per second
    pub upload_rate: u64,
    pub consecutive_errors: u32,
    pub interval: Option<Duration>,
    pub last_success: Option<DateTime<Utc>>,
}

struct SeedState {
    counters: Arc<SeedCounters>,
    identity: SeedIdentity,
    profile: Arc<ClientProfile>,
    port: u16,
    dispatcher: Arc<BandwidthDispatcher>,
    book: Mutex<AnnounceBook>,
    active: AtomicBool,
}

impl SeedState {
    fn push_swarm(&self, swarm: Swarm) {
        *self.counters.swarm.write() = swarm;
        if self.active.load(Ordering::Acquire) {
            self.dispatcher.claim_or_update(self.counters.clone());
        }
    }
}

impl AnnounceDelegate for SeedState {
    fn announce_request(&self, event: AnnounceEvent) -> AnnounceRequest {
        let num_want = if event == AnnounceEvent::Stopped {
            self.profile.num_want_on_stop
        } else {
            self.profile.num_want
        };

        AnnounceRequest {
            info_hash: self.counters.info_hash,
            peer_id: self.identity.peer_id,
            uploaded: self.counters.uploaded.load(Ordering::Relaxed),
            downloaded: 0,
            left: 0,
            event,
            ip: None,
            key: self.identity.key.clone(),
            port: self.port,
            num_want,
        }
    }

    fn on_announce_success(&self, _tracker_url: &str, event: AnnounceEvent, response: &AnnounceResponse) {
        {
            let mut book = self.book.lock();
            book.consecutive_errors = 0;
            book.interval = Some(response.interval);
            book.last_success = Some(Utc::now());
        }
        if event != AnnounceEvent::Stopped {
            self.push_swarm(response.swarm());
        }
    }

    fn on_announce_error(&self, tracker_url: &str, event: AnnounceEvent, error: &TrackerError) {
        let consecutive_errors = {
            let mut book = self.book.lock();
            book.consecutive_errors = book.consecutive_errors.saturating_add(1);
            book.consecutive_errors
        };

        if consecutive_errors >= SWARM_RESET_ERRORS
            && event != AnnounceEvent::Started
            && event != AnnounceEvent::Stopped
        {
            tracing::info!(
                "{} consecutive announce errors for {} (last from {}: {}), dropping swarm",
                consecutive_errors,
                self.counters.info_hash.short(),
                tracker_url,
                error
            );
            self.push_swarm(Swarm::empty());
        }
    }
}

/// One fake-seeded torrent: identity, counters and its orchestrator.
///
/// Announces go through the orchestrator; the dispatcher credits uploads
/// through the seed's counters, so neither holds a reference back to the
/// seed itself.
pub struct Seed {
    name: String,
    state: Arc<SeedState>,
    orchestrator: Orchestrator,
    stop_timeout: Duration,
}

impl Seed {
    /// Builds a seed and its orchestrator without starting anything.
    ///
    /// # Errors
    ///
    /// - `AnnounceError` - The torrent's tracker list cannot be announced to
    pub fn new<R: Rng + ?Sized>(
        metadata: &TorrentMetadata,
        profile: Arc<ClientProfile>,
        factory: &AnnouncerFactory,
        dispatcher: Arc<BandwidthDispatcher>,
        port: u16,
        stop_timeout: Duration,
        rng: &mut R,
    ) -> Result<Self, AnnounceError> {
        let state = Arc::new(SeedState {
            counters: Arc::new(SeedCounters {
                info_hash: metadata.info_hash,
                uploaded: AtomicU64::new(0),
                swarm: RwLock::new(Swarm::empty()),
            }),
            identity: SeedIdentity::generate(&profile, rng),
            profile: Arc::clone(&profile),
            port,
            dispatcher,
            book: Mutex::new(AnnounceBook::default()),
            active: AtomicBool::new(false),
        });

        let delegate: Arc<dyn AnnounceDelegate> = state.clone();
        let orchestrator = factory.build(&metadata.tiers, &profile.capabilities, delegate)?;

        Ok(Self {
            name: metadata.name.clone(),
            state,
            orchestrator,
            stop_timeout,
        })
    }

    pub fn info_hash(&self) -> InfoHash {
        self.state.counters.info_hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &SeedIdentity {
        &self.state.identity
    }

    /// Registers with the dispatcher and starts announcing with `Started`.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::AlreadyRunning` - Seed already started
    pub fn start(&self) -> Result<(), AnnounceError> {
        self.orchestrator.start()?;
        self.state.active.store(true, Ordering::Release);
        self.state
            .dispatcher
            .claim_or_update(self.state.counters.clone());
        tracing::info!("Seeding {} ({})", self.name, self.info_hash());
        Ok(())
    }

    /// Sends the final `Stopped` announce and releases the bandwidth claim.
    ///
    /// No-op when the seed is not running.
    pub async fn stop(&self) {
        if !self.orchestrator.is_running() {
            return;
        }
        self.orchestrator.stop(self.stop_timeout).await;
        self.state.active.store(false, Ordering::Release);
        self.state.dispatcher.release(&self.info_hash());
        tracing::info!(
            "Stopped seeding {} after {} bytes",
            self.name,
            self.uploaded()
        );
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    pub fn uploaded(&self) -> u64 {
        self.state.counters.uploaded.load(Ordering::Relaxed)
    }

    pub fn swarm(&self) -> Swarm {
        self.state.counters.current_swarm()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.state.book.lock().consecutive_errors
    }

    pub fn status(&self) -> SeedStatus {
        let info_hash = self.info_hash();
        let book = self.state.book.lock();
        SeedStatus {
            info_hash,
            name: self.name.clone(),
            uploaded: self.uploaded(),
            swarm: self.swarm(),
            upload_rate: self
                .state
                .dispatcher
                .speeds()
                .get(&info_hash)
                .copied()
                .unwrap_or(0),
            consecutive_errors: book.consecutive_errors,
            interval: book.interval,
            last_success: book.last_success,
        }
    }
}
