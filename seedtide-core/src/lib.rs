//! Seedtide Core - tracker announce orchestration for fake seeding
//!
//! Reports plausible upload progress to BitTorrent trackers without moving
//! any data: a multi-tier announce engine decides which trackers to contact
//! and when, while a bandwidth dispatcher fabricates upload throughput and
//! splits it between torrents by swarm demand.

pub mod announce;
pub mod bandwidth;
pub mod config;
pub mod engine;
pub mod seed;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use announce::{AnnounceError, AnnouncerFactory, Orchestrator};
pub use bandwidth::{BandwidthDispatcher, BandwidthError};
pub use config::SeedtideConfig;
pub use engine::{SeedManagerHandle, spawn_seed_manager};
pub use seed::{ClientProfile, Seed, SeedStatus};
pub use torrent::{InfoHash, TorrentError, TorrentMetadata};

/// Errors that can bubble up from any Seedtide subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SeedtideError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Announce error: {0}")]
    Announce(#[from] AnnounceError),

    #[error("Bandwidth error: {0}")]
    Bandwidth(#[from] BandwidthError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Seed manager has shut down")]
    EngineShutdown,

    #[error("Torrent {info_hash} is not being seeded")]
    SeedNotFound { info_hash: InfoHash },

    #[error("Torrent {info_hash} is already being seeded")]
    DuplicateSeed { info_hash: InfoHash },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeedtideError {
    /// Checks if this error is due to user input rather than runtime state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SeedtideError::Configuration { .. }
                | SeedtideError::Torrent(TorrentError::InvalidTorrentFile { .. })
                | SeedtideError::Announce(
                    AnnounceError::EmptyTierList
                        | AnnounceError::EmptyTrackerList { .. }
                        | AnnounceError::UnsupportedScheme { .. }
                        | AnnounceError::InvalidTrackerUrl { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, SeedtideError>;
