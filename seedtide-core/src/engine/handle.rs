//! Handle for communicating with the seed manager actor.

use tokio::sync::{mpsc, oneshot};

use super::commands::SeedManagerCommand;
use crate::seed::SeedStatus;
use crate::torrent::{InfoHash, TorrentMetadata};
use crate::{Result, SeedtideError};

/// Cloneable async API over the seed manager actor.
#[derive(Clone)]
pub struct SeedManagerHandle {
    sender: mpsc::Sender<SeedManagerCommand>,
}

impl SeedManagerHandle {
    pub(super) fn new(sender: mpsc::Sender<SeedManagerCommand>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SeedManagerCommand,
    ) -> Result<T> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(command(responder))
            .await
            .map_err(|_| SeedtideError::EngineShutdown)?;
        rx.await.map_err(|_| SeedtideError::EngineShutdown)
    }

    /// Starts seeding a torrent.
    ///
    /// # Errors
    ///
    /// - `SeedtideError::DuplicateSeed` - Torrent is already seeding
    /// - `SeedtideError::Announce` - Tracker list cannot be announced to
    /// - `SeedtideError::EngineShutdown` - Actor is gone
    pub async fn add_torrent(&self, metadata: TorrentMetadata) -> Result<InfoHash> {
        self.request(|responder| SeedManagerCommand::AddTorrent {
            metadata: Box::new(metadata),
            responder,
        })
        .await?
    }

    /// Stops seeding a torrent, sending its `Stopped` announce.
    ///
    /// # Errors
    ///
    /// - `SeedtideError::SeedNotFound` - Unknown info hash
    /// - `SeedtideError::EngineShutdown` - Actor is gone
    pub async fn remove_torrent(&self, info_hash: InfoHash) -> Result<()> {
        self.request(|responder| SeedManagerCommand::RemoveTorrent {
            info_hash,
            responder,
        })
        .await?
    }

    /// Status of every active seed, ordered by name.
    ///
    /// # Errors
    ///
    /// - `SeedtideError::EngineShutdown` - Actor is gone
    pub async fn seed_statuses(&self) -> Result<Vec<SeedStatus>> {
        self.request(|responder| SeedManagerCommand::ListSeeds { responder })
            .await
    }

    /// Stops every seed and waits for the actor to finish.
    ///
    /// # Errors
    ///
    /// - `SeedtideError::EngineShutdown` - Actor already gone
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|responder| SeedManagerCommand::Shutdown { responder })
            .await
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
