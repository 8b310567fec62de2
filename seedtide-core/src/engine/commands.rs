//! Command definitions for the seed manager actor.

use tokio::sync::oneshot;

use crate::Result;
use crate::seed::SeedStatus;
use crate::torrent::{InfoHash, TorrentMetadata};

/// Commands sent to the seed manager actor.
///
/// Each command carries a responder for the actor's reply; seeds are only
/// ever touched from the actor task.
pub enum SeedManagerCommand {
    /// Start seeding a torrent.
    AddTorrent {
        metadata: Box<TorrentMetadata>,
        responder: oneshot::Sender<Result<InfoHash>>,
    },
    /// Send the final announce for a torrent and forget it.
    RemoveTorrent {
        info_hash: InfoHash,
        responder: oneshot::Sender<Result<()>>,
    },
    /// Snapshot every active seed.
    ListSeeds {
        responder: oneshot::Sender<Vec<SeedStatus>>,
    },
    /// Stop every seed and the bandwidth dispatcher, then exit.
    Shutdown { responder: oneshot::Sender<()> },
}
