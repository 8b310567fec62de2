//! Actor owning every active seed.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;

use super::commands::SeedManagerCommand;
use super::handle::SeedManagerHandle;
use crate::announce::AnnouncerFactory;
use crate::bandwidth::BandwidthDispatcher;
use crate::config::SeedtideConfig;
use crate::seed::{ClientProfile, Seed, SeedStatus};
use crate::torrent::tracker::TrackerClientProvider;
use crate::torrent::{InfoHash, TorrentMetadata};
use crate::{Result, SeedtideError};

const COMMAND_BUFFER: usize = 100;

/// Spawns the bandwidth dispatcher and the seed manager actor.
///
/// # Errors
///
/// - `SeedtideError::Configuration` - Invalid configuration or profile
/// - `SeedtideError::Bandwidth` - Invalid upload rate settings
pub fn spawn_seed_manager(
    config: SeedtideConfig,
    profile: ClientProfile,
    provider: Arc<dyn TrackerClientProvider>,
) -> Result<SeedManagerHandle> {
    config.validate()?;
    profile.validate()?;

    let dispatcher = Arc::new(BandwidthDispatcher::new(config.bandwidth.clone())?);
    dispatcher.start();

    let rng = match config.bandwidth.rng_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::seed_from_u64(rand::random()),
    };

    let manager = SeedManager {
        factory: AnnouncerFactory::new(provider, config.announce.clone()),
        profile: Arc::new(profile),
        dispatcher,
        config,
        rng,
        seeds: HashMap::new(),
    };

    let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
    tokio::spawn(run_actor_loop(manager, receiver));

    Ok(SeedManagerHandle::new(sender))
}

struct SeedManager {
    factory: AnnouncerFactory,
    profile: Arc<ClientProfile>,
    dispatcher: Arc<BandwidthDispatcher>,
    config: SeedtideConfig,
    rng: ChaCha8Rng,
    seeds: HashMap<InfoHash, Seed>,
}

impl SeedManager {
    fn add_torrent(&mut self, metadata: &TorrentMetadata) -> Result<InfoHash> {
        let info_hash = metadata.info_hash;
        if self.seeds.contains_key(&info_hash) {
            return Err(SeedtideError::DuplicateSeed { info_hash });
        }

        let seed = Seed::new(
            metadata,
            Arc::clone(&self.profile),
            &self.factory,
            Arc::clone(&self.dispatcher),
            self.config.network.listen_port,
            self.config.announce.stop_timeout,
            &mut self.rng,
        )?;
        seed.start()?;
        self.seeds.insert(info_hash, seed);
        Ok(info_hash)
    }

    async fn remove_torrent(&mut self, info_hash: InfoHash) -> Result<()> {
        let seed = self
            .seeds
            .remove(&info_hash)
            .ok_or(SeedtideError::SeedNotFound { info_hash })?;
        seed.stop().await;
        Ok(())
    }

    fn statuses(&self) -> Vec<SeedStatus> {
        let mut statuses: Vec<SeedStatus> = self.seeds.values().map(Seed::status).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name).then(a.info_hash.cmp(&b.info_hash)));
        statuses
    }

    async fn shutdown(&mut self) {
        let seeds: Vec<Seed> = self.seeds.drain().map(|(_, seed)| seed).collect();
        tracing::info!("Stopping {} seed(s)", seeds.len());
        join_all(seeds.iter().map(|seed| seed.stop())).await;
        self.dispatcher.stop().await;
    }
}

async fn run_actor_loop(mut manager: SeedManager, mut receiver: mpsc::Receiver<SeedManagerCommand>) {
    tracing::debug!("Seed manager actor started");

    while let Some(command) = receiver.recv().await {
        match command {
            SeedManagerCommand::AddTorrent {
                metadata,
                responder,
            } => {
                let result = manager.add_torrent(&metadata);
                if let Err(e) = &result {
                    tracing::warn!("Could not seed {}: {}", metadata.name, e);
                }
                let _ = responder.send(result);
            }
            SeedManagerCommand::RemoveTorrent {
                info_hash,
                responder,
            } => {
                let result = manager.remove_torrent(info_hash).await;
                let _ = responder.send(result);
            }
            SeedManagerCommand::ListSeeds { responder } => {
                let _ = responder.send(manager.statuses());
            }
            SeedManagerCommand::Shutdown { responder } => {
                manager.shutdown().await;
                let _ = responder.send(());
                tracing::debug!("Seed manager actor shut down");
                return;
            }
        }
    }

    // Every handle dropped without an explicit shutdown
    manager.shutdown().await;
    tracing::debug!("Seed manager actor stopped");
}
