//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Subcommand;
use seedtide_core::torrent::parse_torrent_file;
use seedtide_core::torrent::tracker::{
    HttpTrackerProvider, SimulatedTrackerProvider, TrackerClientProvider,
};
use seedtide_core::{
    ClientProfile, SeedManagerHandle, SeedStatus, SeedtideConfig, TorrentMetadata,
    spawn_seed_manager,
};

/// Seed used for simulated swarms when no bandwidth seed is configured
const DEFAULT_SIMULATION_SEED: u64 = 42;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Seed torrents until interrupted with Ctrl-C
    Seed {
        /// Torrent files to seed
        #[arg(required = true)]
        torrents: Vec<PathBuf>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON client profile to emulate
        #[arg(long)]
        client: Option<PathBuf>,
        /// Announce to in-process simulated trackers instead of the network
        #[arg(long)]
        simulate: bool,
        /// Seconds between status reports
        #[arg(long, default_value = "60")]
        status_every: u64,
    },
    /// Show what a torrent file announces
    Inspect {
        /// Path to torrent file
        torrent: PathBuf,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the first configuration, torrent or engine error encountered
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Seed {
            torrents,
            config,
            client,
            simulate,
            status_every,
        } => {
            seed_torrents(
                &torrents,
                config.as_deref(),
                client.as_deref(),
                simulate,
                Duration::from_secs(status_every.max(1)),
            )
            .await
        }
        Commands::Inspect { torrent } => inspect_torrent(&torrent).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SeedtideConfig> {
    let mut config = match path {
        Some(path) => SeedtideConfig::from_file(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => SeedtideConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn load_profile(path: Option<&Path>) -> anyhow::Result<ClientProfile> {
    match path {
        Some(path) => ClientProfile::from_file(path)
            .with_context(|| format!("Loading client file {}", path.display())),
        None => Ok(ClientProfile::default()),
    }
}

async fn load_torrents(paths: &[PathBuf]) -> Vec<TorrentMetadata> {
    let mut torrents = Vec::with_capacity(paths.len());
    for path in paths {
        match parse_torrent_file(path).await {
            Ok(metadata) => torrents.push(metadata),
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }
    torrents
}

/// Seed torrents until Ctrl-C, then announce `stopped` everywhere
///
/// # Errors
/// - Invalid configuration or client file
/// - None of the torrents could be loaded or seeded
pub async fn seed_torrents(
    paths: &[PathBuf],
    config_path: Option<&Path>,
    client_path: Option<&Path>,
    simulate: bool,
    status_every: Duration,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let profile = load_profile(client_path)?;

    let provider: Arc<dyn TrackerClientProvider> = if simulate {
        let seed = config.bandwidth.rng_seed.unwrap_or(DEFAULT_SIMULATION_SEED);
        println!("Simulation mode: no request leaves this machine");
        Arc::new(SimulatedTrackerProvider::randomized(seed))
    } else {
        Arc::new(HttpTrackerProvider::new(&profile, &config.network)?)
    };

    let torrents = load_torrents(paths).await;
    if torrents.is_empty() {
        bail!("No torrent could be loaded");
    }

    println!("Emulating {}", profile.name);
    let handle = spawn_seed_manager(config, profile, provider)?;

    let mut seeding = 0;
    for metadata in torrents {
        let name = metadata.name.clone();
        match handle.add_torrent(metadata).await {
            Ok(info_hash) => {
                println!("Seeding {name} ({info_hash})");
                seeding += 1;
            }
            Err(e) => eprintln!("Cannot seed {name}: {e}"),
        }
    }
    if seeding == 0 {
        handle.shutdown().await?;
        bail!("No torrent could be seeded");
    }

    report_until_interrupted(&handle, status_every).await?;

    println!("Stopping, sending final announces...");
    handle.shutdown().await?;
    println!("Done");
    Ok(())
}

async fn report_until_interrupted(
    handle: &SeedManagerHandle,
    status_every: Duration,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(status_every);
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Listening for Ctrl-C")?;
                return Ok(());
            }
            _ = ticker.tick() => {
                for status in handle.seed_statuses().await? {
                    println!("{}", format_status(&status));
                }
            }
        }
    }
}

/// Show info hash, size and trackers of a torrent file
///
/// # Errors
/// - Torrent file unreadable or malformed
pub async fn inspect_torrent(path: &Path) -> anyhow::Result<()> {
    let metadata = parse_torrent_file(path)
        .await
        .with_context(|| format!("Reading {}", path.display()))?;

    println!("Name:      {}", metadata.name);
    println!("Info hash: {}", metadata.info_hash);
    println!("Size:      {}", format_size(metadata.total_length));
    println!("Trackers:  {}", metadata.tracker_count());
    for (index, tier) in metadata.tiers.iter().enumerate() {
        println!("  Tier {index}:");
        for url in tier {
            println!("    {url}");
        }
    }
    Ok(())
}

fn format_status(status: &SeedStatus) -> String {
    let last_success = status
        .last_success
        .map(|time| time.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    format!(
        "{} [{}] up {} at {}/s, swarm {}S/{}L, errors {}, last ok {}",
        status.name,
        status.info_hash.short(),
        format_size(status.uploaded),
        format_size(status.upload_rate),
        status.swarm.seeders,
        status.swarm.leechers,
        status.consecutive_errors,
        last_success
    )
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
