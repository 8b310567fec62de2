//! Centralized configuration for Seedtide.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase. Files are JSON with durations in
//! (fractional) seconds; every field is optional and falls back to its
//! default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SeedtideError};

/// Central configuration for all Seedtide components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedtideConfig {
    pub announce: AnnounceConfig,
    pub bandwidth: BandwidthConfig,
    pub network: NetworkConfig,
}

/// Announce scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    /// Wait used when a tracker never granted an interval
    #[serde(with = "duration_secs")]
    pub default_interval: Duration,
    /// Floor applied to tracker-provided intervals
    #[serde(with = "duration_secs")]
    pub min_interval: Duration,
    /// Results buffered per tracker loop before the oldest is dropped
    pub result_buffer: usize,
    /// Bound on each phase of an orchestrator stop
    #[serde(with = "duration_secs")]
    pub stop_timeout: Duration,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(1800), // 30 minutes
            min_interval: Duration::from_secs(5),
            result_buffer: 64,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Simulated upload budget configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthConfig {
    pub min_bytes_per_second: u64,
    pub max_bytes_per_second: u64,
    /// How often the global rate is re-rolled
    #[serde(with = "duration_secs")]
    pub global_refresh_interval: Duration,
    /// How often the rate is split between torrents
    #[serde(with = "duration_secs")]
    pub distribute_tick_interval: Duration,
    /// Fixed seed for reproducible rate rolls
    pub rng_seed: Option<u64>,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            min_bytes_per_second: 10 * 1024,  // 10 KiB/s
            max_bytes_per_second: 100 * 1024, // 100 KiB/s
            global_refresh_interval: Duration::from_secs(20 * 60),
            distribute_tick_interval: Duration::from_secs(5),
            rng_seed: None,
        }
    }
}

/// Network and tracker communication configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout for tracker communication
    #[serde(with = "duration_secs")]
    pub tracker_timeout: Duration,
    /// Port reported to trackers
    pub listen_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tracker_timeout: Duration::from_secs(30),
            listen_port: 6881,
        }
    }
}

impl SeedtideConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// - `SeedtideError::Io` - File cannot be read
    /// - `SeedtideError::Configuration` - Invalid JSON or values
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| SeedtideError::Configuration {
                reason: format!("Failed to parse {}: {e}", path.display()),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Overrides fields from `SEEDTIDE_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(rate) = env_parse::<u64>("SEEDTIDE_MIN_UPLOAD_RATE") {
            self.bandwidth.min_bytes_per_second = rate;
        }
        if let Some(rate) = env_parse::<u64>("SEEDTIDE_MAX_UPLOAD_RATE") {
            self.bandwidth.max_bytes_per_second = rate;
        }
        if let Some(seconds) = env_parse::<u64>("SEEDTIDE_TRACKER_TIMEOUT") {
            self.network.tracker_timeout = Duration::from_secs(seconds);
        }
        if let Some(seed) = env_parse::<u64>("SEEDTIDE_RNG_SEED") {
            self.bandwidth.rng_seed = Some(seed);
        }
        if let Some(port) = env_parse::<u16>("SEEDTIDE_LISTEN_PORT") {
            self.network.listen_port = port;
        }
    }

    /// Creates a configuration optimized for testing: deterministic rates,
    /// short intervals.
    pub fn for_testing() -> Self {
        Self {
            announce: AnnounceConfig {
                default_interval: Duration::from_secs(60),
                min_interval: Duration::from_secs(1),
                stop_timeout: Duration::from_secs(1),
                ..AnnounceConfig::default()
            },
            bandwidth: BandwidthConfig {
                min_bytes_per_second: 1024,
                max_bytes_per_second: 1024,
                distribute_tick_interval: Duration::from_secs(1),
                rng_seed: Some(42),
                ..BandwidthConfig::default()
            },
            network: NetworkConfig::default(),
        }
    }

    /// # Errors
    ///
    /// - `SeedtideError::Configuration` - Inconsistent or zero values
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(SeedtideError::Configuration { reason });

        if self.bandwidth.min_bytes_per_second > self.bandwidth.max_bytes_per_second {
            return invalid(format!(
                "min_bytes_per_second ({}) exceeds max_bytes_per_second ({})",
                self.bandwidth.min_bytes_per_second, self.bandwidth.max_bytes_per_second
            ));
        }

        for (name, value) in [
            ("announce.default_interval", self.announce.default_interval),
            ("announce.stop_timeout", self.announce.stop_timeout),
            ("bandwidth.global_refresh_interval", self.bandwidth.global_refresh_interval),
            ("bandwidth.distribute_tick_interval", self.bandwidth.distribute_tick_interval),
            ("network.tracker_timeout", self.network.tracker_timeout),
        ] {
            if value.is_zero() {
                return invalid(format!("{name} must be greater than zero"));
            }
        }

        if self.announce.result_buffer == 0 {
            return invalid("announce.result_buffer must be at least 1".to_string());
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

/// Serializes a `Duration` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
    }
}
