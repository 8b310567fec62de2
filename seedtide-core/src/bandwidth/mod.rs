//! Simulated upload bandwidth shared between seeding torrents.
//!
//! A global rate is rolled uniformly within configured bounds and split
//! between active torrents by swarm weight on every distribute tick.

mod dispatcher;
mod weight;

pub use dispatcher::{BandwidthClaimant, BandwidthDispatcher};
pub use weight::calculate_weight;

/// Errors from bandwidth dispatcher setup.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BandwidthError {
    #[error("Invalid upload rate range: min {min} > max {max}")]
    InvalidRateRange { min: u64, max: u64 },

    #[error("Interval {name} must be non-zero")]
    ZeroInterval { name: String },
}
