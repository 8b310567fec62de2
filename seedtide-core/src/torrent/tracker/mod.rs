//! BitTorrent tracker communication abstractions and implementations.
//!
//! HTTP tracker client following BEP 3 with per-client query templates,
//! a UDP placeholder and a scripted simulation transport. Everything above
//! this module only sees the [`TrackerClient`] trait.

pub mod client;
pub mod simulated;
pub mod types;
pub mod udp;

// Re-export public API
pub use client::{HttpTrackerClient, HttpTrackerProvider};
pub use simulated::{
    AnnounceLog, RecordedAnnounce, ResponseConfig, SimulatedTrackerClient,
    SimulatedTrackerProvider,
};
pub use types::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, Swarm, TrackerClient,
    TrackerClientProvider, TrackerError,
};
pub use udp::UdpTrackerClient;
