//! Seed manager actor.
//!
//! A single task owns every active [`Seed`](crate::seed::Seed); callers talk
//! to it through a cloneable [`SeedManagerHandle`].

mod actor;
mod commands;
mod handle;

pub use actor::spawn_seed_manager;
pub use handle::SeedManagerHandle;
