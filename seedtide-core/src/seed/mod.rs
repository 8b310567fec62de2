//! Seed driver: one fake-seeded torrent end to end.

mod driver;
mod identity;
mod profile;

pub use driver::{Seed, SeedStatus};
pub use identity::SeedIdentity;
pub use profile::{ClientCapabilities, ClientProfile};
