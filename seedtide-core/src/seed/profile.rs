//! Emulated client profile: identity format, announce query and strategy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, SeedtideError};

/// Multi-tracker behaviour of the emulated client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCapabilities {
    /// Honours `announce-list`; otherwise only the first tracker is used
    pub support_announce_list: bool,
    /// Announces to every tier instead of falling back between them
    pub announce_to_all_tiers: bool,
    /// Announces to every tracker of a tier instead of one at a time
    pub announce_to_all_trackers_in_tier: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            support_announce_list: true,
            announce_to_all_tiers: false,
            announce_to_all_trackers_in_tier: false,
        }
    }
}

/// Everything trackers can observe about the emulated client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProfile {
    pub name: String,
    /// Azureus-style prefix, e.g. `-TR3000-`
    pub peer_id_prefix: String,
    pub key_length: usize,
    /// Announce query template with `{placeholder}` tokens
    pub query: String,
    pub user_agent: String,
    pub num_want: u32,
    pub num_want_on_stop: u32,
    pub capabilities: ClientCapabilities,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            name: "Transmission 3.00".to_string(),
            peer_id_prefix: "-TR3000-".to_string(),
            key_length: 8,
            query: "info_hash={infohash}&peer_id={peerid}&port={port}&uploaded={uploaded}\
                    &downloaded={downloaded}&left={left}&numwant={numwant}&key={key}\
                    &compact=1&supportcrypto=1&event={event}"
                .to_string(),
            user_agent: "Transmission/3.00".to_string(),
            num_want: 80,
            num_want_on_stop: 0,
            capabilities: ClientCapabilities::default(),
        }
    }
}

impl ClientProfile {
    /// Loads a profile from a JSON client file.
    ///
    /// # Errors
    ///
    /// - `SeedtideError::Io` - File cannot be read
    /// - `SeedtideError::Configuration` - Invalid JSON or profile values
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let profile: Self =
            serde_json::from_str(&contents).map_err(|e| SeedtideError::Configuration {
                reason: format!("Failed to parse client file {}: {e}", path.display()),
            })?;
        profile.validate()?;
        Ok(profile)
    }

    /// # Errors
    ///
    /// - `SeedtideError::Configuration` - Prefix too long or query lacks
    ///   the info hash placeholder
    pub fn validate(&self) -> Result<()> {
        if self.peer_id_prefix.len() > 20 {
            return Err(SeedtideError::Configuration {
                reason: format!(
                    "Peer id prefix {:?} exceeds 20 bytes",
                    self.peer_id_prefix
                ),
            });
        }
        if !self.query.contains("{infohash}") {
            return Err(SeedtideError::Configuration {
                reason: "Announce query must contain {infohash}".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_valid() {
        let profile = ClientProfile::default();
        assert!(profile.validate().is_ok());
        assert!(!profile.query.contains(' '));
        assert!(profile.capabilities.support_announce_list);
    }

    #[test]
    fn test_from_file_with_partial_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{ "name": "qBittorrent 4.6.2", "peer_id_prefix": "-qB4620-",
                 "capabilities": { "announce_to_all_tiers": true } }"#,
        )
        .unwrap();

        let profile = ClientProfile::from_file(&path).unwrap();
        assert_eq!(profile.peer_id_prefix, "-qB4620-");
        assert!(profile.capabilities.announce_to_all_tiers);
        assert!(profile.capabilities.support_announce_list);
        assert_eq!(profile.key_length, 8);
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let long_prefix = ClientProfile {
            peer_id_prefix: "-XX0000-this-is-far-too-long".to_string(),
            ..ClientProfile::default()
        };
        assert!(long_prefix.validate().is_err());

        let no_hash = ClientProfile {
            query: "peer_id={peerid}".to_string(),
            ..ClientProfile::default()
        };
        assert!(no_hash.validate().is_err());
    }
}
