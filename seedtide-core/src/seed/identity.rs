//! Per-seed peer id and announce key.

use rand::Rng;
use rand::distr::Alphanumeric;

use super::ClientProfile;

const PEER_ID_LEN: usize = 20;
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Identity presented to trackers for one torrent, fixed for the seed's life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedIdentity {
    pub peer_id: [u8; PEER_ID_LEN],
    pub key: String,
}

impl SeedIdentity {
    pub fn generate<R: Rng + ?Sized>(profile: &ClientProfile, rng: &mut R) -> Self {
        Self {
            peer_id: generate_peer_id(&profile.peer_id_prefix, rng),
            key: generate_key(profile.key_length, rng),
        }
    }
}

/// Profile prefix followed by random alphanumerics up to 20 bytes.
fn generate_peer_id<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> [u8; PEER_ID_LEN] {
    let mut peer_id = [0u8; PEER_ID_LEN];
    let prefix = prefix.as_bytes();
    let prefix_len = prefix.len().min(PEER_ID_LEN);
    peer_id[..prefix_len].copy_from_slice(&prefix[..prefix_len]);
    for byte in &mut peer_id[prefix_len..] {
        *byte = rng.sample(Alphanumeric);
    }
    peer_id
}

/// Random upper-case hex string of `length` characters.
fn generate_key<R: Rng + ?Sized>(length: usize, rng: &mut R) -> String {
    (0..length)
        .map(|_| char::from(HEX_DIGITS[rng.random_range(0..HEX_DIGITS.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_peer_id_keeps_prefix() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let identity = SeedIdentity::generate(&ClientProfile::default(), &mut rng);

        assert!(identity.peer_id.starts_with(b"-TR3000-"));
        assert!(identity.peer_id[8..].iter().all(u8::is_ascii_alphanumeric));
        assert_eq!(identity.key.len(), 8);
        assert!(identity.key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_generation_is_seeded() {
        let profile = ClientProfile::default();
        let first = SeedIdentity::generate(&profile, &mut ChaCha8Rng::seed_from_u64(9));
        let second = SeedIdentity::generate(&profile, &mut ChaCha8Rng::seed_from_u64(9));
        let other = SeedIdentity::generate(&profile, &mut ChaCha8Rng::seed_from_u64(10));

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_full_length_prefix() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let peer_id = generate_peer_id("ABCDEFGHIJKLMNOPQRSTUVWXYZ", &mut rng);
        assert_eq!(&peer_id, b"ABCDEFGHIJKLMNOPQRST");
        assert!(generate_key(0, &mut rng).is_empty());
    }
}
