//! Channel id hashing
//!
//! The hash is only the primary index key. Collisions are expected and
//! resolved by comparing the full id, so any stable function will do.

use xxhash_rust::xxh32::xxh32;

/// Stable 32-bit digest of a channel id
pub trait ChannelHasher: Send + Sync {
    fn hash(&self, id: &[u8]) -> u32;
}

/// Default hasher: XXH32 with a fixed seed
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh32Hasher {
    seed: u32,
}

impl Xxh32Hasher {
    pub fn with_seed(seed: u32) -> Self {
        Self { seed }
    }
}

impl ChannelHasher for Xxh32Hasher {
    fn hash(&self, id: &[u8]) -> u32 {
        xxh32(id, self.seed)
    }
}

impl<F> ChannelHasher for F
where
    F: Fn(&[u8]) -> u32 + Send + Sync,
{
    fn hash(&self, id: &[u8]) -> u32 {
        self(id)
    }
}
