//! Key hashing for the extendible hash index.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps keys to the 32-bit hashes the index routes on.
///
/// Injectable so tests can pin exact hash values and force bucket collisions
/// deterministically.
pub trait HashFunction<K>: Send + Sync {
    /// Hashes a key.
    fn hash_key(&self, key: &K) -> u32;
}

/// Default hash function over `std::hash`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHashFunction;

impl<K: Hash> HashFunction<K> for DefaultHashFunction {
    fn hash_key(&self, key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hash_is_deterministic() {
        let hash_fn = DefaultHashFunction;
        assert_eq!(
            HashFunction::<u32>::hash_key(&hash_fn, &42),
            HashFunction::<u32>::hash_key(&hash_fn, &42)
        );
    }

    #[test]
    fn test_default_hash_spreads_keys() {
        let hash_fn = DefaultHashFunction;
        let a = HashFunction::<u32>::hash_key(&hash_fn, &1);
        let b = HashFunction::<u32>::hash_key(&hash_fn, &2);
        assert_ne!(a, b);
    }
}
