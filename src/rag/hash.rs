//! Deterministic hashing for chunk ids and the hashed-bucket embedder.
//!
//! `std::collections::hash_map::DefaultHasher` is seeded randomly per
//! process, which would make chunk ids and embedding buckets change across
//! restarts. We need the same id for the same `source:start:end` every
//! time, so we hash with `sha2` instead.

use sha2::{Digest, Sha256};

/// Stable 64-bit hash of `input`, taken from the first 8 bytes of its
/// SHA-256 digest.
pub fn stable_hash(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().unwrap())
}

/// Stable id for an index entry, per §4.7: `hash(source:start:end)`.
pub fn chunk_id(source: &str, start_line: u32, end_line: u32) -> u64 {
    stable_hash(&format!("{source}:{start_line}:{end_line}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_hashes_identically() {
        assert_eq!(stable_hash("hello"), stable_hash("hello"));
    }

    #[test]
    fn different_input_hashes_differently() {
        assert_ne!(stable_hash("hello"), stable_hash("world"));
    }

    #[test]
    fn chunk_id_is_stable_across_calls() {
        assert_eq!(chunk_id("src/lib.rs", 1, 10), chunk_id("src/lib.rs", 1, 10));
        assert_ne!(chunk_id("src/lib.rs", 1, 10), chunk_id("src/lib.rs", 1, 11));
    }
}
