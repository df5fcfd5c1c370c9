//! Errors surfaced by the map.
//!
//! Misses are never errors: lookups return `Option`, deletes return `bool`.
//! Only misconfiguration at construction and duplicate `try_insert` calls
//! are reported through these types.

use thiserror::Error;

/// Construction-time misconfiguration, reported by `ConcurrentMapBuilder::build`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("shard count must be at least 1")]
    ZeroShardCount,
    #[error("shard count {0} exceeds the maximum of {max}", max = crate::map::MAX_SHARD_COUNT)]
    TooManyShards(usize),
    #[error("initial slot count per shard must be at least 1")]
    ZeroSlotCount,
    #[error("maximum slot size must be at least 1")]
    ZeroMaxSlotSize,
}

/// Returned by `try_insert` when the key is already present; the map is left unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InsertError {
    #[error("key is already present")]
    DuplicateKey,
}
