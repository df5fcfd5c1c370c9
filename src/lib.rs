//! cmap: a sharded concurrent hash map whose shards resize themselves
//! independently, without a global lock.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: many threads reading and writing the same map with short,
//!   local critical sections, and online resizing that never stops more
//!   than one shard at a time.
//! - Layers:
//!   - Slot<K, V>: one chain of entries behind its own mutex. The chain
//!     stores entries in a small arena (`slotmap`) linked by index, so
//!     deleted storage is recycled and entries move between chains by
//!     value.
//!   - Redistributor: per-shard policy that watches slot sizes after each
//!     mutation and decides when the slot array should be resized, and to
//!     what size. `LoadFactorRedistributor` is the default; implement the
//!     trait to substitute another strategy.
//!   - Shard<K, V, R>: an array of slots behind a reader/writer lock plus
//!     an atomic entry count. Ordinary operations share the structural
//!     lock; a resize takes it exclusively and rehomes every entry.
//!   - ConcurrentMap<K, V, S, R>: fixed array of shards; hashes each key
//!     once and routes it to one shard.
//!
//! Routing
//! - One `u64` hash per key, computed with the map's `BuildHasher` and
//!   stored in the entry; `K: Hash` is never called again for that entry,
//!   not even during a resize.
//! - Shard index: upper 32 bits modulo the shard count. Slot index: the
//!   full hash modulo the shard's current slot count.
//!
//! Concurrency
//! - Operations on the same key are linearized by that key's slot lock.
//!   Nothing orders operations on keys in different slots or shards.
//! - `len()` sums per-shard atomic counters and is approximate while
//!   writers are active.
//! - No operation performs I/O or waits on anything but the locks above.
//! - Closures given to `with`, `with_mut` and `for_each` run under a lock
//!   and must not call back into the same map. Debug builds detect this
//!   and panic instead of deadlocking.
//!
//! Errors
//! - Misses are `Option`/`bool` results, not errors.
//! - `ConfigError` reports misconfiguration from `ConcurrentMapBuilder::build`.
//! - A resize that loses or duplicates an entry, or a shard count going
//!   negative, is a broken invariant and panics.
//!
//! Notes and non-goals
//! - The shard array never changes size; only slot arrays do.
//! - No persistence, no capacity ceiling beyond what the policy implies.

pub mod error;
pub mod map;
pub mod redistributor;
mod reentrancy;
pub mod shard;
pub mod slot;
mod slot_proptest;

// Public surface
pub use error::{ConfigError, InsertError};
pub use map::{ConcurrentMap, ConcurrentMapBuilder};
pub use redistributor::{LoadFactorRedistributor, Redistributor, RedistributorConfig, SlotStatus};
pub use shard::{Shard, ShardStats};
