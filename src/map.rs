//! ConcurrentMap: fixed array of shards routed by key hash.

use crate::error::{ConfigError, InsertError};
use crate::redistributor::{
    LoadFactorRedistributor, Redistributor, RedistributorConfig, DEFAULT_LOAD_FACTOR,
    DEFAULT_MAX_SLOT_SIZE,
};
use crate::shard::{Shard, ShardStats};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use crossbeam_utils::CachePadded;
use hashbrown::hash_map::DefaultHashBuilder;
use tracing::debug;

/// Upper bound on the number of shards.
pub const MAX_SHARD_COUNT: usize = 1 << 16;
pub const DEFAULT_SHARD_COUNT: usize = 16;
pub const DEFAULT_SLOTS_PER_SHARD: usize = 16;

/// Signature of the default redistributor factory.
pub type DefaultRedistributorFactory = fn(&RedistributorConfig) -> LoadFactorRedistributor;

pub struct ConcurrentMap<K, V, S = DefaultHashBuilder, R = LoadFactorRedistributor> {
    hasher: S,
    shards: Box<[CachePadded<Shard<K, V, R>>]>,
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    /// A map with the default configuration.
    pub fn new() -> Self {
        Self::builder().assemble()
    }

    pub fn builder() -> ConcurrentMapBuilder<K, V> {
        ConcurrentMapBuilder::new()
    }
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, R> ConcurrentMap<K, V, S, R>
where
    K: Eq + Hash,
    S: BuildHasher,
    R: Redistributor,
{
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    // Slots are chosen with `hash % slot_count`; the shard comes from the
    // upper half so both choices do not hinge on the same bits.
    fn shard_for(&self, hash: u64) -> &Shard<K, V, R> {
        let index = ((hash >> 32) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Inserts or replaces; returns the previous value when replacing.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let hash = self.make_hash(&key);
        self.shard_for(hash).put(key, hash, value)
    }

    /// Inserts only if `key` is absent.
    pub fn try_insert(&self, key: K, value: V) -> Result<(), InsertError> {
        let hash = self.make_hash(&key);
        self.shard_for(hash).try_insert(key, hash, value)
    }

    /// Returns a clone of the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        let hash = self.make_hash(key);
        self.shard_for(hash).get(key, hash)
    }

    /// Runs `f` on the value for `key` while its slot is locked.
    ///
    /// `f` must not call back into this map; debug builds panic if it does.
    pub fn with<Q, T, F>(&self, key: &Q, f: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V) -> T,
    {
        let hash = self.make_hash(key);
        self.shard_for(hash).with(key, hash, f)
    }

    /// Runs `f` on a mutable reference to the value for `key`.
    pub fn with_mut<Q, T, F>(&self, key: &Q, f: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&mut V) -> T,
    {
        let hash = self.make_hash(key);
        self.shard_for(hash).with_mut(key, hash, f)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(key);
        self.shard_for(hash).contains_key(key, hash)
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(key);
        self.shard_for(hash).remove(key, hash)
    }

    /// Removes `key`; `true` if it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove(key).is_some()
    }

    /// Sum of the shard totals. Not a snapshot: shards are read one after
    /// another while other threads may be mutating them.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.is_empty())
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shards(&self) -> impl Iterator<Item = &Shard<K, V, R>> {
        self.shards.iter().map(|s| &**s)
    }

    /// Visits every entry, shard by shard.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for shard in self.shards() {
            shard.for_each(&mut f);
        }
    }

    pub fn stats(&self) -> Vec<ShardStats> {
        self.shards().map(Shard::stats).collect()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<K, V, S, R> fmt::Debug for ConcurrentMap<K, V, S, R>
where
    K: Eq + Hash,
    S: BuildHasher,
    R: Redistributor,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("len", &self.len())
            .field("shards", &self.stats())
            .finish()
    }
}

/// Construction-time configuration of a `ConcurrentMap`.
///
/// `build` validates the settings; a load factor that is not positive is
/// not an error, the redistributor substitutes its default.
pub struct ConcurrentMapBuilder<K, V, S = DefaultHashBuilder, F = DefaultRedistributorFactory> {
    shard_count: usize,
    slots_per_shard: usize,
    load_factor: f64,
    max_slot_size: u64,
    hasher: S,
    make_redistributor: F,
    _map: PhantomData<fn() -> (K, V)>,
}

impl<K, V> ConcurrentMapBuilder<K, V> {
    pub fn new() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            slots_per_shard: DEFAULT_SLOTS_PER_SHARD,
            load_factor: DEFAULT_LOAD_FACTOR,
            max_slot_size: DEFAULT_MAX_SLOT_SIZE,
            hasher: DefaultHashBuilder::default(),
            make_redistributor: LoadFactorRedistributor::new,
            _map: PhantomData,
        }
    }
}

impl<K, V> Default for ConcurrentMapBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, F> ConcurrentMapBuilder<K, V, S, F> {
    /// Number of shards; fixed for the lifetime of the map.
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Slots each shard starts with.
    pub fn slots_per_shard(mut self, slots_per_shard: usize) -> Self {
        self.slots_per_shard = slots_per_shard;
        self
    }

    pub fn load_factor(mut self, load_factor: f64) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Chain length above which a slot is always overweight.
    pub fn max_slot_size(mut self, max_slot_size: u64) -> Self {
        self.max_slot_size = max_slot_size;
        self
    }

    pub fn hasher<S2>(self, hasher: S2) -> ConcurrentMapBuilder<K, V, S2, F> {
        ConcurrentMapBuilder {
            shard_count: self.shard_count,
            slots_per_shard: self.slots_per_shard,
            load_factor: self.load_factor,
            max_slot_size: self.max_slot_size,
            hasher,
            make_redistributor: self.make_redistributor,
            _map: PhantomData,
        }
    }

    /// Replaces the redistribution policy; `make` is called once per shard.
    pub fn redistributor<F2, R>(self, make: F2) -> ConcurrentMapBuilder<K, V, S, F2>
    where
        F2: Fn(&RedistributorConfig) -> R,
        R: Redistributor,
    {
        ConcurrentMapBuilder {
            shard_count: self.shard_count,
            slots_per_shard: self.slots_per_shard,
            load_factor: self.load_factor,
            max_slot_size: self.max_slot_size,
            hasher: self.hasher,
            make_redistributor: make,
            _map: PhantomData,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::ZeroShardCount);
        }
        if self.shard_count > MAX_SHARD_COUNT {
            return Err(ConfigError::TooManyShards(self.shard_count));
        }
        if self.slots_per_shard == 0 {
            return Err(ConfigError::ZeroSlotCount);
        }
        if self.max_slot_size == 0 {
            return Err(ConfigError::ZeroMaxSlotSize);
        }
        Ok(())
    }

    pub fn build<R>(self) -> Result<ConcurrentMap<K, V, S, R>, ConfigError>
    where
        K: Eq + Hash,
        S: BuildHasher,
        F: Fn(&RedistributorConfig) -> R,
        R: Redistributor,
    {
        self.validate()?;
        Ok(self.assemble())
    }

    // Callers have validated the configuration.
    fn assemble<R>(self) -> ConcurrentMap<K, V, S, R>
    where
        K: Eq + Hash,
        S: BuildHasher,
        F: Fn(&RedistributorConfig) -> R,
        R: Redistributor,
    {
        let config = RedistributorConfig {
            load_factor: self.load_factor,
            slot_count: self.slots_per_shard,
            max_slot_size: self.max_slot_size,
        };
        debug!(
            shard_count = self.shard_count,
            slots_per_shard = self.slots_per_shard,
            load_factor = self.load_factor,
            max_slot_size = self.max_slot_size,
            "building concurrent map"
        );
        let shards = (0..self.shard_count)
            .map(|_| {
                CachePadded::new(Shard::new(
                    self.slots_per_shard,
                    (self.make_redistributor)(&config),
                ))
            })
            .collect();
        ConcurrentMap {
            hasher: self.hasher,
            shards,
        }
    }
}
