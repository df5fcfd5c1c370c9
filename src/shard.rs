//! Shard: an independently resizable partition of the map.
//!
//! Ordinary operations take the structural lock shared, then the lock of
//! the one slot they touch. A resize takes the structural lock exclusively
//! and is the only point where the whole shard stops; other shards are
//! unaffected.

use crate::error::InsertError;
use crate::reentrancy::DebugReentrancy;
use crate::redistributor::{LoadFactorRedistributor, Redistributor, SlotStatus};
use crate::slot::{slot_index, Chain, Entry, Slot};
use core::borrow::Borrow;
use core::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;

/// Point-in-time occupancy of one shard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub slot_count: usize,
    pub pair_total: u64,
    pub empty_slots: usize,
    pub longest_slot: usize,
}

pub struct Shard<K, V, R = LoadFactorRedistributor> {
    slots: RwLock<Vec<Slot<K, V>>>,
    pair_total: AtomicU64,
    redistributor: R,
    reentrancy: DebugReentrancy,
}

impl<K, V, R> Shard<K, V, R>
where
    K: Eq,
    R: Redistributor,
{
    /// Creates a shard of `slot_count` empty slots.
    ///
    /// # Panics
    ///
    /// If `slot_count` is zero; the map builder rejects that configuration
    /// before any shard is built.
    pub fn new(slot_count: usize, redistributor: R) -> Self {
        assert!(slot_count > 0, "a shard needs at least one slot");
        redistributor.update_threshold(0, slot_count);
        Self {
            slots: RwLock::new((0..slot_count).map(|_| Slot::new()).collect()),
            pair_total: AtomicU64::new(0),
            redistributor,
            reentrancy: DebugReentrancy::new(),
        }
    }

    /// Number of entries; approximate while other threads mutate the shard.
    pub fn len(&self) -> usize {
        self.pair_total.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot_count(&self) -> usize {
        let _g = self.reentrancy.enter();
        self.slots.read().len()
    }

    pub fn redistributor(&self) -> &R {
        &self.redistributor
    }

    // Runs `f` on the chain owning `hash`; also returns that chain's length
    // afterwards and the slot count it was observed under.
    fn with_chain<T, F>(&self, hash: u64, f: F) -> (T, usize, usize)
    where
        F: FnOnce(&mut Chain<K, V>) -> T,
    {
        let _g = self.reentrancy.enter();
        let slots = self.slots.read();
        let mut chain = slots[slot_index(hash, slots.len())].lock();
        let out = f(&mut chain);
        (out, chain.len(), slots.len())
    }

    /// Inserts or replaces; returns the previous value on replace.
    pub fn put(&self, key: K, hash: u64, value: V) -> Option<V> {
        let (previous, slot_size, slot_count) = self.with_chain(hash, |chain| {
            let previous = chain.put(Entry::new(key, hash, value));
            if previous.is_none() {
                self.pair_total.fetch_add(1, Ordering::Relaxed);
            }
            previous
        });
        self.settle(slot_size, slot_count, false);
        previous
    }

    /// Inserts only if no entry with an equal key exists.
    pub fn try_insert(&self, key: K, hash: u64, value: V) -> Result<(), InsertError> {
        let (inserted, slot_size, slot_count) = self.with_chain(hash, |chain| {
            if chain.contains_key(&key, hash) {
                return false;
            }
            chain.push(Entry::new(key, hash, value));
            self.pair_total.fetch_add(1, Ordering::Relaxed);
            true
        });
        if !inserted {
            return Err(InsertError::DuplicateKey);
        }
        self.settle(slot_size, slot_count, false);
        Ok(())
    }

    /// Runs `f` on the value for `key` while its slot is locked.
    pub fn with<Q, T, F>(&self, key: &Q, hash: u64, f: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        F: FnOnce(&V) -> T,
    {
        self.with_chain(hash, |chain| chain.get(key, hash).map(f)).0
    }

    /// Runs `f` on a mutable reference to the value for `key`.
    pub fn with_mut<Q, T, F>(&self, key: &Q, hash: u64, f: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        F: FnOnce(&mut V) -> T,
    {
        self.with_chain(hash, |chain| chain.get_mut(key, hash).map(f)).0
    }

    pub fn get<Q>(&self, key: &Q, hash: u64) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        V: Clone,
    {
        self.with(key, hash, V::clone)
    }

    pub fn contains_key<Q>(&self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.with_chain(hash, |chain| chain.contains_key(key, hash)).0
    }

    /// Removes the entry for `key` and returns its value.
    pub fn remove<Q>(&self, key: &Q, hash: u64) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let (removed, slot_size, slot_count) = self.with_chain(hash, |chain| {
            let removed = chain.remove(key, hash);
            if removed.is_some() {
                let before = self.pair_total.fetch_sub(1, Ordering::Relaxed);
                assert!(before > 0, "shard pair total underflow");
            }
            removed
        });
        // The removed key is dropped outside of every lock.
        let (_key, value) = removed?;
        self.settle(slot_size, slot_count, true);
        Some(value)
    }

    pub fn delete<Q>(&self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.remove(key, hash).is_some()
    }

    /// Visits every entry, one slot at a time.
    ///
    /// Entries inserted or removed concurrently in slots not yet visited
    /// may or may not be seen; a resize cannot start until the visit ends.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        let _g = self.reentrancy.enter();
        let slots = self.slots.read();
        for slot in slots.iter() {
            for entry in slot.lock().iter() {
                f(entry.key(), entry.value());
            }
        }
    }

    pub fn stats(&self) -> ShardStats {
        let _g = self.reentrancy.enter();
        let slots = self.slots.read();
        let mut stats = ShardStats {
            slot_count: slots.len(),
            pair_total: self.pair_total.load(Ordering::Relaxed),
            ..ShardStats::default()
        };
        for slot in slots.iter() {
            let size = slot.len();
            if size == 0 {
                stats.empty_slots += 1;
            }
            stats.longest_slot = stats.longest_slot.max(size);
        }
        stats
    }

    // Consults the policy about the slot just mutated and, if it asks for a
    // redistribution, escalates to the structural lock.
    fn settle(&self, slot_size: usize, slot_count: usize, removed: bool) {
        let pair_total = self.pair_total.load(Ordering::Relaxed);
        let status = match self
            .redistributor
            .check_slot_status(pair_total, slot_size as u64)
        {
            // A delete that empties its slot is the underweight trigger.
            SlotStatus::Normal if removed && slot_size == 0 => SlotStatus::Underweight,
            status => status,
        };
        if status == SlotStatus::Normal
            || !self.redistributor.should_redistribute(status, slot_count)
        {
            return;
        }

        let _g = self.reentrancy.enter();
        let mut slots = self.slots.write();
        if self.redistributor.redistribute(status, &mut slots) {
            let pair_total = self.pair_total.load(Ordering::Relaxed);
            self.redistributor.update_threshold(pair_total, slots.len());
        }
    }
}

impl<K, V, R> core::fmt::Debug for Shard<K, V, R>
where
    K: Eq,
    R: Redistributor,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Shard").field("stats", &self.stats()).finish()
    }
}
