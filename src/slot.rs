//! Slot: one hash-indexed chain of entries, guarded by its own lock.

use core::borrow::Borrow;
use core::mem;
use parking_lot::{Mutex, MutexGuard};
use slotmap::{DefaultKey, SlotMap};

/// One key/value association plus the hash computed when it was first inserted.
#[derive(Debug)]
pub struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
    next: Option<DefaultKey>, // index into the owning chain's arena
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, hash: u64, value: V) -> Self {
        Self {
            key,
            value,
            hash,
            next: None,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn into_pair(self) -> (K, V) {
        (self.key, self.value)
    }
}

/// Singly-linked chain of entries with unique keys.
///
/// Entries live in a per-chain arena; links are arena indices, and the
/// arena's free list recycles the storage of deleted entries. Taking an
/// entry out of the chain moves it by value, so handing it to another
/// chain never clones `K` or `V`.
#[derive(Debug)]
pub struct Chain<K, V> {
    arena: SlotMap<DefaultKey, Entry<K, V>>,
    head: Option<DefaultKey>,
}

impl<K, V> Chain<K, V> {
    pub fn new() -> Self {
        Self {
            arena: SlotMap::with_key(),
            head: None,
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    fn find<Q>(&self, key: &Q, hash: u64) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut cursor = self.head;
        while let Some(k) = cursor {
            let entry = self.arena.get(k)?;
            if entry.hash == hash && entry.key.borrow() == key {
                return Some(k);
            }
            cursor = entry.next;
        }
        None
    }

    /// Inserts `entry`, or replaces the value of the entry with an equal key.
    ///
    /// Returns the previous value when a value was replaced, `None` when the
    /// chain grew by one.
    pub fn put(&mut self, entry: Entry<K, V>) -> Option<V>
    where
        K: Eq,
    {
        match self.find(&entry.key, entry.hash) {
            Some(k) => Some(mem::replace(&mut self.arena[k].value, entry.value)),
            None => {
                self.push(entry);
                None
            }
        }
    }

    /// Prepends `entry` without looking for an equal key.
    ///
    /// Callers guarantee the key is not already in this chain.
    pub(crate) fn push(&mut self, mut entry: Entry<K, V>) {
        entry.next = self.head;
        let k = self.arena.insert(entry);
        self.head = Some(k);
    }

    pub fn get<Q>(&self, key: &Q, hash: u64) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let k = self.find(key, hash)?;
        self.arena.get(k).map(|e| &e.value)
    }

    pub fn get_mut<Q>(&mut self, key: &Q, hash: u64) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let k = self.find(key, hash)?;
        self.arena.get_mut(k).map(|e| &mut e.value)
    }

    pub fn contains_key<Q>(&self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.find(key, hash).is_some()
    }

    /// Unlinks the entry with an equal key and returns it as an owned pair.
    pub fn remove<Q>(&mut self, key: &Q, hash: u64) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut prev: Option<DefaultKey> = None;
        let mut cursor = self.head;
        while let Some(k) = cursor {
            let entry = self.arena.get(k)?;
            let next = entry.next;
            if entry.hash == hash && entry.key.borrow() == key {
                match prev {
                    None => self.head = next,
                    Some(p) => self.arena[p].next = next,
                }
                return self.arena.remove(k).map(Entry::into_pair);
            }
            prev = Some(k);
            cursor = next;
        }
        None
    }

    pub fn delete<Q>(&mut self, key: &Q, hash: u64) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.remove(key, hash).is_some()
    }

    fn pop_front(&mut self) -> Option<Entry<K, V>> {
        let k = self.head?;
        let mut entry = self.arena.remove(k)?;
        self.head = entry.next.take();
        Some(entry)
    }

    /// Detaches every entry, handing each one to `f` in chain order.
    pub fn clear_with<F>(&mut self, mut f: F)
    where
        F: FnMut(Entry<K, V>),
    {
        while let Some(entry) = self.pop_front() {
            f(entry);
        }
        debug_assert!(self.arena.is_empty());
    }

    /// Detaches and drops every entry.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.head = None;
    }

    pub fn first_entry(&self) -> Option<&Entry<K, V>> {
        self.head.and_then(|k| self.arena.get(k))
    }

    /// The entry following `entry`, which must belong to this chain.
    pub fn next_entry(&self, entry: &Entry<K, V>) -> Option<&Entry<K, V>> {
        entry.next.and_then(|k| self.arena.get(k))
    }

    /// Chain-order iteration (most recently inserted first).
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            chain: self,
            cursor: self.first_entry(),
        }
    }
}

impl<K, V> Default for Chain<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the entries of a `Chain`, in chain order.
pub struct Iter<'a, K, V> {
    chain: &'a Chain<K, V>,
    cursor: Option<&'a Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor?;
        self.cursor = self.chain.next_entry(entry);
        Some(entry)
    }
}

/// A chain behind its own mutex; unrelated slots never contend.
#[derive(Debug)]
pub struct Slot<K, V> {
    chain: Mutex<Chain<K, V>>,
}

impl<K, V> Slot<K, V> {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(Chain::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Chain<K, V>> {
        self.chain.lock()
    }

    /// Lock-free access when the caller already has the slot exclusively.
    pub fn get_mut(&mut self) -> &mut Chain<K, V> {
        self.chain.get_mut()
    }

    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }
}

impl<K, V> Default for Slot<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the slot owning `hash` among `slot_count` slots.
#[inline]
pub fn slot_index(hash: u64, slot_count: usize) -> usize {
    debug_assert!(slot_count > 0);
    (hash % slot_count as u64) as usize
}

/// Moves every entry of `slots` into a layout of `new_count` slots.
///
/// Growing keeps the existing slots, each with a fresh chain, and appends new ones;
/// shrinking allocates a new array. Each entry lands at
/// `hash % new_count`. Returns the number of entries moved.
///
/// # Panics
///
/// If `new_count` is zero, or if the pass loses or duplicates an entry.
pub fn rehome<K, V>(slots: &mut Vec<Slot<K, V>>, new_count: usize) -> usize {
    assert!(new_count > 0, "cannot rehome into zero slots");

    let current = slots.len();
    let total: usize = slots.iter_mut().map(|s| s.get_mut().len()).sum();
    let mut entries = Vec::with_capacity(total);
    // Swapping in a fresh chain releases the old arena, which may have been
    // sized for the overweight chain that caused this pass.
    for slot in slots.iter_mut() {
        mem::take(slot.get_mut()).clear_with(|e| entries.push(e));
    }

    if new_count > current {
        slots.extend((current..new_count).map(|_| Slot::new()));
    } else {
        *slots = (0..new_count).map(|_| Slot::new()).collect();
    }

    let moved = entries.len();
    for entry in entries {
        let index = slot_index(entry.hash, new_count);
        slots[index].get_mut().push(entry);
    }

    let placed: usize = slots.iter_mut().map(|s| s.get_mut().len()).sum();
    assert!(
        moved == total && placed == moved,
        "rehome lost or duplicated entries: {total} before, {moved} moved, {placed} placed"
    );
    moved
}
