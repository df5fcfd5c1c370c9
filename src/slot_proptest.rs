#![cfg(test)]

// Property tests for the chain layer and the rehome pass, kept inside the
// crate next to the code they exercise.

use crate::slot::{rehome, slot_index, Chain, Entry, Slot};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Put(usize, i32),
    Remove(usize),
    Get(usize),
    Contains(String),
    Mutate(usize, i32),
    Iterate,
    Drain,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Put(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Get),
            1 => prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::Drain),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Runs the scenario against a chain whose hashes come from `hash`, checking
// every step against a BTreeMap model.
fn run_chain_scenario(
    pool: &[String],
    ops: Vec<OpI>,
    hash: impl Fn(&str) -> u64,
) -> Result<(), TestCaseError> {
    let mut sut: Chain<Key, i32> = Chain::new();
    let mut model: BTreeMap<Key, i32> = BTreeMap::new();

    for op in ops {
        match op {
            OpI::Put(i, v) => {
                let k = key_from(pool, i);
                let h = hash(k.0.as_str());
                let prev = sut.put(Entry::new(k.clone(), h, v));
                prop_assert_eq!(prev, model.insert(k, v));
            }
            OpI::Remove(i) => {
                let k = key_from(pool, i);
                let removed = sut.remove(k.0.as_str(), hash(k.0.as_str()));
                prop_assert_eq!(removed.map(|(_, v)| v), model.remove(&k));
            }
            OpI::Get(i) => {
                let k = key_from(pool, i);
                prop_assert_eq!(sut.get(k.0.as_str(), hash(k.0.as_str())), model.get(&k));
            }
            OpI::Contains(s) => {
                let has = sut.contains_key(s.as_str(), hash(s.as_str()));
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(has, has_model);
            }
            OpI::Mutate(i, d) => {
                let k = key_from(pool, i);
                if let Some(v) = sut.get_mut(k.0.as_str(), hash(k.0.as_str())) {
                    *v = v.saturating_add(d);
                    let mv = model.get_mut(&k).expect("model has every live key");
                    *mv = mv.saturating_add(d);
                } else {
                    prop_assert!(!model.contains_key(&k));
                }
            }
            OpI::Iterate => {
                let s_keys: Vec<_> = sut.iter().map(|e| e.key().clone()).collect();
                let unique: BTreeSet<_> = s_keys.iter().cloned().collect();
                prop_assert_eq!(s_keys.len(), unique.len(), "keys in a chain are unique");
                let m_keys: BTreeSet<_> = model.keys().cloned().collect();
                prop_assert_eq!(unique, m_keys);
                for e in sut.iter() {
                    prop_assert_eq!(e.hash(), hash(e.key().0.as_str()));
                }
            }
            OpI::Drain => {
                let mut drained = BTreeMap::new();
                sut.clear_with(|e| {
                    let (k, v) = e.into_pair();
                    drained.insert(k, v);
                });
                prop_assert_eq!(&drained, &model);
                model.clear();
            }
        }

        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    Ok(())
}

fn fnv(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

// Property: State-machine equivalence against an ordered map.
// Invariants exercised across random operation sequences:
// - `put` reports the replaced value exactly when the model had the key.
// - `remove`/`get`/`contains_key` parity with the model, borrowed lookups.
// - `iter` yields each live entry exactly once with its stored hash.
// - `clear_with` hands over every entry and empties the chain.
// - `len`/`is_empty` parity with the model after each op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_chain_state_machine((pool, ops) in arb_scenario()) {
        run_chain_scenario(&pool, ops, fnv)?;
    }
}

// Property: Same invariants under worst-case collisions, every key
// sharing one hash, so equality alone resolves entries.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_chain_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_chain_scenario(&pool, ops, |_| 0)?;
    }
}

// Property: rehoming between arbitrary slot counts keeps every entry, each
// at `hash % new_count`, and the total count unchanged.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_rehome_preserves_entries(
        keys in proptest::collection::btree_set(any::<u64>(), 0..200),
        from in 1usize..64,
        to in 1usize..64,
    ) {
        let mut slots: Vec<Slot<u64, u64>> = (0..from).map(|_| Slot::new()).collect();
        for &k in &keys {
            let index = slot_index(k, from);
            prop_assert!(slots[index].get_mut().put(Entry::new(k, k, !k)).is_none());
        }

        prop_assert_eq!(rehome(&mut slots, to), keys.len());
        prop_assert_eq!(slots.len(), to);

        let mut seen = BTreeSet::new();
        for (index, slot) in slots.iter_mut().enumerate() {
            for e in slot.get_mut().iter() {
                prop_assert_eq!(slot_index(e.hash(), to), index);
                prop_assert_eq!(*e.value(), !*e.key());
                prop_assert!(seen.insert(*e.key()));
            }
        }
        prop_assert_eq!(seen, keys);
    }
}
