// ConcurrentMap property tests.
//
// Property 1: single-threaded equivalence with std HashMap.
//  - Model: HashMap<String, i32>.
//  - Operations: put, try_insert, get, remove, delete, with_mut.
//  - Invariant after each op: len() and contains_key() match the model.
//  - Final: for_each visits exactly the model's pairs.
//  - A small hard cap keeps slots resizing throughout the run.
//
// Property 2: same model under a constant hasher, so every key shares one
// shard and one slot and lookups are resolved by equality alone.
//
// Property 3: disjoint writers on several threads end in the state each
// thread's own sequence implies; try_insert keeps the first value it finds.
use cmap::ConcurrentMap;
use proptest::prelude::*;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

#[derive(Clone, Debug)]
enum Op {
    Put(usize, i32),
    TryInsert(usize, i32),
    Get(usize),
    Remove(usize),
    Delete(usize),
    Add(usize, i32),
}

fn arb_ops(keys: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        4 => (0..keys, any::<i32>()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => (0..keys, any::<i32>()).prop_map(|(k, v)| Op::TryInsert(k, v)),
        2 => (0..keys).prop_map(Op::Get),
        2 => (0..keys).prop_map(Op::Remove),
        1 => (0..keys).prop_map(Op::Delete),
        1 => (0..keys, any::<i32>()).prop_map(|(k, d)| Op::Add(k, d)),
    ];
    proptest::collection::vec(op, 1..300)
}

fn key(i: usize) -> String {
    format!("k{}", i)
}

fn run_model<S: BuildHasher>(
    m: &ConcurrentMap<String, i32, S>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<String, i32> = HashMap::new();
    for op in ops {
        let touched = match op {
            Op::Put(i, v) => {
                let k = key(i);
                prop_assert_eq!(m.put(k.clone(), v), model.insert(k.clone(), v));
                k
            }
            Op::TryInsert(i, v) => {
                let k = key(i);
                let res = m.try_insert(k.clone(), v);
                if model.contains_key(&k) {
                    prop_assert!(res.is_err());
                } else {
                    prop_assert!(res.is_ok());
                    model.insert(k.clone(), v);
                }
                k
            }
            Op::Get(i) => {
                let k = key(i);
                prop_assert_eq!(m.get(&k), model.get(&k).copied());
                k
            }
            Op::Remove(i) => {
                let k = key(i);
                prop_assert_eq!(m.remove(&k), model.remove(&k));
                k
            }
            Op::Delete(i) => {
                let k = key(i);
                prop_assert_eq!(m.delete(&k), model.remove(&k).is_some());
                k
            }
            Op::Add(i, d) => {
                let k = key(i);
                let got = m.with_mut(&k, |v| {
                    *v = v.wrapping_add(d);
                    *v
                });
                let want = model.get_mut(&k).map(|v| {
                    *v = v.wrapping_add(d);
                    *v
                });
                prop_assert_eq!(got, want);
                k
            }
        };
        prop_assert_eq!(m.contains_key(&touched), model.contains_key(&touched));
        prop_assert_eq!(m.len(), model.len());
    }

    let mut seen = HashMap::new();
    m.for_each(|k, v| {
        seen.insert(k.clone(), *v);
    });
    prop_assert_eq!(seen, model);
    Ok(())
}

// Property 1: equivalence with HashMap under the default hasher.
proptest! {
    #[test]
    fn prop_matches_hashmap(keys in 1usize..=200, ops in arb_ops(200)) {
        let ops: Vec<Op> = ops
            .into_iter()
            .map(|op| match op {
                Op::Put(k, v) => Op::Put(k % keys, v),
                Op::TryInsert(k, v) => Op::TryInsert(k % keys, v),
                Op::Get(k) => Op::Get(k % keys),
                Op::Remove(k) => Op::Remove(k % keys),
                Op::Delete(k) => Op::Delete(k % keys),
                Op::Add(k, d) => Op::Add(k % keys, d),
            })
            .collect();
        let m: ConcurrentMap<String, i32> = ConcurrentMap::builder()
            .shard_count(4)
            .slots_per_shard(2)
            .max_slot_size(3)
            .build()
            .unwrap();
        run_model(&m, ops)?;
    }
}

// Property 2: equivalence with every key colliding.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_matches_hashmap_with_collisions(ops in arb_ops(16)) {
        let m: ConcurrentMap<String, i32, ConstBuildHasher> = ConcurrentMap::builder()
            .shard_count(8)
            .hasher(ConstBuildHasher)
            .build()
            .unwrap();
        run_model(&m, ops)?;
    }
}

// Property 3: each thread owns its keys; the final map is the union of the
// per-thread models.
proptest! {
    #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]
    #[test]
    fn prop_disjoint_threads_match_models(
        per_thread in proptest::collection::vec(arb_ops(32), 2..=4)
    ) {
        let m: ConcurrentMap<String, i32> = ConcurrentMap::builder()
            .shard_count(2)
            .slots_per_shard(1)
            .max_slot_size(2)
            .build()
            .unwrap();

        std::thread::scope(|s| {
            for (t, ops) in per_thread.iter().enumerate() {
                let m = &m;
                s.spawn(move || {
                    // Keys present right now; nobody else touches them.
                    let mut live = std::collections::HashSet::new();
                    for op in ops {
                        match *op {
                            Op::Put(i, v) => {
                                m.put(format!("t{t}-{i}"), v);
                                live.insert(i);
                            }
                            Op::TryInsert(i, v) => {
                                let res = m.try_insert(format!("t{t}-{i}"), v);
                                assert_eq!(res.is_err(), live.contains(&i), "try_insert t{t}-{i}");
                                live.insert(i);
                            }
                            Op::Remove(i) | Op::Delete(i) => {
                                assert_eq!(m.delete(&format!("t{t}-{i}")), live.remove(&i));
                            }
                            Op::Get(i) => {
                                let _ = m.get(&format!("t{t}-{i}"));
                            }
                            Op::Add(i, d) => {
                                m.with_mut(&format!("t{t}-{i}"), |v| *v = v.wrapping_add(d));
                            }
                        }
                    }
                });
            }
        });

        let mut expected = HashMap::new();
        for (t, ops) in per_thread.iter().enumerate() {
            for op in ops {
                match *op {
                    Op::Put(i, v) => {
                        expected.insert(format!("t{t}-{i}"), v);
                    }
                    Op::TryInsert(i, v) => {
                        expected.entry(format!("t{t}-{i}")).or_insert(v);
                    }
                    Op::Remove(i) | Op::Delete(i) => {
                        expected.remove(&format!("t{t}-{i}"));
                    }
                    Op::Get(_) => {}
                    Op::Add(i, d) => {
                        if let Some(v) = expected.get_mut(&format!("t{t}-{i}")) {
                            *v = v.wrapping_add(d);
                        }
                    }
                }
            }
        }

        prop_assert_eq!(m.len(), expected.len());
        for (k, v) in &expected {
            prop_assert_eq!(m.get(k), Some(*v));
        }
    }
}
