//! Redistribution policy: decides when and how far a shard's slot array is resized.
//!
//! The shard reports the size of every slot it just mutated through
//! `check_slot_status`. The policy keeps running counters of what it has
//! seen and, once a verdict is non-normal, `should_redistribute` tells the
//! shard whether enough evidence has accumulated to justify taking the
//! structural lock. `redistribute` re-evaluates the same gate under that
//! lock and performs the rehome pass.
//!
//! Gating
//! - Overweight: more than a quarter of the slots must have been flagged
//!   since the last resize before the array doubles. One flagged slot out
//!   of four is tolerated; the second one triggers.
//! - Underweight: only shards with at least `UNDERWEIGHT_MIN_SLOTS` slots
//!   are considered, and at least a quarter of the checks since the last
//!   resize must have seen an empty slot.
//!
//! Underweight growth
//! - An underweight redistribution currently targets twice the current
//!   slot count, the same as an overweight one, floored at
//!   `MIN_SLOT_COUNT`. Halving would be the intuitive correction for a
//!   sparse shard; the doubling is kept as-is and covered by a test so any
//!   change to it is deliberate. Implement `Redistributor` to substitute a
//!   shrinking strategy.

use crate::slot::{self, Slot};
use core::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Load factor substituted for configurations that would yield a zero
/// threshold: non-positive, NaN, or below `1 / MIN_AVERAGE_SLOT_SIZE`.
pub const DEFAULT_LOAD_FACTOR: f64 = 0.75;
/// Chain length above which a slot is overweight regardless of load factor.
pub const DEFAULT_MAX_SLOT_SIZE: u64 = 1000;
/// Floor of the running average used to compute the upper threshold.
pub const MIN_AVERAGE_SLOT_SIZE: u64 = 100;
/// Shards with fewer slots are never redistributed for being underweight.
pub const UNDERWEIGHT_MIN_SLOTS: usize = 100;
/// Smallest slot count an underweight redistribution may produce.
pub const MIN_SLOT_COUNT: usize = 2;

/// Verdict of a single slot check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    Normal,
    Underweight,
    Overweight,
}

/// What a redistributor factory receives for each shard it builds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RedistributorConfig {
    pub load_factor: f64,
    pub slot_count: usize,
    pub max_slot_size: u64,
}

impl Default for RedistributorConfig {
    fn default() -> Self {
        Self {
            load_factor: DEFAULT_LOAD_FACTOR,
            slot_count: crate::map::DEFAULT_SLOTS_PER_SHARD,
            max_slot_size: DEFAULT_MAX_SLOT_SIZE,
        }
    }
}

/// Pluggable resize strategy, one instance per shard.
///
/// Methods take `&self`: checks run concurrently from every thread
/// operating on the shard, so implementations keep their state in
/// atomics. `redistribute` is only ever called with the shard's
/// structural lock held exclusively.
pub trait Redistributor: Send + Sync {
    /// Recomputes the overweight threshold for a shard holding `pair_total`
    /// entries in `slot_count` slots.
    fn update_threshold(&self, pair_total: u64, slot_count: usize);

    /// Classifies a slot of `slot_size` entries and records the observation.
    fn check_slot_status(&self, pair_total: u64, slot_size: u64) -> SlotStatus;

    /// Whether a redistribution for `status` would currently go ahead.
    ///
    /// Must not change any state; the shard calls it without holding the
    /// structural lock to decide whether taking that lock is worthwhile.
    fn should_redistribute(&self, status: SlotStatus, slot_count: usize) -> bool;

    /// Resizes `slots` for `status` if the gate allows it.
    ///
    /// Returns `true` when the slot array was changed.
    fn redistribute<K, V>(&self, status: SlotStatus, slots: &mut Vec<Slot<K, V>>) -> bool;
}

/// Default policy: threshold derived from a load factor over the average
/// slot size, a hard cap on chain length, and quarter-of-slots hysteresis.
#[derive(Debug)]
pub struct LoadFactorRedistributor {
    load_factor: f64,
    max_slot_size: u64,
    upper_threshold: AtomicU64,
    overweight_count: AtomicU64,
    empty_count: AtomicU64,
}

impl LoadFactorRedistributor {
    pub fn new(config: &RedistributorConfig) -> Self {
        // Anything that cannot lift the floored average to a threshold of at
        // least one would flag every slot, empty ones included.
        let load_factor = if MIN_AVERAGE_SLOT_SIZE as f64 * config.load_factor >= 1.0 {
            config.load_factor
        } else {
            DEFAULT_LOAD_FACTOR
        };
        let redistributor = Self {
            load_factor,
            max_slot_size: config.max_slot_size,
            upper_threshold: AtomicU64::new(0),
            overweight_count: AtomicU64::new(0),
            empty_count: AtomicU64::new(0),
        };
        redistributor.update_threshold(0, config.slot_count);
        redistributor
    }

    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    pub fn max_slot_size(&self) -> u64 {
        self.max_slot_size
    }

    pub fn upper_threshold(&self) -> u64 {
        self.upper_threshold.load(Ordering::Relaxed)
    }

    /// Overweight verdicts since the last resize decision.
    pub fn overweight_count(&self) -> u64 {
        self.overweight_count.load(Ordering::Relaxed)
    }

    /// Empty-slot observations since the last resize decision.
    pub fn empty_count(&self) -> u64 {
        self.empty_count.load(Ordering::Relaxed)
    }

    fn reset_counters(&self) {
        self.overweight_count.store(0, Ordering::Relaxed);
        self.empty_count.store(0, Ordering::Relaxed);
    }

    fn target_slot_count(status: SlotStatus, current: usize) -> usize {
        match status {
            SlotStatus::Overweight => current.saturating_mul(2),
            SlotStatus::Underweight => current.saturating_mul(2).max(MIN_SLOT_COUNT),
            SlotStatus::Normal => current,
        }
    }
}

impl Default for LoadFactorRedistributor {
    fn default() -> Self {
        Self::new(&RedistributorConfig::default())
    }
}

impl Redistributor for LoadFactorRedistributor {
    fn update_threshold(&self, pair_total: u64, slot_count: usize) {
        let average = pair_total
            .checked_div(slot_count as u64)
            .unwrap_or(0)
            .max(MIN_AVERAGE_SLOT_SIZE);
        let threshold = ((average as f64 * self.load_factor) as u64).max(1);
        self.upper_threshold.store(threshold, Ordering::Relaxed);
    }

    fn check_slot_status(&self, pair_total: u64, slot_size: u64) -> SlotStatus {
        if slot_size > self.max_slot_size || slot_size >= self.upper_threshold() {
            let flagged = self.overweight_count.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(pair_total, slot_size, flagged, "overweight slot");
            return SlotStatus::Overweight;
        }
        if slot_size == 0 {
            self.empty_count.fetch_add(1, Ordering::Relaxed);
        }
        SlotStatus::Normal
    }

    fn should_redistribute(&self, status: SlotStatus, slot_count: usize) -> bool {
        let slots = slot_count as u64;
        match status {
            SlotStatus::Overweight => self.overweight_count().saturating_mul(4) > slots,
            SlotStatus::Underweight => {
                slot_count >= UNDERWEIGHT_MIN_SLOTS && self.empty_count().saturating_mul(4) >= slots
            }
            SlotStatus::Normal => false,
        }
    }

    fn redistribute<K, V>(&self, status: SlotStatus, slots: &mut Vec<Slot<K, V>>) -> bool {
        let current = slots.len();
        if !self.should_redistribute(status, current) {
            return false;
        }

        let target = Self::target_slot_count(status, current);
        if target == current {
            self.reset_counters();
            debug!(?status, current, "redistribution left slot count unchanged");
            return false;
        }

        let moved = slot::rehome(slots, target);
        self.reset_counters();
        debug!(?status, current, target, moved, "redistributed shard");
        true
    }
}
