//! Eviction policies shared by all three engines.
//!
//! A replacer only keeps bookkeeping about keys it has been told about. The
//! engine owns the authoritative set of residents and hands it over, in slot
//! order, whenever it needs a victim.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::constants::UNSTAMPED;
use crate::types::Algorithm;

pub trait Replacer<K> {
    /// A key became resident.
    fn record_load(&mut self, key: K);

    /// A resident key was accessed.
    fn record_access(&mut self, key: &K);

    /// A key stopped being resident.
    fn forget(&mut self, key: &K);

    /// Drop all bookkeeping.
    fn clear(&mut self);

    /// Choose which of `residents` to evict. `residents` must be in slot order.
    fn pick_victim(&self, residents: &[K]) -> Option<K>;
}

/// Evicts in arrival order.
#[derive(Debug, Clone)]
pub struct FifoReplacer<K> {
    queue: VecDeque<K>,
}

impl<K> Default for FifoReplacer<K> {
    fn default() -> Self {
        FifoReplacer { queue: VecDeque::new() }
    }
}

impl<K: Clone + Eq> Replacer<K> for FifoReplacer<K> {
    fn record_load(&mut self, key: K) {
        self.queue.retain(|k| k != &key);
        self.queue.push_back(key);
    }

    fn record_access(&mut self, _key: &K) {}

    fn forget(&mut self, key: &K) {
        self.queue.retain(|k| k != key);
    }

    fn clear(&mut self) {
        self.queue.clear();
    }

    fn pick_victim(&self, residents: &[K]) -> Option<K> {
        self.queue
            .iter()
            .find(|k| residents.contains(k))
            .or_else(|| residents.first())
            .cloned()
    }
}

/// Evicts the key with the oldest stamp of a monotonically increasing clock.
#[derive(Debug, Clone)]
pub struct LruReplacer<K: Eq + Hash> {
    stamps: HashMap<K, u64>,
    clock: u64,
}

impl<K: Eq + Hash> Default for LruReplacer<K> {
    fn default() -> Self {
        LruReplacer { stamps: HashMap::new(), clock: UNSTAMPED }
    }
}

impl<K: Eq + Hash> LruReplacer<K> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn stamp(&self, key: &K) -> u64 {
        self.stamps.get(key).copied().unwrap_or(UNSTAMPED)
    }
}

impl<K: Clone + Eq + Hash> Replacer<K> for LruReplacer<K> {
    fn record_load(&mut self, key: K) {
        let now = self.tick();
        self.stamps.insert(key, now);
    }

    fn record_access(&mut self, key: &K) {
        let now = self.tick();
        self.stamps.insert(key.clone(), now);
    }

    fn forget(&mut self, key: &K) {
        self.stamps.remove(key);
    }

    fn clear(&mut self) {
        self.stamps.clear();
        self.clock = UNSTAMPED;
    }

    fn pick_victim(&self, residents: &[K]) -> Option<K> {
        // min_by_key keeps the first minimum, so ties go to the lowest slot
        residents.iter().min_by_key(|k| self.stamp(k)).cloned()
    }
}

/// The active replacement policy of an engine.
#[derive(Debug, Clone)]
pub enum EvictionPolicy<K: Eq + Hash> {
    Fifo(FifoReplacer<K>),
    Lru(LruReplacer<K>),
}

impl<K: Clone + Eq + Hash> EvictionPolicy<K> {
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Fifo => EvictionPolicy::Fifo(FifoReplacer::default()),
            Algorithm::Lru => EvictionPolicy::Lru(LruReplacer::default()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            EvictionPolicy::Fifo(_) => Algorithm::Fifo,
            EvictionPolicy::Lru(_) => Algorithm::Lru,
        }
    }

    /// Fresh policy for `algorithm` with `residents` recorded as just loaded,
    /// in the order given.
    pub fn rebuilt(algorithm: Algorithm, residents: impl IntoIterator<Item = K>) -> Self {
        let mut policy = Self::new(algorithm);
        for key in residents {
            policy.record_load(key);
        }
        policy
    }
}

impl<K: Clone + Eq + Hash> Default for EvictionPolicy<K> {
    fn default() -> Self {
        Self::new(Algorithm::default())
    }
}

impl<K: Clone + Eq + Hash> Replacer<K> for EvictionPolicy<K> {
    fn record_load(&mut self, key: K) {
        match self {
            EvictionPolicy::Fifo(r) => r.record_load(key),
            EvictionPolicy::Lru(r) => r.record_load(key),
        }
    }

    fn record_access(&mut self, key: &K) {
        match self {
            EvictionPolicy::Fifo(r) => r.record_access(key),
            EvictionPolicy::Lru(r) => r.record_access(key),
        }
    }

    fn forget(&mut self, key: &K) {
        match self {
            EvictionPolicy::Fifo(r) => r.forget(key),
            EvictionPolicy::Lru(r) => r.forget(key),
        }
    }

    fn clear(&mut self) {
        match self {
            EvictionPolicy::Fifo(r) => r.clear(),
            EvictionPolicy::Lru(r) => r.clear(),
        }
    }

    fn pick_victim(&self, residents: &[K]) -> Option<K> {
        match self {
            EvictionPolicy::Fifo(r) => r.pick_victim(residents),
            EvictionPolicy::Lru(r) => r.pick_victim(residents),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_evicts_oldest() {
        let mut fifo = FifoReplacer::default();
        fifo.record_load('a');
        fifo.record_load('b');
        fifo.record_load('c');
        fifo.record_access(&'a');

        assert_eq!(fifo.pick_victim(&['a', 'b', 'c']), Some('a'));
    }

    #[test]
    fn test_fifo_skips_non_residents() {
        let mut fifo = FifoReplacer::default();
        fifo.record_load(1);
        fifo.record_load(2);
        assert_eq!(fifo.pick_victim(&[2]), Some(2));
    }

    #[test]
    fn test_fifo_forget() {
        let mut fifo = FifoReplacer::default();
        fifo.record_load(1);
        fifo.record_load(2);
        fifo.forget(&1);
        assert_eq!(fifo.pick_victim(&[1, 2]), Some(2));
    }

    #[test]
    fn test_fifo_reload_moves_to_back() {
        let mut fifo = FifoReplacer::default();
        fifo.record_load(1);
        fifo.record_load(2);
        fifo.record_load(1);
        assert_eq!(fifo.pick_victim(&[1, 2]), Some(2));
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let mut lru = LruReplacer::default();
        lru.record_load("a0");
        lru.record_load("a1");
        lru.record_load("a2");
        lru.record_access(&"a0");

        assert_eq!(lru.pick_victim(&["a0", "a1", "a2"]), Some("a1"));
    }

    #[test]
    fn test_lru_tie_breaks_on_slot_order() {
        let lru: LruReplacer<u32> = LruReplacer::default();
        // nothing stamped: every resident ties at zero
        assert_eq!(lru.pick_victim(&[7, 3, 5]), Some(7));
    }

    #[test]
    fn test_lru_clock_is_monotonic() {
        let mut lru = LruReplacer::default();
        lru.record_load(1);
        let first = lru.stamp(&1);
        lru.record_access(&1);
        assert!(lru.stamp(&1) > first);
        lru.forget(&1);
        assert_eq!(lru.stamp(&1), UNSTAMPED);
    }

    #[test]
    fn test_empty_residents() {
        let policy: EvictionPolicy<u32> = EvictionPolicy::new(Algorithm::Lru);
        assert_eq!(policy.pick_victim(&[]), None);
        let policy: EvictionPolicy<u32> = EvictionPolicy::new(Algorithm::Fifo);
        assert_eq!(policy.pick_victim(&[]), None);
    }

    #[test]
    fn test_rebuilt_policy_treats_residents_as_fresh() {
        let policy = EvictionPolicy::rebuilt(Algorithm::Fifo, vec![4, 9, 2]);
        assert_eq!(policy.algorithm(), Algorithm::Fifo);
        assert_eq!(policy.pick_victim(&[4, 9, 2]), Some(4));

        let policy = EvictionPolicy::rebuilt(Algorithm::Lru, vec![4, 9, 2]);
        assert_eq!(policy.algorithm(), Algorithm::Lru);
        assert_eq!(policy.pick_victim(&[4, 9, 2]), Some(4));
    }
}
