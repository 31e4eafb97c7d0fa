use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::valuation::{Stage, TerminalMethod, ValuationAssumptions};

const NIL: usize = usize::MAX;

/// Fingerprint of a fully specified set of assumptions, every field rounded
/// to a fixed number of decimals in display units. The swept axis values are
/// part of the fingerprint, so overlapping sweeps share entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridKey(Vec<i64>);

impl GridKey {
    pub fn new(a: &ValuationAssumptions, scale: f64) -> Self {
        let round = |v: f64| -> i64 {
            if v.is_finite() {
                (v * scale).round() as i64
            } else {
                i64::MIN
            }
        };

        let (method, multiple) = match a.terminal_method {
            TerminalMethod::Perpetuity => (0, 0.0),
            TerminalMethod::ExitMultiple { multiple } => (1, multiple),
        };

        let mut parts = Vec::with_capacity(24);
        parts.extend([
            round(a.starting_revenue),
            i64::from(a.years),
            round(a.wacc.as_percent()),
            round(a.terminal_growth.as_percent()),
            round(a.tax_rate.as_percent()),
            round(a.shares_outstanding),
            round(a.net_debt),
            round(a.sales_to_capital),
            method,
            round(multiple),
        ]);
        for stage in Stage::ALL {
            let st = a.stage(stage);
            parts.extend([
                i64::from(st.end_year),
                round(st.growth.as_percent()),
                round(st.ebit_margin.as_percent()),
                round(a.stage_sales_to_capital(stage)),
                round(st.nwc_ratio.as_percent()),
            ]);
        }
        GridKey(parts)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Node {
    key: GridKey,
    value: f64,
    prev: usize,
    next: usize,
}

/// Bounded least-recently-used map from [`GridKey`] to a computed value.
///
/// Entries live in a slab threaded by a doubly linked recency list, so
/// lookups, inserts and evictions are O(1).
#[derive(Debug)]
pub struct GridCache {
    map: FxHashMap<GridKey, usize>,
    nodes: Vec<Node>,
    /// Most recently used
    head: usize,
    /// Least recently used
    tail: usize,
    capacity: usize,
    stats: CacheStats,
}

impl GridCache {
    pub fn new(capacity: usize) -> Self {
        GridCache {
            map: FxHashMap::default(),
            nodes: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.head = NIL;
        self.tail = NIL;
        self.stats = CacheStats::default();
    }

    /// Look up a value, marking it most recently used.
    pub fn get(&mut self, key: &GridKey) -> Option<f64> {
        match self.map.get(key).copied() {
            Some(idx) => {
                self.stats.hits += 1;
                self.touch(idx);
                Some(self.nodes[idx].value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: GridKey, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if let Some(&idx) = self.map.get(&key) {
            self.nodes[idx].value = value;
            self.touch(idx);
            return;
        }

        let idx = if self.map.len() >= self.capacity {
            let idx = self.tail;
            self.unlink(idx);
            let old = std::mem::replace(&mut self.nodes[idx].key, key.clone());
            self.map.remove(&old);
            self.nodes[idx].value = value;
            self.stats.evictions += 1;
            if self.stats.evictions % self.capacity as u64 == 0 {
                debug!(evictions = self.stats.evictions, capacity = self.capacity, "grid cache turned over");
            }
            idx
        } else {
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: NIL,
                next: NIL,
            });
            self.nodes.len() - 1
        };

        self.map.insert(key, idx);
        self.push_front(idx);
    }

    /// Cached value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with(&mut self, key: GridKey, compute: impl FnOnce() -> f64) -> f64 {
        if let Some(v) = self.get(&key) {
            return v;
        }
        let v = compute();
        self.insert(key, v);
        v
    }

    fn touch(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Percentage;

    fn key(n: i64) -> GridKey {
        GridKey(vec![n])
    }

    #[test]
    fn test_get_and_insert() {
        let mut cache = GridCache::new(4);
        assert_eq!(cache.get(&key(1)), None);
        cache.insert(key(1), 10.0);
        assert_eq!(cache.get(&key(1)), Some(10.0));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = GridCache::new(3);
        cache.insert(key(1), 1.0);
        cache.insert(key(2), 2.0);
        cache.insert(key(3), 3.0);
        // Refresh 1 so that 2 becomes the oldest
        assert_eq!(cache.get(&key(1)), Some(1.0));
        cache.insert(key(4), 4.0);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&key(2)), None);
        assert_eq!(cache.get(&key(1)), Some(1.0));
        assert_eq!(cache.get(&key(3)), Some(3.0));
        assert_eq!(cache.get(&key(4)), Some(4.0));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_refreshes_recency() {
        let mut cache = GridCache::new(2);
        cache.insert(key(1), 1.0);
        cache.insert(key(2), 2.0);
        cache.insert(key(1), 11.0);
        cache.insert(key(3), 3.0);
        assert_eq!(cache.get(&key(1)), Some(11.0));
        assert_eq!(cache.get(&key(2)), None);
    }

    #[test]
    fn test_long_churn_keeps_capacity() {
        let mut cache = GridCache::new(50);
        for i in 0..1_000 {
            cache.insert(key(i), i as f64);
        }
        assert_eq!(cache.len(), 50);
        assert_eq!(cache.get(&key(949)), None);
        assert_eq!(cache.get(&key(950)), Some(950.0));
        assert_eq!(cache.get(&key(999)), Some(999.0));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = GridCache::new(0);
        assert_eq!(cache.get_or_insert_with(key(1), || 5.0), 5.0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut cache = GridCache::new(2);
        cache.insert(key(1), 1.0);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
        cache.insert(key(2), 2.0);
        assert_eq!(cache.get(&key(2)), Some(2.0));
    }

    #[test]
    fn test_key_rounding() {
        let a = ValuationAssumptions::default();
        let mut b = a.clone();
        b.wacc = Percentage::from_percent(10.0001);
        let mut c = a.clone();
        c.wacc = Percentage::from_percent(10.01);
        assert_eq!(GridKey::new(&a, 1000.0), GridKey::new(&b, 1000.0));
        assert_ne!(GridKey::new(&a, 1000.0), GridKey::new(&c, 1000.0));
    }

    #[test]
    fn test_key_covers_non_axis_fields() {
        let a = ValuationAssumptions::default();
        let mut b = a.clone();
        b.net_debt = 250.0;
        assert_ne!(GridKey::new(&a, 1000.0), GridKey::new(&b, 1000.0));
    }
}
