//! Bounded per-entity history windows.
//!
//! A [`Series`] is a FIFO ring of at most `capacity` samples for one entity.
//! A [`HistoryStore`] maps entity keys to series and remembers the order in
//! which keys were first seen, so history projections are deterministic.
//!
//! Capacity counts reporting intervals, not seconds: with a provider pushing
//! every 500 ms, 60 samples cover 30 seconds. Time-based eviction happens
//! only when [`Retention::max_age_ms`] is set.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::snapshot::{EntityKey, Sample};

/// Samples retained per entity unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 60;

/// How much history each series keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    /// Maximum samples per series (at least 1).
    pub capacity: usize,
    /// Optional age limit; samples older than this relative to the newest
    /// arrival are evicted as well.
    pub max_age_ms: Option<u64>,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_age_ms: None,
        }
    }
}

impl Retention {
    pub fn samples(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            max_age_ms: None,
        }
    }

    pub fn with_max_age_ms(mut self, max_age_ms: u64) -> Self {
        self.max_age_ms = Some(max_age_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Summary of one field across a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStats {
    pub latest: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Bounded, oldest-first history of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    key: EntityKey,
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Series {
    pub fn new(key: EntityKey, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            key,
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full. Returns the evicted
    /// sample, if any.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Overwrite the newest sample (or append if empty).
    pub(crate) fn replace_latest(&mut self, sample: Sample) {
        match self.samples.back_mut() {
            Some(last) => *last = sample,
            None => {
                self.samples.push_back(sample);
            }
        }
    }

    /// Drop samples strictly older than `cutoff_ms`. The newest sample is
    /// always kept.
    pub(crate) fn evict_older_than(&mut self, cutoff_ms: u64) -> usize {
        let mut evicted = 0;
        while self.samples.len() > 1
            && self
                .samples
                .front()
                .is_some_and(|s| s.timestamp_ms < cutoff_ms)
        {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Values of one field, oldest first. Samples lacking the field are
    /// skipped.
    pub fn values(&self, field: &str) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.get(field)).collect()
    }

    pub fn stats(&self, field: &str) -> Option<FieldStats> {
        let values = self.values(field);
        let latest = *values.last()?;
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(FieldStats {
            latest,
            min,
            max,
            mean,
        })
    }
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

/// Entity key → [`Series`] for one topic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryStore {
    retention: Retention,
    series: HashMap<EntityKey, Series>,
    /// Keys in first-seen order.
    order: Vec<EntityKey>,
}

impl HistoryStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            retention: Retention {
                capacity: retention.capacity.max(1),
                ..retention
            },
            series: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Retention::samples(capacity))
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Append a sample for `key`, creating the series on first sight.
    /// Returns true when the series was created.
    pub(crate) fn record(&mut self, key: &EntityKey, sample: Sample) -> bool {
        match self.series.get_mut(key) {
            Some(series) => {
                series.push(sample);
                false
            }
            None => {
                let mut series = Series::new(key.clone(), self.retention.capacity);
                series.push(sample);
                self.series.insert(key.clone(), series);
                self.order.push(key.clone());
                true
            }
        }
    }

    /// Overwrite the newest sample of an existing series.
    pub(crate) fn replace_latest(&mut self, key: &EntityKey, sample: Sample) {
        if let Some(series) = self.series.get_mut(key) {
            series.replace_latest(sample);
        }
    }

    /// Apply the age limit relative to `now_ms` to the series of `keys`
    /// only. No-op without `max_age_ms`.
    pub(crate) fn prune_expired<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a EntityKey>,
        now_ms: u64,
    ) -> usize {
        let Some(max_age) = self.retention.max_age_ms else {
            return 0;
        };
        let cutoff = now_ms.saturating_sub(max_age);
        keys.into_iter()
            .filter_map(|k| self.series.get_mut(k).map(|s| s.evict_older_than(cutoff)))
            .sum()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.series.contains_key(key)
    }

    /// Number of series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> &[EntityKey] {
        &self.order
    }

    /// Series in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.order.iter().filter_map(|k| self.series.get(k))
    }

    pub fn total_samples(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(ts: u64, v: f64) -> Sample {
        let mut fields = BTreeMap::new();
        fields.insert("v".to_string(), v);
        Sample {
            timestamp_ms: ts,
            fields,
        }
    }

    // -----------------------------------------------------------------------
    // Series
    // -----------------------------------------------------------------------

    #[test]
    fn test_series_never_exceeds_capacity() {
        let mut s = Series::new(EntityKey::from("k"), 5);
        for i in 0..50 {
            s.push(sample(i, i as f64));
            assert!(s.len() <= 5);
        }
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn test_series_fifo_keeps_most_recent() {
        let mut s = Series::new(EntityKey::from("k"), 60);
        for i in 1..=61 {
            s.push(sample(i, i as f64));
        }
        let expected: Vec<f64> = (2..=61).map(|i| i as f64).collect();
        assert_eq!(s.values("v"), expected);
    }

    #[test]
    fn test_series_push_reports_eviction() {
        let mut s = Series::new(EntityKey::from("k"), 2);
        assert!(s.push(sample(1, 1.0)).is_none());
        assert!(s.push(sample(2, 2.0)).is_none());
        let evicted = s.push(sample(3, 3.0)).unwrap();
        assert_eq!(evicted.timestamp_ms, 1);
    }

    #[test]
    fn test_series_zero_capacity_clamped_to_one() {
        let mut s = Series::new(EntityKey::from("k"), 0);
        s.push(sample(1, 1.0));
        s.push(sample(2, 2.0));
        assert_eq!(s.capacity(), 1);
        assert_eq!(s.values("v"), vec![2.0]);
    }

    #[test]
    fn test_series_replace_latest() {
        let mut s = Series::new(EntityKey::from("k"), 4);
        s.push(sample(1, 1.0));
        s.replace_latest(sample(1, 9.0));
        assert_eq!(s.values("v"), vec![9.0]);
    }

    #[test]
    fn test_series_stats() {
        let mut s = Series::new(EntityKey::from("k"), 10);
        for v in [2.0, 4.0, 6.0] {
            s.push(sample(0, v));
        }
        let st = s.stats("v").unwrap();
        assert_eq!(st.latest, 6.0);
        assert_eq!(st.min, 2.0);
        assert_eq!(st.max, 6.0);
        assert!((st.mean - 4.0).abs() < 1e-12);
        assert!(s.stats("missing").is_none());
    }

    #[test]
    fn test_series_age_eviction_keeps_newest() {
        let mut s = Series::new(EntityKey::from("k"), 10);
        s.push(sample(100, 1.0));
        s.push(sample(200, 2.0));
        assert_eq!(s.evict_older_than(1_000), 1);
        assert_eq!(s.values("v"), vec![2.0]);
    }

    // -----------------------------------------------------------------------
    // HistoryStore
    // -----------------------------------------------------------------------

    #[test]
    fn test_store_first_seen_order() {
        let mut store = HistoryStore::with_capacity(3);
        assert!(store.record(&EntityKey::from("b"), sample(1, 1.0)));
        assert!(store.record(&EntityKey::from("a"), sample(1, 1.0)));
        assert!(!store.record(&EntityKey::from("b"), sample(2, 2.0)));
        let keys: Vec<&str> = store.keys().iter().map(EntityKey::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(store.total_samples(), 3);
    }

    #[test]
    fn test_store_prune_without_max_age_is_noop() {
        let mut store = HistoryStore::with_capacity(3);
        store.record(&EntityKey::from("a"), sample(1, 1.0));
        store.record(&EntityKey::from("a"), sample(2, 1.0));
        assert_eq!(store.prune_expired([&EntityKey::from("a")], u64::MAX), 0);
        assert_eq!(store.total_samples(), 2);
    }

    #[test]
    fn test_store_prune_with_max_age() {
        let mut store = HistoryStore::new(Retention::samples(10).with_max_age_ms(1_000));
        let key = EntityKey::from("a");
        store.record(&key, sample(0, 1.0));
        store.record(&key, sample(500, 2.0));
        store.record(&key, sample(2_000, 3.0));
        assert_eq!(store.prune_expired([&key], 2_000), 2);
        assert_eq!(store.get(&key).unwrap().values("v"), vec![3.0]);
    }
}
