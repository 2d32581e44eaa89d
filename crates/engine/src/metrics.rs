//! In-process counters and timers.
//!
//! A metric is addressed by name plus a set of labels. [`LocalMetrics`]
//! flattens both into one key (`name_k1_v1_k2_v2`, labels sorted) so the
//! same name with different labels is tracked separately.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;

pub type Labels = BTreeMap<String, String>;

/// Sink for counters and timers, shared by every worker.
pub trait Metrics: Send + Sync {
    fn counter(&self, name: &str, labels: &Labels) -> Arc<Counter>;

    fn timer(&self, name: &str, labels: &Labels) -> Arc<Timer>;
}

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Accumulates recorded durations.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl Timer {
    pub fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }
}

/// Point-in-time view of one timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total: Duration,
}

/// Flatten a metric name and its labels into one registry key.
pub fn metric_key(name: &str, labels: &Labels) -> String {
    let mut key = name.to_string();
    for (k, v) in labels {
        key.push('_');
        key.push_str(k);
        key.push('_');
        key.push_str(v);
    }
    key
}

/// [`Metrics`] kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct LocalMetrics {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
    timers: RwLock<BTreeMap<String, Arc<Timer>>>,
}

impl LocalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, 0 if it was never touched.
    pub fn counter_value(&self, name: &str, labels: &Labels) -> u64 {
        read(&self.counters, &metric_key(name, labels)).map_or(0, |c| c.get())
    }

    pub fn timer_snapshot(&self, name: &str, labels: &Labels) -> Option<TimerSnapshot> {
        read(&self.timers, &metric_key(name, labels)).map(|t| TimerSnapshot {
            count: t.count(),
            total: t.total(),
        })
    }

    /// Every counter, sorted by key.
    pub fn counters(&self) -> Vec<(String, u64)> {
        let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        map.iter().map(|(k, c)| (k.clone(), c.get())).collect()
    }

    /// Every timer, sorted by key.
    pub fn timers(&self) -> Vec<(String, TimerSnapshot)> {
        let map = self.timers.read().unwrap_or_else(PoisonError::into_inner);
        map.iter()
            .map(|(k, t)| {
                let snapshot = TimerSnapshot {
                    count: t.count(),
                    total: t.total(),
                };
                (k.clone(), snapshot)
            })
            .collect()
    }
}

impl Metrics for LocalMetrics {
    fn counter(&self, name: &str, labels: &Labels) -> Arc<Counter> {
        get_or_insert(&self.counters, metric_key(name, labels))
    }

    fn timer(&self, name: &str, labels: &Labels) -> Arc<Timer> {
        get_or_insert(&self.timers, metric_key(name, labels))
    }
}

fn read<T>(map: &RwLock<BTreeMap<String, Arc<T>>>, key: &str) -> Option<Arc<T>> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

fn get_or_insert<T: Default>(map: &RwLock<BTreeMap<String, Arc<T>>>, key: String) -> Arc<T> {
    if let Some(existing) = read(map, &key) {
        return existing;
    }
    let mut guard = map.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(guard.entry(key).or_default())
}

/// Build a label set from literal pairs.
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn key_sorts_labels() {
        let l = labels([("package", "data.rules.a"), ("bundle", "b1")]);
        assert_eq!(metric_key("evaluate_policy_time", &l), "evaluate_policy_time_bundle_b1_package_data.rules.a");
        assert_eq!(metric_key("policies_evaluated", &Labels::new()), "policies_evaluated");
    }

    #[test]
    fn same_name_different_labels_are_separate() {
        let m = LocalMetrics::new();
        m.counter("hits", &labels([("bundle", "a")])).inc();
        m.counter("hits", &labels([("bundle", "b")])).add(3);

        assert_eq!(m.counter_value("hits", &labels([("bundle", "a")])), 1);
        assert_eq!(m.counter_value("hits", &labels([("bundle", "b")])), 3);
        assert_eq!(m.counter_value("hits", &Labels::new()), 0);
    }

    #[test]
    fn timers_accumulate() {
        let m = LocalMetrics::new();
        let t = m.timer("compile_time", &Labels::new());
        t.record(Duration::from_millis(100));
        t.record(Duration::from_millis(50));

        let snap = m.timer_snapshot("compile_time", &Labels::new()).unwrap();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.total, Duration::from_millis(150));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let m = Arc::new(LocalMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.counter("policies_evaluated", &Labels::new()).inc();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.counter_value("policies_evaluated", &Labels::new()), 8000);
    }

    #[test]
    fn snapshots_are_sorted() {
        let m = LocalMetrics::new();
        m.counter("b", &Labels::new()).inc();
        m.counter("a", &Labels::new()).inc();
        let keys: Vec<String> = m.counters().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
