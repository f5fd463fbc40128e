//! Store instrumentation
//!
//! Counters for the store's main activities, cheap enough to leave on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for a single store
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Number of sources merged into the store
    pub publish_count: AtomicU64,

    /// Records whose contents changed across all publishes
    pub records_changed: AtomicU64,

    /// Reads executed against the store
    pub read_count: AtomicU64,

    /// Lookups answered from the snapshot cache without reading
    pub lookup_cache_hits: AtomicU64,

    /// Subscriber callbacks invoked
    pub notifications: AtomicU64,

    pub gc_runs: AtomicU64,

    pub records_evicted: AtomicU64,

    /// Time spent normalizing payloads (nanoseconds)
    pub total_normalize_time_ns: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self, changed: usize) {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        self.records_changed.fetch_add(changed as u64, Ordering::Relaxed);
    }

    pub fn record_read(&self) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.lookup_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notifications(&self, count: usize) {
        self.notifications.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_gc(&self, evicted: usize) {
        self.gc_runs.fetch_add(1, Ordering::Relaxed);
        self.records_evicted.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_normalize(&self, duration: Duration) {
        self.total_normalize_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.publish_count.store(0, Ordering::Relaxed);
        self.records_changed.store(0, Ordering::Relaxed);
        self.read_count.store(0, Ordering::Relaxed);
        self.lookup_cache_hits.store(0, Ordering::Relaxed);
        self.notifications.store(0, Ordering::Relaxed);
        self.gc_runs.store(0, Ordering::Relaxed);
        self.records_evicted.store(0, Ordering::Relaxed);
        self.total_normalize_time_ns.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            publishes: self.publish_count.load(Ordering::Relaxed),
            records_changed: self.records_changed.load(Ordering::Relaxed),
            reads: self.read_count.load(Ordering::Relaxed),
            lookup_cache_hits: self.lookup_cache_hits.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            gc_runs: self.gc_runs.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            total_normalize_time_ns: self.total_normalize_time_ns.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of store metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub publishes: u64,
    pub records_changed: u64,
    pub reads: u64,
    pub lookup_cache_hits: u64,
    pub notifications: u64,
    pub gc_runs: u64,
    pub records_evicted: u64,
    pub total_normalize_time_ns: u64,
}

impl MetricsSnapshot {
    /// Share of lookups served from cache
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.reads + self.lookup_cache_hits;
        if lookups == 0 {
            0.0
        } else {
            self.lookup_cache_hits as f64 / lookups as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Publishes: {} | Records Changed: {}",
            self.publishes, self.records_changed
        )?;
        writeln!(
            f,
            "  Reads: {} | Cache Hits: {} | Hit Rate: {:.1}%",
            self.reads,
            self.lookup_cache_hits,
            self.cache_hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "  Notifications: {} | GC Runs: {} | Evicted: {}",
            self.notifications, self.gc_runs, self.records_evicted
        )?;
        writeln!(
            f,
            "  Normalize Time: {:.2}ms",
            Duration::from_nanos(self.total_normalize_time_ns).as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}
