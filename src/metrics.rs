/*!
Operation counters and gauges surfaced through
[`DB::stats`](crate::DB::stats).

Counters are atomics owned by the [`Metrics`] sink, which is created per
database instance and shared with the engine. Gauges (memtable sizes, table
counts) are sampled from the engine at stats time rather than tracked here.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time engine gauges merged into the stats snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct EngineGauges {
    /// Entries in the active memtable.
    pub memtable_entries: u64,

    /// Approximate bytes held by the active memtable.
    pub memtable_size_bytes: u64,

    /// Frozen memtables awaiting flush.
    pub immutable_memtables: u64,

    /// Table files across all levels.
    pub sstable_count: u64,
}

/// Counter sink for database operations.
pub(crate) struct Metrics {
    enabled: bool,
    start_time: Instant,

    total_operations: AtomicU64,
    put_operations: AtomicU64,
    get_operations: AtomicU64,
    delete_operations: AtomicU64,
    flush_count: AtomicU64,
    compaction_count: AtomicU64,
}

impl Metrics {
    /// Create a new instance of [`Metrics`].
    pub fn new(enabled: bool) -> Self {
        Metrics {
            enabled,
            start_time: Instant::now(),
            total_operations: AtomicU64::new(0),
            put_operations: AtomicU64::new(0),
            get_operations: AtomicU64::new(0),
            delete_operations: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
            compaction_count: AtomicU64::new(0),
        }
    }

    /// Record a put operation.
    pub fn record_put(&self) {
        self.record(&self.put_operations);
    }

    /// Record a get operation.
    pub fn record_get(&self) {
        self.record(&self.get_operations);
    }

    /// Record a delete operation.
    pub fn record_delete(&self) {
        self.record(&self.delete_operations);
    }

    /// Record a memtable flush.
    pub fn record_flush(&self) {
        if self.enabled {
            self.flush_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a completed compaction.
    pub fn record_compaction(&self) {
        if self.enabled {
            self.compaction_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Produce the stats map from the counters and the provided gauges.
    pub fn snapshot(&self, gauges: EngineGauges) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        stats.insert(
            "total_operations".to_string(),
            self.total_operations.load(Ordering::Relaxed),
        );
        stats.insert(
            "put_operations".to_string(),
            self.put_operations.load(Ordering::Relaxed),
        );
        stats.insert(
            "get_operations".to_string(),
            self.get_operations.load(Ordering::Relaxed),
        );
        stats.insert(
            "delete_operations".to_string(),
            self.delete_operations.load(Ordering::Relaxed),
        );
        stats.insert(
            "flush_count".to_string(),
            self.flush_count.load(Ordering::Relaxed),
        );
        stats.insert(
            "compaction_count".to_string(),
            self.compaction_count.load(Ordering::Relaxed),
        );
        stats.insert(
            "uptime_seconds".to_string(),
            self.start_time.elapsed().as_secs(),
        );
        stats.insert("memtable_entries".to_string(), gauges.memtable_entries);
        stats.insert(
            "memtable_size_bytes".to_string(),
            gauges.memtable_size_bytes,
        );
        stats.insert(
            "immutable_memtables".to_string(),
            gauges.immutable_memtables,
        );
        stats.insert("sstable_count".to_string(), gauges.sstable_count);

        stats
    }
}

/// Private methods.
impl Metrics {
    /// Bump an operation counter and the total.
    fn record(&self, counter: &AtomicU64) {
        if !self.enabled {
            return;
        }

        counter.fetch_add(1, Ordering::Relaxed);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
    }
}
