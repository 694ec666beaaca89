/*!
The database module contains the primary API for interacting with the
key-value store.

# Write-ahead ordering

Every mutation is appended to the write-ahead log before it is applied to the
engine. A crash after the append but before the apply is recovered by replay
at the next open; a crash before the append is never visible to readers.
Replay is idempotent because re-applying an entry produces the same engine
state, which matters because the log is only cleared on a clean close rather
than after each flush.

# Locking

One exclusive lock guards the WAL manager and the entire engine state. Every
public operation and every background compaction tick serializes through it,
so callers observe a total order over puts, gets, and deletes. There is no
cross-key transactional atomicity.
*/

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::compaction::{CompactionWorker, WorkerContext};
use crate::engine::LsmEngine;
use crate::errors::{SiltError, SiltResult};
use crate::file_names::FileNameHandler;
use crate::fs::FileLock;
use crate::metrics::Metrics;
use crate::options::DbOptions;
use crate::types::Operation;
use crate::wal::WalManager;

/// The lock-guarded state shared between the database and the compaction
/// worker.
pub(crate) struct DatabaseCore {
    /// The write-ahead log manager.
    pub(crate) wal: WalManager,

    /// The LSM engine.
    pub(crate) engine: LsmEngine,
}

/// A handle to an open siltdb database.
pub struct DB {
    options: DbOptions,

    /// The WAL and engine state, behind the database-wide lock.
    core: Arc<Mutex<DatabaseCore>>,

    metrics: Arc<Metrics>,

    /// False once [`DB::close`] has run; operations fail afterwards.
    is_open: AtomicBool,

    /// Signals the compaction worker that shutdown has begun.
    is_shutting_down: Arc<AtomicBool>,

    /// The background compaction worker, when enabled.
    worker: Mutex<Option<CompactionWorker>>,

    /// Advisory lock guaranteeing single-instance access to the data
    /// directory. Released when the database is dropped.
    _db_lock: FileLock,
}

impl fmt::Debug for DB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DB")
            .field("options", &self.options)
            .field("is_open", &self.is_open)
            .finish()
    }
}

/// Public methods.
impl DB {
    /**
    Open the database described by `options`.

    Validates the configuration, locks the data directory, restores the
    table set, replays the write-ahead log, and starts the background
    compaction worker when enabled.
    */
    pub fn open(options: DbOptions) -> SiltResult<DB> {
        options.validate()?;
        log::info!(
            "Initializing siltdb with the following options {:#?}",
            options
        );

        let fs = Arc::clone(&options.filesystem_provider);
        let file_names = FileNameHandler::new(options.db_path.clone());

        log::info!(
            "Creating the database directory at {path}.",
            path = &options.db_path
        );
        fs.create_dir_all(Path::new(&options.db_path))?;
        let db_lock = fs.lock_file(&file_names.lock_file_path())?;

        let metrics = Arc::new(Metrics::new(options.enable_metrics));
        let engine = LsmEngine::new(
            Arc::clone(&fs),
            file_names.clone(),
            options.memtable_variant,
            options.max_memtable_entries,
            Arc::clone(&metrics),
        )?;
        let wal = WalManager::new(
            Arc::clone(&fs),
            file_names.wal_path(&options.db_name),
            options.wal_sync_mode,
            options.enable_wal,
        )?;

        let core = Arc::new(Mutex::new(DatabaseCore { wal, engine }));
        DB::recover_from_wal(&core)?;

        let is_shutting_down = Arc::new(AtomicBool::new(false));
        let worker = if options.enable_background_compaction {
            Some(
                CompactionWorker::start(WorkerContext {
                    core: Arc::clone(&core),
                    is_shutting_down: Arc::clone(&is_shutting_down),
                    check_interval: Duration::from_millis(options.compaction_check_interval_ms),
                })
                .map_err(SiltError::IO)?,
            )
        } else {
            None
        };

        log::info!(
            "Database '{name}' opened successfully.",
            name = &options.db_name
        );

        Ok(DB {
            options,
            core,
            metrics,
            is_open: AtomicBool::new(true),
            is_shutting_down,
            worker: Mutex::new(worker),
            _db_lock: db_lock,
        })
    }

    /// Insert or overwrite the value for a key.
    pub fn put(&self, key: String, value: String) -> SiltResult<()> {
        self.check_open()?;

        {
            let mut core = self.core.lock();
            core.wal.append(Operation::Put, &key, &value)?;
            core.engine.apply_put(key, value)?;
        }
        self.metrics.record_put();

        Ok(())
    }

    /**
    Get the value for a key.

    Returns `Ok(None)` for keys that were never written or have been
    deleted. Reads resolve entirely from engine state; the write-ahead log
    is never consulted.
    */
    pub fn get(&self, key: &str) -> SiltResult<Option<String>> {
        self.check_open()?;

        let result = self.core.lock().engine.get(key)?;
        self.metrics.record_get();

        Ok(result)
    }

    /// Delete a key. Deleting an absent key is not an error.
    pub fn delete(&self, key: String) -> SiltResult<()> {
        self.check_open()?;

        {
            let mut core = self.core.lock();
            core.wal.append(Operation::Delete, &key, "")?;
            core.engine.apply_delete(key)?;
        }
        self.metrics.record_delete();

        Ok(())
    }

    /**
    Get a snapshot of database statistics: operation counters, memtable and
    table gauges, and uptime.
    */
    pub fn stats(&self) -> SiltResult<HashMap<String, u64>> {
        self.check_open()?;

        let gauges = self.core.lock().engine.gauges();
        Ok(self.metrics.snapshot(gauges))
    }

    /**
    Synchronously run one compaction check, merging a level if any level's
    file count exceeds its trigger.

    The background worker performs the same check periodically; this entry
    point exists for callers that need a deterministic compaction point.
    */
    pub fn compact(&self) -> SiltResult<()> {
        self.check_open()?;

        let mut core = self.core.lock();
        core.engine.compact_if_needed()?;

        Ok(())
    }

    /**
    Close the database.

    Stops the compaction worker (waiting a bounded time for an in-flight
    tick), flushes every remaining memtable, and clears the write-ahead log
    only after that flush succeeds. Closing an already closed database is a
    no-op; any other operation on a closed database fails with
    [`SiltError::Closed`].
    */
    pub fn close(&self) -> SiltResult<()> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        log::info!(
            "Closing database '{name}'.",
            name = &self.options.db_name
        );
        self.is_shutting_down.store(true, Ordering::Release);
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
        }

        let mut core = self.core.lock();
        core.engine.force_flush()?;
        core.wal.clear()?;

        log::info!(
            "Database '{name}' closed successfully.",
            name = &self.options.db_name
        );

        Ok(())
    }
}

/// Private methods.
impl DB {
    /// Fail with [`SiltError::Closed`] once the database has been closed.
    fn check_open(&self) -> SiltResult<()> {
        if !self.is_open.load(Ordering::Acquire) {
            return Err(SiltError::Closed);
        }

        Ok(())
    }

    /// Re-apply every write-ahead log entry to the engine in sequence order.
    fn recover_from_wal(core: &Arc<Mutex<DatabaseCore>>) -> SiltResult<()> {
        let mut core_guard = core.lock();
        let entries = core_guard.wal.entries()?;
        if entries.is_empty() {
            log::info!("No write-ahead log entries to recover.");
            return Ok(());
        }

        log::info!(
            "Replaying {count} write-ahead log entries.",
            count = entries.len()
        );
        for entry in entries {
            match entry.operation {
                Operation::Put => core_guard.engine.apply_put(entry.key, entry.value)?,
                Operation::Delete => core_guard.engine.apply_delete(entry.key)?,
            }
        }
        log::info!(
            "Recovery complete. The write-ahead log sequence is at {sequence}.",
            sequence = core_guard.wal.current_sequence()
        );

        Ok(())
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        if !self.is_open.load(Ordering::Acquire) {
            return;
        }

        // Dropped without a clean close. Stop the worker so the process can
        // exit; the WAL stays behind for recovery at the next open.
        self.is_shutting_down.store(true, Ordering::Release);
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
        }
        log::warn!(
            "Database '{name}' was dropped without being closed. The write-ahead log was \
            retained for recovery.",
            name = &self.options.db_name
        );
    }
}

#[cfg(test)]
mod db_test;
