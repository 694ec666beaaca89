/*!
The LSM engine orchestrates the write and read paths across the storage
tiers: the active memtable, frozen memtables awaiting flush, and the leveled
table files.

A key's records move through the tiers in one direction only. A write lands
in the active memtable; crossing the size threshold freezes the memtable and
flushes it to a level-0 table; compaction later merges an overfull level into
the next one and deletes the merged-away files. Reads therefore resolve
newest-first: the active memtable, then frozen memtables from most recently
frozen to oldest, then tables level by level (level 0 first) and
newest-first within each level. A tombstone found at any tier resolves the
key as absent immediately; older tiers are never consulted past it.

The engine does no locking of its own. The owning database serializes every
operation, including the background worker's ticks, through one exclusive
lock.
*/

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::compaction::errors::CompactionResult;
use crate::compaction::CompactionStrategy;
use crate::errors::SiltResult;
use crate::file_names::FileNameHandler;
use crate::fs::FileSystem;
use crate::memtable::{new_memtable, MemTable};
use crate::metrics::{EngineGauges, Metrics};
use crate::options::MemtableVariant;
use crate::tables::{Table, TableBuilder};
use crate::types::{LookupOutcome, StoredValue};
use crate::wal::unix_timestamp_ms;

pub(crate) struct LsmEngine {
    fs: Arc<dyn FileSystem>,
    file_names: FileNameHandler,
    memtable_variant: MemtableVariant,
    max_memtable_entries: usize,
    metrics: Arc<Metrics>,
    strategy: CompactionStrategy,

    /// The memtable absorbing writes.
    active: Box<dyn MemTable>,

    /// Frozen memtables pending flush, oldest first.
    frozen: Vec<Box<dyn MemTable>>,

    /// Every live table, ordered by (level ascending, created stamp
    /// descending). This is exactly the order the read path must search.
    tables: Vec<Table>,

    /// High-water mark for table creation stamps. Stamps are strictly
    /// increasing even when the clock does not move between flushes.
    last_table_stamp: u64,
}

/// Public methods.
impl LsmEngine {
    /**
    Create a new instance of [`LsmEngine`].

    Scans the data directory for existing table files, removes leftover temp
    files from interrupted writes, and restores the table set.
    */
    pub fn new(
        fs: Arc<dyn FileSystem>,
        file_names: FileNameHandler,
        memtable_variant: MemtableVariant,
        max_memtable_entries: usize,
        metrics: Arc<Metrics>,
    ) -> SiltResult<Self> {
        let mut engine = LsmEngine {
            active: new_memtable(memtable_variant),
            fs,
            file_names,
            memtable_variant,
            max_memtable_entries,
            metrics,
            strategy: CompactionStrategy::new(),
            frozen: Vec::new(),
            tables: Vec::new(),
            last_table_stamp: 0,
        };
        engine.load_existing_tables()?;

        Ok(engine)
    }

    /// Record `value` for `key`, flushing the memtable if it is now full.
    pub fn apply_put(&mut self, key: String, value: String) -> SiltResult<()> {
        self.active.insert(key, StoredValue::Value(value));
        self.maybe_flush_active()
    }

    /// Record a tombstone for `key`, flushing the memtable if it is now full.
    pub fn apply_delete(&mut self, key: String) -> SiltResult<()> {
        self.active.insert(key, StoredValue::Tombstone);
        self.maybe_flush_active()
    }

    /// Resolve the most recent record for `key` across all tiers.
    pub fn get(&self, key: &str) -> SiltResult<Option<String>> {
        match self.active.get(key) {
            Some(StoredValue::Value(value)) => return Ok(Some(value.clone())),
            Some(StoredValue::Tombstone) => return Ok(None),
            None => {}
        }

        for memtable in self.frozen.iter().rev() {
            match memtable.get(key) {
                Some(StoredValue::Value(value)) => return Ok(Some(value.clone())),
                Some(StoredValue::Tombstone) => return Ok(None),
                None => {}
            }
        }

        for table in &self.tables {
            match table.get(key)? {
                LookupOutcome::Found(value) => return Ok(Some(value)),
                LookupOutcome::Deleted => return Ok(None),
                LookupOutcome::Missing => {}
            }
        }

        Ok(None)
    }

    /// Flush the frozen queue and the active memtable regardless of size.
    pub fn force_flush(&mut self) -> SiltResult<()> {
        if !self.active.is_empty() {
            self.freeze_active();
        }

        self.flush_frozen()
    }

    /**
    Run one compaction if any level's file count exceeds its trigger.

    Returns true if a level was compacted.
    */
    pub fn compact_if_needed(&mut self) -> CompactionResult<bool> {
        let level_counts = self.level_file_counts();
        match self.strategy.level_needing_compaction(&level_counts) {
            Some(level) => {
                self.compact_level(level)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The number of table files per level, indexed by level.
    pub fn level_file_counts(&self) -> Vec<usize> {
        let max_level = match self.tables.iter().map(|table| table.metadata().level).max() {
            Some(max_level) => max_level,
            None => return Vec::new(),
        };

        let mut counts = vec![0; max_level + 1];
        for table in &self.tables {
            counts[table.metadata().level] += 1;
        }

        counts
    }

    /// Sample the gauges reported through the stats map.
    pub fn gauges(&self) -> EngineGauges {
        EngineGauges {
            memtable_entries: self.active.len() as u64,
            memtable_size_bytes: self.active.approximate_size() as u64,
            immutable_memtables: self.frozen.len() as u64,
            sstable_count: self.tables.len() as u64,
        }
    }
}

/// Private methods.
impl LsmEngine {
    /// Restore the table set from the files in the data directory.
    fn load_existing_tables(&mut self) -> SiltResult<()> {
        let data_dir = self.file_names.db_path();
        for path in self.fs.list_dir(&data_dir)? {
            if FileNameHandler::is_temp_file(&path) {
                log::warn!(
                    "Removing leftover temp file from an interrupted table write: {path}",
                    path = path.display()
                );
                if let Err(remove_error) = self.fs.remove_file(&path) {
                    log::error!(
                        "Failed to remove temp file {path}. Error: {remove_error}",
                        path = path.display()
                    );
                }
                continue;
            }

            let (level, created_at_ms) = match FileNameHandler::parse_table_file_name(&path) {
                Some(parsed) => parsed,
                None => continue,
            };

            let table = Table::open(&self.fs, level, &path, created_at_ms)?;
            log::info!(
                "Loaded table file {path} at level {level} with {count} entries.",
                path = path.display(),
                count = table.metadata().entry_count
            );
            self.last_table_stamp = self.last_table_stamp.max(created_at_ms);
            self.tables.push(table);
        }

        self.sort_tables();
        if !self.tables.is_empty() {
            log::info!(
                "Restored {count} table files across {levels} levels.",
                count = self.tables.len(),
                levels = self.level_file_counts().len()
            );
        }

        Ok(())
    }

    /// Flush the active memtable once it crosses the configured threshold.
    fn maybe_flush_active(&mut self) -> SiltResult<()> {
        if self.active.len() < self.max_memtable_entries {
            return Ok(());
        }

        self.freeze_active();
        self.flush_frozen()
    }

    /// Swap in a fresh active memtable, queueing the full one for flush.
    fn freeze_active(&mut self) {
        let full = std::mem::replace(&mut self.active, new_memtable(self.memtable_variant));
        self.frozen.push(full);
    }

    /// Flush every frozen memtable to level-0 tables, oldest first.
    fn flush_frozen(&mut self) -> SiltResult<()> {
        while !self.frozen.is_empty() {
            let memtable = self.frozen.remove(0);
            if let Err(flush_error) = self.flush_memtable(memtable.as_ref()) {
                // Keep the memtable readable and flushable for a later retry
                self.frozen.insert(0, memtable);
                return Err(flush_error);
            }
        }

        Ok(())
    }

    /// Write one memtable out as a level-0 table and register it.
    fn flush_memtable(&mut self, memtable: &dyn MemTable) -> SiltResult<()> {
        if memtable.is_empty() {
            return Ok(());
        }

        let created_at_ms = self.next_table_stamp();
        let mut builder =
            TableBuilder::new(Arc::clone(&self.fs), &self.file_names, 0, created_at_ms)?;
        for (key, value) in memtable.iter() {
            builder.add_entry(key, value)?;
        }

        let entry_count = builder.num_entries();
        let metadata = builder.finish()?;
        let table = Table::open(
            &self.fs,
            metadata.level,
            &metadata.file_path,
            metadata.created_at_ms,
        )?;

        log::info!(
            "Flushed a memtable with {entry_count} entries to {path}.",
            path = metadata.file_path.display()
        );
        self.tables.push(table);
        self.sort_tables();
        self.metrics.record_flush();

        Ok(())
    }

    /**
    Merge every table at `level` into one table at `level + 1`.

    For each key the record from the most recently created source file wins.
    A tombstone is dropped only when no table at or below the output level
    still holds the key; otherwise dropping it would let the older value
    resurface. Source files are deleted only after the merged output is
    durably in place.
    */
    fn compact_level(&mut self, level: usize) -> CompactionResult<()> {
        let source_positions = self.strategy.compaction_files(&self.tables, level);
        if source_positions.is_empty() {
            return Ok(());
        }
        let target_level = level + 1;

        // Sources are ordered newest-first; inserting oldest-first lets the
        // most recently created file win each key
        let mut merged: BTreeMap<String, StoredValue> = BTreeMap::new();
        for &position in source_positions.iter().rev() {
            for (key, value) in self.tables[position].entries()? {
                merged.insert(key, value);
            }
        }

        let source_set: HashSet<usize> = source_positions.iter().copied().collect();
        let mut surviving: Vec<(String, StoredValue)> = Vec::with_capacity(merged.len());
        let mut dropped_tombstones = 0usize;
        for (key, value) in merged {
            if value.is_tombstone()
                && !self.key_held_at_or_below(&key, target_level, &source_set)?
            {
                dropped_tombstones += 1;
                continue;
            }
            surviving.push((key, value));
        }

        let source_paths: Vec<PathBuf> = source_positions
            .iter()
            .map(|&position| self.tables[position].metadata().file_path.clone())
            .collect();

        let output_table = if surviving.is_empty() {
            None
        } else {
            let created_at_ms = self.next_table_stamp();
            let mut builder = TableBuilder::new(
                Arc::clone(&self.fs),
                &self.file_names,
                target_level,
                created_at_ms,
            )?;
            for (key, value) in &surviving {
                builder.add_entry(key, value)?;
            }
            let metadata = builder.finish()?;
            Some(Table::open(
                &self.fs,
                metadata.level,
                &metadata.file_path,
                metadata.created_at_ms,
            )?)
        };

        // The merged output is durable; the sources can now go
        self.tables
            .retain(|table| !source_paths.contains(&table.metadata().file_path));
        for path in &source_paths {
            if let Err(remove_error) = self.fs.remove_file(path) {
                log::error!(
                    "Failed to remove compacted table file {path}. Error: {remove_error}",
                    path = path.display()
                );
            }
        }

        log::info!(
            "Compacted {sources} level-{level} tables into level {target_level} \
            ({surviving} surviving entries, {dropped_tombstones} tombstones dropped).",
            sources = source_paths.len(),
            surviving = surviving.len(),
        );
        if let Some(table) = output_table {
            self.tables.push(table);
            self.sort_tables();
        }
        self.metrics.record_compaction();

        Ok(())
    }

    /**
    Return true if any table at `target_level` or deeper, excluding the
    compaction sources, holds a record for `key`.
    */
    fn key_held_at_or_below(
        &self,
        key: &str,
        target_level: usize,
        source_set: &HashSet<usize>,
    ) -> CompactionResult<bool> {
        for (position, table) in self.tables.iter().enumerate() {
            if source_set.contains(&position) || table.metadata().level < target_level {
                continue;
            }
            if table.key_in_range(key) && table.contains_key(key)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Keep tables in read order: level ascending, newest first within a
    /// level.
    fn sort_tables(&mut self) {
        self.tables.sort_by(|left, right| {
            left.metadata()
                .level
                .cmp(&right.metadata().level)
                .then(right.metadata().created_at_ms.cmp(&left.metadata().created_at_ms))
        });
    }

    /// The next strictly increasing table creation stamp.
    fn next_table_stamp(&mut self) -> u64 {
        let stamp = unix_timestamp_ms().max(self.last_table_stamp + 1);
        self.last_table_stamp = stamp;

        stamp
    }
}
