/*!
This module holds the option structures that control database behavior.
*/

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{SiltError, SiltResult};
use crate::fs::{FileSystem, OsFileSystem};

/**
Holds options to control database behavior.

Options are plain public fields so that callers can use struct-update syntax
over [`DbOptions::default`]. They are validated once at
[`DB::open`](crate::DB::open).
*/
#[derive(Clone, Debug)]
pub struct DbOptions {
    /**
    The name of the database. The write-ahead log file is derived from it.

    **This defaults to `siltdb`.**
    */
    pub db_name: String,

    /**
    The path of the directory to use for the database's files.

    **This defaults to `./siltdb_data`.**
    */
    pub db_path: String,

    /**
    The in-memory representation used for memtables.

    Variants are behaviorally identical and differ only in performance
    characteristics.

    **This defaults to [`MemtableVariant::SkipList`].**
    */
    pub memtable_variant: MemtableVariant,

    /**
    The number of entries a memtable can hold before it is frozen and flushed
    to a level-0 table file.

    **This defaults to 1024 entries.**
    */
    pub max_memtable_entries: usize,

    /**
    Whether a background worker periodically checks for and runs compactions.

    **This defaults to true.**
    */
    pub enable_background_compaction: bool,

    /**
    How often, in milliseconds, the background worker checks whether
    compaction is needed.

    **This defaults to 5000 ms.**
    */
    pub compaction_check_interval_ms: u64,

    /**
    Whether mutations are recorded in the write-ahead log before being
    applied. Disabling this trades crash durability for write throughput and
    is mainly meant for ephemeral and testing configurations.

    **This defaults to true.**
    */
    pub enable_wal: bool,

    /**
    How write-ahead log appends are made durable. See [`WalSyncMode`].

    **This defaults to [`WalSyncMode::Sync`].**
    */
    pub wal_sync_mode: WalSyncMode,

    /**
    Upper bound on concurrent client operations. Must be positive.

    All operations serialize through one exclusive lock, so this does not
    currently gate admission; it is validated and reported for compatibility
    with configurations that tune it.

    **This defaults to 10.**
    */
    pub max_concurrent_operations: usize,

    /**
    Whether operation counters are recorded. Statistics gauges are reported
    either way.

    **This defaults to true.**
    */
    pub enable_metrics: bool,

    /**
    A wrapper around a particular file system to use.

    **This defaults to [`OsFileSystem`](crate::fs::OsFileSystem).**
    */
    pub filesystem_provider: Arc<dyn FileSystem>,
}

impl DbOptions {
    /**
    Check the options for values that the database cannot run with.

    Returns a [`SiltError::Configuration`] describing the first problem
    found.
    */
    pub fn validate(&self) -> SiltResult<()> {
        if self.max_concurrent_operations == 0 {
            return Err(SiltError::Configuration(
                "max_concurrent_operations must be positive".to_string(),
            ));
        }

        if self.db_name.is_empty() {
            return Err(SiltError::Configuration(
                "db_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DbOptions {
    fn default() -> Self {
        DbOptions {
            db_name: "siltdb".to_string(),
            db_path: "./siltdb_data".to_string(),
            memtable_variant: MemtableVariant::SkipList,
            max_memtable_entries: 1024,
            enable_background_compaction: true,
            compaction_check_interval_ms: 5000,
            enable_wal: true,
            wal_sync_mode: WalSyncMode::Sync,
            max_concurrent_operations: 10,
            enable_metrics: true,
            filesystem_provider: Arc::new(OsFileSystem::new()),
        }
    }
}

/// The in-memory representations available for memtables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemtableVariant {
    /// An arena-indexed skip list. The default.
    SkipList,

    /// A hash index that sorts keys at flush time.
    HashIndex,

    /// An ordered index backed by a B-tree map.
    Ordered,
}

impl FromStr for MemtableVariant {
    type Err = SiltError;

    fn from_str(raw: &str) -> SiltResult<MemtableVariant> {
        match raw {
            "skiplist" => Ok(MemtableVariant::SkipList),
            "hash_index" => Ok(MemtableVariant::HashIndex),
            "ordered" => Ok(MemtableVariant::Ordered),
            _ => Err(SiltError::Configuration(format!(
                "Unknown memtable variant: {raw}. Valid options: skiplist, hash_index, ordered"
            ))),
        }
    }
}

/// How write-ahead log appends are made durable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WalSyncMode {
    /**
    Every append is written and fsynced before the operation returns, and an
    append failure fails the operation. The slowest and safest mode.
    */
    Sync,

    /**
    Appends are written to the log file without an fsync. A crash can lose
    recently acknowledged writes that the operating system had not yet
    persisted. Append failures are logged and swallowed.
    */
    Async,

    /**
    Appends are buffered in memory and written out in groups. A crash can
    lose up to one buffer of acknowledged writes. Append failures are logged
    and swallowed.
    */
    Batch,
}

impl fmt::Display for WalSyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalSyncMode::Sync => write!(f, "sync"),
            WalSyncMode::Async => write!(f, "async"),
            WalSyncMode::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for WalSyncMode {
    type Err = SiltError;

    fn from_str(raw: &str) -> SiltResult<WalSyncMode> {
        match raw {
            "sync" => Ok(WalSyncMode::Sync),
            "async" => Ok(WalSyncMode::Async),
            "batch" => Ok(WalSyncMode::Batch),
            _ => Err(SiltError::Configuration(format!(
                "Unknown WAL sync mode: {raw}. Valid options: sync, async, batch"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(DbOptions::default().validate().is_ok());
    }

    #[test]
    fn non_positive_concurrency_is_rejected() {
        let options = DbOptions {
            max_concurrent_operations: 0,
            ..DbOptions::default()
        };

        assert!(matches!(
            options.validate(),
            Err(SiltError::Configuration(_))
        ));
    }

    #[test]
    fn sync_modes_parse_from_configuration_strings() {
        assert_eq!("sync".parse::<WalSyncMode>().unwrap(), WalSyncMode::Sync);
        assert_eq!("async".parse::<WalSyncMode>().unwrap(), WalSyncMode::Async);
        assert_eq!("batch".parse::<WalSyncMode>().unwrap(), WalSyncMode::Batch);
        assert!(matches!(
            "eventually".parse::<WalSyncMode>(),
            Err(SiltError::Configuration(_))
        ));
    }

    #[test]
    fn memtable_variants_parse_from_configuration_strings() {
        assert_eq!(
            "skiplist".parse::<MemtableVariant>().unwrap(),
            MemtableVariant::SkipList
        );
        assert!(matches!(
            "btree".parse::<MemtableVariant>(),
            Err(SiltError::Configuration(_))
        ));
    }
}
