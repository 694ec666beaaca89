use pretty_assertions::assert_eq;

use crate::fs::InMemoryFileSystem;
use crate::options::MemtableVariant;

use super::*;

fn setup() {
    let _ = env_logger::builder()
        // Include all events in tests
        .filter_level(log::LevelFilter::max())
        // Ensure events are captured by `cargo test`
        .is_test(true)
        // Ignore errors initializing the logger if tests race to configure it
        .try_init();
}

/// Options for an in-memory database with a small flush threshold and no
/// background worker, so tests control exactly when flushes happen.
fn memory_options(test_name: &str) -> DbOptions {
    DbOptions {
        db_name: test_name.to_string(),
        db_path: format!("/{test_name}"),
        max_memtable_entries: 4,
        enable_background_compaction: false,
        filesystem_provider: Arc::new(InMemoryFileSystem::new()),
        ..DbOptions::default()
    }
}

#[test]
fn opening_with_an_invalid_configuration_fails() {
    setup();

    let options = DbOptions {
        max_concurrent_operations: 0,
        ..memory_options("invalid_config")
    };

    assert!(matches!(
        DB::open(options),
        Err(SiltError::Configuration(_))
    ));
}

#[test]
fn can_write_to_and_read_from_the_database() {
    setup();

    let db = DB::open(memory_options("basic_ops")).unwrap();

    db.put("batmann".to_string(), "lab".to_string()).unwrap();
    assert_eq!(db.get("batmann").unwrap(), Some("lab".to_string()));
    assert_eq!(db.get("does not exist").unwrap(), None);

    db.delete("batmann".to_string()).unwrap();
    assert_eq!(db.get("batmann").unwrap(), None);
}

#[test]
fn the_last_write_wins() {
    setup();

    let db = DB::open(memory_options("last_write_wins")).unwrap();

    db.put("key".to_string(), "first".to_string()).unwrap();
    db.put("key".to_string(), "second".to_string()).unwrap();

    assert_eq!(db.get("key").unwrap(), Some("second".to_string()));
}

#[test]
fn deleted_keys_stay_deleted_across_flushes() {
    setup();

    let db = DB::open(memory_options("tombstone_visibility")).unwrap();

    db.put("victim".to_string(), "value".to_string()).unwrap();
    // Push the value into a level-0 table
    for index in 0..4 {
        db.put(format!("filler_a{index}"), "x".to_string()).unwrap();
    }

    db.delete("victim".to_string()).unwrap();
    // Push the tombstone into a level-0 table as well
    for index in 0..4 {
        db.put(format!("filler_b{index}"), "x".to_string()).unwrap();
    }

    assert_eq!(db.get("victim").unwrap(), None);
}

#[test]
fn flushes_preserve_every_written_value() {
    setup();

    let db = DB::open(memory_options("flush_preserves_reads")).unwrap();

    // Three times the flush threshold guarantees at least one flush
    for index in 0..12 {
        db.put(format!("key{index:02}"), format!("value{index}")).unwrap();
    }

    let stats = db.stats().unwrap();
    assert!(stats["flush_count"] >= 1, "Expected at least one flush");
    assert!(stats["sstable_count"] >= 1);

    for index in 0..12 {
        assert_eq!(
            db.get(&format!("key{index:02}")).unwrap(),
            Some(format!("value{index}"))
        );
    }
}

#[test]
fn operations_on_a_closed_database_fail() {
    setup();

    let db = DB::open(memory_options("closed_ops")).unwrap();
    db.put("key".to_string(), "value".to_string()).unwrap();
    db.close().unwrap();

    assert!(matches!(
        db.put("key".to_string(), "value".to_string()),
        Err(SiltError::Closed)
    ));
    assert!(matches!(db.get("key"), Err(SiltError::Closed)));
    assert!(matches!(db.delete("key".to_string()), Err(SiltError::Closed)));
    assert!(matches!(db.stats(), Err(SiltError::Closed)));
    assert!(matches!(db.compact(), Err(SiltError::Closed)));

    // Closing again is a no-op rather than an error
    assert!(db.close().is_ok());
}

#[test]
fn stats_count_operations_and_report_gauges() {
    setup();

    let db = DB::open(memory_options("stats")).unwrap();
    db.put("a".to_string(), "1".to_string()).unwrap();
    db.put("b".to_string(), "2".to_string()).unwrap();
    db.get("a").unwrap();
    db.delete("b".to_string()).unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats["put_operations"], 2);
    assert_eq!(stats["get_operations"], 1);
    assert_eq!(stats["delete_operations"], 1);
    assert_eq!(stats["total_operations"], 4);
    // "a" plus the tombstone that overwrote "b"
    assert_eq!(stats["memtable_entries"], 2);
    assert!(stats.contains_key("uptime_seconds"));
}

#[test]
fn disabled_metrics_report_zero_counters() {
    setup();

    let options = DbOptions {
        enable_metrics: false,
        ..memory_options("metrics_disabled")
    };
    let db = DB::open(options).unwrap();
    db.put("a".to_string(), "1".to_string()).unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats["put_operations"], 0);
    assert_eq!(stats["total_operations"], 0);
    // Gauges are sampled regardless
    assert_eq!(stats["memtable_entries"], 1);
}

#[test]
fn an_unclosed_database_recovers_its_writes_from_the_wal() {
    setup();

    let options = memory_options("wal_recovery");
    let fs = Arc::clone(&options.filesystem_provider);

    let db = DB::open(DbOptions {
        max_memtable_entries: 1024,
        ..options.clone()
    })
    .unwrap();
    for index in 0..50 {
        db.put(format!("recovery_key{index}"), format!("recovery_value{index}"))
            .unwrap();
    }
    // Simulate a crash: drop without closing
    drop(db);

    let reopened = DB::open(DbOptions {
        max_memtable_entries: 1024,
        filesystem_provider: fs,
        ..options
    })
    .unwrap();
    for index in 0..50 {
        assert_eq!(
            reopened.get(&format!("recovery_key{index}")).unwrap(),
            Some(format!("recovery_value{index}"))
        );
    }
}

#[test]
fn replayed_deletes_shadow_flushed_values() {
    setup();

    let options = memory_options("wal_delete_recovery");
    let fs = Arc::clone(&options.filesystem_provider);

    let db = DB::open(options.clone()).unwrap();
    db.put("victim".to_string(), "value".to_string()).unwrap();
    // Flush the value to a table, then delete without flushing the tombstone
    for index in 0..4 {
        db.put(format!("filler{index}"), "x".to_string()).unwrap();
    }
    db.delete("victim".to_string()).unwrap();
    drop(db);

    let reopened = DB::open(DbOptions {
        filesystem_provider: fs,
        ..options
    })
    .unwrap();
    assert_eq!(reopened.get("victim").unwrap(), None);
}

#[test]
fn a_database_without_a_wal_loses_unflushed_writes() {
    setup();

    let options = DbOptions {
        enable_wal: false,
        ..memory_options("wal_disabled")
    };
    let fs = Arc::clone(&options.filesystem_provider);

    let db = DB::open(options.clone()).unwrap();
    db.put("ephemeral".to_string(), "value".to_string()).unwrap();
    drop(db);

    let reopened = DB::open(DbOptions {
        filesystem_provider: fs,
        ..options
    })
    .unwrap();
    assert_eq!(reopened.get("ephemeral").unwrap(), None);
}

#[test]
fn every_memtable_variant_behaves_identically_through_the_public_api() {
    setup();

    for (variant, name) in [
        (MemtableVariant::SkipList, "variant_skiplist"),
        (MemtableVariant::HashIndex, "variant_hash"),
        (MemtableVariant::Ordered, "variant_ordered"),
    ] {
        let options = DbOptions {
            memtable_variant: variant,
            ..memory_options(name)
        };
        let db = DB::open(options).unwrap();

        for index in 0..10 {
            db.put(format!("key{index}"), format!("value{index}")).unwrap();
        }
        db.delete("key3".to_string()).unwrap();

        assert_eq!(db.get("key2").unwrap(), Some("value2".to_string()));
        assert_eq!(db.get("key3").unwrap(), None);
        assert_eq!(db.get("key9").unwrap(), Some("value9".to_string()));
    }
}
