use std::path::Path;
use std::sync::Arc;

use siltdb::fs::{FileSystem, TmpFileSystem};
use siltdb::{DbOptions, DB};

fn setup() {
    let _ = env_logger::builder()
        // Include all events in tests
        .filter_level(log::LevelFilter::max())
        // Ensure events are captured by `cargo test`
        .is_test(true)
        // Ignore errors initializing the logger if tests race to configure it
        .try_init();
}

fn disk_options(fs: &Arc<dyn FileSystem>, name: &str) -> DbOptions {
    DbOptions {
        db_name: name.to_string(),
        db_path: name.to_string(),
        enable_background_compaction: false,
        filesystem_provider: Arc::clone(fs),
        ..DbOptions::default()
    }
}

#[test]
fn an_abandoned_database_recovers_every_write_from_the_wal() {
    setup();

    let shared_fs: Arc<dyn FileSystem> = Arc::new(TmpFileSystem::new(None));

    let db = DB::open(disk_options(&shared_fs, "crash-replay")).unwrap();
    for index in 0..50 {
        db.put(format!("recovery_key{index}"), format!("recovery_value{index}"))
            .unwrap();
    }
    // Simulate a crash by dropping the handle without closing
    drop(db);

    let reopened = DB::open(disk_options(&shared_fs, "crash-replay")).unwrap();
    for index in 0..50 {
        assert_eq!(
            reopened.get(&format!("recovery_key{index}")).unwrap(),
            Some(format!("recovery_value{index}")),
            "recovery_key{index} should survive the crash"
        );
    }
}

#[test]
fn a_clean_close_flushes_everything_and_empties_the_wal() {
    setup();

    let shared_fs: Arc<dyn FileSystem> = Arc::new(TmpFileSystem::new(None));

    let db = DB::open(disk_options(&shared_fs, "clean-close")).unwrap();
    for index in 0..10 {
        db.put(format!("key{index}"), format!("value{index}")).unwrap();
    }
    db.delete("key3".to_string()).unwrap();
    db.close().unwrap();

    let wal_path = Path::new("clean-close").join("clean-close.wal");
    assert_eq!(
        shared_fs.get_file_size(&wal_path).unwrap(),
        0,
        "A clean close must leave an empty WAL"
    );

    let reopened = DB::open(disk_options(&shared_fs, "clean-close")).unwrap();
    for index in 0..10 {
        let expected = if index == 3 {
            None
        } else {
            Some(format!("value{index}"))
        };
        assert_eq!(reopened.get(&format!("key{index}")).unwrap(), expected);
    }

    let stats = reopened.stats().unwrap();
    assert!(stats["sstable_count"] >= 1, "The close-time flush should persist a table");
    assert_eq!(stats["memtable_entries"], 0);
}

#[test]
fn writes_after_a_crash_recovery_keep_their_order() {
    setup();

    let shared_fs: Arc<dyn FileSystem> = Arc::new(TmpFileSystem::new(None));

    let db = DB::open(disk_options(&shared_fs, "reorder")).unwrap();
    db.put("key".to_string(), "first".to_string()).unwrap();
    drop(db);

    let db = DB::open(disk_options(&shared_fs, "reorder")).unwrap();
    db.put("key".to_string(), "second".to_string()).unwrap();
    drop(db);

    let db = DB::open(disk_options(&shared_fs, "reorder")).unwrap();
    assert_eq!(db.get("key").unwrap(), Some("second".to_string()));
}

#[test]
fn a_second_instance_cannot_lock_the_same_data_directory() {
    setup();

    let shared_fs: Arc<dyn FileSystem> = Arc::new(TmpFileSystem::new(None));

    let first = DB::open(disk_options(&shared_fs, "locked")).unwrap();
    assert!(
        DB::open(disk_options(&shared_fs, "locked")).is_err(),
        "The LOCK file must reject a second instance"
    );

    drop(first);
    assert!(DB::open(disk_options(&shared_fs, "locked")).is_ok());
}
