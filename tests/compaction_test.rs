use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use siltdb::fs::{FileSystem, TmpFileSystem};
use siltdb::{DbOptions, DB};

fn setup() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::max())
        .is_test(true)
        .try_init();
}

/// Options that flush after every two writes so tests can mint level-0
/// tables at will. The background worker stays off; tests drive compaction
/// through [`DB::compact`] for determinism.
fn compaction_options(fs: &Arc<dyn FileSystem>, name: &str) -> DbOptions {
    DbOptions {
        db_name: name.to_string(),
        db_path: name.to_string(),
        max_memtable_entries: 2,
        enable_background_compaction: false,
        filesystem_provider: Arc::clone(fs),
        ..DbOptions::default()
    }
}

/// Table files at `level` inside the database directory, by file name.
fn table_files_at_level(data_dir: &PathBuf, level: usize) -> Vec<String> {
    let marker = format!("_L{level}_");
    let mut names: Vec<String> = fs::read_dir(data_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("sstable") && name.contains(&marker))
        .collect();
    names.sort();

    names
}

#[test]
fn compacting_an_overfull_level_zero_leaves_one_level_one_file() {
    setup();

    let tmp_fs = TmpFileSystem::new(None);
    let data_dir = tmp_fs.get_root_path().join("level-counts");
    let shared_fs: Arc<dyn FileSystem> = Arc::new(tmp_fs);

    let db = DB::open(compaction_options(&shared_fs, "level-counts")).unwrap();
    // Five flushes of two keys each: one more level-0 table than the
    // trigger of four
    for index in 0..10 {
        db.put(format!("key{index:02}"), format!("value{index}")).unwrap();
    }
    assert_eq!(table_files_at_level(&data_dir, 0).len(), 5);

    db.compact().unwrap();

    assert!(
        table_files_at_level(&data_dir, 0).len() < 4,
        "Level 0 must drop below its trigger"
    );
    assert_eq!(
        table_files_at_level(&data_dir, 1).len(),
        1,
        "The merge must produce exactly one level-1 file"
    );

    // The union of all written keys survives the merge
    for index in 0..10 {
        assert_eq!(
            db.get(&format!("key{index:02}")).unwrap(),
            Some(format!("value{index}"))
        );
    }
}

#[test]
fn compaction_is_a_no_op_below_the_trigger() {
    setup();

    let tmp_fs = TmpFileSystem::new(None);
    let data_dir = tmp_fs.get_root_path().join("no-op");
    let shared_fs: Arc<dyn FileSystem> = Arc::new(tmp_fs);

    let db = DB::open(compaction_options(&shared_fs, "no-op")).unwrap();
    for index in 0..4 {
        db.put(format!("key{index}"), "value".to_string()).unwrap();
    }
    assert_eq!(table_files_at_level(&data_dir, 0).len(), 2);

    db.compact().unwrap();
    assert_eq!(table_files_at_level(&data_dir, 0).len(), 2);
    assert!(table_files_at_level(&data_dir, 1).is_empty());
}

#[test]
fn a_deleted_key_never_resurrects_through_compaction() {
    setup();

    let tmp_fs = TmpFileSystem::new(None);
    let shared_fs: Arc<dyn FileSystem> = Arc::new(tmp_fs);

    let db = DB::open(compaction_options(&shared_fs, "no-resurrection")).unwrap();

    // Sink an old value for the victim key into level 1
    db.put("victim".to_string(), "stale".to_string()).unwrap();
    db.put("pad0".to_string(), "x".to_string()).unwrap();
    for index in 0..8 {
        db.put(format!("seed{index}"), "x".to_string()).unwrap();
    }
    db.compact().unwrap();
    assert_eq!(db.get("victim").unwrap(), Some("stale".to_string()));

    // Delete the victim and push the tombstone through its own compaction
    db.delete("victim".to_string()).unwrap();
    db.put("pad1".to_string(), "x".to_string()).unwrap();
    assert_eq!(db.get("victim").unwrap(), None);
    for index in 0..8 {
        db.put(format!("churn{index}"), "x".to_string()).unwrap();
    }
    db.compact().unwrap();

    // The stale level-1 value must stay shadowed by the merged tombstone
    assert_eq!(db.get("victim").unwrap(), None);

    // Even after further compactions the key stays deleted
    for index in 0..10 {
        db.put(format!("more{index}"), "x".to_string()).unwrap();
    }
    db.compact().unwrap();
    assert_eq!(db.get("victim").unwrap(), None);
}
