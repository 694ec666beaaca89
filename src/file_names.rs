/*!
This module contains utilities for managing file names used by the database.

Files are rooted at the `db_path` provided in the
[database options](crate::DbOptions).

Files (and their name formats) used by the database are as follows:

- Database lock file: `./LOCK`
- Write-ahead log: `./<db_name>.wal`
- Table files: `./sstable_L<level>_<created_ms>.sst`
- Temp files: `./sstable_L<level>_<created_ms>.sst.tmp`
*/

use std::path::{Path, PathBuf};

/// The name of the database lock file.
pub(crate) const LOCK_FILE: &str = "LOCK";

/// Suffix for write-ahead log files.
pub(crate) const WAL_EXT: &str = "wal";

/// Prefix for table files.
pub(crate) const TABLE_FILE_PREFIX: &str = "sstable";

/// Suffix for table files.
pub(crate) const TABLE_EXT: &str = "sst";

/// Suffix appended to a table file path while it is being written.
pub(crate) const TEMP_EXT: &str = "tmp";

/// Various utilities for managing file and folder names that siltdb uses.
#[derive(Clone, Debug)]
pub(crate) struct FileNameHandler {
    db_path: String,
}

impl FileNameHandler {
    /// Create a new instance of the [`FileNameHandler`].
    pub fn new(db_path: String) -> Self {
        FileNameHandler { db_path }
    }

    /// The database directory every other path is rooted at.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }

    /// Resolve the path to the database lock file.
    pub fn lock_file_path(&self) -> PathBuf {
        Path::new(&self.db_path).join(LOCK_FILE)
    }

    /// Resolve the path to the write-ahead log.
    pub fn wal_path(&self, db_name: &str) -> PathBuf {
        Path::new(&self.db_path).join(format!("{db_name}.{WAL_EXT}"))
    }

    /// Resolve the path to a table file at a level with a creation stamp.
    pub fn table_file_path(&self, level: usize, created_at_ms: u64) -> PathBuf {
        Path::new(&self.db_path).join(format!(
            "{TABLE_FILE_PREFIX}_L{level}_{created_at_ms}.{TABLE_EXT}"
        ))
    }

    /// Resolve the temp sibling of a table file path.
    pub fn temp_table_path(&self, level: usize, created_at_ms: u64) -> PathBuf {
        Path::new(&self.db_path).join(format!(
            "{TABLE_FILE_PREFIX}_L{level}_{created_at_ms}.{TABLE_EXT}.{TEMP_EXT}"
        ))
    }

    /**
    Parse the level and creation stamp out of a table file path.

    Returns `None` for paths that are not table files (e.g. the WAL, the lock
    file, or leftover temp files).
    */
    pub fn parse_table_file_name(path: &Path) -> Option<(usize, u64)> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(&format!(".{TABLE_EXT}"))?;
        let level_and_stamp = stem.strip_prefix(&format!("{TABLE_FILE_PREFIX}_L"))?;
        let (level_part, stamp_part) = level_and_stamp.split_once('_')?;

        let level = level_part.parse::<usize>().ok()?;
        let created_at_ms = stamp_part.parse::<u64>().ok()?;
        Some((level, created_at_ms))
    }

    /// Return true if the path carries the temp file suffix.
    pub fn is_temp_file(path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == TEMP_EXT)
    }
}
