/*!
This module contains file system wrappers for disk-based file systems.
*/

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::traits::{FileSystem, RandomAccessFile, ReadonlyRandomAccessFile, UnlockableFile};
use super::FileLock;

impl ReadonlyRandomAccessFile for File {
    #[cfg(target_family = "windows")]
    fn read_from(&self, buf: &mut [u8], offset: usize) -> io::Result<usize> {
        use std::os::windows::prelude::FileExt;

        self.seek_read(buf, offset as u64)
    }

    #[cfg(target_family = "unix")]
    fn read_from(&self, buf: &mut [u8], offset: usize) -> io::Result<usize> {
        use std::os::unix::prelude::FileExt;

        self.read_at(buf, offset as u64)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl RandomAccessFile for File {
    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Seek to the end first
        self.seek(SeekFrom::End(0))?;
        self.write(buf)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_all()
    }
}

impl UnlockableFile for File {
    fn unlock(&self) -> io::Result<()> {
        fs2::FileExt::unlock(self)
    }
}

/// File system implementation that delegates I/O to the operating system.
#[derive(Debug)]
pub struct OsFileSystem {}

/// Public methods.
impl OsFileSystem {
    /// Create an instance of [`OsFileSystem`].
    pub fn new() -> Self {
        OsFileSystem {}
    }
}

impl Default for OsFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for OsFileSystem {
    fn get_name(&self) -> String {
        "OsFileSystem".to_string()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)?
            .map(|maybe_entry| maybe_entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, io::Error>>()?;
        entries.sort();
        Ok(entries)
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ReadonlyRandomAccessFile>> {
        let file = File::open(path)?;
        Ok(Box::new(file))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn create_file(&self, path: &Path, append: bool) -> io::Result<Box<dyn RandomAccessFile>> {
        let mut open_options = OpenOptions::new();
        open_options.create(true).write(true).read(true);

        if append {
            open_options.append(true);
        } else {
            open_options.truncate(true);
        }

        let file = open_options.open(path)?;

        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn get_file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.try_lock_exclusive()?;

        Ok(FileLock::new(Box::new(file)))
    }
}

/**
A file system implementation rooted in a `tempfile` temp directory.

Only the root directory is backed by the `tempfile` crate to take advantage of
its auto-cleanup mechanism. File creation is done directly so that control
over file naming is retained.
*/
#[derive(Debug)]
pub struct TmpFileSystem {
    root_dir: TempDir,
}

/// Public methods
impl TmpFileSystem {
    /// Create a new instance of [`TmpFileSystem`] rooted in the provided path.
    pub fn new(root_path: Option<&Path>) -> Self {
        if let Some(path) = root_path {
            return TmpFileSystem {
                root_dir: TempDir::new_in(path).unwrap(),
            };
        }

        TmpFileSystem {
            root_dir: TempDir::new().unwrap(),
        }
    }

    /**
    Get the root path of this temporary file system.

    All methods operate relative to this root path.
    */
    pub fn get_root_path(&self) -> PathBuf {
        self.root_dir.path().to_owned()
    }
}

impl Default for TmpFileSystem {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Private methods.
impl TmpFileSystem {
    /**
    Get a path rooted at the root path of this file system. Prefixes that
    already match the root path are kept as is.
    */
    fn get_rooted_path(&self, path: &Path) -> PathBuf {
        if path.starts_with(self.root_dir.path()) {
            return path.to_path_buf();
        }

        self.root_dir.path().join(path)
    }
}

impl FileSystem for TmpFileSystem {
    fn get_name(&self) -> String {
        "TmpFileSystem".to_string()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.get_rooted_path(path))
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(self.get_rooted_path(path))?
            .map(|maybe_entry| maybe_entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, io::Error>>()?;
        entries.sort();
        Ok(entries)
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ReadonlyRandomAccessFile>> {
        let file = File::open(self.get_rooted_path(path))?;
        Ok(Box::new(file))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.get_rooted_path(from), self.get_rooted_path(to))
    }

    fn create_file(&self, path: &Path, append: bool) -> io::Result<Box<dyn RandomAccessFile>> {
        let mut open_options = OpenOptions::new();
        open_options.create(true).write(true).read(true);

        if append {
            open_options.append(true);
        } else {
            open_options.truncate(true);
        }

        let file = open_options.open(self.get_rooted_path(path))?;

        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.get_rooted_path(path))
    }

    fn get_file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(self.get_rooted_path(path))?.len())
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.get_rooted_path(path))?;
        file.try_lock_exclusive()?;

        Ok(FileLock::new(Box::new(file)))
    }
}

#[cfg(test)]
mod os_file_system_tests {
    use pretty_assertions::assert_eq;
    use std::io::Read;

    use super::*;

    #[test]
    fn create_file_creates_a_file_we_can_write_to_and_read_from() {
        let temp_dir = TempDir::new().unwrap();
        let file_system = OsFileSystem::new();
        let file_path = temp_dir.path().join("testing_file");

        let mut file = file_system.create_file(&file_path, true).unwrap();
        assert!(file.write(b"Hello World").is_ok());
        assert!(file.flush().is_ok());
        assert_eq!(file_system.get_file_size(&file_path).unwrap(), 11);

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut file_contents = String::new();
        let bytes_read = file.read_to_string(&mut file_contents).unwrap();
        assert_eq!(bytes_read, 11);
        assert_eq!(file_contents, "Hello World");
    }

    #[test]
    fn read_from_reads_at_an_offset_without_moving_the_cursor() {
        let temp_dir = TempDir::new().unwrap();
        let file_system = OsFileSystem::new();
        let file_path = temp_dir.path().join("offset_file");

        let mut file = file_system.create_file(&file_path, false).unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let readable = file_system.open_file(&file_path).unwrap();
        let mut buf = [0u8; 4];
        let bytes_read = readable.read_from(&mut buf, 3).unwrap();
        assert_eq!(bytes_read, 4);
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn remove_file_removes_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_system = OsFileSystem::new();
        let file_path = temp_dir.path().join("testing_file");

        let mut file = file_system.create_file(&file_path, true).unwrap();
        assert!(file.write(b"Hello World").is_ok());
        assert!(file.flush().is_ok());
        assert_eq!(file_system.list_dir(temp_dir.path()).unwrap().len(), 1);

        assert!(file_system.remove_file(&file_path).is_ok());
        assert_eq!(file_system.list_dir(temp_dir.path()).unwrap().len(), 0);
    }

    #[test]
    fn lock_file_rejects_a_second_locker() {
        let temp_dir = TempDir::new().unwrap();
        let file_system = OsFileSystem::new();
        let lock_path = temp_dir.path().join("LOCK");

        let held_lock = file_system.lock_file(&lock_path).unwrap();
        assert!(file_system.lock_file(&lock_path).is_err());

        drop(held_lock);
        assert!(file_system.lock_file(&lock_path).is_ok());
    }
}
