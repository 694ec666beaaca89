/*!
This module contains a wrapper for an in-memory file system implementation.
*/

use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::traits::{FileSystem, RandomAccessFile, ReadonlyRandomAccessFile, UnlockableFile};
use super::FileLock;

/// File system implementation that is backed by memory.
#[derive(Debug)]
pub struct InMemoryFileSystem {
    /// The files on the file system.
    files: Arc<RwLock<HashMap<PathBuf, InMemoryFile>>>,
}

impl InMemoryFileSystem {
    /// Create a new instance of the in-memory file system.
    pub fn new() -> Self {
        InMemoryFileSystem {
            files: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Private methods.
impl InMemoryFileSystem {
    /**
    Open the file at the specified `path`.

    The returned handle shares its contents with every other handle for the
    path. The read cursor is reset on open; the in-memory environment is only
    used for tests where multiple handles for a file are not held at the same
    time.
    */
    fn open_mem_file(&self, path: &Path) -> io::Result<InMemoryFile> {
        let files = self.files.read();
        match files.get(path) {
            Some(file) => {
                file.0.write().cursor = 0;
                Ok(file.clone())
            }
            None => {
                let error_message = format!(
                    "Could not find the file with path {path}",
                    path = path.to_string_lossy()
                );
                Err(io::Error::new(io::ErrorKind::NotFound, error_message))
            }
        }
    }
}

impl FileSystem for InMemoryFileSystem {
    fn get_name(&self) -> String {
        "InMemoryFileSystem".to_string()
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let files = self.files.read();
        let mut children: Vec<PathBuf> = files
            .keys()
            .filter(|key| key.parent().map_or(false, |parent| parent == path))
            .cloned()
            .collect();
        children.sort();

        Ok(children)
    }

    fn open_file(&self, path: &Path) -> io::Result<Box<dyn ReadonlyRandomAccessFile>> {
        Ok(Box::new(self.open_mem_file(path)?))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut files = self.files.write();
        match files.remove(from) {
            Some(file) => {
                files.insert(to.to_path_buf(), file);
            }
            None => {
                let error_message = format!(
                    "Could not find the file with path {path}",
                    path = from.to_string_lossy()
                );
                return Err(io::Error::new(io::ErrorKind::NotFound, error_message));
            }
        }

        Ok(())
    }

    fn create_file(&self, path: &Path, append: bool) -> io::Result<Box<dyn RandomAccessFile>> {
        let mut files = self.files.write();
        if let Some(file) = files.get(path) {
            let mut file_guard = file.0.write();
            if append {
                file_guard.cursor = file_guard.data.len();
            } else {
                file_guard.data.clear();
                file_guard.cursor = 0;
            }

            return Ok(Box::new(file.clone()));
        }

        let file = InMemoryFile::new();
        files.insert(path.to_path_buf(), file.clone());
        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.write();
        match files.remove(path) {
            Some(_) => Ok(()),
            None => {
                let error_message = format!(
                    "Could not find the file with path {path}",
                    path = path.to_string_lossy()
                );
                Err(io::Error::new(io::ErrorKind::NotFound, error_message))
            }
        }
    }

    fn get_file_size(&self, path: &Path) -> io::Result<u64> {
        let file = self.open_mem_file(path)?;
        ReadonlyRandomAccessFile::len(&file)
    }

    fn lock_file(&self, path: &Path) -> io::Result<FileLock> {
        let mut files = self.files.write();
        files
            .entry(path.to_path_buf())
            .or_insert_with(InMemoryFile::new);

        Ok(FileLock::new(Box::new(InMemoryFile::new())))
    }
}

/// Contents and cursor state backing an [`InMemoryFile`].
#[derive(Debug)]
struct InMemoryFileInner {
    data: Vec<u8>,
    cursor: usize,
}

/// A file whose contents live entirely in memory. Clones share contents.
#[derive(Clone, Debug)]
struct InMemoryFile(Arc<RwLock<InMemoryFileInner>>);

impl InMemoryFile {
    fn new() -> Self {
        InMemoryFile(Arc::new(RwLock::new(InMemoryFileInner {
            data: Vec::new(),
            cursor: 0,
        })))
    }
}

impl Read for InMemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.0.write();
        let start = inner.cursor.min(inner.data.len());
        let available = inner.data.len() - start;
        let to_read = available.min(buf.len());
        buf[..to_read].copy_from_slice(&inner.data[start..start + to_read]);
        inner.cursor = start + to_read;

        Ok(to_read)
    }
}

impl Write for InMemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.write();
        let cursor = inner.cursor;
        if cursor < inner.data.len() {
            let overlap = (inner.data.len() - cursor).min(buf.len());
            let overlap_range = cursor..cursor + overlap;
            inner.data.splice(overlap_range, buf[..overlap].iter().copied());
            inner.data.extend_from_slice(&buf[overlap..]);
        } else {
            inner.data.extend_from_slice(buf);
        }
        inner.cursor = cursor + buf.len();

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for InMemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut inner = self.0.write();
        let new_cursor: i64 = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => inner.data.len() as i64 + offset,
            SeekFrom::Current(offset) => inner.cursor as i64 + offset,
        };

        if new_cursor < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Attempted to seek before the start of the file",
            ));
        }

        inner.cursor = new_cursor as usize;
        Ok(inner.cursor as u64)
    }
}

impl ReadonlyRandomAccessFile for InMemoryFile {
    fn read_from(&self, buf: &mut [u8], offset: usize) -> io::Result<usize> {
        let inner = self.0.read();
        if offset >= inner.data.len() {
            return Ok(0);
        }

        let available = inner.data.len() - offset;
        let to_read = available.min(buf.len());
        buf[..to_read].copy_from_slice(&inner.data[offset..offset + to_read]);

        Ok(to_read)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.0.read().data.len() as u64)
    }
}

impl RandomAccessFile for InMemoryFile {
    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.write();
        inner.data.extend_from_slice(buf);
        inner.cursor = inner.data.len();

        Ok(buf.len())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

impl UnlockableFile for InMemoryFile {
    fn unlock(&self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn files_can_be_written_read_and_removed() {
        let file_system = InMemoryFileSystem::new();
        let path = Path::new("/db/some_file");

        let mut file = file_system.create_file(path, false).unwrap();
        file.write_all(b"some bytes").unwrap();
        assert_eq!(file_system.get_file_size(path).unwrap(), 10);

        let mut readable = file_system.open_file(path).unwrap();
        let mut contents = String::new();
        readable.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "some bytes");

        file_system.remove_file(path).unwrap();
        assert!(file_system.open_file(path).is_err());
    }

    #[test]
    fn append_mode_does_not_truncate_existing_contents() {
        let file_system = InMemoryFileSystem::new();
        let path = Path::new("/db/appendable");

        let mut file = file_system.create_file(path, true).unwrap();
        file.append(b"one,").unwrap();
        drop(file);

        let mut file = file_system.create_file(path, true).unwrap();
        file.append(b"two").unwrap();
        assert_eq!(file_system.get_file_size(path).unwrap(), 7);
    }

    #[test]
    fn read_from_reads_at_arbitrary_offsets() {
        let file_system = InMemoryFileSystem::new();
        let path = Path::new("/db/offsets");

        let mut file = file_system.create_file(path, false).unwrap();
        file.write_all(b"0123456789").unwrap();

        let readable = file_system.open_file(path).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(readable.read_from(&mut buf, 4).unwrap(), 3);
        assert_eq!(&buf, b"456");

        // Reads past the end return nothing rather than erroring
        assert_eq!(readable.read_from(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn list_dir_returns_only_direct_children() {
        let file_system = InMemoryFileSystem::new();
        file_system
            .create_file(Path::new("/db/a.sst"), false)
            .unwrap();
        file_system
            .create_file(Path::new("/db/b.sst"), false)
            .unwrap();
        file_system
            .create_file(Path::new("/other/c.sst"), false)
            .unwrap();

        let listed = file_system.list_dir(Path::new("/db")).unwrap();
        assert_eq!(
            listed,
            vec![PathBuf::from("/db/a.sst"), PathBuf::from("/db/b.sst")]
        );
    }
}
