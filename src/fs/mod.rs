/*!
File system wrappers to enable different implementations of file systems to be
used.

The primary purpose of this wrapper is to enable testing with temp file based
or in-memory file systems.
*/

mod disk;
mod mem;
mod traits;

pub use disk::{OsFileSystem, TmpFileSystem};
pub use mem::InMemoryFileSystem;
pub use traits::{
    FileLock, FileSystem, RandomAccessFile, ReadonlyRandomAccessFile, UnlockableFile,
};
