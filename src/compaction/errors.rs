use std::fmt;
use std::io;

use crate::tables::errors::{BuilderError, ReadError};

/// Type alias for [`Result`]s wrapping [`CompactionError`]s.
pub(crate) type CompactionResult<T> = Result<T, CompactionError>;

/// Errors that occur while merging tables into a deeper level.
#[derive(Debug)]
pub enum CompactionError {
    /// Variant for I/O errors encountered during compaction.
    IO(io::Error),

    /// Variant for issues that occur when reading source tables.
    TableRead(ReadError),

    /// Variant for issues that occur when writing the merged table.
    TableBuild(BuilderError),
}

impl std::error::Error for CompactionError {}

impl fmt::Display for CompactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompactionError::IO(base_err) => write!(f, "{base_err}"),
            CompactionError::TableRead(base_err) => write!(f, "{base_err}"),
            CompactionError::TableBuild(base_err) => write!(f, "{base_err}"),
        }
    }
}

impl From<io::Error> for CompactionError {
    fn from(err: io::Error) -> Self {
        CompactionError::IO(err)
    }
}

impl From<ReadError> for CompactionError {
    fn from(err: ReadError) -> Self {
        CompactionError::TableRead(err)
    }
}

impl From<BuilderError> for CompactionError {
    fn from(err: BuilderError) -> Self {
        CompactionError::TableBuild(err)
    }
}
