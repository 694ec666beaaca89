/*!
This module contains error types specific to siltdb as well as wrappers and
`From` implementations for common errors to enable error propagation.
*/

use std::fmt;
use std::io;

use crate::compaction::errors::CompactionError;
use crate::tables::errors::{BuilderError, ReadError};

/// Alias for a [`Result`] that wraps a [`SiltError`].
pub type SiltResult<T> = Result<T, SiltError>;

/// Top-level database errors.
#[derive(Debug)]
pub enum SiltError {
    /// Variant for invalid configuration detected while opening the database.
    Configuration(String),

    /// Variant for operations attempted after the database was closed.
    Closed,

    /// Variant for errors stemming from top-level I/O operations.
    IO(io::Error),

    /// Variant for errors stemming from write-ahead log operations.
    Wal(WalError),

    /// Variant for errors encountered while building a table file.
    TableBuild(BuilderError),

    /// Variant for errors encountered while reading a table file.
    TableRead(ReadError),

    /// Variant for errors encountered during compaction.
    Compaction(CompactionError),
}

impl std::error::Error for SiltError {}

impl fmt::Display for SiltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiltError::Configuration(reason) => {
                write!(f, "Invalid configuration: {reason}")
            }
            SiltError::Closed => write!(f, "The database has been closed"),
            SiltError::IO(base_err) => write!(f, "{base_err}"),
            SiltError::Wal(base_err) => write!(f, "{base_err}"),
            SiltError::TableBuild(base_err) => write!(f, "{base_err}"),
            SiltError::TableRead(base_err) => write!(f, "{base_err}"),
            SiltError::Compaction(base_err) => write!(f, "{base_err}"),
        }
    }
}

impl From<io::Error> for SiltError {
    fn from(err: io::Error) -> Self {
        SiltError::IO(err)
    }
}

impl From<WalError> for SiltError {
    fn from(err: WalError) -> Self {
        SiltError::Wal(err)
    }
}

impl From<BuilderError> for SiltError {
    fn from(err: BuilderError) -> Self {
        SiltError::TableBuild(err)
    }
}

impl From<ReadError> for SiltError {
    fn from(err: ReadError) -> Self {
        SiltError::TableRead(err)
    }
}

impl From<CompactionError> for SiltError {
    fn from(err: CompactionError) -> Self {
        SiltError::Compaction(err)
    }
}

/// Errors related to reading and writing the write-ahead log.
#[derive(Debug)]
pub enum WalError {
    /// Variant for errors that are related to I/O.
    IO(io::Error),

    /// Variant for malformed records encountered while replaying the log.
    Corrupt {
        /// One-based line number of the offending record.
        line: usize,

        /// Why the record could not be parsed.
        reason: String,
    },
}

impl std::error::Error for WalError {}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalError::IO(base_err) => write!(f, "{base_err}"),
            WalError::Corrupt { line, reason } => {
                write!(f, "Corrupt WAL record at line {line}: {reason}")
            }
        }
    }
}

impl From<io::Error> for WalError {
    fn from(err: io::Error) -> Self {
        WalError::IO(err)
    }
}
