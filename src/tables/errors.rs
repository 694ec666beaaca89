use std::fmt;
use std::io;

/// Type alias for [`Result`]s wrapping [`BuilderError`]s.
pub(crate) type BuildResult<T> = Result<T, BuilderError>;

/// Type alias for [`Result`]s wrapping [`ReadError`]s.
pub(crate) type ReadResult<T> = Result<T, ReadError>;

/// Errors that can occur while building a table file.
#[derive(Debug)]
pub enum BuilderError {
    /// Variant for errors that are related to I/O.
    IO(io::Error),

    /// Variant for entries added after the table was finalized.
    AlreadyFinished,

    /// Variant for entries added out of key order.
    OutOfOrder,

    /// Variant for block compression failures.
    Compression(String),
}

impl std::error::Error for BuilderError {}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderError::IO(base_err) => write!(f, "{base_err}"),
            BuilderError::AlreadyFinished => {
                write!(f, "Attempted to add an entry to a finished table")
            }
            BuilderError::OutOfOrder => {
                write!(
                    f,
                    "Attempted to add an entry with a key that is not larger than the last \
                    added key"
                )
            }
            BuilderError::Compression(reason) => {
                write!(f, "Failed to compress a table block: {reason}")
            }
        }
    }
}

impl From<io::Error> for BuilderError {
    fn from(err: io::Error) -> Self {
        BuilderError::IO(err)
    }
}

/// Errors that can occur while reading a table file.
#[derive(Debug)]
pub enum ReadError {
    /// Variant for errors that are related to I/O.
    IO(io::Error),

    /// Variant for issues where the cause is malformed data on disk.
    Corruption(String),
}

impl std::error::Error for ReadError {}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::IO(base_err) => write!(f, "{base_err}"),
            ReadError::Corruption(reason) => {
                write!(f, "Detected table file corruption: {reason}")
            }
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        ReadError::IO(err)
    }
}
