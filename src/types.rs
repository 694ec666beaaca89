/*!
Core value types shared by the memtables, table files, and the LSM engine.

Deletions are first-class records in an LSM tree: a delete writes a tombstone
that shadows older versions of the key in deeper storage tiers. Representing
the tombstone structurally (instead of with a sentinel value) means no user
value can ever collide with it.
*/

use std::fmt;
use std::str::FromStr;

use crate::errors::SiltError;

/// The kinds of mutations recorded in the write-ahead log.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Operation {
    /// An insert or overwrite of a key.
    Put,

    /// A deletion of a key.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Put => write!(f, "PUT"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for Operation {
    type Err = SiltError;

    fn from_str(raw: &str) -> Result<Operation, SiltError> {
        match raw {
            "PUT" => Ok(Operation::Put),
            "DELETE" => Ok(Operation::Delete),
            _ => Err(SiltError::Configuration(format!(
                "Unknown operation tag: {raw}"
            ))),
        }
    }
}

/**
A value as stored in a memtable or a table file.

Tombstones are retained through flushes and carried across table levels until
compaction can prove that no deeper table still holds the key.
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum StoredValue {
    /// A live user value.
    Value(String),

    /// A marker recording that the key was deleted.
    Tombstone,
}

impl StoredValue {
    /// Return true if this record is a deletion marker.
    pub(crate) fn is_tombstone(&self) -> bool {
        matches!(self, StoredValue::Tombstone)
    }

    /// The number of payload bytes this record carries.
    pub(crate) fn payload_len(&self) -> usize {
        match self {
            StoredValue::Value(value) => value.len(),
            StoredValue::Tombstone => 0,
        }
    }
}

/**
The three-way outcome of a point lookup against a single storage tier.

`Deleted` is distinct from `Missing` because a tombstone found in a newer tier
must stop the search; falling through to an older tier could resurrect a value
that the user already deleted.
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum LookupOutcome {
    /// The key is present with this value.
    Found(String),

    /// A tombstone for the key was found; the key is deleted.
    Deleted,

    /// The tier holds no record for the key.
    Missing,
}
