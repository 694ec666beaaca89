/*!
siltdb is an embedded key-value store built on a log-structured merge (LSM)
tree: writes land in an in-memory memtable after being recorded in a
write-ahead log, full memtables are flushed to immutable sorted table files,
and a background worker compacts overfull levels into deeper ones.

The crate exposes a local point-key API ([`DB::put`], [`DB::get`],
[`DB::delete`]) plus statistics and explicit lifecycle control
([`DB::open`], [`DB::close`]). There is no network protocol, replication, or
multi-key transaction support.

# Example

```no_run
use siltdb::{DbOptions, DB};

fn main() -> siltdb::SiltResult<()> {
    let db = DB::open(DbOptions {
        db_path: "./example_data".to_string(),
        ..DbOptions::default()
    })?;

    db.put("user:alice".to_string(), "Alice Johnson".to_string())?;
    assert_eq!(db.get("user:alice")?, Some("Alice Johnson".to_string()));

    db.delete("user:alice".to_string())?;
    assert_eq!(db.get("user:alice")?, None);

    db.close()
}
```
*/

#![warn(missing_debug_implementations, missing_docs)]

pub mod db;
pub use db::DB;

pub mod fs;

mod compaction;
mod config;
mod engine;
mod errors;
mod file_names;
mod memtable;
mod metrics;
mod tables;
mod types;
mod utils;
mod wal;

pub use compaction::errors::CompactionError;
pub use errors::{SiltError, SiltResult, WalError};
pub use tables::errors::{BuilderError, ReadError};

pub mod options;
pub use options::{DbOptions, MemtableVariant, WalSyncMode};
