/*!
This module contains global configuration constants for siltdb.

These are fixed tuning values rather than user-facing options. To get to an
MVP and iterate, we keep static values here. These may be made configurable in
future versions.
*/

use std::time::Duration;

/**
Per-level table file count triggers for compaction.

A level is compacted once its file count exceeds its trigger. The last trigger
is reused for any level deeper than the table.
*/
pub(crate) const LEVEL_FILE_COUNT_TRIGGERS: [usize; 5] = [4, 8, 16, 32, 64];

/**
The approximate maximum size of user data that is allowed to be packed into a
data block of a table file.

The data considered here is uncompressed data. The actual size of the block on
disk may be smaller due to compression.
*/
pub(crate) const MAX_BLOCK_DATA_SIZE: usize = 4 * 1024;

/**
The number of entries buffered in memory before the write-ahead log flushes
them to the log file when running in batch sync mode.
*/
pub(crate) const WAL_BATCH_FLUSH_THRESHOLD: usize = 32;

/**
How long database shutdown will wait for the compaction worker to finish an
in-flight tick before abandoning the thread.
*/
pub(crate) const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/**
Upper bound on the wait between compaction ticks when consecutive ticks keep
failing. The wait doubles per failure until it reaches this cap and resets on
the first successful tick.
*/
pub(crate) const MAX_COMPACTION_BACKOFF: Duration = Duration::from_secs(60);
