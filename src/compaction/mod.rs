/*!
Compaction keeps read amplification bounded by merging the tables of an
overfull level into a single table at the next level.

The [strategy](strategy::CompactionStrategy) decides when a merge is due and
which files it consumes; the [worker](worker::CompactionWorker) runs the
checks periodically on a background thread.
*/

pub(crate) mod errors;
mod strategy;
mod worker;

pub(crate) use strategy::CompactionStrategy;
pub(crate) use worker::{CompactionWorker, WorkerContext};
