use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{MAX_COMPACTION_BACKOFF, WORKER_SHUTDOWN_TIMEOUT};
use crate::db::DatabaseCore;

/// Name of the compaction thread.
const COMPACTION_THREAD_NAME: &str = "siltdb-compact";

/// The kinds of tasks that the compaction worker can be given.
#[derive(Debug)]
enum TaskKind {
    /// Variant for shutting down the compaction thread.
    Terminate,
}

/// Shared state the worker needs to run compaction ticks.
pub(crate) struct WorkerContext {
    /// The lock-guarded WAL and engine state shared with the database.
    pub core: Arc<Mutex<DatabaseCore>>,

    /// Set when the database begins shutting down; ticks observed after this
    /// do nothing.
    pub is_shutting_down: Arc<AtomicBool>,

    /// How long the worker waits between compaction checks.
    pub check_interval: Duration,
}

/**
The compaction worker manages a thread that periodically checks whether
compaction is due and runs it.

Each tick acquires the database lock, so ticks serialize with client
operations. Errors inside a tick are logged and the loop continues with the
wait doubling per consecutive failure, capped by
[`MAX_COMPACTION_BACKOFF`]; the worker never propagates an error to callers.
*/
pub(crate) struct CompactionWorker {
    /**
    The join handle of the background compaction thread.

    This is used to try to gracefully shut down the background thread during
    database shutdown.
    */
    maybe_background_handle: Option<JoinHandle<()>>,

    /// Sender end of the channel used to deliver tasks to the thread.
    task_sender: mpsc::Sender<TaskKind>,

    /// Receiver signalled by the thread right before it exits.
    done_receiver: mpsc::Receiver<()>,
}

/// Public methods.
impl CompactionWorker {
    /// Create a new instance of [`CompactionWorker`] and start its thread.
    pub fn start(context: WorkerContext) -> std::io::Result<Self> {
        let (task_sender, task_receiver) = mpsc::channel();
        let (done_sender, done_receiver) = mpsc::channel();

        log::info!(
            "Starting the background compaction thread with a check interval of {interval:?}.",
            interval = context.check_interval
        );
        let background_handle = thread::Builder::new()
            .name(COMPACTION_THREAD_NAME.to_string())
            .spawn(move || {
                CompactionWorker::run_loop(context, task_receiver);
                let _ = done_sender.send(());
            })?;

        Ok(Self {
            maybe_background_handle: Some(background_handle),
            task_sender,
            done_receiver,
        })
    }

    /**
    Signal the thread to stop and wait for any in-flight tick to finish.

    The wait is bounded by [`WORKER_SHUTDOWN_TIMEOUT`]; if the thread does
    not finish in time it is abandoned rather than blocking shutdown
    indefinitely.
    */
    pub fn stop(&mut self) {
        let handle = match self.maybe_background_handle.take() {
            Some(handle) => handle,
            None => return,
        };

        if self.task_sender.send(TaskKind::Terminate).is_err() {
            log::debug!("The compaction thread has already exited.");
        }

        match self.done_receiver.recv_timeout(WORKER_SHUTDOWN_TIMEOUT) {
            Ok(()) => {
                if let Err(panic_value) = handle.join() {
                    log::error!(
                        "The compaction thread panicked while exiting. Panic value: \
                        {panic_value:?}"
                    );
                }
                log::info!("The compaction thread shut down cleanly.");
            }
            Err(_) => {
                log::warn!(
                    "Timed out after {timeout:?} waiting for the compaction thread to finish \
                    its tick. Abandoning the thread.",
                    timeout = WORKER_SHUTDOWN_TIMEOUT
                );
            }
        }
    }
}

/// Private methods.
impl CompactionWorker {
    /// The body of the compaction thread.
    fn run_loop(context: WorkerContext, task_receiver: mpsc::Receiver<TaskKind>) {
        log::info!("Compaction thread initializing.");
        let mut consecutive_failures: u32 = 0;

        loop {
            let wait = Self::backoff_wait(context.check_interval, consecutive_failures);
            match task_receiver.recv_timeout(wait) {
                Ok(TaskKind::Terminate) => {
                    log::info!(
                        "Compaction thread received the termination command. Shutting down \
                        the thread."
                    );
                    break;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    log::info!(
                        "The compaction task channel disconnected. Shutting down the thread."
                    );
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if context.is_shutting_down.load(Ordering::Acquire) {
                        log::info!(
                            "Compaction thread discovered that the database is shutting down. \
                            Halting compaction work."
                        );
                        break;
                    }

                    let mut core = context.core.lock();
                    match core.engine.compact_if_needed() {
                        Ok(compacted) => {
                            consecutive_failures = 0;
                            if compacted {
                                log::info!("Compaction tick merged a level.");
                            }
                        }
                        Err(compaction_error) => {
                            consecutive_failures += 1;
                            log::error!(
                                "A compaction tick failed ({failures} consecutive). The loop \
                                will continue with backoff. Error: {compaction_error}",
                                failures = consecutive_failures
                            );
                        }
                    }
                }
            }
        }
    }

    /// The wait before the next tick, doubling per consecutive failure.
    fn backoff_wait(check_interval: Duration, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.min(6);
        let backed_off = check_interval.saturating_mul(1 << exponent);

        backed_off.min(MAX_COMPACTION_BACKOFF.max(check_interval))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn backoff_doubles_per_failure_and_is_capped() {
        let interval = Duration::from_millis(100);

        assert_eq!(
            CompactionWorker::backoff_wait(interval, 0),
            Duration::from_millis(100)
        );
        assert_eq!(
            CompactionWorker::backoff_wait(interval, 1),
            Duration::from_millis(200)
        );
        assert_eq!(
            CompactionWorker::backoff_wait(interval, 3),
            Duration::from_millis(800)
        );
        assert_eq!(
            CompactionWorker::backoff_wait(interval, 1000),
            Duration::from_millis(6400)
        );
    }

    #[test]
    fn a_long_interval_is_not_shortened_by_the_cap() {
        let interval = Duration::from_secs(120);

        assert_eq!(
            CompactionWorker::backoff_wait(interval, 0),
            Duration::from_secs(120)
        );
        assert_eq!(
            CompactionWorker::backoff_wait(interval, 5),
            Duration::from_secs(120)
        );
    }
}
