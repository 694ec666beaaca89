/*!
The write-ahead log (WAL) persists mutations to disk before they are applied
to the in-memory state, enabling recovery of acknowledged writes after a
crash.

# Record format

The log is a newline-delimited text file. Each line is one entry:

```text
operation,key,value,timestamp_ms,sequence_number
```

Backslash, comma, and line-break characters inside keys and values are
backslash-escaped so that a record always stays a single parseable line.

Sequence numbers are assigned by the [`WalManager`] and are strictly
increasing within a process lifetime; after a reopen the counter resumes
above the highest sequence number found in the log.
*/

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::WAL_BATCH_FLUSH_THRESHOLD;
use crate::errors::{SiltResult, WalError};
use crate::fs::{FileSystem, RandomAccessFile};
use crate::options::WalSyncMode;
use crate::types::Operation;

/// An immutable record of one mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct WalEntry {
    /// The mutation kind.
    pub operation: Operation,

    /// The user key.
    pub key: String,

    /// The user value. Empty for deletes.
    pub value: String,

    /// Milliseconds since the Unix epoch at append time.
    pub timestamp_ms: u64,

    /// Position of this entry in the total order of durable mutations.
    pub sequence_number: u64,
}

impl WalEntry {
    /// Serialize the entry to its single-line text form (without a newline).
    fn encode(&self) -> String {
        format!(
            "{op},{key},{value},{timestamp},{sequence}",
            op = self.operation,
            key = escape_field(&self.key),
            value = escape_field(&self.value),
            timestamp = self.timestamp_ms,
            sequence = self.sequence_number,
        )
    }

    /// Parse an entry from one log line. `line_number` is used for error
    /// reporting only.
    fn decode(line: &str, line_number: usize) -> Result<WalEntry, WalError> {
        let fields = split_fields(line, line_number)?;
        if fields.len() != 5 {
            return Err(WalError::Corrupt {
                line: line_number,
                reason: format!("Expected 5 fields but found {}", fields.len()),
            });
        }

        let operation = fields[0].parse::<Operation>().map_err(|_| WalError::Corrupt {
            line: line_number,
            reason: format!("Unknown operation tag: {}", fields[0]),
        })?;
        let timestamp_ms = fields[3].parse::<u64>().map_err(|_| WalError::Corrupt {
            line: line_number,
            reason: format!("Unparseable timestamp: {}", fields[3]),
        })?;
        let sequence_number = fields[4].parse::<u64>().map_err(|_| WalError::Corrupt {
            line: line_number,
            reason: format!("Unparseable sequence number: {}", fields[4]),
        })?;

        Ok(WalEntry {
            operation,
            key: fields[1].clone(),
            value: fields[2].clone(),
            timestamp_ms,
            sequence_number,
        })
    }
}

/// Escape record-structure characters so a field cannot break its line.
fn escape_field(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for character in field.chars() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(character),
        }
    }

    escaped
}

/// Split a record line on unescaped commas, unescaping each field.
fn split_fields(line: &str, line_number: usize) -> Result<Vec<String>, WalError> {
    let mut fields = Vec::with_capacity(5);
    let mut current = String::new();
    let mut characters = line.chars();

    while let Some(character) = characters.next() {
        match character {
            '\\' => match characters.next() {
                Some('\\') => current.push('\\'),
                Some(',') => current.push(','),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                other => {
                    return Err(WalError::Corrupt {
                        line: line_number,
                        reason: format!("Invalid escape sequence: \\{:?}", other),
                    })
                }
            },
            ',' => fields.push(std::mem::take(&mut current)),
            _ => current.push(character),
        }
    }
    fields.push(current);

    Ok(fields)
}

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/**
Owns the log file and assigns the total order of durable mutations.

The manager has no locking of its own; the owning database serializes all
access alongside the engine state.
*/
pub(crate) struct WalManager {
    fs: Arc<dyn FileSystem>,
    wal_path: PathBuf,
    sync_mode: WalSyncMode,
    enabled: bool,

    /// The most recently assigned sequence number.
    current_sequence: u64,

    /// The open log file. `None` when the WAL is disabled.
    log_file: Option<Box<dyn RandomAccessFile>>,

    /// Serialized entries awaiting a group write in batch mode.
    pending: Vec<u8>,
    pending_entries: usize,
}

/// Public methods.
impl WalManager {
    /**
    Create a new instance of [`WalManager`].

    Any existing log is scanned so that newly assigned sequence numbers
    continue above everything already recorded.
    */
    pub fn new(
        fs: Arc<dyn FileSystem>,
        wal_path: PathBuf,
        sync_mode: WalSyncMode,
        enabled: bool,
    ) -> SiltResult<Self> {
        let mut manager = WalManager {
            fs,
            wal_path,
            sync_mode,
            enabled,
            current_sequence: 0,
            log_file: None,
            pending: Vec::new(),
            pending_entries: 0,
        };

        if !enabled {
            log::info!("The write-ahead log is disabled. Writes will not be crash-durable.");
            return Ok(manager);
        }

        let recovered_sequence = manager
            .entries()?
            .iter()
            .map(|entry| entry.sequence_number)
            .max()
            .unwrap_or(0);
        manager.current_sequence = recovered_sequence;

        let log_file = manager
            .fs
            .create_file(&manager.wal_path, true)
            .map_err(WalError::IO)?;
        manager.log_file = Some(log_file);

        log::info!(
            "Write-ahead log opened at {path} in {mode} mode. Sequence resumes after \
            {sequence}.",
            path = manager.wal_path.display(),
            mode = manager.sync_mode,
            sequence = recovered_sequence
        );

        Ok(manager)
    }

    /**
    Assign the next sequence number to the mutation and append it to the log.

    In [`WalSyncMode::Sync`] an I/O failure is returned to the caller so the
    mutation is never acknowledged without being durable. The other modes are
    best-effort: failures are logged and the mutation proceeds.
    */
    pub fn append(&mut self, operation: Operation, key: &str, value: &str) -> SiltResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = WalEntry {
            operation,
            key: key.to_string(),
            value: value.to_string(),
            timestamp_ms: unix_timestamp_ms(),
            sequence_number: self.current_sequence + 1,
        };
        let mut line = entry.encode();
        line.push('\n');

        match self.sync_mode {
            WalSyncMode::Sync => {
                self.write_direct(line.as_bytes())?;
                if let Some(file) = self.log_file.as_ref() {
                    file.sync().map_err(WalError::IO)?;
                }
            }
            WalSyncMode::Async => {
                if let Err(write_error) = self.write_direct(line.as_bytes()) {
                    log::error!(
                        "Failed to append to the write-ahead log; continuing without \
                        durability for this write. Error: {write_error}"
                    );
                }
            }
            WalSyncMode::Batch => {
                self.pending.extend_from_slice(line.as_bytes());
                self.pending_entries += 1;
                if self.pending_entries >= WAL_BATCH_FLUSH_THRESHOLD {
                    self.flush_pending();
                }
            }
        }

        self.current_sequence += 1;
        Ok(())
    }

    /// Produce every entry currently in the log, in append order.
    pub fn entries(&self) -> SiltResult<Vec<WalEntry>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let mut file = match self.fs.open_file(&self.wal_path) {
            Ok(file) => file,
            Err(open_error) if open_error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(open_error) => return Err(WalError::IO(open_error).into()),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(WalError::IO)?;

        let mut entries = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }

            match WalEntry::decode(line, index + 1) {
                Ok(entry) => entries.push(entry),
                Err(parse_error) => {
                    // A torn tail line is the common crash artifact; skip it
                    // rather than discarding the durable entries before it
                    log::warn!(
                        "Skipping unparseable write-ahead log record. Error: {parse_error}"
                    );
                }
            }
        }

        Ok(entries)
    }

    /**
    Truncate the log.

    Only safe to call once every entry is durably reflected in flushed table
    files, i.e. after a successful close-time flush. The sequence counter is
    not reset.
    */
    pub fn clear(&mut self) -> SiltResult<()> {
        if !self.enabled {
            return Ok(());
        }

        self.pending.clear();
        self.pending_entries = 0;

        let truncated = self
            .fs
            .create_file(&self.wal_path, false)
            .map_err(WalError::IO)?;
        self.log_file = Some(truncated);
        log::info!(
            "Write-ahead log at {path} cleared.",
            path = self.wal_path.display()
        );

        Ok(())
    }

    /// Write out any entries still buffered by batch mode.
    pub fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let buffered = std::mem::take(&mut self.pending);
        self.pending_entries = 0;
        if let Err(write_error) = self.write_direct(&buffered) {
            log::error!(
                "Failed to flush buffered write-ahead log entries; continuing without \
                durability for this batch. Error: {write_error}"
            );
        }
    }

    /// The most recently assigned sequence number.
    pub fn current_sequence(&self) -> u64 {
        self.current_sequence
    }
}

/// Private methods.
impl WalManager {
    /// Append bytes to the log file and flush them to the operating system.
    fn write_direct(&mut self, bytes: &[u8]) -> Result<(), WalError> {
        let file = match self.log_file.as_mut() {
            Some(file) => file,
            None => return Ok(()),
        };

        file.append(bytes)?;
        file.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::path::Path;

    use crate::fs::InMemoryFileSystem;

    use super::*;

    fn test_manager(
        fs: &Arc<dyn FileSystem>,
        sync_mode: WalSyncMode,
        enabled: bool,
    ) -> WalManager {
        WalManager::new(
            Arc::clone(fs),
            Path::new("/db/test.wal").to_path_buf(),
            sync_mode,
            enabled,
        )
        .unwrap()
    }

    fn shared_fs() -> Arc<dyn FileSystem> {
        Arc::new(InMemoryFileSystem::new())
    }

    #[test]
    fn appended_entries_replay_in_order_with_increasing_sequences() {
        let fs = shared_fs();
        let mut manager = test_manager(&fs, WalSyncMode::Sync, true);

        manager.append(Operation::Put, "a", "1").unwrap();
        manager.append(Operation::Put, "b", "2").unwrap();
        manager.append(Operation::Delete, "a", "").unwrap();

        let entries = manager.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[0].operation, Operation::Put);
        assert_eq!(entries[2].operation, Operation::Delete);
        let sequences: Vec<u64> = entries.iter().map(|entry| entry.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn keys_and_values_with_structural_characters_round_trip() {
        let fs = shared_fs();
        let mut manager = test_manager(&fs, WalSyncMode::Sync, true);

        let tricky_key = "key,with\\structure";
        let tricky_value = "line one\nline two,\r tail";
        manager.append(Operation::Put, tricky_key, tricky_value).unwrap();

        let entries = manager.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, tricky_key);
        assert_eq!(entries[0].value, tricky_value);
    }

    #[test]
    fn corrupt_lines_are_skipped_and_later_entries_survive() {
        let fs = shared_fs();
        let mut manager = test_manager(&fs, WalSyncMode::Sync, true);
        manager.append(Operation::Put, "before", "1").unwrap();

        // Simulate a torn write by appending garbage directly to the file
        let mut raw = fs.create_file(Path::new("/db/test.wal"), true).unwrap();
        raw.append(b"PUT,torn\n").unwrap();
        drop(raw);

        let mut manager = test_manager(&fs, WalSyncMode::Sync, true);
        manager.append(Operation::Put, "after", "2").unwrap();

        let entries = manager.entries().unwrap();
        let keys: Vec<&str> = entries.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, vec!["before", "after"]);
    }

    #[test]
    fn sequence_numbers_resume_after_reopen() {
        let fs = shared_fs();
        let mut manager = test_manager(&fs, WalSyncMode::Sync, true);
        manager.append(Operation::Put, "a", "1").unwrap();
        manager.append(Operation::Put, "b", "2").unwrap();
        drop(manager);

        let mut reopened = test_manager(&fs, WalSyncMode::Sync, true);
        assert_eq!(reopened.current_sequence(), 2);
        reopened.append(Operation::Put, "c", "3").unwrap();

        let entries = reopened.entries().unwrap();
        assert_eq!(entries.last().unwrap().sequence_number, 3);
    }

    #[test]
    fn batch_mode_defers_writes_until_the_threshold() {
        let fs = shared_fs();
        let mut manager = test_manager(&fs, WalSyncMode::Batch, true);

        for index in 0..WAL_BATCH_FLUSH_THRESHOLD - 1 {
            manager
                .append(Operation::Put, &format!("key{index}"), "value")
                .unwrap();
        }
        assert_eq!(manager.entries().unwrap().len(), 0);

        manager.append(Operation::Put, "tipping-point", "value").unwrap();
        assert_eq!(manager.entries().unwrap().len(), WAL_BATCH_FLUSH_THRESHOLD);
    }

    #[test]
    fn clear_truncates_the_log_but_keeps_the_sequence_counter() {
        let fs = shared_fs();
        let mut manager = test_manager(&fs, WalSyncMode::Sync, true);
        manager.append(Operation::Put, "a", "1").unwrap();

        manager.clear().unwrap();
        assert_eq!(manager.entries().unwrap().len(), 0);
        assert_eq!(manager.current_sequence(), 1);

        manager.append(Operation::Put, "b", "2").unwrap();
        assert_eq!(manager.entries().unwrap()[0].sequence_number, 2);
    }

    #[test]
    fn disabled_mode_is_a_no_op() {
        let fs = shared_fs();
        let mut manager = test_manager(&fs, WalSyncMode::Sync, false);

        manager.append(Operation::Put, "a", "1").unwrap();
        assert_eq!(manager.entries().unwrap().len(), 0);
        assert!(manager.clear().is_ok());
        assert!(fs.open_file(Path::new("/db/test.wal")).is_err());
    }
}
