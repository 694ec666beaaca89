use std::io::Write;
use std::sync::Arc;

use integer_encoding::FixedInt;

use crate::config::MAX_BLOCK_DATA_SIZE;
use crate::file_names::FileNameHandler;
use crate::fs::{FileSystem, RandomAccessFile};
use crate::types::StoredValue;
use crate::utils::crc::mask_checksum;

use super::errors::{BuildResult, BuilderError};
use super::{encode_entry, put_varint, IndexEntry, TableMetadata, CRC_CALCULATOR, TABLE_MAGIC};

/**
Builds and outputs a table file (an immutable and sorted map from keys to
values).

Entries must be added in strictly ascending key order; the data blocks, the
meta block, the index, and the footer are emitted by [`TableBuilder::finish`],
which publishes the file by renaming it from its temp path into its final
location.
*/
pub(crate) struct TableBuilder {
    fs: Arc<dyn FileSystem>,

    /// The physical file that is being written to, at its temp path.
    file: Box<dyn RandomAccessFile>,

    level: usize,
    created_at_ms: u64,
    final_path: std::path::PathBuf,
    temp_path: std::path::PathBuf,

    /// Set to true once the file contents have been finalized.
    finished: bool,

    /// The current offset in the file where data is being appended.
    current_offset: u64,

    /// Uncompressed entries accumulated for the current data block.
    block_buf: Vec<u8>,

    /// The first key of the current data block.
    block_first_key: Option<String>,

    /// Index entries for the data blocks emitted so far.
    index: Vec<IndexEntry>,

    num_entries: usize,
    min_key: Option<String>,

    /// The last key that was added to the table.
    last_key_added: Option<String>,
}

/// Public methods.
impl TableBuilder {
    /// Create a new instance of [`TableBuilder`].
    pub fn new(
        fs: Arc<dyn FileSystem>,
        file_names: &FileNameHandler,
        level: usize,
        created_at_ms: u64,
    ) -> BuildResult<Self> {
        let final_path = file_names.table_file_path(level, created_at_ms);
        let temp_path = file_names.temp_table_path(level, created_at_ms);
        let file = fs.create_file(&temp_path, false)?;

        Ok(Self {
            fs,
            file,
            level,
            created_at_ms,
            final_path,
            temp_path,
            finished: false,
            current_offset: 0,
            block_buf: Vec::new(),
            block_first_key: None,
            index: Vec::new(),
            num_entries: 0,
            min_key: None,
            last_key_added: None,
        })
    }

    /**
    Add a key-value pair to the table being constructed.

    # Panics

    The following invariants must be maintained:

    1. The table must not have been finalized.
    1. The provided key is larger than any previously provided key.
    */
    pub fn add_entry(&mut self, key: &str, value: &StoredValue) -> BuildResult<()> {
        // Panic if our invariants are not maintained. This is a bug.
        assert!(!self.finished, "{}", BuilderError::AlreadyFinished);
        assert!(
            self.last_key_added
                .as_deref()
                .map_or(true, |last_key| last_key < key),
            "{}",
            BuilderError::OutOfOrder
        );

        if self.block_first_key.is_none() {
            self.block_first_key = Some(key.to_string());
        }
        if self.min_key.is_none() {
            self.min_key = Some(key.to_string());
        }

        encode_entry(&mut self.block_buf, key, value);
        self.num_entries += 1;
        self.last_key_added = Some(key.to_string());

        if self.block_buf.len() >= MAX_BLOCK_DATA_SIZE {
            self.emit_data_block()?;
        }

        Ok(())
    }

    /**
    Finish building the table. Flushes all pending blocks to disk, writes the
    trailing metadata, and atomically publishes the file.

    Returns the metadata describing the finished table.
    */
    pub fn finish(mut self) -> BuildResult<TableMetadata> {
        assert!(!self.finished, "{}", BuilderError::AlreadyFinished);
        self.finished = true;

        if !self.block_buf.is_empty() {
            self.emit_data_block()?;
        }

        // Meta block: key range and entry count
        let meta_offset = self.current_offset;
        let mut meta_block = Vec::new();
        let min_key = self.min_key.clone().unwrap_or_default();
        let max_key = self.last_key_added.clone().unwrap_or_default();
        put_varint(&mut meta_block, min_key.len());
        meta_block.extend_from_slice(min_key.as_bytes());
        put_varint(&mut meta_block, max_key.len());
        meta_block.extend_from_slice(max_key.as_bytes());
        put_varint(&mut meta_block, self.num_entries);
        self.write_all(&meta_block)?;
        let meta_length = meta_block.len() as u64;

        // Index block: first key and location of every data block
        let index_offset = self.current_offset;
        let mut index_block = Vec::new();
        for entry in &self.index {
            put_varint(&mut index_block, entry.first_key.len());
            index_block.extend_from_slice(entry.first_key.as_bytes());
            index_block.extend_from_slice(&u64::encode_fixed_vec(entry.offset));
            index_block.extend_from_slice(&u64::encode_fixed_vec(entry.length));
        }
        self.write_all(&index_block)?;
        let index_length = index_block.len() as u64;

        // Fixed footer
        let mut footer = Vec::with_capacity(super::FOOTER_SIZE);
        footer.extend_from_slice(&u64::encode_fixed_vec(meta_offset));
        footer.extend_from_slice(&u64::encode_fixed_vec(meta_length));
        footer.extend_from_slice(&u64::encode_fixed_vec(index_offset));
        footer.extend_from_slice(&u64::encode_fixed_vec(index_length));
        footer.extend_from_slice(&u64::encode_fixed_vec(TABLE_MAGIC));
        self.write_all(&footer)?;

        self.file.flush()?;
        self.file.sync()?;

        // Publish atomically so a crash mid-write never exposes a partial
        // table
        self.fs.rename(&self.temp_path, &self.final_path)?;

        Ok(TableMetadata {
            level: self.level,
            file_path: self.final_path.clone(),
            min_key,
            max_key,
            entry_count: self.num_entries,
            created_at_ms: self.created_at_ms,
        })
    }

    /// The number of entries added so far.
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }
}

/// Private methods.
impl TableBuilder {
    /// Compress the current block, checksum it, and append it to the file.
    fn emit_data_block(&mut self) -> BuildResult<()> {
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&self.block_buf)
            .map_err(|err| BuilderError::Compression(err.to_string()))?;
        let checksum = mask_checksum(CRC_CALCULATOR.checksum(&compressed));

        let block_offset = self.current_offset;
        self.write_all(&compressed)?;
        self.write_all(&u32::encode_fixed_vec(checksum))?;

        let first_key = self
            .block_first_key
            .take()
            .expect("A data block must contain at least one entry");
        self.index.push(IndexEntry {
            first_key,
            offset: block_offset,
            length: self.current_offset - block_offset,
        });
        self.block_buf.clear();

        Ok(())
    }

    /// Append bytes to the file, tracking the write offset.
    fn write_all(&mut self, bytes: &[u8]) -> BuildResult<()> {
        self.file.append(bytes)?;
        self.current_offset += bytes.len() as u64;

        Ok(())
    }
}
