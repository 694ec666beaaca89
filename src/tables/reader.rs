use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use integer_encoding::FixedInt;

use crate::fs::{FileSystem, ReadonlyRandomAccessFile};
use crate::types::{LookupOutcome, StoredValue};
use crate::utils::crc::unmask_checksum;

use super::errors::{ReadError, ReadResult};
use super::{
    decode_entry, get_string, get_varint, IndexEntry, TableMetadata, BLOCK_DESCRIPTOR_SIZE,
    CRC_CALCULATOR, FOOTER_SIZE, TABLE_MAGIC,
};

/**
A handle to one immutable table file.

The footer, meta block, and sparse index are read into memory when the table
is opened; point lookups then read and verify a single data block.

A path with no file behind it opens as an empty table. This mirrors the
engine's tolerance for metadata that references a table that never
materialized.
*/
pub(crate) struct Table {
    metadata: TableMetadata,
    index: Vec<IndexEntry>,
    file: Option<Box<dyn ReadonlyRandomAccessFile>>,
}

/// Public methods.
impl Table {
    /// Open the table file at `path`.
    pub fn open(
        fs: &Arc<dyn FileSystem>,
        level: usize,
        path: &Path,
        created_at_ms: u64,
    ) -> ReadResult<Table> {
        let file = match fs.open_file(path) {
            Ok(file) => file,
            Err(open_error) if open_error.kind() == ErrorKind::NotFound => {
                log::warn!(
                    "Table file {path} does not exist. Loading it as an empty table.",
                    path = path.display()
                );
                return Ok(Table {
                    metadata: TableMetadata {
                        level,
                        file_path: path.to_path_buf(),
                        min_key: String::new(),
                        max_key: String::new(),
                        entry_count: 0,
                        created_at_ms,
                    },
                    index: Vec::new(),
                    file: None,
                });
            }
            Err(open_error) => return Err(open_error.into()),
        };

        let file_length = file.len()?;
        if (file_length as usize) < FOOTER_SIZE {
            return Err(ReadError::Corruption(format!(
                "Table file {path} is shorter than a footer",
                path = path.display()
            )));
        }

        // Footer: meta offset/length, index offset/length, magic
        let footer = read_exact_at(
            file.as_ref(),
            file_length - FOOTER_SIZE as u64,
            FOOTER_SIZE,
        )?;
        let meta_offset = u64::decode_fixed(&footer[0..8]);
        let meta_length = u64::decode_fixed(&footer[8..16]);
        let index_offset = u64::decode_fixed(&footer[16..24]);
        let index_length = u64::decode_fixed(&footer[24..32]);
        let magic = u64::decode_fixed(&footer[32..40]);
        if magic != TABLE_MAGIC {
            return Err(ReadError::Corruption(format!(
                "Table file {path} has an unrecognized magic number",
                path = path.display()
            )));
        }

        let meta_block = read_exact_at(file.as_ref(), meta_offset, meta_length as usize)?;
        let mut pos = 0;
        let min_key = get_string(&meta_block, &mut pos)?;
        let max_key = get_string(&meta_block, &mut pos)?;
        let entry_count = get_varint(&meta_block, &mut pos)?;

        let index_block = read_exact_at(file.as_ref(), index_offset, index_length as usize)?;
        let mut index = Vec::new();
        let mut pos = 0;
        while pos < index_block.len() {
            let first_key = get_string(&index_block, &mut pos)?;
            if pos + 16 > index_block.len() {
                return Err(ReadError::Corruption(
                    "Index entry is missing its block location".to_string(),
                ));
            }
            let offset = u64::decode_fixed(&index_block[pos..pos + 8]);
            let length = u64::decode_fixed(&index_block[pos + 8..pos + 16]);
            pos += 16;
            index.push(IndexEntry {
                first_key,
                offset,
                length,
            });
        }

        Ok(Table {
            metadata: TableMetadata {
                level,
                file_path: path.to_path_buf(),
                min_key,
                max_key,
                entry_count,
                created_at_ms,
            },
            index,
            file: Some(file),
        })
    }

    /// The metadata describing this table.
    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Return true if `key` falls within this table's key range.
    pub fn key_in_range(&self, key: &str) -> bool {
        self.metadata.entry_count > 0
            && self.metadata.min_key.as_str() <= key
            && key <= self.metadata.max_key.as_str()
    }

    /**
    Point lookup scoped to this single table.

    Callers are responsible for correct multi-table resolution order; a
    [`LookupOutcome::Missing`] here says nothing about other tables.
    */
    pub fn get(&self, key: &str) -> ReadResult<LookupOutcome> {
        if !self.key_in_range(key) {
            return Ok(LookupOutcome::Missing);
        }

        // The candidate block is the last one whose first key is <= key
        let position = self
            .index
            .partition_point(|entry| entry.first_key.as_str() <= key);
        if position == 0 {
            return Ok(LookupOutcome::Missing);
        }

        let block = self.read_data_block(&self.index[position - 1])?;
        let mut pos = 0;
        while pos < block.len() {
            let (entry_key, value) = decode_entry(&block, &mut pos)?;
            if entry_key.as_str() == key {
                return Ok(match value {
                    StoredValue::Value(value) => LookupOutcome::Found(value),
                    StoredValue::Tombstone => LookupOutcome::Deleted,
                });
            }
            if entry_key.as_str() > key {
                break;
            }
        }

        Ok(LookupOutcome::Missing)
    }

    /// Return true if this table holds a record (value or tombstone) for `key`.
    pub fn contains_key(&self, key: &str) -> ReadResult<bool> {
        Ok(self.get(key)? != LookupOutcome::Missing)
    }

    /// Read every entry in the table in ascending key order.
    pub fn entries(&self) -> ReadResult<Vec<(String, StoredValue)>> {
        let mut entries = Vec::with_capacity(self.metadata.entry_count);
        for index_entry in &self.index {
            let block = self.read_data_block(index_entry)?;
            let mut pos = 0;
            while pos < block.len() {
                entries.push(decode_entry(&block, &mut pos)?);
            }
        }

        Ok(entries)
    }
}

/// Private methods.
impl Table {
    /// Read a data block, verify its checksum, and decompress it.
    fn read_data_block(&self, index_entry: &IndexEntry) -> ReadResult<Vec<u8>> {
        let file = self.file.as_ref().ok_or_else(|| {
            ReadError::Corruption("Attempted to read a block of an empty table".to_string())
        })?;

        let raw = read_exact_at(file.as_ref(), index_entry.offset, index_entry.length as usize)?;
        if raw.len() < BLOCK_DESCRIPTOR_SIZE {
            return Err(ReadError::Corruption(
                "Data block is shorter than its checksum descriptor".to_string(),
            ));
        }

        let (compressed, descriptor) = raw.split_at(raw.len() - BLOCK_DESCRIPTOR_SIZE);
        let stored_checksum = unmask_checksum(u32::decode_fixed(descriptor));
        let computed_checksum = CRC_CALCULATOR.checksum(compressed);
        if stored_checksum != computed_checksum {
            return Err(ReadError::Corruption(format!(
                "Data block checksum mismatch in {path}",
                path = self.metadata.file_path.display()
            )));
        }

        snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|err| ReadError::Corruption(format!("Failed to decompress a block: {err}")))
    }
}

/// Read exactly `length` bytes starting at `offset`.
fn read_exact_at(
    file: &dyn ReadonlyRandomAccessFile,
    offset: u64,
    length: usize,
) -> ReadResult<Vec<u8>> {
    let mut buf = vec![0u8; length];
    let mut filled = 0;
    while filled < length {
        let bytes_read = file.read_from(&mut buf[filled..], offset as usize + filled)?;
        if bytes_read == 0 {
            return Err(ReadError::Corruption(
                "Unexpected end of file while reading a table".to_string(),
            ));
        }
        filled += bytes_read;
    }

    Ok(buf)
}
