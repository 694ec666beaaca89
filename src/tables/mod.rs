/*!
Immutable, sorted on-disk tables (SSTables).

A table file has the following format:

1. A series of data blocks, each holding up to ~4 KiB of entries in ascending
   key order. A block is Snappy-compressed and followed by a 4-byte masked
   CRC-32 of the compressed bytes.
1. A meta block recording the key range and entry count.
1. An index block mapping each data block's first key to its offset and
   length, enabling point reads that touch a single block.
1. A fixed-length footer locating the meta and index blocks, terminated by a
   magic number.

Entries within a data block are serialized as a varint-length-prefixed key, a
one-byte value tag (live value or tombstone), and, for live values, a
varint-length-prefixed value.

Tables are write-once. A finished table is renamed from a temp path into its
final location, so a crash mid-write never leaves a partially visible table.
*/

pub(crate) mod errors;
mod reader;
mod writer;

pub(crate) use reader::Table;
pub(crate) use writer::TableBuilder;

use std::path::PathBuf;

use crc::{Crc, CRC_32_ISCSI};
use integer_encoding::VarInt;

use crate::types::StoredValue;

use errors::ReadError;

/**
CRC calculator using the iSCSI polynomial.

This is the same polynomial the crc32c family of storage formats uses for
block checksums.
*/
pub(crate) const CRC_CALCULATOR: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Marker terminating every table file footer.
pub(crate) const TABLE_MAGIC: u64 = 0x7369_6c74_6462_0001;

/// Size of the fixed footer: meta offset/length, index offset/length, magic.
pub(crate) const FOOTER_SIZE: usize = 5 * 8;

/// Size of the checksum descriptor that trails each compressed block.
pub(crate) const BLOCK_DESCRIPTOR_SIZE: usize = 4;

/// Value tag marking a live value.
const VALUE_TAG: u8 = 0;

/// Value tag marking a tombstone.
const TOMBSTONE_TAG: u8 = 1;

/// Descriptive metadata about one table file.
#[derive(Clone, Debug)]
pub(crate) struct TableMetadata {
    /// The level this table belongs to.
    pub level: usize,

    /// Where the table file lives on its file system.
    pub file_path: PathBuf,

    /// The smallest key in the table. Empty for empty tables.
    pub min_key: String,

    /// The largest key in the table. Empty for empty tables.
    pub max_key: String,

    /// Total number of entries, tombstones included.
    pub entry_count: usize,

    /// Creation stamp in milliseconds. Newer tables shadow older tables
    /// within the same level.
    pub created_at_ms: u64,
}

/// One sparse-index entry locating a data block.
#[derive(Clone, Debug)]
pub(crate) struct IndexEntry {
    /// The first key stored in the block.
    pub first_key: String,

    /// Byte offset of the block within the file.
    pub offset: u64,

    /// Byte length of the block, checksum descriptor included.
    pub length: u64,
}

/// Append a varint to `buf`.
pub(crate) fn put_varint(buf: &mut Vec<u8>, value: usize) {
    buf.extend_from_slice(&value.encode_var_vec());
}

/// Decode a varint at `*pos`, advancing the position past it.
pub(crate) fn get_varint(buf: &[u8], pos: &mut usize) -> Result<usize, ReadError> {
    if *pos >= buf.len() {
        return Err(ReadError::Corruption(
            "Expected a varint but reached the end of the buffer".to_string(),
        ));
    }

    match usize::decode_var(&buf[*pos..]) {
        Some((value, bytes_read)) => {
            *pos += bytes_read;
            Ok(value)
        }
        None => Err(ReadError::Corruption(
            "Could not decode a varint".to_string(),
        )),
    }
}

/// Decode a length-prefixed string at `*pos`, advancing the position.
pub(crate) fn get_string(buf: &[u8], pos: &mut usize) -> Result<String, ReadError> {
    let length = get_varint(buf, pos)?;
    if *pos + length > buf.len() {
        return Err(ReadError::Corruption(format!(
            "String of length {length} overruns the buffer"
        )));
    }

    let raw = &buf[*pos..*pos + length];
    *pos += length;
    String::from_utf8(raw.to_vec())
        .map_err(|_| ReadError::Corruption("String is not valid UTF-8".to_string()))
}

/// Serialize one entry into a data block buffer.
pub(crate) fn encode_entry(buf: &mut Vec<u8>, key: &str, value: &StoredValue) {
    put_varint(buf, key.len());
    buf.extend_from_slice(key.as_bytes());
    match value {
        StoredValue::Value(value) => {
            buf.push(VALUE_TAG);
            put_varint(buf, value.len());
            buf.extend_from_slice(value.as_bytes());
        }
        StoredValue::Tombstone => buf.push(TOMBSTONE_TAG),
    }
}

/// Deserialize one entry from a decompressed data block, advancing `*pos`.
pub(crate) fn decode_entry(
    buf: &[u8],
    pos: &mut usize,
) -> Result<(String, StoredValue), ReadError> {
    let key = get_string(buf, pos)?;

    if *pos >= buf.len() {
        return Err(ReadError::Corruption(
            "Entry is missing its value tag".to_string(),
        ));
    }
    let tag = buf[*pos];
    *pos += 1;

    let value = match tag {
        VALUE_TAG => StoredValue::Value(get_string(buf, pos)?),
        TOMBSTONE_TAG => StoredValue::Tombstone,
        unknown => {
            return Err(ReadError::Corruption(format!(
                "Unknown value tag: {unknown}"
            )))
        }
    };

    Ok((key, value))
}
