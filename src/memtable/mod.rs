/*!
In-memory write buffers.

A memtable absorbs writes until the engine freezes it and flushes it to a
level-0 table file. Deletions are stored as tombstones so that flushed output
can continue to shadow older values in deeper tables.

Multiple representations are provided behind one trait. They are behaviorally
identical (ordered iteration, point lookup, deterministic flush output) and
differ only in intended performance characteristics. None of them lock
internally; the owning engine serializes all access.
*/

mod skiplist;

use std::collections::{BTreeMap, HashMap};

use crate::options::MemtableVariant;
use crate::types::StoredValue;

use skiplist::SkipList;

/// Fixed per-entry bookkeeping overhead used by size approximations.
const ENTRY_OVERHEAD_BYTES: usize = 32;

/// Approximate in-memory footprint of one entry.
fn entry_size(key: &str, value: &StoredValue) -> usize {
    key.len() + value.payload_len() + ENTRY_OVERHEAD_BYTES
}

/// A mutable, in-memory buffer of the most recent writes.
pub(crate) trait MemTable: Send {
    /**
    Insert a record for `key`, overwriting any previous record.

    Both live values and tombstones go through this method; a delete is an
    insert of [`StoredValue::Tombstone`].
    */
    fn insert(&mut self, key: String, value: StoredValue);

    /**
    Get the record stored for `key`.

    Returns `None` if the memtable holds no record for the key. A returned
    tombstone means the key is deleted, which callers must distinguish from
    absence.
    */
    fn get(&self, key: &str) -> Option<&StoredValue>;

    /// The number of records in the memtable.
    fn len(&self) -> usize;

    /// Returns true if the memtable holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the approximate memory usage of the memtable in bytes.
    fn approximate_size(&self) -> usize;

    /// Remove every record.
    fn clear(&mut self);

    /**
    Iterate over all records in ascending key order.

    Flushes rely on this ordering to emit sorted table files, so it must be
    deterministic for every implementation.
    */
    fn iter(&self) -> Box<dyn Iterator<Item = (&String, &StoredValue)> + '_>;
}

/// Construct the memtable representation selected by configuration.
pub(crate) fn new_memtable(variant: MemtableVariant) -> Box<dyn MemTable> {
    match variant {
        MemtableVariant::SkipList => Box::new(SkipListMemTable::new()),
        MemtableVariant::HashIndex => Box::new(HashIndexMemTable::new()),
        MemtableVariant::Ordered => Box::new(OrderedMemTable::new()),
    }
}

/// Memtable backed by an arena-indexed skip list.
pub(crate) struct SkipListMemTable {
    store: SkipList,
}

impl SkipListMemTable {
    pub fn new() -> Self {
        Self {
            store: SkipList::new(),
        }
    }
}

impl MemTable for SkipListMemTable {
    fn insert(&mut self, key: String, value: StoredValue) {
        self.store.insert(key, value)
    }

    fn get(&self, key: &str) -> Option<&StoredValue> {
        self.store.get(key)
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn approximate_size(&self) -> usize {
        self.store.approximate_size()
    }

    fn clear(&mut self) {
        self.store.clear()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&String, &StoredValue)> + '_> {
        Box::new(self.store.iter())
    }
}

/**
Memtable backed by a hash map.

Point operations avoid comparison costs; the ordering contract is met by
sorting keys at iteration time, which makes flushes more expensive.
*/
pub(crate) struct HashIndexMemTable {
    store: HashMap<String, StoredValue>,
    approximate_size: usize,
}

impl HashIndexMemTable {
    pub fn new() -> Self {
        Self {
            store: HashMap::new(),
            approximate_size: 0,
        }
    }
}

impl MemTable for HashIndexMemTable {
    fn insert(&mut self, key: String, value: StoredValue) {
        let full_size = entry_size(&key, &value);
        let new_payload = value.payload_len();
        match self.store.insert(key, value) {
            Some(previous) => {
                self.approximate_size -= previous.payload_len();
                self.approximate_size += new_payload;
            }
            None => self.approximate_size += full_size,
        }
    }

    fn get(&self, key: &str) -> Option<&StoredValue> {
        self.store.get(key)
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    fn clear(&mut self) {
        self.store.clear();
        self.approximate_size = 0;
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&String, &StoredValue)> + '_> {
        let mut entries: Vec<(&String, &StoredValue)> = self.store.iter().collect();
        entries.sort_by(|(left, _), (right, _)| left.cmp(right));
        Box::new(entries.into_iter())
    }
}

/// Memtable backed by an ordered index (a B-tree map).
pub(crate) struct OrderedMemTable {
    store: BTreeMap<String, StoredValue>,
    approximate_size: usize,
}

impl OrderedMemTable {
    pub fn new() -> Self {
        Self {
            store: BTreeMap::new(),
            approximate_size: 0,
        }
    }
}

impl MemTable for OrderedMemTable {
    fn insert(&mut self, key: String, value: StoredValue) {
        let full_size = entry_size(&key, &value);
        let new_payload = value.payload_len();
        match self.store.insert(key, value) {
            Some(previous) => {
                self.approximate_size -= previous.payload_len();
                self.approximate_size += new_payload;
            }
            None => self.approximate_size += full_size,
        }
    }

    fn get(&self, key: &str) -> Option<&StoredValue> {
        self.store.get(key)
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    fn clear(&mut self) {
        self.store.clear();
        self.approximate_size = 0;
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&String, &StoredValue)> + '_> {
        Box::new(self.store.iter())
    }
}
