/*!
An arena-indexed skip list.

Nodes live in a `Vec` arena and link to each other by index, so the structure
needs no unsafe pointer juggling and keeps good cache locality for the
level-0 walk that iteration uses. Level assignment is randomized with a 1/4
branching factor.
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::StoredValue;

use super::entry_size;

/// Maximum height of the skip list.
const MAX_HEIGHT: usize = 12;

/// Each additional level is taken with probability `1 / BRANCHING_FACTOR`.
const BRANCHING_FACTOR: u32 = 4;

/// A single node in the skip list.
struct SkipNode {
    key: String,
    value: StoredValue,

    /// Indices into the arena for the next node at each level this node
    /// participates in. Level 0 links every node.
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted map from keys to stored values.
pub(super) struct SkipList {
    /// Arena holding every node. Indices are stable; removal only happens
    /// wholesale via [`SkipList::clear`].
    arena: Vec<SkipNode>,

    /// Head pointers per level. `None` marks an empty level.
    head: Vec<Option<usize>>,

    /// Highest level currently in use.
    height: usize,

    len: usize,
    approximate_size: usize,
    rng: StdRng,
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            head: vec![None; MAX_HEIGHT],
            height: 1,
            len: 0,
            approximate_size: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Insert a key-value pair, overwriting any existing record for the key.
    pub fn insert(&mut self, key: String, value: StoredValue) {
        let mut predecessors: Vec<Option<usize>> = vec![None; MAX_HEIGHT];
        let mut current: Option<usize> = None;
        for level in (0..self.height).rev() {
            loop {
                match self.next_index(current, level) {
                    Some(next) if self.arena[next].key < key => current = Some(next),
                    _ => break,
                }
            }
            predecessors[level] = current;
        }

        // An equal key means overwrite in place
        if let Some(candidate) = self.next_index(current, 0) {
            if self.arena[candidate].key == key {
                let node = &mut self.arena[candidate];
                self.approximate_size -= node.value.payload_len();
                self.approximate_size += value.payload_len();
                node.value = value;
                return;
            }
        }

        let node_height = self.random_height();
        if node_height > self.height {
            // Levels above the old height have no predecessors; their `None`
            // entries already point the new node at the head.
            self.height = node_height;
        }

        self.approximate_size += entry_size(&key, &value);
        let new_index = self.arena.len();
        let mut forward = vec![None; node_height];
        for (level, pointer) in forward.iter_mut().enumerate() {
            *pointer = self.next_index(predecessors[level], level);
        }
        self.arena.push(SkipNode {
            key,
            value,
            forward,
        });

        for level in 0..node_height {
            match predecessors[level] {
                Some(predecessor) => self.arena[predecessor].forward[level] = Some(new_index),
                None => self.head[level] = Some(new_index),
            }
        }

        self.len += 1;
    }

    /// Look up a key. Returns the stored record if present.
    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        let mut current: Option<usize> = None;
        for level in (0..self.height).rev() {
            loop {
                match self.next_index(current, level) {
                    Some(next) if self.arena[next].key.as_str() < key => current = Some(next),
                    _ => break,
                }
            }
        }

        let candidate = self.next_index(current, 0)?;
        if self.arena[candidate].key == key {
            return Some(&self.arena[candidate].value);
        }

        None
    }

    /// Number of entries in the skip list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Approximate memory usage in bytes.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.head = vec![None; MAX_HEIGHT];
        self.height = 1;
        self.len = 0;
        self.approximate_size = 0;
    }

    /**
    Iterate all entries in ascending key order by walking the level-0 chain,
    which links every node.
    */
    pub fn iter(&self) -> SkipListIter<'_> {
        SkipListIter {
            list: self,
            current: self.head[0],
        }
    }
}

/// Private methods.
impl SkipList {
    /// The index following `current` at `level`; `None` for the chain end.
    /// A `current` of `None` means the head sentinel.
    fn next_index(&self, current: Option<usize>, level: usize) -> Option<usize> {
        match current {
            Some(index) => self.arena[index].forward.get(level).copied().flatten(),
            None => self.head[level],
        }
    }

    /// Generate a random height for a new node, capped at [`MAX_HEIGHT`].
    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_range(0..BRANCHING_FACTOR) == 0 {
            height += 1;
        }

        height
    }
}

/// Iterator over skip list entries in ascending key order.
pub(super) struct SkipListIter<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl<'a> Iterator for SkipListIter<'a> {
    type Item = (&'a String, &'a StoredValue);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        let node = &self.list.arena[index];
        self.current = node.forward[0];

        Some((&node.key, &node.value))
    }
}
