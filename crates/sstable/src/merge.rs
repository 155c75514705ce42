//! K-way merge over SSTable record iterators.
//!
//! Produces `(key, Option<value>)` pairs in ascending key order, each key
//! exactly once. When a key appears in several source tables, the entry
//! from the **newest** table wins; tombstones are carried through like any
//! other entry, since tables below the merge set may still hold the key.
//!
//! This is the compaction primitive: feed it the tables being merged,
//! oldest first, and stream the output into a new SSTable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::reader::RecordIter;

/// One pending record from one source, ordered for the heap.
struct HeapEntry {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    /// Index into the sources array; higher = newer table.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key comparison so the
        // smallest key pops first. On equal keys the newest source pops
        // first, which makes the popped entry the winner for that key.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges record streams from several SSTables into one sorted,
/// deduplicated stream.
pub struct MergeIterator<'a> {
    sources: Vec<RecordIter<'a>>,
    heap: BinaryHeap<HeapEntry>,
}

impl<'a> MergeIterator<'a> {
    /// Builds a merge over `sources`, which must be supplied **oldest to
    /// newest**; recency is encoded by position.
    pub fn new(sources: Vec<RecordIter<'a>>) -> Self {
        let mut merge = Self {
            sources,
            heap: BinaryHeap::new(),
        };
        for i in 0..merge.sources.len() {
            merge.advance(i);
        }
        merge
    }

    /// Pulls the next record from source `i` into the heap, if any remain.
    fn advance(&mut self, i: usize) {
        if let Some((key, value)) = self.sources[i].next() {
            self.heap.push(HeapEntry {
                key,
                value,
                source: i,
            });
        }
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = (Vec<u8>, Option<Vec<u8>>);

    fn next(&mut self) -> Option<Self::Item> {
        let top = self.heap.pop()?;
        self.advance(top.source);

        // Discard the same key from older sources so it is emitted once.
        while let Some(peek) = self.heap.peek() {
            if peek.key != top.key {
                break;
            }
            let dup = self.heap.pop().expect("peeked entry");
            self.advance(dup.source);
        }

        Some((top.key, top.value))
    }
}
