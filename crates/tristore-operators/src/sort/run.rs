//! Sorted runs: spilling them page by page and streaming them back.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tristore_core::id::SpillId;
use tristore_mem::spill::{SegmentMeta, SpillReader};
use tristore_mem::{MemoryBudgetImpl, SpillManager};

use super::SortComparator;
use crate::error::Result;

/// A run that was written to spill storage.
#[derive(Clone, Debug)]
pub struct RunMeta {
    pub run_index: u32,
    pub len: u64,
    pub pages: Vec<SegmentMeta>,
}

/// Write an already sorted run as pages of at most `page_rows` values.
pub fn spill_run<T: Serialize>(
    spill: &Mutex<SpillManager>,
    spill_id: SpillId,
    run_index: u32,
    values: &[T],
    page_rows: usize,
) -> Result<RunMeta> {
    let mut pages = Vec::with_capacity(values.len().div_ceil(page_rows.max(1)));
    for (page_index, page) in values.chunks(page_rows.max(1)).enumerate() {
        let meta = spill
            .lock()
            .write_page(page, spill_id, run_index, page_index as u32)?;
        pages.push(meta);
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(
        run = run_index,
        values = values.len(),
        pages = pages.len(),
        "sorted run spilled"
    );
    Ok(RunMeta {
        run_index,
        len: values.len() as u64,
        pages,
    })
}

/// Streams one run, holding at most one page in memory.
pub struct RunCursor<T> {
    reader: SpillReader,
    budget: MemoryBudgetImpl,
    pages: std::vec::IntoIter<SegmentMeta>,
    current: std::vec::IntoIter<T>,
}

impl<T: DeserializeOwned> RunCursor<T> {
    pub fn spilled(run: RunMeta, reader: SpillReader, budget: MemoryBudgetImpl) -> Self {
        Self {
            reader,
            budget,
            pages: run.pages.into_iter(),
            current: Vec::new().into_iter(),
        }
    }

    /// A run that never left memory (the sorter's last buffer).
    pub fn in_memory(values: Vec<T>, reader: SpillReader, budget: MemoryBudgetImpl) -> Self {
        Self {
            reader,
            budget,
            pages: Vec::new().into_iter(),
            current: values.into_iter(),
        }
    }

    pub fn next_value(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(v) = self.current.next() {
                return Ok(Some(v));
            }
            match self.pages.next() {
                Some(meta) => {
                    self.current = self.reader.read_page(&meta, &self.budget)?.into_iter();
                }
                None => return Ok(None),
            }
        }
    }
}

struct HeapEntry<T, C> {
    value: T,
    run: usize,
    comparator: C,
}

impl<T, C: SortComparator<T>> Ord for HeapEntry<T, C> {
    // Reversed so that `BinaryHeap`, a max-heap, pops the smallest head
    // first, and the lowest run among equal heads.
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&other.value, &self.value)
            .then_with(|| other.run.cmp(&self.run))
    }
}

impl<T, C: SortComparator<T>> PartialOrd for HeapEntry<T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, C: SortComparator<T>> PartialEq for HeapEntry<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, C: SortComparator<T>> Eq for HeapEntry<T, C> {}

/// Min-heap over the current head of every run. Equal heads pop in run
/// order, which keeps the merge stable.
pub struct MergeHeap<T, C> {
    comparator: C,
    entries: BinaryHeap<HeapEntry<T, C>>,
}

impl<T, C: SortComparator<T>> MergeHeap<T, C> {
    pub fn with_capacity(comparator: C, runs: usize) -> Self {
        Self {
            comparator,
            entries: BinaryHeap::with_capacity(runs),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, value: T, run: usize) {
        self.entries.push(HeapEntry {
            value,
            run,
            comparator: self.comparator.clone(),
        });
    }

    pub fn pop(&mut self) -> Option<(T, usize)> {
        self.entries.pop().map(|e| (e.value, e.run))
    }
}
