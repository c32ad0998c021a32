//! Query-time reads of a written permutation.
//!
//! A scan walks the catalog's relations for a key or key range and pulls
//! their blocks from a [`BlockSource`] one at a time. Exclusive relations
//! come back block by block. Relations embedded in a shared block are cut
//! out of it with their `offset_in_block`; the last shared block read is
//! kept so neighbouring small relations do not read it again.

use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tristore_core::block::BlockSource;
use tristore_core::error::Error;
use tristore_core::id::RelationKey;
use tristore_core::metadata::{BlockMetadata, PermutationCatalog};
use tristore_core::table::IdTable;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub blocks_read: u64,
    /// Blocks overlapping the scanned key range.
    pub blocks_total: u64,
    pub rows_read: u64,
}

/// Tail rows of one relation taken from one block.
#[derive(Debug, Clone)]
pub struct RelationSlice {
    pub key: RelationKey,
    pub tails: IdTable,
    pub block: BlockMetadata,
}

#[derive(Clone)]
pub struct PermutationScan {
    catalog: Arc<PermutationCatalog>,
    source: Arc<dyn BlockSource>,
}

impl PermutationScan {
    pub fn new(catalog: PermutationCatalog, source: Arc<dyn BlockSource>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            source,
        }
    }

    pub fn catalog(&self) -> &PermutationCatalog {
        &self.catalog
    }

    /// Tail rows of one relation. Empty when the key is absent.
    pub fn scan_key(&self, key: RelationKey) -> RelationBlocks {
        self.scan_range(key..=key)
    }

    pub fn scan_range(&self, keys: RangeInclusive<RelationKey>) -> RelationBlocks {
        let relations = self.catalog.relations_in(&keys);
        let start = relations
            .first()
            .map_or(0, |r| self.catalog.relations.partition_point(|x| x.key < r.key));
        let blocks_total = self.catalog.block_range_for(&keys).len() as u64;
        RelationBlocks {
            catalog: Arc::clone(&self.catalog),
            source: Arc::clone(&self.source),
            relations: start..start + relations.len(),
            exclusive: None,
            cached: None,
            progress: ScanProgress {
                blocks_total,
                ..ScanProgress::default()
            },
            failed: false,
        }
    }

    /// Every tuple of the permutation, key column first, one table per
    /// relation slice.
    pub fn scan_all(&self) -> impl Iterator<Item = Result<IdTable>> + Send {
        let all = match (self.catalog.relations.first(), self.catalog.relations.last()) {
            (Some(first), Some(last)) => self.scan_range(first.key..=last.key),
            _ => self.scan_range(RelationKey::new(1)..=RelationKey::new(0)),
        };
        all.map(|slice| slice.and_then(|s| s.into_tuples()))
    }
}

impl RelationSlice {
    /// Prepend the key column.
    pub fn into_tuples(self) -> Result<IdTable> {
        let mut out = IdTable::with_capacity(self.tails.num_columns() + 1, self.tails.num_rows());
        for row in self.tails.rows() {
            out.push_row_parts(&[self.key], row)?;
        }
        Ok(out)
    }
}

/// Lazy sequence of [`RelationSlice`]s in written order.
pub struct RelationBlocks {
    catalog: Arc<PermutationCatalog>,
    source: Arc<dyn BlockSource>,
    relations: std::ops::Range<usize>,
    /// Exclusive relation in progress and its next block.
    exclusive: Option<(RelationKey, usize)>,
    cached: Option<(usize, IdTable)>,
    progress: ScanProgress,
    failed: bool,
}

impl RelationBlocks {
    pub fn progress(&self) -> ScanProgress {
        self.progress
    }

    fn read(&mut self, index: usize) -> Result<IdTable> {
        let table = self.source.read_block(&self.catalog.blocks[index])?;
        self.progress.blocks_read += 1;
        Ok(table)
    }

    fn next_exclusive(&mut self) -> Option<Result<RelationSlice>> {
        let (key, index) = self.exclusive?;
        match self.catalog.blocks.get(index) {
            Some(meta) if meta.first_key == key => {
                let block = meta.clone();
                self.exclusive = Some((key, index + 1));
                Some(self.read(index).map(|tails| RelationSlice { key, tails, block }))
            }
            _ => {
                self.exclusive = None;
                None
            }
        }
    }

    fn embedded(&mut self, index: usize, key: RelationKey, offset: u64, rows: u64) -> Result<RelationSlice> {
        if self.cached.as_ref().map(|(i, _)| *i) != Some(index) {
            let table = self.read(index)?;
            self.cached = Some((index, table));
        }
        let block = self.catalog.blocks[index].clone();
        let table = match &self.cached {
            Some((_, table)) => table,
            None => return Err(Error::Invariant("shared block cache is empty".into()).into()),
        };
        let (start, end) = (offset as usize, (offset + rows) as usize);
        if end > table.num_rows() {
            return Err(Error::Corrupt(format!(
                "{}: relation {key} claims rows {start}..{end} of a block with {} rows",
                self.catalog.name,
                table.num_rows()
            ))
            .into());
        }
        Ok(RelationSlice {
            key,
            tails: table.slice(start, end),
            block,
        })
    }
}

impl Iterator for RelationBlocks {
    type Item = Result<RelationSlice>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = loop {
            if let Some(item) = self.next_exclusive() {
                break item;
            }
            let rel = self.catalog.relations.get(self.relations.next()?)?.clone();
            let index = self.catalog.blocks.partition_point(|b| b.last_key < rel.key);
            if index >= self.catalog.blocks.len() {
                break Err(Error::Corrupt(format!(
                    "{}: no block holds relation {}",
                    self.catalog.name, rel.key
                ))
                .into());
            }
            if rel.is_embedded() {
                break self.embedded(index, rel.key, rel.offset_in_block, rel.num_rows);
            }
            self.exclusive = Some((rel.key, index));
        };
        match &item {
            Ok(slice) => self.progress.rows_read += slice.tails.num_rows() as u64,
            Err(_) => self.failed = true,
        }
        Some(item)
    }
}
