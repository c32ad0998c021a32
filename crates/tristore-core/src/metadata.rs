//! Persisted per-block and per-relation records, and the catalog that ties
//! them to one permutation.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_serde, Hash256};
use crate::id::{RelationKey, ValueId};

/// Sentinel for `RelationMetadata::offset_in_block` when the relation owns
/// its blocks exclusively.
pub const NOT_IN_SHARED_BLOCK: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// Byte offset of the stored block within the permutation file.
    pub offset: u64,
    pub compressed_size: u64,
    pub num_rows: u64,
    pub first_key: RelationKey,
    pub last_key: RelationKey,
    /// First and last value of the primary tail column.
    pub first_col1: ValueId,
    pub last_col1: ValueId,
    /// blake3 of the stored bytes. Zero for sinks that keep blocks in memory.
    pub checksum: Hash256,
}

impl BlockMetadata {
    /// Whether the block's key range overlaps `keys`.
    pub fn overlaps(&self, keys: &RangeInclusive<RelationKey>) -> bool {
        self.first_key <= *keys.end() && self.last_key >= *keys.start()
    }

    /// A block holding a single key may still be a shared block with one
    /// relation in it; only `RelationMetadata` tells the two apart.
    pub fn spans_single_key(&self) -> bool {
        self.first_key == self.last_key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    pub key: RelationKey,
    pub num_rows: u64,
    /// Average rows per distinct value of the first tail column.
    pub multiplicity_col1: f32,
    /// Same for the second tail column. Filled in from the twin permutation.
    pub multiplicity_col2: f32,
    /// Row offset inside the shared block holding this relation, or
    /// `NOT_IN_SHARED_BLOCK`.
    pub offset_in_block: u64,
}

impl RelationMetadata {
    pub fn is_functional(&self) -> bool {
        self.multiplicity_col1 == 1.0
    }

    pub fn is_embedded(&self) -> bool {
        self.offset_in_block != NOT_IN_SHARED_BLOCK
    }
}

/// `rows / distinct`, exactly `1.0` when every value is unique.
///
/// A non-functional column never reports `1.0`: when the quotient rounds to
/// it, the next representable value above is returned instead.
pub fn multiplicity(num_rows: u64, num_distinct: u64) -> f32 {
    if num_rows == num_distinct || num_distinct == 0 {
        return 1.0;
    }
    let m = (num_rows as f64 / num_distinct as f64) as f32;
    if m == 1.0 {
        f32::from_bits(1.0f32.to_bits() + 1)
    } else {
        m
    }
}

/// Everything a scan needs to find the blocks of one permutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationCatalog {
    pub name: String,
    /// Number of columns stored per block row (tuple arity minus the key).
    pub tail_width: usize,
    pub blocks: Vec<BlockMetadata>,
    pub relations: Vec<RelationMetadata>,
    pub engine_version: String,
}

impl PermutationCatalog {
    pub fn new(
        name: impl Into<String>,
        tail_width: usize,
        blocks: Vec<BlockMetadata>,
        relations: Vec<RelationMetadata>,
    ) -> Self {
        Self {
            name: name.into(),
            tail_width,
            blocks,
            relations,
            engine_version: crate::VERSION.to_string(),
        }
    }

    pub fn num_rows(&self) -> u64 {
        self.relations.iter().map(|r| r.num_rows).sum()
    }

    pub fn relation(&self, key: RelationKey) -> Option<&RelationMetadata> {
        self.relations
            .binary_search_by(|r| r.key.cmp(&key))
            .ok()
            .map(|i| &self.relations[i])
    }

    /// Relations whose key falls into `keys`, in key order.
    pub fn relations_in(&self, keys: &RangeInclusive<RelationKey>) -> &[RelationMetadata] {
        let start = self.relations.partition_point(|r| r.key < *keys.start());
        let end = self.relations.partition_point(|r| r.key <= *keys.end());
        &self.relations[start..end.max(start)]
    }

    /// Indices of the blocks whose key range overlaps `keys`. Blocks are
    /// sorted and non-overlapping, so this is one contiguous range.
    pub fn block_range_for(&self, keys: &RangeInclusive<RelationKey>) -> std::ops::Range<usize> {
        let start = self.blocks.partition_point(|b| b.last_key < *keys.start());
        let end = self.blocks.partition_point(|b| b.first_key <= *keys.end());
        start..end.max(start)
    }

    pub fn digest(&self) -> Result<Hash256> {
        hash_serde(self)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Full structural check: relations strictly increasing, blocks ordered
    /// by `(key, col1)` without overlap, and row counts adding up.
    pub fn validate(&self) -> Result<()> {
        for pair in self.relations.windows(2) {
            if pair[0].key >= pair[1].key {
                return Err(Error::Invariant(format!(
                    "{}: relation keys not increasing at {} -> {}",
                    self.name, pair[0].key, pair[1].key
                )));
            }
        }
        for (i, pair) in self.blocks.windows(2).enumerate() {
            let (a, b) = (&pair[0], &pair[1]);
            if (a.last_key, a.last_col1) > (b.first_key, b.first_col1) {
                return Err(Error::Invariant(format!(
                    "{}: blocks {} and {} overlap ({}, {}) > ({}, {})",
                    self.name,
                    i,
                    i + 1,
                    a.last_key,
                    a.last_col1,
                    b.first_key,
                    b.first_col1
                )));
            }
        }
        for (i, b) in self.blocks.iter().enumerate() {
            if b.num_rows == 0 || b.first_key > b.last_key {
                return Err(Error::Invariant(format!(
                    "{}: block {} is empty or has an inverted key range",
                    self.name, i
                )));
            }
        }
        let block_rows: u64 = self.blocks.iter().map(|b| b.num_rows).sum();
        if block_rows != self.num_rows() {
            return Err(Error::Invariant(format!(
                "{}: blocks hold {} rows but relations claim {}",
                self.name,
                block_rows,
                self.num_rows()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(first: u64, last: u64, c1: (u64, u64), rows: u64) -> BlockMetadata {
        BlockMetadata {
            offset: 0,
            compressed_size: 0,
            num_rows: rows,
            first_key: ValueId::new(first),
            last_key: ValueId::new(last),
            first_col1: ValueId::new(c1.0),
            last_col1: ValueId::new(c1.1),
            checksum: Hash256::ZERO,
        }
    }

    fn relation(key: u64, rows: u64, offset: u64) -> RelationMetadata {
        RelationMetadata {
            key: ValueId::new(key),
            num_rows: rows,
            multiplicity_col1: 1.0,
            multiplicity_col2: 1.0,
            offset_in_block: offset,
        }
    }

    fn sample() -> PermutationCatalog {
        PermutationCatalog::new(
            "pso",
            2,
            vec![
                block(1, 3, (1, 9), 4),
                block(5, 5, (1, 4), 3),
                block(5, 5, (4, 8), 3),
                block(7, 9, (2, 2), 2),
            ],
            vec![
                relation(1, 1, 0),
                relation(2, 2, 1),
                relation(3, 1, 3),
                relation(5, 6, NOT_IN_SHARED_BLOCK),
                relation(7, 1, 0),
                relation(9, 1, 1),
            ],
        )
    }

    #[test]
    fn multiplicity_law() {
        assert_eq!(multiplicity(10, 10), 1.0);
        assert_eq!(multiplicity(10, 3), (10.0f64 / 3.0) as f32);
        assert_eq!(multiplicity(0, 0), 1.0);
        let nearly_unique = multiplicity(100_000_001, 100_000_000);
        assert!(nearly_unique > 1.0);
    }

    #[test]
    fn lookups() {
        let c = sample();
        c.validate().expect("sample catalog is valid");
        assert_eq!(c.num_rows(), 12);
        assert!(c.relation(ValueId::new(5)).is_some_and(|r| !r.is_embedded()));
        assert!(c.relation(ValueId::new(4)).is_none());
        assert_eq!(c.block_range_for(&(ValueId::new(5)..=ValueId::new(5))), 1..3);
        assert_eq!(c.block_range_for(&(ValueId::new(2)..=ValueId::new(7))), 0..4);
        assert_eq!(c.block_range_for(&(ValueId::new(10)..=ValueId::new(12))), 4..4);
        assert_eq!(c.relations_in(&(ValueId::new(2)..=ValueId::new(6))).len(), 3);
    }

    #[test]
    fn validate_rejects_overlap() {
        let mut c = sample();
        c.blocks[2].first_col1 = ValueId::new(3);
        let err = c.validate().expect_err("overlap must be detected");
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn json_roundtrip_keeps_digest() {
        let c = sample();
        let bytes = c.to_json().expect("serialize");
        let back = PermutationCatalog::from_json(&bytes).expect("deserialize");
        assert_eq!(c, back);
        assert_eq!(c.digest().expect("digest"), back.digest().expect("digest"));
    }
}
