//! Writes a permutation and its twin in one pass.
//!
//! The input is sorted for the primary permutation. Every tuple goes to the
//! primary segmenter as is and to a [`PermutationRewriter`] for the twin.
//! Since both permutations have the same relations in the same order, the
//! column-2 multiplicity of one is the column-1 multiplicity of the other.

use tristore_core::block::BlockSink;
use tristore_core::error::Error;
use tristore_core::id::ValueId;
use tristore_core::metadata::{PermutationCatalog, RelationMetadata};
use tristore_core::permutation::Permutation;
use tristore_mem::MemoryBudgetImpl;
use tristore_operators::{BackgroundExternalSorter, NaturalOrder};

use crate::error::Result;
use crate::rewriter::PermutationRewriter;
use crate::segmenter::{RelationSegmenter, SegmentedPermutation};

pub struct PermutationPairWriter<A, B> {
    permutation: Permutation,
    primary: RelationSegmenter<A>,
    twin: PermutationRewriter<B>,
}

/// Output of a [`PermutationPairWriter`], multiplicities complete.
pub struct PermutationPair<A, B> {
    pub primary: SegmentedPermutation<A>,
    pub twin: SegmentedPermutation<B>,
}

impl<A, B> PermutationPair<A, B> {
    pub fn catalogs(&self) -> (PermutationCatalog, PermutationCatalog) {
        (self.primary.catalog(), self.twin.catalog())
    }
}

impl<A: BlockSink, B: BlockSink> PermutationPairWriter<A, B> {
    /// `twin_sorter` re-sorts the rows of one relation at a time.
    pub fn new(
        permutation: Permutation,
        primary_sink: A,
        twin_sink: B,
        block_capacity: usize,
        twin_sorter: BackgroundExternalSorter<[ValueId; 2], NaturalOrder>,
        budget: &MemoryBudgetImpl,
    ) -> Result<Self> {
        let primary =
            RelationSegmenter::new(primary_sink, permutation.name(), 2, block_capacity, budget)?;
        let twin_segmenter = RelationSegmenter::new(
            twin_sink,
            permutation.twin().name(),
            2,
            block_capacity,
            budget,
        )?;
        Ok(Self {
            permutation,
            primary,
            twin: PermutationRewriter::new(twin_sorter, twin_segmenter),
        })
    }

    pub fn permutation(&self) -> Permutation {
        self.permutation
    }

    /// `tuple` is already in the primary permutation's key order.
    pub fn push(&mut self, tuple: [ValueId; 3]) -> Result<()> {
        self.primary.push(tuple[0], &tuple[1..])?;
        self.twin.push(tuple[0], [tuple[1], tuple[2]])
    }

    pub fn finish(self) -> Result<PermutationPair<A, B>> {
        let mut primary = self.primary.finish()?;
        let mut twin = self.twin.finish()?;
        patch_col2_multiplicities(&mut primary.relations, &mut twin.relations)?;
        #[cfg(feature = "tracing")]
        tracing::info!(
            primary = %primary.name,
            twin = %twin.name,
            relations = primary.relations.len(),
            rows = primary.num_rows(),
            "permutation pair written"
        );
        Ok(PermutationPair { primary, twin })
    }
}

fn patch_col2_multiplicities(a: &mut [RelationMetadata], b: &mut [RelationMetadata]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::Invariant(format!(
            "twin permutations disagree on the number of relations ({} vs {})",
            a.len(),
            b.len()
        ))
        .into());
    }
    for (ra, rb) in a.iter_mut().zip(b.iter_mut()) {
        if ra.key != rb.key || ra.num_rows != rb.num_rows {
            return Err(Error::Invariant(format!(
                "twin relations differ: {} with {} rows vs {} with {} rows",
                ra.key, ra.num_rows, rb.key, rb.num_rows
            ))
            .into());
        }
        ra.multiplicity_col2 = rb.multiplicity_col1;
        rb.multiplicity_col2 = ra.multiplicity_col1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tristore_core::config::EngineConfig;
    use tristore_core::metadata::NOT_IN_SHARED_BLOCK;
    use tristore_io::{MemoryBlockStore, MemoryStorage};

    fn id(v: u64) -> ValueId {
        ValueId::new(v)
    }

    fn writer(capacity: usize) -> PermutationPairWriter<MemoryBlockStore, MemoryBlockStore> {
        let cfg = EngineConfig {
            sorter_memory_bytes: 1 << 12,
            sort_page_rows: 16,
            ..EngineConfig::default()
        };
        let budget = MemoryBudgetImpl::unbounded();
        let sorter =
            BackgroundExternalSorter::from_config(NaturalOrder, &cfg, &budget, Arc::new(MemoryStorage::new()))
                .expect("sorter");
        PermutationPairWriter::new(
            Permutation::Pso,
            MemoryBlockStore::new(),
            MemoryBlockStore::new(),
            capacity,
            sorter,
            &budget,
        )
        .expect("writer")
    }

    #[test]
    fn multiplicities_are_cross_filled() {
        let mut w = writer(64);
        // key 1: c1 {1, 1, 2}, c2 {5, 6, 7}
        for t in [[1, 1, 5], [1, 1, 6], [1, 2, 7], [2, 3, 3]] {
            w.push(t.map(id)).expect("push");
        }
        let pair = w.finish().expect("finish");
        let (pso, pos) = pair.catalogs();
        assert_eq!((pso.name.as_str(), pos.name.as_str()), ("pso", "pos"));

        let a = pso.relation(id(1)).expect("pso relation");
        let b = pos.relation(id(1)).expect("pos relation");
        assert_eq!(a.multiplicity_col1, 1.5);
        assert_eq!(a.multiplicity_col2, 1.0);
        assert_eq!(b.multiplicity_col1, 1.0);
        assert_eq!(b.multiplicity_col2, 1.5);
        pso.validate().expect("pso");
        pos.validate().expect("pos");
        assert_eq!(pso.num_rows(), pos.num_rows());
    }

    #[test]
    fn both_sides_place_relations_alike() {
        let mut w = writer(4);
        for c1 in 0..6u64 {
            w.push([id(9), id(c1), id(6 - c1)]).expect("push");
        }
        w.push([id(10), id(1), id(1)]).expect("push");
        let pair = w.finish().expect("finish");
        for side in [&pair.primary.relations, &pair.twin.relations] {
            assert_eq!(side[0].offset_in_block, NOT_IN_SHARED_BLOCK);
            assert_eq!(side[1].offset_in_block, 0);
        }
        assert_eq!(pair.primary.sink.block_sizes(), vec![4, 2, 1]);
        assert_eq!(pair.twin.sink.block_sizes(), vec![4, 2, 1]);
    }

    #[test]
    fn mismatched_relation_lists_are_rejected() {
        let rel = |k: u64| RelationMetadata {
            key: id(k),
            num_rows: 1,
            multiplicity_col1: 1.0,
            multiplicity_col2: 1.0,
            offset_in_block: 0,
        };
        let mut a = vec![rel(1), rel(2)];
        let mut b = vec![rel(1), rel(3)];
        assert!(patch_col2_multiplicities(&mut a, &mut b).is_err());
        assert!(patch_col2_multiplicities(&mut a, &mut b[..1]).is_err());
    }
}
