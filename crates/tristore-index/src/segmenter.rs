//! Cuts a sorted tuple stream into relations and places each one.
//!
//! Rows of the current relation are buffered up to the block capacity. A
//! relation that never fills the buffer goes into a shared block when it
//! ends. One that does is promoted to exclusive placement: the full buffer
//! becomes its first block, every later full buffer another one, and the
//! promotion is never undone for that relation.

use tristore_core::block::BlockSink;
use tristore_core::error::Error;
use tristore_core::id::{RelationKey, ValueId};
use tristore_core::metadata::{
    multiplicity, BlockMetadata, PermutationCatalog, RelationMetadata, NOT_IN_SHARED_BLOCK,
};
use tristore_core::table::IdTable;
use tristore_mem::{MemoryBudgetImpl, Reservation};

use crate::block_builder::BlockBuilder;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Shared,
    Exclusive,
}

/// Tail rows of the open relation that are not written yet.
struct RelationTailAccumulator {
    buffer: IdTable,
    capacity: usize,
    placement: Placement,
    _reservation: Reservation,
}

impl RelationTailAccumulator {
    fn new(tail_width: usize, capacity: usize, budget: &MemoryBudgetImpl) -> Result<Self> {
        let bytes = tail_width * capacity * std::mem::size_of::<ValueId>();
        Ok(Self {
            buffer: IdTable::with_capacity(tail_width, capacity),
            capacity,
            placement: Placement::Shared,
            _reservation: Reservation::new(budget, bytes, "relation_accumulator")?,
        })
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.placement = Placement::Shared;
    }

    /// Append one tail. A full buffer is written as an exclusive block.
    fn push<S: BlockSink>(
        &mut self,
        key: RelationKey,
        tail: &[ValueId],
        builder: &mut BlockBuilder<S>,
    ) -> Result<()> {
        self.buffer.push_row(tail)?;
        if self.buffer.num_rows() >= self.capacity {
            if self.placement == Placement::Shared {
                self.placement = Placement::Exclusive;
                #[cfg(feature = "tracing")]
                tracing::debug!(key = %key, "relation promoted to exclusive blocks");
            }
            builder.push_exclusive(key, &self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Write what is left. Returns the offset inside the shared block, or
    /// the sentinel for exclusive relations.
    fn close<S: BlockSink>(
        &mut self,
        key: RelationKey,
        builder: &mut BlockBuilder<S>,
    ) -> Result<u64> {
        let offset = match self.placement {
            Placement::Exclusive => {
                if !self.buffer.is_empty() {
                    builder.push_exclusive(key, &self.buffer)?;
                }
                NOT_IN_SHARED_BLOCK
            }
            Placement::Shared => builder.push_shared(key, &self.buffer)?,
        };
        self.reset();
        Ok(offset)
    }
}

struct RelationState {
    key: RelationKey,
    num_rows: u64,
    distinct_col1: u64,
    last_col1: ValueId,
    #[cfg(feature = "expensive-checks")]
    last_tail: Vec<ValueId>,
}

enum SegmenterState {
    NoRelation,
    InRelation(RelationState),
    Finished,
}

/// Everything a finished segmenter produced.
pub struct SegmentedPermutation<S> {
    pub name: String,
    pub tail_width: usize,
    pub blocks: Vec<BlockMetadata>,
    pub relations: Vec<RelationMetadata>,
    pub sink: S,
}

impl<S> SegmentedPermutation<S> {
    pub fn num_rows(&self) -> u64 {
        self.relations.iter().map(|r| r.num_rows).sum()
    }

    pub fn catalog(&self) -> PermutationCatalog {
        PermutationCatalog::new(
            self.name.clone(),
            self.tail_width,
            self.blocks.clone(),
            self.relations.clone(),
        )
    }

    pub fn into_catalog(self) -> (PermutationCatalog, S) {
        let catalog =
            PermutationCatalog::new(self.name, self.tail_width, self.blocks, self.relations);
        (catalog, self.sink)
    }
}

pub struct RelationSegmenter<S> {
    name: String,
    builder: BlockBuilder<S>,
    tails: RelationTailAccumulator,
    state: SegmenterState,
    relations: Vec<RelationMetadata>,
    rows_seen: u64,
}

impl<S: BlockSink> RelationSegmenter<S> {
    /// `capacity` is the block capacity in rows.
    pub fn new(
        sink: S,
        name: impl Into<String>,
        tail_width: usize,
        capacity: usize,
        budget: &MemoryBudgetImpl,
    ) -> Result<Self> {
        let builder = BlockBuilder::new(sink, tail_width, capacity, budget)?;
        Ok(Self {
            name: name.into(),
            tails: RelationTailAccumulator::new(tail_width, capacity, budget)?,
            builder,
            state: SegmenterState::NoRelation,
            relations: Vec::new(),
            rows_seen: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tail_width(&self) -> usize {
        self.builder.tail_width()
    }

    /// Relations closed so far.
    pub fn relations(&self) -> &[RelationMetadata] {
        &self.relations
    }

    pub fn push(&mut self, key: RelationKey, tail: &[ValueId]) -> Result<()> {
        if tail.len() != self.builder.tail_width() || tail.is_empty() {
            return Err(Error::Invariant(format!(
                "{}: row {} for relation {key} has {} tail columns, expected {}",
                self.name,
                self.rows_seen,
                tail.len(),
                self.builder.tail_width()
            ))
            .into());
        }
        let state = std::mem::replace(&mut self.state, SegmenterState::NoRelation);
        let mut current = match state {
            SegmenterState::Finished => {
                self.state = SegmenterState::Finished;
                return Err(Error::Invariant(format!(
                    "{}: push after finish (relation {key})",
                    self.name
                ))
                .into());
            }
            SegmenterState::InRelation(rel) if rel.key == key => {
                #[cfg(feature = "expensive-checks")]
                self.check_order(&rel, key, tail)?;
                rel
            }
            SegmenterState::InRelation(rel) => {
                #[cfg(feature = "expensive-checks")]
                self.check_order(&rel, key, tail)?;
                self.close(rel)?;
                self.open(key, tail)
            }
            SegmenterState::NoRelation => self.open(key, tail),
        };

        if current.num_rows > 0 && tail[0] != current.last_col1 {
            current.distinct_col1 += 1;
        }
        current.last_col1 = tail[0];
        current.num_rows += 1;
        #[cfg(feature = "expensive-checks")]
        {
            current.last_tail.clear();
            current.last_tail.extend_from_slice(tail);
        }
        self.rows_seen += 1;
        self.tails.push(key, tail, &mut self.builder)?;
        self.state = SegmenterState::InRelation(current);
        Ok(())
    }

    /// Split a full tuple into its key (first column) and tail.
    pub fn push_tuple(&mut self, tuple: &[ValueId]) -> Result<()> {
        match tuple.split_first() {
            Some((key, tail)) => self.push(*key, tail),
            None => Err(Error::Invariant(format!("{}: empty tuple", self.name)).into()),
        }
    }

    /// Push every row of a table of full tuples.
    pub fn push_table(&mut self, table: &IdTable) -> Result<()> {
        for row in table.rows() {
            self.push_tuple(row)?;
        }
        Ok(())
    }

    fn open(&self, key: RelationKey, tail: &[ValueId]) -> RelationState {
        RelationState {
            key,
            num_rows: 0,
            distinct_col1: 1,
            last_col1: tail[0],
            #[cfg(feature = "expensive-checks")]
            last_tail: Vec::with_capacity(tail.len()),
        }
    }

    #[cfg(feature = "expensive-checks")]
    fn check_order(&self, rel: &RelationState, key: RelationKey, tail: &[ValueId]) -> Result<()> {
        let previous = (rel.key, rel.last_tail.as_slice());
        if (key, tail) < previous {
            return Err(Error::Invariant(format!(
                "{}: input not sorted at row {} (relation {key} after relation {})",
                self.name, self.rows_seen, rel.key
            ))
            .into());
        }
        Ok(())
    }

    fn close(&mut self, rel: RelationState) -> Result<()> {
        let offset_in_block = self.tails.close(rel.key, &mut self.builder)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            key = %rel.key,
            rows = rel.num_rows,
            distinct = rel.distinct_col1,
            shared = offset_in_block != NOT_IN_SHARED_BLOCK,
            "relation closed"
        );
        self.relations.push(RelationMetadata {
            key: rel.key,
            num_rows: rel.num_rows,
            multiplicity_col1: multiplicity(rel.num_rows, rel.distinct_col1),
            // Filled in by the pair writer from the twin permutation.
            multiplicity_col2: 1.0,
            offset_in_block,
        });
        Ok(())
    }

    /// Close the last relation and flush the remaining shared rows.
    pub fn finish(mut self) -> Result<SegmentedPermutation<S>> {
        let state = std::mem::replace(&mut self.state, SegmenterState::Finished);
        if let SegmenterState::InRelation(rel) = state {
            self.close(rel)?;
        }
        self.builder.finish()?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            permutation = %self.name,
            rows = self.rows_seen,
            relations = self.relations.len(),
            blocks = self.builder.blocks().len(),
            "permutation segmented"
        );
        let tail_width = self.builder.tail_width();
        let (blocks, sink) = self.builder.into_parts();
        Ok(SegmentedPermutation {
            name: self.name,
            tail_width,
            blocks,
            relations: self.relations,
            sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tristore_core::block::BlockSource;
    use tristore_io::MemoryBlockStore;

    fn id(v: u64) -> ValueId {
        ValueId::new(v)
    }

    fn segmenter(capacity: usize) -> (RelationSegmenter<MemoryBlockStore>, MemoryBlockStore) {
        let store = MemoryBlockStore::new();
        let seg = RelationSegmenter::new(
            store.clone(),
            "pso",
            2,
            capacity,
            &MemoryBudgetImpl::unbounded(),
        )
        .expect("segmenter");
        (seg, store)
    }

    #[test]
    fn multiplicity_of_a_repeated_first_column() {
        let (mut seg, _) = segmenter(100);
        for c1 in [1u64, 1, 2, 2, 2, 3, 3, 3, 3, 3] {
            seg.push(id(5), &[id(c1), id(9)]).expect("push");
        }
        let out = seg.finish().expect("finish");
        assert_eq!(out.relations.len(), 1);
        let rel = &out.relations[0];
        assert_eq!(rel.num_rows, 10);
        assert_eq!(rel.multiplicity_col1, (10.0f64 / 3.0) as f32);
        assert!(!rel.is_functional());
        assert_eq!(rel.offset_in_block, 0);
    }

    #[test]
    fn functional_relations_have_multiplicity_one() {
        let (mut seg, _) = segmenter(100);
        for c1 in 1..=4u64 {
            seg.push(id(2), &[id(c1), id(c1)]).expect("push");
        }
        let out = seg.finish().expect("finish");
        assert!(out.relations[0].is_functional());
        assert_eq!(out.relations[0].multiplicity_col1, 1.0);
    }

    #[test]
    fn small_relations_get_offsets_and_large_ones_the_sentinel() {
        let (mut seg, store) = segmenter(4);
        seg.push_tuple(&[id(1), id(1), id(1)]).expect("a");
        seg.push_tuple(&[id(1), id(2), id(1)]).expect("a");
        seg.push_tuple(&[id(2), id(3), id(1)]).expect("b");
        for c1 in 0..9u64 {
            seg.push_tuple(&[id(3), id(c1), id(0)]).expect("c");
        }
        seg.push_tuple(&[id(4), id(7), id(7)]).expect("d");
        let out = seg.finish().expect("finish");

        let offsets: Vec<u64> = out.relations.iter().map(|r| r.offset_in_block).collect();
        assert_eq!(offsets, vec![0, 2, NOT_IN_SHARED_BLOCK, 0]);
        // shared [1, 2], exclusive 4 + 4 + 1 for key 3, shared [4]
        assert_eq!(store.block_sizes(), vec![3, 4, 4, 1, 1]);
        assert_eq!(out.blocks[0].last_key, id(2));
        assert_eq!(out.blocks[3].first_col1, id(8));
        out.catalog().validate().expect("catalog");

        let last = store.read_block(&out.blocks[4]).expect("read");
        assert_eq!(last.row(0), &[id(7), id(7)]);
    }

    #[test]
    fn one_million_rows_become_ten_thousand_exclusive_blocks() {
        let (mut seg, store) = segmenter(100);
        for i in 0..1_000_000u64 {
            seg.push(id(42), &[id(i + 1), id(1)]).expect("push");
        }
        let out = seg.finish().expect("finish");
        assert_eq!(out.blocks.len(), 10_000);
        assert_eq!(store.num_blocks(), 10_000);
        assert!(out.blocks.iter().all(|b| b.num_rows == 100 && b.spans_single_key()));
        assert_eq!(out.relations.len(), 1);
        assert_eq!(out.relations[0].offset_in_block, NOT_IN_SHARED_BLOCK);
        assert_eq!(out.relations[0].num_rows, 1_000_000);
        assert!(out.relations[0].is_functional());
    }

    #[test]
    fn relation_of_exactly_capacity_rows_is_exclusive() {
        let (mut seg, store) = segmenter(3);
        seg.push_tuple(&[id(1), id(1), id(1)]).expect("a");
        for c1 in 0..3u64 {
            seg.push_tuple(&[id(2), id(c1), id(0)]).expect("b");
        }
        let out = seg.finish().expect("finish");
        assert_eq!(store.block_sizes(), vec![1, 3]);
        assert_eq!(out.relations[1].offset_in_block, NOT_IN_SHARED_BLOCK);
    }

    #[test]
    fn empty_input_yields_an_empty_permutation() {
        let (seg, store) = segmenter(8);
        let out = seg.finish().expect("finish");
        assert!(out.blocks.is_empty() && out.relations.is_empty());
        assert_eq!(store.num_blocks(), 0);
        out.catalog().validate().expect("empty catalog is valid");
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let (mut seg, _) = segmenter(8);
        assert!(seg.push(id(1), &[id(1)]).is_err());
        assert!(seg.push_tuple(&[]).is_err());
        let table = IdTable::from_rows(3, &[[1u64, 2, 3], [1, 2, 4]]).expect("table");
        seg.push_table(&table).expect("table");
        assert_eq!(seg.finish().expect("finish").num_rows(), 2);
    }

    #[cfg(feature = "expensive-checks")]
    #[test]
    fn unsorted_input_is_an_invariant_error() {
        let (mut seg, _) = segmenter(8);
        seg.push(id(2), &[id(5), id(0)]).expect("push");
        let err = seg.push(id(2), &[id(4), id(0)]).expect_err("unsorted");
        assert!(err.to_string().contains("relation ValueId(2)"));
        assert!(err.to_string().contains("row 1"));
    }
}
