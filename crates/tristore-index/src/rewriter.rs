//! Derives the twin permutation from a stream sorted for the first one.
//!
//! Both permutations of a pair share the relation key and differ only in
//! the order of the two tail columns. So the input is already grouped by
//! relation in the right order, and only the rows inside each relation have
//! to be re-sorted by the swapped tail before they reach the twin's
//! segmenter.

use tristore_core::block::BlockSink;
use tristore_core::id::{RelationKey, ValueId};
use tristore_operators::{BackgroundExternalSorter, NaturalOrder};

use crate::error::Result;
use crate::segmenter::{RelationSegmenter, SegmentedPermutation};

pub struct PermutationRewriter<S> {
    sorter: BackgroundExternalSorter<[ValueId; 2], NaturalOrder>,
    downstream: RelationSegmenter<S>,
    current: Option<RelationKey>,
    relations_rewritten: u64,
}

impl<S: BlockSink> PermutationRewriter<S> {
    /// `downstream` must have a tail width of 2.
    pub fn new(
        sorter: BackgroundExternalSorter<[ValueId; 2], NaturalOrder>,
        downstream: RelationSegmenter<S>,
    ) -> Self {
        Self {
            sorter,
            downstream,
            current: None,
            relations_rewritten: 0,
        }
    }

    /// Push a row in the order of the source permutation.
    pub fn push(&mut self, key: RelationKey, tail: [ValueId; 2]) -> Result<()> {
        if self.current != Some(key) {
            self.flush_relation()?;
            self.current = Some(key);
        }
        self.sorter.push([tail[1], tail[0]])?;
        Ok(())
    }

    fn flush_relation(&mut self) -> Result<()> {
        let Some(key) = self.current.take() else {
            return Ok(());
        };
        for tail in self.sorter.sort()? {
            let tail = tail?;
            self.downstream.push(key, &tail)?;
        }
        self.sorter.clear()?;
        self.relations_rewritten += 1;
        Ok(())
    }

    pub fn relations_rewritten(&self) -> u64 {
        self.relations_rewritten
    }

    /// Rewrite the last relation and finish the twin.
    pub fn finish(mut self) -> Result<SegmentedPermutation<S>> {
        self.flush_relation()?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            permutation = %self.downstream.name(),
            relations = self.relations_rewritten,
            "twin permutation rewritten"
        );
        self.downstream.finish()
    }
}
