//! Result accumulator shared by every join algorithm.
//!
//! Rows are assembled in canonical layout and handed to a flush callback
//! once `chunk_size` of them have piled up. The local vocabularies of the
//! input blocks a chunk's rows came from travel with the chunk.

use tristore_core::cancel::CancellationHandle;
use tristore_core::id::ValueId;
use tristore_core::table::IdTable;
use tristore_core::vocab::LocalVocab;
use tristore_mem::{MemoryBudgetImpl, Reservation};

use crate::error::Result;

pub struct CombinedRowAdder<F> {
    num_join_cols: usize,
    result: IdTable,
    vocab: LocalVocab,
    left_vocab: LocalVocab,
    right_vocab: LocalVocab,
    inputs_touched: bool,
    chunk_size: usize,
    reservation: Reservation,
    cancel: CancellationHandle,
    flush: F,
    rows_flushed: u64,
}

impl<F> CombinedRowAdder<F>
where
    F: FnMut(IdTable, LocalVocab) -> Result<()>,
{
    /// `num_columns` is the canonical result width.
    pub fn new(
        num_join_cols: usize,
        num_columns: usize,
        chunk_size: usize,
        budget: &MemoryBudgetImpl,
        cancel: CancellationHandle,
        flush: F,
    ) -> Self {
        Self {
            num_join_cols,
            result: IdTable::new(num_columns),
            vocab: LocalVocab::empty(),
            left_vocab: LocalVocab::empty(),
            right_vocab: LocalVocab::empty(),
            inputs_touched: false,
            chunk_size: chunk_size.max(1),
            reservation: Reservation::empty(budget, "join_result"),
            cancel,
            flush,
            rows_flushed: 0,
        }
    }

    /// Vocabularies of the input blocks the next rows are built from.
    pub fn set_input_vocabs(&mut self, left: &LocalVocab, right: &LocalVocab) {
        self.left_vocab = left.clone();
        self.right_vocab = right.clone();
        self.inputs_touched = false;
    }

    pub fn num_join_cols(&self) -> usize {
        self.num_join_cols
    }

    /// Rows accumulated since the last flush.
    pub fn pending_rows(&self) -> usize {
        self.result.num_rows()
    }

    pub fn rows_flushed(&self) -> u64 {
        self.rows_flushed
    }

    /// Append the join of two canonical rows that agree on the join columns.
    pub fn add_row(&mut self, left: &[ValueId], right: &[ValueId]) -> Result<()> {
        let k = self.num_join_cols;
        let mut row = Vec::with_capacity(self.result.num_columns());
        row.extend(
            left[..k]
                .iter()
                .zip(&right[..k])
                .map(|(l, r)| l.merge_join_value(*r)),
        );
        row.extend_from_slice(&left[k..]);
        row.extend_from_slice(&right[k..]);
        self.result.push_row(&row)?;
        self.reservation.ensure(self.result.size_bytes())?;

        if !self.inputs_touched {
            self.vocab.merge_from(&self.left_vocab);
            self.vocab.merge_from(&self.right_vocab);
            self.inputs_touched = true;
        }
        if self.result.num_rows() >= self.chunk_size {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<()> {
        self.cancel.check("join chunk")?;
        let width = self.result.num_columns();
        let chunk = std::mem::replace(&mut self.result, IdTable::with_capacity(width, 0));
        let vocab = std::mem::take(&mut self.vocab);
        self.inputs_touched = false;
        self.rows_flushed += chunk.num_rows() as u64;
        (self.flush)(chunk, vocab)?;
        self.reservation.shrink_to(0);
        Ok(())
    }

    /// Flush whatever is left, unless nothing is.
    pub fn finish(mut self) -> Result<u64> {
        if !self.result.is_empty() {
            self.flush_chunk()?;
        }
        Ok(self.rows_flushed)
    }

    /// Unflushed rows and their vocabulary, for callers that never flush.
    pub fn into_parts(self) -> (IdTable, LocalVocab) {
        (self.result, self.vocab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tristore_core::budget::MemoryBudget;
    use tristore_core::vocab::LocalVocabBuilder;

    fn vocab(word: &str) -> LocalVocab {
        let mut b = LocalVocabBuilder::new();
        b.add(word);
        b.finalize()
    }

    fn ids(values: &[u64]) -> Vec<ValueId> {
        values.iter().copied().map(ValueId::new).collect()
    }

    #[test]
    fn chunks_are_flushed_at_the_threshold() {
        let mut chunks = Vec::new();
        let budget = MemoryBudgetImpl::unbounded();
        let mut adder = CombinedRowAdder::new(
            1,
            3,
            2,
            &budget,
            CancellationHandle::new(),
            |t: IdTable, v: LocalVocab| {
                chunks.push((t, v));
                Ok(())
            },
        );
        adder.set_input_vocabs(&vocab("a"), &LocalVocab::empty());
        adder.add_row(&ids(&[1, 10]), &ids(&[1, 20])).expect("row");
        adder.add_row(&ids(&[1, 11]), &ids(&[1, 21])).expect("row");
        adder.set_input_vocabs(&vocab("b"), &vocab("c"));
        adder.add_row(&ids(&[2, 12]), &ids(&[0, 22])).expect("row");
        assert_eq!(adder.finish().expect("finish"), 3);
        assert_eq!(budget.used_bytes(), 0);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0.num_rows(), 2);
        assert_eq!(chunks[0].0.row(1), ids(&[1, 11, 21]).as_slice());
        assert!(chunks[0].1.contains("a") && !chunks[0].1.contains("b"));
        // Undefined on the right merges to the defined left value.
        assert_eq!(chunks[1].0.row(0), ids(&[2, 12, 22]).as_slice());
        assert!(chunks[1].1.contains("b") && chunks[1].1.contains("c"));
        assert!(!chunks[1].1.contains("a"));
    }

    #[test]
    fn cancellation_stops_at_the_next_chunk() {
        let cancel = CancellationHandle::new();
        let mut adder = CombinedRowAdder::new(
            1,
            2,
            1,
            &MemoryBudgetImpl::unbounded(),
            cancel.clone(),
            |_: IdTable, _: LocalVocab| Ok(()),
        );
        adder.add_row(&ids(&[1, 2]), &ids(&[1])).expect("row");
        cancel.cancel();
        let err = adder.add_row(&ids(&[1, 3]), &ids(&[1])).expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[test]
    fn result_growth_is_budgeted() {
        let budget = MemoryBudgetImpl::new(40);
        let mut adder = CombinedRowAdder::new(
            1,
            2,
            usize::MAX,
            &budget,
            CancellationHandle::new(),
            |_: IdTable, _: LocalVocab| Ok(()),
        );
        adder.add_row(&ids(&[1, 2]), &ids(&[1])).expect("16 bytes");
        adder.add_row(&ids(&[1, 3]), &ids(&[1])).expect("32 bytes");
        let err = adder.add_row(&ids(&[1, 4]), &ids(&[1])).expect_err("48 bytes");
        assert!(matches!(
            err,
            crate::OpError::Mem(tristore_mem::error::Error::BudgetExceeded { .. })
        ));
    }
}
