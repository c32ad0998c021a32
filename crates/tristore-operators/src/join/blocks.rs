//! Block-wise merge join over two lazily produced, sorted block sequences.
//!
//! Each round picks a frontier, the smaller of the two last buffered join
//! keys. Blocks are pulled until every row with a key at or below the
//! frontier is buffered on both sides, and those rows are zipper-joined and
//! released. Memory therefore stays bounded by the blocks spanning one key
//! group plus one block per side.

use std::cmp::Ordering;
use std::collections::VecDeque;

use tristore_core::cancel::CancellationHandle;
use tristore_core::id::ValueId;
use tristore_core::table::{compare_on, IdTable};
use tristore_core::vocab::LocalVocab;

use super::row_adder::CombinedRowAdder;
use super::zipper::{zipper_join, UndefPolicy};
use super::JoinBlock;
use crate::error::Result;

struct Side<I> {
    input: I,
    buffered: VecDeque<JoinBlock>,
    exhausted: bool,
    name: &'static str,
}

/// Number of leading rows whose key is `<= frontier`.
fn rows_through(table: &IdTable, frontier: &[ValueId], key_cols: &[usize]) -> usize {
    let (mut lo, mut hi) = (0, table.num_rows());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if compare_on(table.row(mid), frontier, key_cols) == Ordering::Greater {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

impl<I> Side<I>
where
    I: Iterator<Item = Result<JoinBlock>>,
{
    fn new(input: I, name: &'static str) -> Self {
        Self {
            input,
            buffered: VecDeque::new(),
            exhausted: false,
            name,
        }
    }

    /// Buffer the next non-empty block. `false` once the input is drained.
    fn pull(&mut self, cancel: &CancellationHandle) -> Result<bool> {
        while !self.exhausted {
            cancel.check(self.name)?;
            match self.input.next() {
                None => self.exhausted = true,
                Some(block) => {
                    let block = block?;
                    if !block.table.is_empty() {
                        self.buffered.push_back(block);
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    fn is_done(&self) -> bool {
        self.exhausted && self.buffered.is_empty()
    }

    fn last_key(&self, num_join_cols: usize) -> Option<Vec<ValueId>> {
        self.buffered
            .back()
            .and_then(|b| b.table.last_row())
            .map(|r| r[..num_join_cols].to_vec())
    }

    /// Pull until the last buffered key is past `frontier`.
    fn complete_group(
        &mut self,
        frontier: &[ValueId],
        key_cols: &[usize],
        cancel: &CancellationHandle,
    ) -> Result<()> {
        while !self.exhausted {
            let past = self
                .buffered
                .back()
                .and_then(|b| b.table.last_row())
                .is_some_and(|r| compare_on(r, frontier, key_cols) == Ordering::Greater);
            if past || !self.pull(cancel)? {
                break;
            }
        }
        Ok(())
    }

    /// Remove the buffered rows with key `<= frontier` (all rows for
    /// `None`), with the vocabularies of the blocks they came from.
    fn take_through(
        &mut self,
        frontier: Option<&[ValueId]>,
        key_cols: &[usize],
    ) -> Result<(IdTable, LocalVocab)> {
        let width = self.buffered.front().map_or(0, |b| b.table.num_columns());
        let mut rows = IdTable::new(width);
        let mut vocab = LocalVocab::empty();
        while let Some(front) = self.buffered.front_mut() {
            let n = front.table.num_rows();
            let take = frontier.map_or(n, |f| rows_through(&front.table, f, key_cols));
            if take == 0 {
                break;
            }
            vocab.merge_from(&front.vocab);
            if take == n {
                rows.extend_from(&front.table)?;
                self.buffered.pop_front();
            } else {
                rows.extend_from(&front.table.slice(0, take))?;
                front.table.drop_front(take);
                break;
            }
        }
        Ok((rows, vocab))
    }
}

/// Join two canonical block sequences, each sorted on its first
/// `num_join_cols` columns. Cancellation is checked once per pulled block.
pub fn block_join<L, R, F>(
    left: L,
    right: R,
    num_join_cols: usize,
    policies: [UndefPolicy; 2],
    cancel: &CancellationHandle,
    adder: &mut CombinedRowAdder<F>,
) -> Result<()>
where
    L: Iterator<Item = Result<JoinBlock>>,
    R: Iterator<Item = Result<JoinBlock>>,
    F: FnMut(IdTable, LocalVocab) -> Result<()>,
{
    let key_cols: Vec<usize> = (0..num_join_cols).collect();
    let mut left = Side::new(left, "left join input");
    let mut right = Side::new(right, "right join input");
    left.pull(cancel)?;
    right.pull(cancel)?;

    let mut rounds = 0usize;
    while !left.is_done() && !right.is_done() {
        let frontier = match (
            left.exhausted,
            right.exhausted,
            left.last_key(num_join_cols),
            right.last_key(num_join_cols),
        ) {
            (true, true, _, _) => None,
            (false, true, Some(l), _) => Some(l),
            (true, false, _, Some(r)) => Some(r),
            (false, false, Some(l), Some(r)) => Some(l.min(r)),
            // A live side with nothing buffered: refill and retry.
            _ => {
                if left.buffered.is_empty() {
                    left.pull(cancel)?;
                }
                if right.buffered.is_empty() {
                    right.pull(cancel)?;
                }
                continue;
            }
        };

        if let Some(f) = &frontier {
            left.complete_group(f, &key_cols, cancel)?;
            right.complete_group(f, &key_cols, cancel)?;
        }
        let (lrows, lvocab) = left.take_through(frontier.as_deref(), &key_cols)?;
        let (rrows, rvocab) = right.take_through(frontier.as_deref(), &key_cols)?;
        adder.set_input_vocabs(&lvocab, &rvocab);
        zipper_join(&lrows, &rrows, num_join_cols, policies, adder)?;
        rounds += 1;

        if frontier.is_none() {
            break;
        }
        if left.buffered.is_empty() {
            left.pull(cancel)?;
        }
        if right.buffered.is_empty() {
            right.pull(cancel)?;
        }
    }
    #[cfg(feature = "tracing")]
    tracing::trace!(rounds, "block join drained");
    #[cfg(not(feature = "tracing"))]
    let _ = rounds;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpError;
    use crate::join::zipper_join;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tristore_core::vocab::LocalVocabBuilder;
    use tristore_mem::MemoryBudgetImpl;

    type Collect<'a> = Box<dyn FnMut(IdTable, LocalVocab) -> Result<()> + 'a>;

    fn sorted_table(rng: &mut StdRng, rows: usize, keys: u64) -> IdTable {
        let mut data: Vec<[u64; 2]> = (0..rows)
            .map(|i| [rng.gen_range(0..keys), i as u64])
            .collect();
        data.sort();
        IdTable::from_rows(2, &data).expect("rows")
    }

    fn split(table: &IdTable, sizes: &mut StdRng, tag: &str) -> Vec<Result<JoinBlock>> {
        let mut blocks = Vec::new();
        let mut start = 0;
        while start < table.num_rows() {
            let len = sizes.gen_range(0..5);
            let mut vocab = LocalVocabBuilder::new();
            vocab.add(format!("{tag}{start}"));
            blocks.push(Ok(JoinBlock::new(
                table.slice(start, start + len),
                vocab.finalize(),
            )));
            start += len;
        }
        blocks
    }

    fn run_zipper(left: &IdTable, right: &IdTable) -> IdTable {
        let mut adder = CombinedRowAdder::new(
            1,
            3,
            usize::MAX,
            &MemoryBudgetImpl::unbounded(),
            CancellationHandle::new(),
            |_: IdTable, _: LocalVocab| -> Result<()> { Ok(()) },
        );
        zipper_join(left, right, 1, [UndefPolicy::SkipUndefined; 2], &mut adder).expect("zipper");
        adder.into_parts().0
    }

    #[test]
    fn matches_the_zipper_over_whole_inputs() {
        let mut rng = StdRng::seed_from_u64(42);
        for round in 0..20 {
            let left = sorted_table(&mut rng, 40, 12);
            let right = sorted_table(&mut rng, 60, 12);
            let expected = run_zipper(&left, &right);

            let mut chunks: Vec<(IdTable, LocalVocab)> = Vec::new();
            let flush: Collect<'_> = Box::new(|t, v| {
                chunks.push((t, v));
                Ok(())
            });
            let mut adder = CombinedRowAdder::new(
                1,
                3,
                7,
                &MemoryBudgetImpl::unbounded(),
                CancellationHandle::new(),
                flush,
            );
            block_join(
                split(&left, &mut rng, "l").into_iter(),
                split(&right, &mut rng, "r").into_iter(),
                1,
                [UndefPolicy::SkipUndefined; 2],
                &CancellationHandle::new(),
                &mut adder,
            )
            .expect("block join");
            adder.finish().expect("finish");

            let mut joined = IdTable::new(3);
            for (i, (chunk, vocab)) in chunks.iter().enumerate() {
                if i + 1 < chunks.len() {
                    assert_eq!(chunk.num_rows(), 7, "round {round}");
                }
                assert!(!vocab.is_empty());
                joined.extend_from(chunk).expect("extend");
            }
            assert_eq!(joined, expected, "round {round}");
        }
    }

    #[test]
    fn one_key_spanning_many_blocks() {
        let left: Vec<Result<JoinBlock>> = (0..5)
            .map(|i| Ok(JoinBlock::without_vocab(
                IdTable::from_rows(2, &[[7, i], [7, i + 100]]).expect("rows"),
            )))
            .collect();
        let right = vec![Ok(JoinBlock::without_vocab(
            IdTable::from_rows(2, &[[7, 1], [8, 2]]).expect("rows"),
        ))];
        let mut adder = CombinedRowAdder::new(
            1,
            3,
            usize::MAX,
            &MemoryBudgetImpl::unbounded(),
            CancellationHandle::new(),
            |_: IdTable, _: LocalVocab| -> Result<()> { Ok(()) },
        );
        block_join(
            left.into_iter(),
            right.into_iter(),
            1,
            [UndefPolicy::NeverUndefined; 2],
            &CancellationHandle::new(),
            &mut adder,
        )
        .expect("join");
        assert_eq!(adder.pending_rows(), 10);
    }

    #[test]
    fn cancellation_is_seen_per_block_and_input_errors_propagate() {
        let cancel = CancellationHandle::new();
        cancel.cancel();
        let block = || Ok(JoinBlock::without_vocab(IdTable::from_rows(2, &[[1, 1]]).expect("rows")));
        let mut adder = CombinedRowAdder::new(
            1,
            3,
            usize::MAX,
            &MemoryBudgetImpl::unbounded(),
            CancellationHandle::new(),
            |_: IdTable, _: LocalVocab| -> Result<()> { Ok(()) },
        );
        let err = block_join(
            std::iter::once(block()),
            std::iter::once(block()),
            1,
            [UndefPolicy::NeverUndefined; 2],
            &cancel,
            &mut adder,
        )
        .expect_err("cancelled");
        assert!(err.is_cancelled());

        let failing = vec![block(), Err(OpError::Exec("scan failed".into()))];
        let err = block_join(
            failing.into_iter(),
            vec![block(), block()].into_iter(),
            1,
            [UndefPolicy::NeverUndefined; 2],
            &CancellationHandle::new(),
            &mut adder,
        )
        .expect_err("input error");
        assert!(err.to_string().contains("scan failed"));
    }
}
