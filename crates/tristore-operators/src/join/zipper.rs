//! In-memory merge joins over canonical tables.
//!
//! Both inputs are sorted on their first `num_join_cols` columns. Every
//! matching pair is handed to a [`CombinedRowAdder`], left-major within an
//! equal-key group.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tristore_core::id::ValueId;
use tristore_core::table::{compare_on, IdTable};
use tristore_core::vocab::LocalVocab;

use super::row_adder::CombinedRowAdder;
use crate::error::Result;

/// How a side's join columns treat the undefined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UndefPolicy {
    /// Rows with an undefined join value match nothing.
    #[default]
    SkipUndefined,
    /// The caller guarantees the join columns are never undefined.
    NeverUndefined,
}

fn has_undefined(row: &[ValueId], num_join_cols: usize) -> bool {
    row[..num_join_cols].iter().any(|v| v.is_undefined())
}

fn skip(policy: UndefPolicy, row: &[ValueId], num_join_cols: usize) -> bool {
    policy == UndefPolicy::SkipUndefined && has_undefined(row, num_join_cols)
}

/// End of the run of rows equal to row `start` on the join columns.
fn group_end(table: &IdTable, start: usize, key_cols: &[usize]) -> usize {
    let first = table.row(start);
    let mut end = start + 1;
    while end < table.num_rows() && compare_on(table.row(end), first, key_cols) == Ordering::Equal
    {
        end += 1;
    }
    end
}

/// Classic zipper join.
pub fn zipper_join<F>(
    left: &IdTable,
    right: &IdTable,
    num_join_cols: usize,
    policies: [UndefPolicy; 2],
    adder: &mut CombinedRowAdder<F>,
) -> Result<()>
where
    F: FnMut(IdTable, LocalVocab) -> Result<()>,
{
    let key_cols: Vec<usize> = (0..num_join_cols).collect();
    let (mut i, mut j) = (0, 0);
    while i < left.num_rows() && j < right.num_rows() {
        if skip(policies[0], left.row(i), num_join_cols) {
            i += 1;
            continue;
        }
        if skip(policies[1], right.row(j), num_join_cols) {
            j += 1;
            continue;
        }
        match compare_on(left.row(i), right.row(j), &key_cols) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                let (ie, je) = (group_end(left, i, &key_cols), group_end(right, j, &key_cols));
                for a in i..ie {
                    for b in j..je {
                        adder.add_row(left.row(a), right.row(b))?;
                    }
                }
                i = ie;
                j = je;
            }
        }
    }
    Ok(())
}

/// First index `>= from` whose row is not less than `key`: exponential
/// probing followed by a binary search.
fn gallop_lower_bound(table: &IdTable, from: usize, key: &[ValueId], key_cols: &[usize]) -> usize {
    let n = table.num_rows();
    let below = |idx: usize| compare_on(table.row(idx), key, key_cols) == Ordering::Less;
    if from >= n || !below(from) {
        return from;
    }
    let mut lo = from;
    let mut step = 1;
    let mut hi = from + 1;
    while hi < n && below(hi) {
        lo = hi;
        step *= 2;
        hi = from + step;
    }
    let hi = hi.min(n);
    let mut first = lo + 1;
    let mut len = hi - first;
    while len > 0 {
        let half = len / 2;
        if below(first + half) {
            first += half + 1;
            len -= half + 1;
        } else {
            len = half;
        }
    }
    first
}

/// Join for very different input sizes: walks the smaller side and gallops
/// through the larger one. Only valid when neither side has undefined join
/// values.
pub fn galloping_join<F>(
    left: &IdTable,
    right: &IdTable,
    num_join_cols: usize,
    adder: &mut CombinedRowAdder<F>,
) -> Result<()>
where
    F: FnMut(IdTable, LocalVocab) -> Result<()>,
{
    let key_cols: Vec<usize> = (0..num_join_cols).collect();
    let left_is_small = left.num_rows() <= right.num_rows();
    let (small, large) = if left_is_small {
        (left, right)
    } else {
        (right, left)
    };

    let mut i = 0;
    let mut pos = 0;
    while i < small.num_rows() && pos < large.num_rows() {
        let ie = group_end(small, i, &key_cols);
        let key = small.row(i);
        pos = gallop_lower_bound(large, pos, key, &key_cols);
        if pos < large.num_rows() && compare_on(large.row(pos), key, &key_cols) == Ordering::Equal
        {
            let pe = group_end(large, pos, &key_cols);
            if left_is_small {
                for a in i..ie {
                    for b in pos..pe {
                        adder.add_row(small.row(a), large.row(b))?;
                    }
                }
            } else {
                for a in pos..pe {
                    for b in i..ie {
                        adder.add_row(large.row(a), small.row(b))?;
                    }
                }
            }
            pos = pe;
        }
        i = ie;
    }
    Ok(())
}
