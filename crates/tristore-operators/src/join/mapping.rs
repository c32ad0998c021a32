//! Column bookkeeping between caller layouts and the canonical join layout.
//!
//! The join core expects both inputs with their join columns first, in
//! priority order, and produces rows as
//! `[join columns (merged)] [other left columns] [other right columns]`.
//! [`JoinColumnMapping`] holds the permutations into and out of that layout.

use tristore_core::error::Error;
use tristore_core::table::IdTable;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumnMapping {
    left_join_cols: Vec<usize>,
    right_join_cols: Vec<usize>,
    permutation_left: Vec<usize>,
    permutation_right: Vec<usize>,
    permutation_result: Vec<usize>,
}

fn check_side(side: &'static str, cols: &[usize], num_columns: usize) -> Result<()> {
    match cols.iter().find(|&&c| c >= num_columns) {
        Some(&column) => Err(Error::ColumnOutOfRange {
            side,
            column,
            num_columns,
        }
        .into()),
        None => Ok(()),
    }
}

/// Join columns first, then the remaining columns in original order. A
/// column used by several pairs is repeated once per pair.
fn join_columns_first(join_cols: &[usize], num_columns: usize) -> Vec<usize> {
    let mut perm = join_cols.to_vec();
    perm.extend((0..num_columns).filter(|c| !join_cols.contains(c)));
    perm
}

impl JoinColumnMapping {
    /// `pairs` are `(left column, right column)` in join priority order.
    ///
    /// The final layout is every left column followed by the right columns
    /// that are not join columns. With `keep_join_columns == false` the join
    /// columns are left out of the result entirely.
    ///
    /// Only out-of-range indices are rejected. Repeated columns express a
    /// conjunctive equality, and no pairs at all give a cross product.
    pub fn compute(
        pairs: &[(usize, usize)],
        num_left: usize,
        num_right: usize,
        keep_join_columns: bool,
    ) -> Result<Self> {
        let left_join_cols: Vec<usize> = pairs.iter().map(|p| p.0).collect();
        let right_join_cols: Vec<usize> = pairs.iter().map(|p| p.1).collect();
        check_side("left", &left_join_cols, num_left)?;
        check_side("right", &right_join_cols, num_right)?;

        let permutation_left = join_columns_first(&left_join_cols, num_left);
        let permutation_right = join_columns_first(&right_join_cols, num_right);

        // permutation_left[k + i] is the i-th non-join left column, so its
        // canonical position is k + i. Invert that for the left side; a
        // repeated join column maps from its first copy.
        let k = pairs.len();
        let mut canonical_of_left = vec![None; num_left];
        for (canonical, &original) in permutation_left.iter().enumerate() {
            canonical_of_left[original].get_or_insert(canonical);
        }
        let right_rest = permutation_right.len() - k;
        let mut permutation_result = Vec::with_capacity(num_left + right_rest);
        for (original, canonical) in canonical_of_left.iter().enumerate() {
            if keep_join_columns || !left_join_cols.contains(&original) {
                permutation_result.extend(*canonical);
            }
        }
        // Non-join right columns follow the non-join left columns.
        let right_start = permutation_left.len();
        permutation_result.extend((0..right_rest).map(|i| right_start + i));

        Ok(Self {
            left_join_cols,
            right_join_cols,
            permutation_left,
            permutation_right,
            permutation_result,
        })
    }

    pub fn num_join_columns(&self) -> usize {
        self.left_join_cols.len()
    }

    pub fn left_join_cols(&self) -> &[usize] {
        &self.left_join_cols
    }

    pub fn right_join_cols(&self) -> &[usize] {
        &self.right_join_cols
    }

    pub fn permutation_left(&self) -> &[usize] {
        &self.permutation_left
    }

    pub fn permutation_right(&self) -> &[usize] {
        &self.permutation_right
    }

    /// `permutation_result[i]` is the canonical column shown as final column `i`.
    pub fn permutation_result(&self) -> &[usize] {
        &self.permutation_result
    }

    pub fn num_result_columns(&self) -> usize {
        self.permutation_result.len()
    }

    /// Width of a canonical join row.
    pub fn num_canonical_columns(&self) -> usize {
        self.permutation_left.len() + self.permutation_right.len() - self.num_join_columns()
    }

    pub fn left_to_canonical(&self, table: &IdTable) -> Result<IdTable> {
        Ok(table.select_columns(&self.permutation_left)?)
    }

    pub fn right_to_canonical(&self, table: &IdTable) -> Result<IdTable> {
        Ok(table.select_columns(&self.permutation_right)?)
    }

    pub fn to_result(&self, canonical: &IdTable) -> Result<IdTable> {
        Ok(canonical.select_columns(&self.permutation_result)?)
    }
}
