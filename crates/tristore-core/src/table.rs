//! Dense row-major table of `ValueId`s.
//!
//! Every row has exactly `num_columns` entries. This is the unit that flows
//! through block sinks, scans, the merge join and lazy join chunks. The row
//! count is stored explicitly so that a zero-width table (a join projecting
//! away every column) keeps its cardinality.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::ValueId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTable {
    num_columns: usize,
    num_rows: usize,
    data: Vec<ValueId>,
}

impl IdTable {
    pub fn new(num_columns: usize) -> Self {
        Self {
            num_columns,
            num_rows: 0,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(num_columns: usize, rows: usize) -> Self {
        Self {
            num_columns,
            num_rows: 0,
            data: Vec::with_capacity(num_columns * rows),
        }
    }

    /// Build from a flat row-major vector. Fails if the length does not
    /// divide into whole rows.
    pub fn from_flat(num_columns: usize, data: Vec<ValueId>) -> Result<Self> {
        if num_columns == 0 && !data.is_empty() {
            return Err(Error::Invariant("zero-width table with data".into()));
        }
        if num_columns > 0 && data.len() % num_columns != 0 {
            return Err(Error::Invariant(format!(
                "flat length {} is not a multiple of width {}",
                data.len(),
                num_columns
            )));
        }
        let num_rows = if num_columns == 0 {
            0
        } else {
            data.len() / num_columns
        };
        Ok(Self {
            num_columns,
            num_rows,
            data,
        })
    }

    /// Convenience for tests and small literals.
    pub fn from_rows<R: AsRef<[u64]>>(num_columns: usize, rows: &[R]) -> Result<Self> {
        let mut table = Self::with_capacity(num_columns, rows.len());
        for row in rows {
            let row = row.as_ref();
            if row.len() != num_columns {
                return Err(Error::Invariant(format!(
                    "row of width {} pushed into table of width {}",
                    row.len(),
                    num_columns
                )));
            }
            table.data.extend(row.iter().copied().map(ValueId::new));
            table.num_rows += 1;
        }
        Ok(table)
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Approximate heap footprint, used for budget accounting.
    pub fn size_bytes(&self) -> usize {
        self.data.capacity() * std::mem::size_of::<ValueId>()
    }

    pub fn row(&self, i: usize) -> &[ValueId] {
        let start = i * self.num_columns;
        &self.data[start..start + self.num_columns]
    }

    pub fn get(&self, row: usize, column: usize) -> ValueId {
        self.data[row * self.num_columns + column]
    }

    pub fn first_row(&self) -> Option<&[ValueId]> {
        (!self.is_empty()).then(|| self.row(0))
    }

    pub fn last_row(&self) -> Option<&[ValueId]> {
        (!self.is_empty()).then(|| self.row(self.num_rows() - 1))
    }

    /// Every row in order; a zero-width table yields `num_rows` empty rows.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[ValueId]> + '_ {
        (0..self.num_rows).map(move |i| self.row(i))
    }

    pub fn column(&self, column: usize) -> impl Iterator<Item = ValueId> + '_ {
        self.rows().map(move |r| r[column])
    }

    /// Append one row. The caller guarantees the width; a mismatch is a
    /// programming error and reported as an invariant failure.
    pub fn push_row(&mut self, row: &[ValueId]) -> Result<()> {
        if row.len() != self.num_columns {
            return Err(Error::Invariant(format!(
                "row of width {} pushed into table of width {}",
                row.len(),
                self.num_columns
            )));
        }
        self.data.extend_from_slice(row);
        self.num_rows += 1;
        Ok(())
    }

    /// Row assembled from parts, e.g. a relation key followed by a tail.
    pub fn push_row_parts(&mut self, head: &[ValueId], tail: &[ValueId]) -> Result<()> {
        if head.len() + tail.len() != self.num_columns {
            return Err(Error::Invariant(format!(
                "row of width {} pushed into table of width {}",
                head.len() + tail.len(),
                self.num_columns
            )));
        }
        self.data.extend_from_slice(head);
        self.data.extend_from_slice(tail);
        self.num_rows += 1;
        Ok(())
    }

    pub fn extend_from(&mut self, other: &IdTable) -> Result<()> {
        if other.num_columns != self.num_columns {
            return Err(Error::Invariant(format!(
                "cannot append table of width {} to width {}",
                other.num_columns, self.num_columns
            )));
        }
        self.data.extend_from_slice(&other.data);
        self.num_rows += other.num_rows;
        Ok(())
    }

    /// Copy of rows `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> IdTable {
        let end = end.min(self.num_rows());
        let start = start.min(end);
        IdTable {
            num_columns: self.num_columns,
            num_rows: end - start,
            data: self.data[start * self.num_columns..end * self.num_columns].to_vec(),
        }
    }

    /// Drop the first `n` rows in place.
    pub fn drop_front(&mut self, n: usize) {
        let n = n.min(self.num_rows());
        self.data.drain(..n * self.num_columns);
        self.num_rows -= n;
    }

    /// New table whose column `i` is this table's column `columns[i]`.
    ///
    /// Columns may be omitted (projection) but every index must be in range.
    pub fn select_columns(&self, columns: &[usize]) -> Result<IdTable> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.num_columns) {
            return Err(Error::ColumnOutOfRange {
                side: "table",
                column: bad,
                num_columns: self.num_columns,
            });
        }
        let mut out = IdTable::with_capacity(columns.len(), self.num_rows());
        for row in self.rows() {
            out.data.extend(columns.iter().map(|&c| row[c]));
        }
        out.num_rows = self.num_rows;
        Ok(out)
    }

    /// Stable sort of the rows by the given column priority.
    pub fn sort_by_columns(&mut self, columns: &[usize]) -> Result<()> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.num_columns) {
            return Err(Error::ColumnOutOfRange {
                side: "table",
                column: bad,
                num_columns: self.num_columns,
            });
        }
        let mut rows: Vec<&[ValueId]> = self.rows().collect();
        rows.sort_by(|a, b| compare_on(a, b, columns));
        let data = rows.into_iter().flatten().copied().collect();
        self.data = data;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.num_rows = 0;
    }

    pub fn into_flat(self) -> Vec<ValueId> {
        self.data
    }

    pub fn as_flat(&self) -> &[ValueId] {
        &self.data
    }
}

/// Lexicographic comparison of two rows restricted to `columns`.
pub fn compare_on(a: &[ValueId], b: &[ValueId], columns: &[usize]) -> Ordering {
    for &c in columns {
        match a[c].cmp(&b[c]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(row: &[ValueId]) -> Vec<u64> {
        row.iter().map(|v| v.get()).collect()
    }

    #[test]
    fn from_rows_and_access() {
        let t = IdTable::from_rows(3, &[[1, 2, 3], [4, 5, 6]]).expect("valid rows");
        assert_eq!(t.num_rows(), 2);
        assert_eq!(ids(t.row(1)), vec![4, 5, 6]);
        assert_eq!(t.get(0, 2), ValueId::new(3));
        assert_eq!(t.column(1).map(ValueId::get).collect::<Vec<_>>(), vec![2, 5]);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let mut t = IdTable::new(2);
        assert!(t.push_row(&[ValueId::new(1)]).is_err());
        assert!(IdTable::from_flat(2, vec![ValueId::new(1); 3]).is_err());
    }

    #[test]
    fn select_columns_reorders_and_projects() {
        let t = IdTable::from_rows(3, &[[1, 2, 3], [4, 5, 6]]).expect("valid rows");
        let p = t.select_columns(&[2, 0]).expect("in range");
        assert_eq!(p.num_columns(), 2);
        assert_eq!(ids(p.row(0)), vec![3, 1]);
        assert_eq!(ids(p.row(1)), vec![6, 4]);

        let err = t.select_columns(&[3]).expect_err("out of range");
        assert!(matches!(err, Error::ColumnOutOfRange { column: 3, .. }));
    }

    #[test]
    fn sort_is_stable_on_prefix() {
        let mut t =
            IdTable::from_rows(2, &[[2, 1], [1, 9], [2, 0], [1, 3]]).expect("valid rows");
        t.sort_by_columns(&[0]).expect("sort");
        let rows: Vec<Vec<u64>> = t.rows().map(ids).collect();
        assert_eq!(rows, vec![vec![1, 9], vec![1, 3], vec![2, 1], vec![2, 0]]);
    }

    #[test]
    fn slice_and_drop_front() {
        let mut t = IdTable::from_rows(1, &[[1], [2], [3], [4]]).expect("valid rows");
        assert_eq!(t.slice(1, 3).num_rows(), 2);
        assert_eq!(t.slice(3, 10).num_rows(), 1);
        t.drop_front(3);
        assert_eq!(ids(t.row(0)), vec![4]);
    }

    #[test]
    fn zero_width_tables_keep_their_row_count() {
        let t = IdTable::from_rows(1, &[[5], [5], [7]]).expect("valid rows");
        let projected = t.select_columns(&[]).expect("empty projection");
        assert_eq!(projected.num_columns(), 0);
        assert_eq!(projected.num_rows(), 3);
        assert!(!projected.is_empty());
        assert_eq!(projected.rows().len(), 3);
        assert!(projected.rows().all(|r| r.is_empty()));
        assert_eq!(projected.first_row(), Some(&[][..]));

        assert_eq!(projected.slice(1, 10).num_rows(), 2);

        let mut acc = IdTable::new(0);
        assert!(acc.is_empty());
        acc.extend_from(&projected).expect("same width");
        acc.extend_from(&projected.slice(0, 1)).expect("same width");
        acc.push_row(&[]).expect("empty row");
        assert_eq!(acc.num_rows(), 5);

        acc.drop_front(4);
        assert_eq!(acc.num_rows(), 1);
        acc.clear();
        assert!(acc.is_empty());
    }
}
