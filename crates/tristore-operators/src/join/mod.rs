//! Merge-join core over the canonical "join columns first" layout.

use tristore_core::table::IdTable;
use tristore_core::vocab::LocalVocab;

pub mod blocks;
pub mod mapping;
pub mod row_adder;
pub mod zipper;

pub use blocks::block_join;
pub use mapping::JoinColumnMapping;
pub use row_adder::CombinedRowAdder;
pub use zipper::{galloping_join, zipper_join, UndefPolicy};

/// A block of rows with the local vocabulary its values may refer to.
#[derive(Debug, Clone)]
pub struct JoinBlock {
    pub table: IdTable,
    pub vocab: LocalVocab,
}

impl JoinBlock {
    pub fn new(table: IdTable, vocab: LocalVocab) -> Self {
        Self { table, vocab }
    }

    pub fn without_vocab(table: IdTable) -> Self {
        Self::new(table, LocalVocab::empty())
    }

    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }
}
