//! Convenient re-exports for downstream crates.

pub use crate::block::{describe_block, BlockSink, BlockSource};
pub use crate::budget::{BudgetGuard, MemoryBudget};
pub use crate::cancel::CancellationHandle;
pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::id::{RelationKey, SpillId, ValueId};
pub use crate::metadata::{
    multiplicity, BlockMetadata, PermutationCatalog, RelationMetadata, NOT_IN_SHARED_BLOCK,
};
pub use crate::permutation::Permutation;
pub use crate::table::IdTable;
pub use crate::vocab::{LocalVocab, LocalVocabBuilder};
