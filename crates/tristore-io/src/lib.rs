#![forbid(unsafe_code)]
//! tristore-io: storage adapters and the persisted form of permutations.
//!
//! - `storage`: filesystem `Storage` and URI-based selection.
//! - `memory_storage`: in-process `Storage` for tests and `memory://` roots.
//! - `permutation_file`: block sink/source over one `<name>.blocks` file
//!   plus a `<name>.catalog.json`.
//! - `memory_blocks`: uncompressed in-memory block sink/source.

pub mod memory_blocks;
pub mod memory_storage;
pub mod permutation_file;
pub mod storage;

pub use memory_blocks::MemoryBlockStore;
pub use memory_storage::MemoryStorage;
pub use permutation_file::{PermutationFileReader, PermutationFileWriter};
pub use storage::{storage_for_uri, FsStorage};
