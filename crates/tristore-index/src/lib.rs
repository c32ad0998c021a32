#![forbid(unsafe_code)]
//! tristore-index: turns a sorted tuple stream into permutation blocks and a
//! relation catalog, and replays those blocks at query time.
//!
//! Write path: [`RelationSegmenter`] cuts the stream into relations and
//! decides where each one lives, [`BlockBuilder`] packs the rows into
//! blocks and hands them to a [`BlockSink`](tristore_core::block::BlockSink).
//! [`PermutationPairWriter`] drives a permutation and its twin in one pass,
//! [`PermutationBuilder`] adds the sort in front of it.
//!
//! Read path: [`PermutationScan`] walks the catalog and yields the tail rows
//! of a key or a key range.

pub mod block_builder;
pub mod builder;
pub mod error;
pub mod pair;
pub mod rewriter;
pub mod scan;
pub mod segmenter;

pub use block_builder::BlockBuilder;
pub use builder::{BuildStats, PermutationBuilder};
pub use error::{IndexError, Result};
pub use pair::{PermutationPair, PermutationPairWriter};
pub use rewriter::PermutationRewriter;
pub use scan::{PermutationScan, RelationBlocks, RelationSlice, ScanProgress};
pub use segmenter::{RelationSegmenter, SegmentedPermutation};
