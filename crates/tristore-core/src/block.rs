//! Block sink and source seams.
//!
//! The index builder hands finished blocks to a [`BlockSink`]; query-time
//! scans pull them back through a [`BlockSource`]. Compression and storage
//! are the implementor's business.

use crate::error::{Error, Result};
use crate::hash::Hash256;
use crate::id::RelationKey;
use crate::metadata::BlockMetadata;
use crate::table::IdTable;

/// Receives every block in write order.
pub trait BlockSink {
    fn write_block(
        &mut self,
        first_key: RelationKey,
        last_key: RelationKey,
        tails: &IdTable,
    ) -> Result<BlockMetadata>;
}

impl<F> BlockSink for F
where
    F: FnMut(RelationKey, RelationKey, &IdTable) -> Result<BlockMetadata>,
{
    fn write_block(
        &mut self,
        first_key: RelationKey,
        last_key: RelationKey,
        tails: &IdTable,
    ) -> Result<BlockMetadata> {
        self(first_key, last_key, tails)
    }
}

/// Replays blocks previously written through a sink.
pub trait BlockSource: Send + Sync {
    fn read_block(&self, meta: &BlockMetadata) -> Result<IdTable>;
}

/// Metadata for a block of `tails` stored at `offset`. The primary tail
/// column bounds are taken from the first and last row.
pub fn describe_block(
    first_key: RelationKey,
    last_key: RelationKey,
    tails: &IdTable,
    offset: u64,
    compressed_size: u64,
    checksum: Hash256,
) -> Result<BlockMetadata> {
    let (first, last) = match (tails.first_row(), tails.last_row()) {
        (Some(f), Some(l)) if tails.num_columns() > 0 => (f[0], l[0]),
        _ => {
            return Err(Error::Invariant(format!(
                "refusing to describe an empty block for keys {first_key}..={last_key}"
            )))
        }
    };
    Ok(BlockMetadata {
        offset,
        compressed_size,
        num_rows: tails.num_rows() as u64,
        first_key,
        last_key,
        first_col1: first,
        last_col1: last,
        checksum,
    })
}
