//! Uncompressed in-process block store.
//!
//! Serves as both sink and source, so an index can be built and scanned
//! without touching storage. The block "offset" is its index in write order.

use std::sync::Arc;

use parking_lot::RwLock;
use tristore_core::block::{describe_block, BlockSink, BlockSource};
use tristore_core::error::{Error, Result};
use tristore_core::hash::Hash256;
use tristore_core::id::RelationKey;
use tristore_core::metadata::BlockMetadata;
use tristore_core::table::IdTable;

/// Clones share the same blocks.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<RwLock<Vec<IdTable>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.read().len()
    }

    /// Row counts per block in write order.
    pub fn block_sizes(&self) -> Vec<usize> {
        self.blocks.read().iter().map(IdTable::num_rows).collect()
    }
}

impl BlockSink for MemoryBlockStore {
    fn write_block(
        &mut self,
        first_key: RelationKey,
        last_key: RelationKey,
        tails: &IdTable,
    ) -> Result<BlockMetadata> {
        let mut blocks = self.blocks.write();
        let meta = describe_block(
            first_key,
            last_key,
            tails,
            blocks.len() as u64,
            tails.size_bytes() as u64,
            Hash256::ZERO,
        )?;
        blocks.push(tails.clone());
        Ok(meta)
    }
}

impl BlockSource for MemoryBlockStore {
    fn read_block(&self, meta: &BlockMetadata) -> Result<IdTable> {
        let blocks = self.blocks.read();
        let block = blocks.get(meta.offset as usize).ok_or_else(|| {
            Error::Corrupt(format!(
                "no block at index {} ({} stored)",
                meta.offset,
                blocks.len()
            ))
        })?;
        if block.num_rows() as u64 != meta.num_rows {
            return Err(Error::Corrupt(format!(
                "block {} has {} rows, metadata says {}",
                meta.offset,
                block.num_rows(),
                meta.num_rows
            )));
        }
        Ok(block.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tristore_core::id::ValueId;

    #[test]
    fn offsets_are_block_indices() {
        let mut store = MemoryBlockStore::new();
        let reader = store.clone();
        let a = IdTable::from_rows(2, &[[1, 1], [2, 2]]).expect("rows");
        let b = IdTable::from_rows(2, &[[3, 3]]).expect("rows");
        let ma = store
            .write_block(ValueId::new(1), ValueId::new(1), &a)
            .expect("a");
        let mb = store
            .write_block(ValueId::new(2), ValueId::new(4), &b)
            .expect("b");
        assert_eq!((ma.offset, mb.offset), (0, 1));
        assert_eq!(reader.block_sizes(), vec![2, 1]);
        assert_eq!(reader.read_block(&mb).expect("read"), b);

        let mut bogus = mb.clone();
        bogus.offset = 7;
        assert!(reader.read_block(&bogus).is_err());
    }
}
