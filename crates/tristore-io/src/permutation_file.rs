//! On-disk form of one permutation.
//!
//! Blocks are appended back to back to `<dir>/<name>.blocks`; each block is
//! the row-major little-endian `u64` encoding of its tail table, compressed
//! with the file's codec. The catalog (block and relation metadata) is
//! written last to `<dir>/<name>.catalog.json`, so a permutation without a
//! catalog is an incomplete build.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tristore_core::block::{describe_block, BlockSink, BlockSource};
use tristore_core::error::{Error, Result};
use tristore_core::hash::hash_bytes;
use tristore_core::id::{RelationKey, ValueId};
use tristore_core::metadata::{BlockMetadata, PermutationCatalog};
use tristore_core::table::IdTable;
use tristore_mem::spill::codec::{compress, decompress};
use tristore_mem::{Codec, Storage};

const VALUE_BYTES: usize = std::mem::size_of::<u64>();

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    codec: Codec,
    catalog: PermutationCatalog,
}

fn blocks_path(dir: &str, name: &str) -> String {
    format!("{dir}/{name}.blocks")
}

fn catalog_path(dir: &str, name: &str) -> String {
    format!("{dir}/{name}.catalog.json")
}

fn encode(tails: &IdTable) -> Vec<u8> {
    let mut out = Vec::with_capacity(tails.as_flat().len() * VALUE_BYTES);
    for v in tails.as_flat() {
        out.extend_from_slice(&v.get().to_le_bytes());
    }
    out
}

fn decode(width: usize, bytes: &[u8]) -> Result<IdTable> {
    if bytes.len() % VALUE_BYTES != 0 {
        return Err(Error::Corrupt(format!(
            "block payload of {} bytes is not a whole number of values",
            bytes.len()
        )));
    }
    let values = bytes
        .chunks_exact(VALUE_BYTES)
        .map(|c| {
            let mut word = [0u8; VALUE_BYTES];
            word.copy_from_slice(c);
            ValueId::new(u64::from_le_bytes(word))
        })
        .collect();
    IdTable::from_flat(width, values)
}

/// Appends blocks for one permutation and finally persists its catalog.
pub struct PermutationFileWriter {
    storage: Arc<dyn Storage>,
    dir: String,
    name: String,
    tail_width: usize,
    codec: Codec,
    blocks_written: usize,
}

impl PermutationFileWriter {
    /// Truncates any previous `<name>.blocks` under `dir`.
    pub fn create(
        storage: Arc<dyn Storage>,
        dir: impl Into<String>,
        name: impl Into<String>,
        tail_width: usize,
        codec: Codec,
    ) -> Result<Self> {
        let dir = dir.into();
        let name = name.into();
        if tail_width == 0 {
            return Err(Error::Config("permutation tail width must be > 0".into()));
        }
        if !codec.is_available() {
            return Err(Error::Config(format!("codec {codec:?} is not compiled in")));
        }
        storage.write(&blocks_path(&dir, &name), &[])?;
        Ok(Self {
            storage,
            dir,
            name,
            tail_width,
            codec,
            blocks_written: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Write the catalog next to the block file. The catalog must describe
    /// this writer's blocks.
    pub fn finish(self, catalog: &PermutationCatalog) -> Result<()> {
        if catalog.blocks.len() != self.blocks_written {
            return Err(Error::Invariant(format!(
                "catalog for '{}' lists {} blocks, {} were written",
                self.name,
                catalog.blocks.len(),
                self.blocks_written
            )));
        }
        if catalog.tail_width != self.tail_width {
            return Err(Error::Invariant(format!(
                "catalog tail width {} does not match file width {}",
                catalog.tail_width, self.tail_width
            )));
        }
        let file = CatalogFile {
            codec: self.codec,
            catalog: catalog.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        self.storage
            .write(&catalog_path(&self.dir, &self.name), &bytes)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            permutation = %self.name,
            blocks = self.blocks_written,
            rows = catalog.num_rows(),
            "permutation file finished"
        );
        Ok(())
    }
}

impl BlockSink for PermutationFileWriter {
    fn write_block(
        &mut self,
        first_key: RelationKey,
        last_key: RelationKey,
        tails: &IdTable,
    ) -> Result<BlockMetadata> {
        if tails.num_columns() != self.tail_width {
            return Err(Error::Invariant(format!(
                "block of width {} written to permutation of width {}",
                tails.num_columns(),
                self.tail_width
            )));
        }
        let payload = compress(self.codec, &encode(tails))?;
        let offset = self
            .storage
            .append(&blocks_path(&self.dir, &self.name), &payload)?;
        let meta = describe_block(
            first_key,
            last_key,
            tails,
            offset,
            payload.len() as u64,
            hash_bytes(&payload),
        )?;
        self.blocks_written += 1;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            permutation = %self.name,
            offset,
            rows = tails.num_rows(),
            bytes = payload.len(),
            "block written"
        );
        Ok(meta)
    }
}

/// Reads blocks back from a finished permutation file.
pub struct PermutationFileReader {
    storage: Arc<dyn Storage>,
    blocks: String,
    tail_width: usize,
    codec: Codec,
}

impl PermutationFileReader {
    pub fn open(
        storage: Arc<dyn Storage>,
        dir: &str,
        name: &str,
    ) -> Result<(Self, PermutationCatalog)> {
        let path = catalog_path(dir, name);
        let len = storage.size(&path)?;
        let bytes = storage.read_range(&path, 0, len as usize)?;
        let file: CatalogFile = serde_json::from_slice(&bytes)?;
        file.catalog.validate()?;
        let reader = Self {
            storage,
            blocks: blocks_path(dir, name),
            tail_width: file.catalog.tail_width,
            codec: file.codec,
        };
        Ok((reader, file.catalog))
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

impl BlockSource for PermutationFileReader {
    fn read_block(&self, meta: &BlockMetadata) -> Result<IdTable> {
        let payload =
            self.storage
                .read_range(&self.blocks, meta.offset, meta.compressed_size as usize)?;
        if payload.len() as u64 != meta.compressed_size {
            return Err(Error::Corrupt(format!(
                "block at offset {} truncated: {} of {} bytes",
                meta.offset,
                payload.len(),
                meta.compressed_size
            )));
        }
        if hash_bytes(&payload) != meta.checksum {
            return Err(Error::Corrupt(format!(
                "checksum mismatch for block at offset {}",
                meta.offset
            )));
        }
        let expected = meta.num_rows as usize * self.tail_width * VALUE_BYTES;
        let raw = decompress(self.codec, &payload, expected)?;
        decode(self.tail_width, &raw)
    }
}
