//! Spill manager for the external sorter.
//!
//! Sorted runs are written as a sequence of pages so the merge phase can
//! stream each run with one page in memory at a time.

pub mod codec;
pub mod segment;

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tristore_core::budget::MemoryBudget;
use tristore_core::id::SpillId;

use crate::error::{Error, Result};
use crate::guard::MemoryBudgetImpl;

pub use codec::Codec;
pub use segment::{SegmentHeader, SegmentMeta, SegmentName, HEADER_LEN};

/// Abstract byte storage for spill pages and permutation files.
///
/// Implemented by `tristore-io::FsStorage` (local filesystem) and
/// `tristore-io::MemoryStorage` (tests).
pub trait Storage: Send + Sync {
    /// Write bytes to a path, replacing it. Creates parent directories.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Append bytes to a path (creating it) and return the offset they
    /// start at.
    fn append(&self, path: &str, bytes: &[u8]) -> Result<u64>;

    /// Read exactly `len` bytes at `offset`.
    fn read_range(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Delete a path. Idempotent.
    fn delete(&self, path: &str) -> Result<()>;

    /// All paths under a prefix.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn size(&self, path: &str) -> Result<u64>;

    /// Cheap change detector for a path, if the backend has one.
    fn etag(&self, path: &str) -> Result<Option<String>>;
}

/// Writes pages and remembers their metadata until they are deleted.
pub struct SpillManager {
    storage: Arc<dyn Storage>,
    codec: Codec,
    root_dir: String,
    segments: HashMap<SegmentName, SegmentMeta>,
}

impl SpillManager {
    pub fn new(storage: Arc<dyn Storage>, codec: Codec, root_dir: impl Into<String>) -> Self {
        Self {
            storage,
            codec,
            root_dir: root_dir.into(),
            segments: HashMap::new(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Serialize, compress, checksum and store one page of values.
    pub fn write_page<T: Serialize>(
        &mut self,
        values: &[T],
        spill_id: SpillId,
        run_index: u32,
        page_index: u32,
    ) -> Result<SegmentMeta> {
        let uncompressed =
            serde_json::to_vec(values).map_err(|e| Error::Codec(format!("json serialize: {e}")))?;
        let compressed = codec::compress(self.codec, &uncompressed)?;

        let header = SegmentHeader {
            codec: self.codec,
            uncompressed_len: uncompressed.len() as u64,
            compressed_len: compressed.len() as u64,
            num_values: values.len() as u64,
        };
        let header_bytes = header.to_bytes();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(&compressed);
        let checksum: [u8; 32] = hasher.finalize().into();

        let name = SegmentName::new(spill_id, run_index, page_index);
        let path = format!("{}/{}.seg", self.root_dir, name.0);

        let mut full = Vec::with_capacity(HEADER_LEN + compressed.len());
        full.extend_from_slice(&header_bytes);
        full.extend_from_slice(&compressed);
        self.storage.write(&path, &full)?;

        let etag = self.storage.etag(&path).ok().flatten();
        let meta = SegmentMeta {
            name: name.clone(),
            path,
            codec: self.codec,
            uncompressed_len: header.uncompressed_len,
            compressed_len: header.compressed_len,
            num_values: header.num_values,
            checksum,
            etag,
        };
        self.segments.insert(name, meta.clone());

        #[cfg(feature = "tracing")]
        tracing::trace!(
            page = %meta.name.0,
            values = meta.num_values,
            bytes = meta.compressed_len,
            "spilled page"
        );
        Ok(meta)
    }

    /// A lock-free handle for reading pages from another thread.
    pub fn reader(&self) -> SpillReader {
        SpillReader {
            storage: Arc::clone(&self.storage),
        }
    }

    pub fn get_segment(&self, name: &SegmentName) -> Option<&SegmentMeta> {
        self.segments.get(name)
    }

    pub fn delete_segment(&mut self, name: &SegmentName) -> Result<()> {
        if let Some(meta) = self.segments.remove(name) {
            self.storage.delete(&meta.path)?;
        }
        Ok(())
    }

    /// Delete every page written for `spill_id`; returns how many there were.
    pub fn delete_spill(&mut self, spill_id: SpillId) -> Result<usize> {
        let names: Vec<SegmentName> = self
            .segments
            .keys()
            .filter(|n| n.belongs_to(spill_id))
            .cloned()
            .collect();
        for name in &names {
            self.delete_segment(name)?;
        }
        Ok(names.len())
    }

    pub fn list_segments(&self) -> Vec<SegmentName> {
        let mut names: Vec<SegmentName> = self.segments.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Reads pages written by a [`SpillManager`].
#[derive(Clone)]
pub struct SpillReader {
    storage: Arc<dyn Storage>,
}

impl SpillReader {
    /// Verify and decode one page. The decompression buffer is accounted
    /// against `budget` while it is alive.
    pub fn read_page<T: DeserializeOwned>(
        &self,
        meta: &SegmentMeta,
        budget: &MemoryBudgetImpl,
    ) -> Result<Vec<T>> {
        let total_len = HEADER_LEN + meta.compressed_len as usize;
        let full = self.storage.read_range(&meta.path, 0, total_len)?;
        if full.len() != total_len {
            return Err(Error::Segment(format!(
                "{}: read {} of {} bytes",
                meta.name.0,
                full.len(),
                total_len
            )));
        }

        let computed: [u8; 32] = blake3::hash(&full).into();
        if computed != meta.checksum {
            return Err(Error::ChecksumMismatch(meta.name.0.clone()));
        }

        let header = SegmentHeader::from_bytes(&full[..HEADER_LEN])?;
        let _guard = budget
            .try_acquire(header.uncompressed_len as usize, "spill_decompress")
            .ok_or_else(|| Error::BudgetExceeded {
                tag: "spill_decompress",
                requested: header.uncompressed_len as usize,
                capacity: budget.capacity_bytes(),
                used: budget.used_bytes(),
            })?;
        let payload = codec::decompress(
            header.codec,
            &full[HEADER_LEN..],
            header.uncompressed_len as usize,
        )?;

        let values: Vec<T> = serde_json::from_slice(&payload)
            .map_err(|e| Error::Codec(format!("json deserialize: {e}")))?;
        if values.len() as u64 != header.num_values {
            return Err(Error::Segment(format!(
                "{}: header promises {} values, payload has {}",
                meta.name.0,
                header.num_values,
                values.len()
            )));
        }
        Ok(values)
    }
}
