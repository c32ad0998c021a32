//! Spill page header and metadata.
//!
//! Layout on disk:
//! [ magic: u32 ][ version: u16 ][ codec: u8 ][ reserved: u8 ]
//! [ uncompressed_len: u64 ][ compressed_len: u64 ][ num_values: u64 ]
//! [ payload bytes … ]
//!
//! End-to-end checksum is computed over (header || payload) using blake3.

use serde::{Deserialize, Serialize};
use tristore_core::id::SpillId;

use super::Codec;
use crate::error::{Error, Result};

pub const MAGIC: u32 = 0x5053_5254; // "TRSP"
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 8 + 8 + 8;

/// Pages above this size are treated as corrupt rather than allocated.
pub const MAX_PAGE_BYTES: u64 = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub codec: Codec,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub num_values: u64,
}

impl SegmentHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[6] = self.codec as u8;
        // out[7] reserved
        out[8..16].copy_from_slice(&self.uncompressed_len.to_le_bytes());
        out[16..24].copy_from_slice(&self.compressed_len.to_le_bytes());
        out[24..32].copy_from_slice(&self.num_values.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Segment(format!(
                "short header: {} of {HEADER_LEN} bytes",
                bytes.len()
            )));
        }
        let magic = u32::from_le_bytes(le_array(&bytes[0..4]));
        let version = u16::from_le_bytes(le_array(&bytes[4..6]));
        if magic != MAGIC || version != VERSION {
            return Err(Error::Segment(format!(
                "bad magic/version {magic:#x}/{version}"
            )));
        }
        let header = Self {
            codec: Codec::from_u8(bytes[6])?,
            uncompressed_len: u64::from_le_bytes(le_array(&bytes[8..16])),
            compressed_len: u64::from_le_bytes(le_array(&bytes[16..24])),
            num_values: u64::from_le_bytes(le_array(&bytes[24..32])),
        };
        header.validate_sizes()?;
        Ok(header)
    }

    /// Reject sizes a corrupted header could use to force huge allocations.
    pub fn validate_sizes(&self) -> Result<()> {
        if self.uncompressed_len > MAX_PAGE_BYTES || self.compressed_len > MAX_PAGE_BYTES {
            return Err(Error::Segment(format!(
                "page sizes {}/{} exceed {MAX_PAGE_BYTES}",
                self.compressed_len, self.uncompressed_len
            )));
        }
        Ok(())
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Name of one spilled page: spill id, run index and page index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentName(pub String);

impl SegmentName {
    pub fn new(id: SpillId, run_index: u32, page_index: u32) -> Self {
        SegmentName(format!("spill{}_run{}_page{}", id.get(), run_index, page_index))
    }

    pub fn belongs_to(&self, id: SpillId) -> bool {
        self.0
            .strip_prefix(&format!("spill{}_", id.get()))
            .is_some()
    }
}

/// What the engine keeps in memory for a spilled page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: SegmentName,
    pub path: String,
    pub codec: Codec,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
    pub num_values: u64,
    pub checksum: [u8; 32],
    pub etag: Option<String>,
}
