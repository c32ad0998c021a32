//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::ValueId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard memory cap (in bytes) shared by sorters, builders and joins.
    pub mem_cap_bytes: usize,

    /// Uncompressed byte size of one permutation block.
    pub block_size_bytes: usize,

    /// Memory for one external sorter. Split between the buffer being filled
    /// and the one the background worker sorts.
    pub sorter_memory_bytes: usize,

    /// Values per spilled page when a sorted run is written out.
    pub sort_page_rows: usize,

    /// Rows per chunk yielded by a lazy join.
    pub join_chunk_size: usize,

    /// Size ratio above which the galloping join replaces the zipper join.
    pub gallop_threshold: usize,

    /// Chunks the lazy join worker may run ahead of its consumer.
    pub lazy_channel_capacity: usize,

    /// Minimum interval between "if due" progress reports.
    pub progress_interval_ms: u64,

    /// Directory for sorter spill segments.
    pub spill_dir: String,

    /// `none`, `zstd` or `lz4`; the latter two need the matching cargo feature.
    pub spill_codec: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_cap_bytes: 2 * 1024 * 1024 * 1024, // 2 GiB
            block_size_bytes: 8 * 1024 * 1024,
            sorter_memory_bytes: 512 * 1024 * 1024,
            sort_page_rows: 64 * 1024,
            join_chunk_size: 100_000,
            gallop_threshold: 1000,
            lazy_channel_capacity: 1,
            progress_interval_ms: 50,
            spill_dir: "/tmp/tristore-spill".to_string(),
            spill_codec: "none".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TRISTORE_MEM_CAP_BYTES`
    /// - `TRISTORE_BLOCK_SIZE_BYTES`
    /// - `TRISTORE_SORTER_MEMORY_BYTES`
    /// - `TRISTORE_SORT_PAGE_ROWS`
    /// - `TRISTORE_JOIN_CHUNK_SIZE`
    /// - `TRISTORE_GALLOP_THRESHOLD`
    /// - `TRISTORE_LAZY_CHANNEL_CAPACITY`
    /// - `TRISTORE_PROGRESS_INTERVAL_MS`
    /// - `TRISTORE_SPILL_DIR`
    /// - `TRISTORE_SPILL_CODEC`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse("TRISTORE_MEM_CAP_BYTES") {
            cfg.mem_cap_bytes = v;
        }
        if let Some(v) = env_parse("TRISTORE_BLOCK_SIZE_BYTES") {
            cfg.block_size_bytes = v;
        }
        if let Some(v) = env_parse("TRISTORE_SORTER_MEMORY_BYTES") {
            cfg.sorter_memory_bytes = v;
        }
        if let Some(v) = env_parse("TRISTORE_SORT_PAGE_ROWS") {
            cfg.sort_page_rows = v;
        }
        if let Some(v) = env_parse("TRISTORE_JOIN_CHUNK_SIZE") {
            cfg.join_chunk_size = v;
        }
        if let Some(v) = env_parse("TRISTORE_GALLOP_THRESHOLD") {
            cfg.gallop_threshold = v;
        }
        if let Some(v) = env_parse("TRISTORE_LAZY_CHANNEL_CAPACITY") {
            cfg.lazy_channel_capacity = v;
        }
        if let Some(v) = env_parse("TRISTORE_PROGRESS_INTERVAL_MS") {
            cfg.progress_interval_ms = v;
        }
        if let Ok(s) = std::env::var("TRISTORE_SPILL_DIR") {
            cfg.spill_dir = s;
        }
        if let Ok(s) = std::env::var("TRISTORE_SPILL_CODEC") {
            cfg.spill_codec = s.to_ascii_lowercase();
        }

        cfg
    }

    /// Rows per block for tuples whose tail has `tail_width` columns.
    pub fn block_capacity(&self, tail_width: usize) -> Result<usize> {
        if tail_width == 0 {
            return Err(Error::Config("tail width must be at least 1".into()));
        }
        let cap = self.block_size_bytes / (tail_width * std::mem::size_of::<ValueId>());
        if cap == 0 {
            return Err(Error::Config(format!(
                "block_size_bytes {} cannot hold a single row of width {}",
                self.block_size_bytes, tail_width
            )));
        }
        Ok(cap)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mem_cap_bytes == 0 {
            return Err(Error::Config("mem_cap_bytes must be > 0".into()));
        }
        if self.sorter_memory_bytes > self.mem_cap_bytes {
            return Err(Error::Config(format!(
                "sorter_memory_bytes {} exceeds mem_cap_bytes {}",
                self.sorter_memory_bytes, self.mem_cap_bytes
            )));
        }
        if self.sort_page_rows == 0 || self.join_chunk_size == 0 {
            return Err(Error::Config(
                "sort_page_rows and join_chunk_size must be > 0".into(),
            ));
        }
        if self.lazy_channel_capacity == 0 {
            return Err(Error::Config("lazy_channel_capacity must be > 0".into()));
        }
        if !matches!(self.spill_codec.as_str(), "none" | "zstd" | "lz4") {
            return Err(Error::Config(format!(
                "unknown spill codec '{}'",
                self.spill_codec
            )));
        }
        self.block_capacity(1).map(|_| ())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().expect("default config");
        // 8 MiB over two 8-byte columns.
        assert_eq!(cfg.block_capacity(2).expect("capacity"), 524_288);
    }

    #[test]
    fn tiny_blocks_are_a_config_error() {
        let cfg = EngineConfig {
            block_size_bytes: 8,
            ..EngineConfig::default()
        };
        assert!(cfg.block_capacity(1).is_ok());
        let err = cfg.block_capacity(2).expect_err("too small");
        assert!(err.is_fatal_config());
    }

    #[test]
    fn from_env_overrides() {
        std::env::set_var("TRISTORE_JOIN_CHUNK_SIZE", "17");
        std::env::set_var("TRISTORE_SPILL_CODEC", "LZ4");
        let cfg = EngineConfig::from_env();
        std::env::remove_var("TRISTORE_JOIN_CHUNK_SIZE");
        std::env::remove_var("TRISTORE_SPILL_CODEC");
        assert_eq!(cfg.join_chunk_size, 17);
        assert_eq!(cfg.spill_codec, "lz4");
    }
}
