//! Storage adapters implementing `tristore_mem::spill::Storage`.
//!
//! Roots are given as plain paths, `file://` URIs or `memory://` URIs.

mod fs;
pub use fs::FsStorage;

use std::sync::Arc;

use tristore_core::error::{Error, Result};
use tristore_mem::Storage;

use crate::memory_storage::MemoryStorage;

/// Pick a backend for `uri` and return it with the path prefix to use.
pub fn storage_for_uri(uri: &str) -> Result<(Arc<dyn Storage>, String)> {
    match uri.split_once("://") {
        Some(("memory", rest)) => Ok((
            Arc::new(MemoryStorage::new()),
            rest.trim_end_matches('/').to_string(),
        )),
        Some(("file", rest)) => {
            let path = if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            };
            Ok((Arc::new(FsStorage::new()), path.trim_end_matches('/').to_string()))
        }
        Some((other, _)) => Err(Error::Config(format!("unsupported storage scheme '{other}'"))),
        None => Ok((
            Arc::new(FsStorage::new()),
            uri.trim_end_matches('/').to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes() {
        let (_, root) = storage_for_uri("file:///tmp/x/").expect("file");
        assert_eq!(root, "/tmp/x");
        let (s, root) = storage_for_uri("memory://idx").expect("memory");
        assert_eq!(root, "idx");
        s.write("idx/a", b"1").expect("write");
        assert_eq!(s.size("idx/a").expect("size"), 1);
        let (_, root) = storage_for_uri("/var/tmp/spill").expect("bare path");
        assert_eq!(root, "/var/tmp/spill");
        assert!(storage_for_uri("s3://bucket").is_err());
    }
}
