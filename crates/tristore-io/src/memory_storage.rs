//! In-memory storage backend.
//!
//! HashMap-backed `Storage` used for `memory://` roots and tests that should
//! not touch the filesystem.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tristore_mem::error::{Error as MemError, Result as MemResult};
use tristore_mem::Storage;

/// Thread-safe in-memory storage. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    /// Flip one byte of a stored file; used to simulate on-disk corruption.
    pub fn corrupt_byte(&self, path: &str, offset: usize) -> bool {
        match self.files.lock().get_mut(path).and_then(|f| f.get_mut(offset)) {
            Some(b) => {
                *b ^= 0xFF;
                true
            }
            None => false,
        }
    }
}

fn missing(path: &str) -> MemError {
    MemError::Storage(format!("path not found: {path}"))
}

impl Storage for MemoryStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        self.files.lock().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn append(&self, path: &str, bytes: &[u8]) -> MemResult<u64> {
        let mut files = self.files.lock();
        let file = files.entry(path.to_string()).or_default();
        let offset = file.len() as u64;
        file.extend_from_slice(bytes);
        Ok(offset)
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> MemResult<Vec<u8>> {
        let files = self.files.lock();
        let bytes = files.get(path).ok_or_else(|| missing(path))?;
        let start = offset as usize;
        if start > bytes.len() {
            return Err(MemError::Storage(format!(
                "offset {offset} exceeds size {} of {path}",
                bytes.len()
            )));
        }
        let end = start.saturating_add(len).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        let mut out: Vec<String> = self
            .files
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        self.files
            .lock()
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| missing(path))
    }

    fn etag(&self, path: &str) -> MemResult<Option<String>> {
        Ok(self
            .files
            .lock()
            .get(path)
            .map(|b| blake3::hash(b).to_hex().to_string()))
    }
}
