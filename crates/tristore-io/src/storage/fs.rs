use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use blake3::Hasher;
use tristore_mem::error::{Error as MemError, Result as MemResult};
use tristore_mem::Storage;

/// Local filesystem storage; paths are host paths.
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

fn ensure_parent(p: &Path) -> MemResult<()> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).map_err(|e| MemError::Storage(format!("mkparent: {e}")))?;
    }
    Ok(())
}

impl Storage for FsStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        let p = Path::new(path);
        ensure_parent(p)?;
        let mut f = File::create(p).map_err(|e| MemError::Storage(format!("create {path}: {e}")))?;
        f.write_all(bytes)
            .and_then(|_| f.flush())
            .map_err(|e| MemError::Storage(format!("write {path}: {e}")))
    }

    fn append(&self, path: &str, bytes: &[u8]) -> MemResult<u64> {
        let p = Path::new(path);
        ensure_parent(p)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(p)
            .map_err(|e| MemError::Storage(format!("open {path}: {e}")))?;
        let offset = f
            .seek(SeekFrom::End(0))
            .map_err(|e| MemError::Storage(format!("seek {path}: {e}")))?;
        f.write_all(bytes)
            .and_then(|_| f.flush())
            .map_err(|e| MemError::Storage(format!("append {path}: {e}")))?;
        Ok(offset)
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> MemResult<Vec<u8>> {
        let mut f =
            File::open(Path::new(path)).map_err(|e| MemError::Storage(format!("open {path}: {e}")))?;
        f.seek(SeekFrom::Start(offset))
            .map_err(|e| MemError::Storage(format!("seek {path}: {e}")))?;
        // A single read() may return short; take+read_to_end loops until EOF or len.
        let mut buf = Vec::with_capacity(len.min(64 * 1024 * 1024));
        f.take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| MemError::Storage(format!("read {path}: {e}")))?;
        Ok(buf)
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MemError::Storage(format!("delete {path}: {e}"))),
        }
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        let root = Path::new(prefix);
        if root.is_file() {
            return Ok(vec![prefix.to_string()]);
        }
        let mut out = Vec::new();
        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(MemError::Storage(format!("list {}: {e}", dir.display()))),
            };
            for entry in entries {
                let path = entry
                    .map_err(|e| MemError::Storage(format!("list: {e}")))?
                    .path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Some(s) = path.to_str() {
                    out.push(s.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| MemError::Storage(format!("size {path}: {e}")))
    }

    fn etag(&self, path: &str) -> MemResult<Option<String>> {
        // Pseudo-ETag: hash(size || mtime || path).
        let Ok(meta) = fs::metadata(path) else {
            return Ok(None);
        };
        let mut h = Hasher::new();
        h.update(&meta.len().to_le_bytes());
        if let Ok(d) = meta
            .modified()
            .map_err(|_| ())
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).map_err(|_| ()))
        {
            h.update(&d.as_nanos().to_le_bytes());
        }
        h.update(path.as_bytes());
        Ok(Some(h.finalize().to_hex().to_string()))
    }
}
