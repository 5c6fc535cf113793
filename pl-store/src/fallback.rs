//! Plaintext file fallback backend.
//!
//! One file per key under a dedicated directory. Used when the secure
//! backend is unavailable, and as the legacy location migrated away from
//! on devices that gained secure storage later.

use std::path::{Path, PathBuf};

use pl_core::error::PlResult;

use crate::backend::StorageBackend;

/// File-per-key plaintext backend.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal identifiers, but never trust them as raw paths.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> PlResult<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> PlResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        write_atomically(&path, value)
    }

    fn remove(&self, key: &str) -> PlResult<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn probe(&self) -> bool {
        std::fs::create_dir_all(&self.dir).is_ok()
    }
}

/// Write via a temp file + rename so a crash mid-write never leaves a
/// truncated blob behind.
fn write_atomically(path: &Path, contents: &str) -> PlResult<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
