use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::debug;

/// File access for operators. Implementations may cache.
pub trait FileManager: Send + Sync {
    fn load(&self, path: &Path) -> io::Result<Arc<Vec<u8>>>;

    /// Drops any cached copy so the next load reads from disk.
    fn forget(&self, path: &Path);
}

/// Reads files once and shares the bytes until forgotten.
#[derive(Debug, Default)]
pub struct FileCache {
    files: Mutex<HashMap<PathBuf, Arc<Vec<u8>>>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.files.lock().clear();
    }
}

impl FileManager for FileCache {
    fn load(&self, path: &Path) -> io::Result<Arc<Vec<u8>>> {
        if let Some(bytes) = self.files.lock().get(path) {
            return Ok(Arc::clone(bytes));
        }

        // Read outside the lock; a racing reader just replaces the entry.
        let bytes = Arc::new(std::fs::read(path)?);
        debug!(path = %path.display(), len = bytes.len(), "File loaded");
        self.files
            .lock()
            .insert(path.to_path_buf(), Arc::clone(&bytes));

        Ok(bytes)
    }

    fn forget(&self, path: &Path) {
        self.files.lock().remove(path);
    }
}
