//! Artifact existence checks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Answers whether a step's declared output already exists.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// Artifact store backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactStore;

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory artifact store.
///
/// Useful for planning runs against a known set of artifacts.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    paths: Mutex<HashSet<PathBuf>>,
}

impl MemoryArtifactStore {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: Mutex::new(paths.into_iter().collect()),
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.insert(path.into());
        }
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .map(|paths| paths.contains(path))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.json");
        assert!(!FsArtifactStore.exists(&path));
        std::fs::write(&path, "{}").unwrap();
        assert!(FsArtifactStore.exists(&path));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryArtifactStore::new([PathBuf::from("/a")]);
        assert!(store.exists(Path::new("/a")));
        assert!(!store.exists(Path::new("/b")));
        store.insert("/b");
        assert!(store.exists(Path::new("/b")));
    }
}
