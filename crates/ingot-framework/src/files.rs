//! Scoped file storage.
//!
//! The blob-shaped sibling of [`Storage`](crate::storage::Storage): each
//! module gets a directory subtree keyed by its id, and child scopes map to
//! subdirectories.  Directories are created lazily on first write.

use std::path::PathBuf;

use tokio::fs;
use tracing::debug;

/// Owner of the file-storage root; produces [`FileStore`] scopes.
pub struct FileService {
    root: PathBuf,
}

impl FileService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Derives the scope rooted at `<root>/<prefix>/`.
    pub fn scope(&self, prefix: &str) -> FileStore {
        FileStore {
            root: self.root.join(prefix),
        }
    }
}

/// One directory-backed scope.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Derives a child scope (a subdirectory); no side effects.
    pub fn child(&self, prefix: &str) -> FileStore {
        FileStore {
            root: self.root.join(prefix),
        }
    }

    /// Writes a blob under `key`, creating the scope directory if needed.
    pub async fn write(&self, key: &str, bytes: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        let path = self.root.join(key);
        debug!(path = %path.display(), len = bytes.len(), "Writing stored file");
        fs::write(path, bytes).await
    }

    /// Reads the blob stored under `key`.
    pub async fn read(&self, key: &str) -> std::io::Result<Vec<u8>> {
        fs::read(self.root.join(key)).await
    }

    /// Deletes the blob under `key`, reporting whether one existed.
    pub async fn delete(&self, key: &str) -> std::io::Result<bool> {
        match fs::remove_file(self.root.join(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let svc = FileService::new(dir.path());
        let store = svc.scope("dice");

        store.write("state.bin", b"abc").await.unwrap();
        assert_eq!(store.read("state.bin").await.unwrap(), b"abc");
        assert!(store.delete("state.bin").await.unwrap());
        assert!(!store.delete("state.bin").await.unwrap());
        assert!(store.read("state.bin").await.is_err());
    }

    #[tokio::test]
    async fn test_scopes_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let svc = FileService::new(dir.path());

        svc.scope("a").write("k", b"for a").await.unwrap();
        svc.scope("b").write("k", b"for b").await.unwrap();
        svc.scope("a").child("sub").write("k", b"nested").await.unwrap();

        assert_eq!(svc.scope("a").read("k").await.unwrap(), b"for a");
        assert_eq!(svc.scope("b").read("k").await.unwrap(), b"for b");
        assert_eq!(svc.scope("a").child("sub").read("k").await.unwrap(), b"nested");
    }
}
