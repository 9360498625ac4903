//! Local filesystem storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{StorageError, StorageProvider, StoredObject};

/// Writes files under a root directory and serves them from a base URL.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    /// Create a store rooted at `root`. Files are published as
    /// `{public_base_url}/{folder}/{name}`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Reject anything that is not a plain relative path.
fn relative_path(value: &str) -> Result<PathBuf, StorageError> {
    let path = Path::new(value);
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(path.to_path_buf())
    } else {
        Err(StorageError::InvalidName(value.to_string()))
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        folder: &str,
    ) -> Result<StoredObject, StorageError> {
        if suggested_name.is_empty() || suggested_name.contains(['/', '\\']) {
            return Err(StorageError::InvalidName(suggested_name.to_string()));
        }
        let folder = folder.trim_matches('/');
        let dir = self.root.join(relative_path(folder)?);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(suggested_name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &bytes).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        let identifier = if folder.is_empty() {
            suggested_name.to_string()
        } else {
            format!("{folder}/{suggested_name}")
        };
        tracing::debug!(path = %path.display(), "Stored file locally");

        Ok(StoredObject {
            url: format!("{}/{identifier}", self.public_base_url),
            identifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_file_and_builds_url() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://files.local/");

        let stored = storage
            .upload(b"hello".to_vec(), "doc_20260101_000000.txt", "orders")
            .await
            .unwrap();

        assert_eq!(stored.identifier, "orders/doc_20260101_000000.txt");
        assert_eq!(stored.url, "http://files.local/orders/doc_20260101_000000.txt");
        let written = std::fs::read(dir.path().join("orders/doc_20260101_000000.txt")).unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn existing_files_are_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://files.local");
        storage.upload(b"a".to_vec(), "same.txt", "x").await.unwrap();
        let second = storage.upload(b"b".to_vec(), "same.txt", "x").await;
        assert!(matches!(second, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://files.local");
        assert!(matches!(
            storage.upload(b"x".to_vec(), "a.txt", "../outside").await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            storage.upload(b"x".to_vec(), "../a.txt", "orders").await,
            Err(StorageError::InvalidName(_))
        ));
    }
}
