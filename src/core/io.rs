use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Key-value store backing settings persistence and exported files.
///
/// Keys are relative paths; `NativeStorage` resolves them under a root folder.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Vec<u8>>;
    async fn write(&self, key: &str, content: &[u8]) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Keys directly under `prefix`; empty when it does not exist.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

pub struct NativeStorage {
    root: PathBuf,
}

impl NativeStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(key)).await?)
    }

    async fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.path_for(prefix);
        let mut entries = Vec::new();
        if !path.is_dir() {
            return Ok(entries);
        }
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let key = Path::new(prefix).join(entry.file_name());
            entries.push(key.to_string_lossy().to_string());
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parents() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let storage = NativeStorage::new(temp_dir.path());

        storage.write("nested/dir/value.json", b"{}").await?;
        assert!(storage.exists("nested/dir/value.json").await?);
        assert_eq!(storage.read("nested/dir/value.json").await?, b"{}");

        assert!(!storage.exists("nested/dir/other.json").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_tolerates_missing_folder() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let storage = NativeStorage::new(temp_dir.path());
        assert!(storage.list("input").await?.is_empty());

        storage.write("input/b.txt", b"B: hi").await?;
        storage.write("input/a.txt", b"A: hi").await?;
        assert_eq!(storage.list("input").await?, ["input/a.txt", "input/b.txt"]);
        Ok(())
    }
}
