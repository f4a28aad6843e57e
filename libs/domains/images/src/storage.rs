use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{ImageError, ImageResult};

/// Durable storage for uploaded image bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Write `bytes` under `filename` and return the stored path
    async fn save(&self, filename: &str, bytes: &[u8]) -> ImageResult<String>;

    /// Remove a stored file; removing a missing file is not an error
    async fn remove(&self, filename: &str) -> ImageResult<()>;
}

/// Stores uploads as files in a local directory
#[derive(Debug, Clone)]
pub struct LocalImageStorage {
    root: PathBuf,
}

impl LocalImageStorage {
    /// Create `root` if needed
    pub async fn new(root: impl Into<PathBuf>) -> ImageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn path_for(&self, filename: &str) -> ImageResult<PathBuf> {
        // Only generated flat names are accepted
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename.starts_with('.')
        {
            return Err(ImageError::Validation(format!("invalid storage name {:?}", filename)));
        }
        Ok(self.root.join(filename))
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    async fn save(&self, filename: &str, bytes: &[u8]) -> ImageResult<String> {
        let path = self.path_for(filename)?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "Stored image");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn remove(&self, filename: &str) -> ImageResult<()> {
        let path = self.path_for(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps uploads in memory
#[derive(Clone, Default)]
pub struct InMemoryImageStorage {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryImageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, filename: &str) -> bool {
        self.files.read().await.contains_key(filename)
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl ImageStorage for InMemoryImageStorage {
    async fn save(&self, filename: &str, bytes: &[u8]) -> ImageResult<String> {
        self.files.write().await.insert(filename.to_string(), bytes.to_vec());
        Ok(format!("memory/{}", filename))
    }

    async fn remove(&self, filename: &str) -> ImageResult<()> {
        self.files.write().await.remove(filename);
        Ok(())
    }
}
