use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{ImageError, ImageResult};
use crate::index::EntityId;
use crate::models::{EmbeddingRecord, ImageRecord, NewImage, NewSearchRecord, SearchHistoryEntry};

/// Durable (image id, vector) table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Insert or overwrite the vector for `record.image_id`
    async fn upsert(&self, record: EmbeddingRecord) -> ImageResult<()>;

    /// Every stored embedding, ordered by image id
    async fn fetch_all(&self) -> ImageResult<Vec<EmbeddingRecord>>;
}

/// Image metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn create(&self, image: NewImage) -> ImageResult<ImageRecord>;

    /// Records for the ids that exist, in no particular order
    async fn find_many(&self, ids: Vec<EntityId>) -> ImageResult<Vec<ImageRecord>>;

    /// Newest first
    async fn list_recent(&self, limit: u64) -> ImageResult<Vec<ImageRecord>>;

    async fn count(&self) -> ImageResult<u64>;

    /// Returns whether a record was removed
    async fn delete(&self, id: EntityId) -> ImageResult<bool>;

    /// Connectivity check
    async fn ping(&self) -> ImageResult<()>;
}

/// Log of executed similarity queries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchHistoryRepository: Send + Sync {
    async fn append(&self, record: NewSearchRecord) -> ImageResult<()>;

    /// Newest first
    async fn list_recent(&self, limit: u64) -> ImageResult<Vec<SearchHistoryEntry>>;

    async fn count(&self) -> ImageResult<u64>;
}

/// In-memory embedding store for tests and local runs
#[derive(Clone, Default)]
pub struct InMemoryEmbeddingStore {
    rows: Arc<RwLock<BTreeMap<EntityId, Vec<f32>>>>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn upsert(&self, record: EmbeddingRecord) -> ImageResult<()> {
        if record.vector.is_empty() {
            return Err(ImageError::StorageFailure(format!(
                "refusing empty vector for image {}",
                record.image_id
            )));
        }
        self.rows.write().await.insert(record.image_id, record.vector);
        Ok(())
    }

    async fn fetch_all(&self) -> ImageResult<Vec<EmbeddingRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .map(|(image_id, vector)| EmbeddingRecord {
                image_id: *image_id,
                vector: vector.clone(),
            })
            .collect())
    }
}

/// In-memory image metadata with sequential ids starting at 1
#[derive(Clone, Default)]
pub struct InMemoryImageRepository {
    images: Arc<RwLock<HashMap<EntityId, ImageRecord>>>,
    next_id: Arc<RwLock<EntityId>>,
}

impl InMemoryImageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageRepository for InMemoryImageRepository {
    async fn create(&self, image: NewImage) -> ImageResult<ImageRecord> {
        let mut next_id = self.next_id.write().await;
        *next_id += 1;

        let record = ImageRecord {
            id: *next_id,
            filename: image.filename,
            filepath: image.filepath,
            uploaded_at: Utc::now(),
        };
        self.images.write().await.insert(record.id, record.clone());

        tracing::info!(image_id = record.id, filename = %record.filename, "Created image record");
        Ok(record)
    }

    async fn find_many(&self, ids: Vec<EntityId>) -> ImageResult<Vec<ImageRecord>> {
        let images = self.images.read().await;
        Ok(ids.iter().filter_map(|id| images.get(id).cloned()).collect())
    }

    async fn list_recent(&self, limit: u64) -> ImageResult<Vec<ImageRecord>> {
        let images = self.images.read().await;
        let mut records: Vec<ImageRecord> = images.values().cloned().collect();
        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn count(&self) -> ImageResult<u64> {
        Ok(self.images.read().await.len() as u64)
    }

    async fn delete(&self, id: EntityId) -> ImageResult<bool> {
        Ok(self.images.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> ImageResult<()> {
        Ok(())
    }
}

/// In-memory search history
#[derive(Clone, Default)]
pub struct InMemorySearchHistoryRepository {
    entries: Arc<RwLock<Vec<SearchHistoryEntry>>>,
}

impl InMemorySearchHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchHistoryRepository for InMemorySearchHistoryRepository {
    async fn append(&self, record: NewSearchRecord) -> ImageResult<()> {
        self.entries.write().await.push(SearchHistoryEntry {
            query_id: record.query_id,
            query_filename: record.query_filename,
            result_count: record.results.len(),
            results: record.results,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_recent(&self, limit: u64) -> ImageResult<Vec<SearchHistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn count(&self) -> ImageResult<u64> {
        Ok(self.entries.read().await.len() as u64)
    }
}
