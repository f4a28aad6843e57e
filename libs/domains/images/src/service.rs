use std::sync::Arc;

use validator::Validate;

use crate::config::{SearchConfig, StorageConfig};
use crate::embedding::ImageEmbedder;
use crate::error::ImageResult;
use crate::index::IndexManager;
use crate::models::{
    DashboardStats, HealthStatus, HistoryParams, ImageUpload, IndexStatus, IngestedImage,
    SearchHistoryEntry, SearchResponse, UploadHistoryEntry, UploadReport,
};
use crate::pipeline::{IngestPipeline, SearchPipeline};
use crate::repository::{
    EmbeddingStore, ImageRepository, InMemoryEmbeddingStore, InMemoryImageRepository,
    InMemorySearchHistoryRepository, SearchHistoryRepository,
};
use crate::storage::{ImageStorage, InMemoryImageStorage};

/// Uploads shown in the dashboard activity feed
const RECENT_ACTIVITY: u64 = 5;

/// External collaborators the service is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn ImageEmbedder>,
    pub images: Arc<dyn ImageRepository>,
    pub embeddings: Arc<dyn EmbeddingStore>,
    pub history: Arc<dyn SearchHistoryRepository>,
    pub storage: Arc<dyn ImageStorage>,
}

impl Collaborators {
    /// Every store in memory, around the given embedder
    pub fn in_memory(embedder: Arc<dyn ImageEmbedder>) -> Self {
        Self {
            embedder,
            images: Arc::new(InMemoryImageRepository::new()),
            embeddings: Arc::new(InMemoryEmbeddingStore::new()),
            history: Arc::new(InMemorySearchHistoryRepository::new()),
            storage: Arc::new(InMemoryImageStorage::new()),
        }
    }
}

/// Entry point for the image search operations
pub struct ImageService {
    index: Arc<IndexManager>,
    search: SearchPipeline,
    ingest: IngestPipeline,
    images: Arc<dyn ImageRepository>,
    history: Arc<dyn SearchHistoryRepository>,
}

impl ImageService {
    pub fn new(deps: Collaborators, storage: StorageConfig, search: SearchConfig) -> Self {
        let index = Arc::new(IndexManager::new(deps.embeddings.clone()));

        Self {
            search: SearchPipeline::new(
                index.clone(),
                deps.embedder.clone(),
                deps.images.clone(),
                deps.history.clone(),
                storage,
                search,
            ),
            ingest: IngestPipeline::new(
                index.clone(),
                deps.embedder,
                deps.images.clone(),
                deps.embeddings,
                deps.storage,
            ),
            index,
            images: deps.images,
            history: deps.history,
        }
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    /// Build the index from the embedding store; called once at startup
    pub async fn initialize_index(&self) -> ImageResult<IndexStatus> {
        self.index.initialize().await
    }

    pub async fn search(&self, upload: ImageUpload, top_k: Option<usize>) -> ImageResult<SearchResponse> {
        self.search.search(upload, top_k).await
    }

    pub async fn ingest(&self, upload: ImageUpload) -> ImageResult<IngestedImage> {
        self.ingest.ingest(upload).await
    }

    pub async fn ingest_batch(&self, uploads: Vec<ImageUpload>) -> ImageResult<UploadReport> {
        self.ingest.ingest_batch(uploads).await
    }

    pub async fn upload_history(&self, params: HistoryParams) -> ImageResult<Vec<UploadHistoryEntry>> {
        params.validate()?;
        let records = self.images.list_recent(params.limit).await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    pub async fn search_history(&self, params: HistoryParams) -> ImageResult<Vec<SearchHistoryEntry>> {
        params.validate()?;
        self.history.list_recent(params.limit).await
    }

    pub async fn dashboard_stats(&self) -> ImageResult<DashboardStats> {
        let (total_images, total_searches, recent) = tokio::try_join!(
            self.images.count(),
            self.history.count(),
            self.images.list_recent(RECENT_ACTIVITY),
        )?;

        Ok(DashboardStats {
            total_images,
            total_searches,
            system_status: "Active".to_string(),
            recent_activity: recent.into_iter().map(Into::into).collect(),
            index: self.index.status().await,
        })
    }

    /// Never fails; a broken database is reported in the body
    pub async fn health(&self) -> HealthStatus {
        let database = match self.images.ping().await {
            Ok(()) => "OK",
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                "FAILED"
            }
        };

        HealthStatus {
            status: "running".to_string(),
            database: database.to_string(),
            index: self.index.status().await.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockImageEmbedder;
    use crate::error::ImageError;
    use crate::models::IndexPhase;
    use crate::repository::MockImageRepository;
    use crate::validation::fixtures;

    fn embedder() -> Arc<dyn ImageEmbedder> {
        let mut embedder = MockImageEmbedder::new();
        embedder.expect_embed().returning(|bytes| Ok(vec![bytes.len() as f32, 1.0]));
        Arc::new(embedder)
    }

    fn service(deps: Collaborators) -> ImageService {
        ImageService::new(deps, StorageConfig::default(), SearchConfig::default())
    }

    #[tokio::test]
    async fn test_dashboard_stats_counts() {
        let service = service(Collaborators::in_memory(embedder()));
        service.initialize_index().await.unwrap();

        for i in 0..7u8 {
            service
                .ingest(ImageUpload {
                    filename: format!("{i}.png"),
                    bytes: fixtures::png([i * 30, 0, 0]).into(),
                })
                .await
                .unwrap();
        }
        service
            .search(
                ImageUpload {
                    filename: "q.png".into(),
                    bytes: fixtures::png([0, 0, 0]).into(),
                },
                None,
            )
            .await
            .unwrap();

        let stats = service.dashboard_stats().await.unwrap();
        assert_eq!(stats.total_images, 7);
        assert_eq!(stats.total_searches, 1);
        assert_eq!(stats.recent_activity.len(), 5);
        assert_eq!(stats.system_status, "Active");
        assert_eq!(stats.index.vectors, 7);
        assert_eq!(stats.index.state, IndexPhase::Ready);
    }

    #[tokio::test]
    async fn test_history_limit_validated() {
        let service = service(Collaborators::in_memory(embedder()));
        let err = service.upload_history(HistoryParams { limit: 0 }).await.unwrap_err();
        assert!(matches!(err, ImageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_health_reports_database_failure() {
        let mut images = MockImageRepository::new();
        images
            .expect_ping()
            .returning(|| Err(ImageError::StorageFailure("connection refused".into())));
        let mut deps = Collaborators::in_memory(embedder());
        deps.images = Arc::new(images);

        let health = service(deps).health().await;
        assert_eq!(health.status, "running");
        assert_eq!(health.database, "FAILED");
        assert_eq!(health.index, IndexPhase::Initializing);
    }
}
