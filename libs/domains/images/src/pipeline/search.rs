use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::{SearchConfig, StorageConfig};
use crate::embedding::ImageEmbedder;
use crate::error::{ImageError, ImageResult};
use crate::index::{EntityId, IndexError, IndexManager};
use crate::models::{ImageRecord, ImageUpload, NewSearchRecord, SearchHit, SearchResponse};
use crate::repository::{ImageRepository, SearchHistoryRepository};
use crate::validation::validate_image_async;

/// Progress of a single query. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStage {
    ReceivedImage,
    EmbeddingComputed,
    RawResultsFetched,
    ResultsEnriched,
    Done,
    Failed(String),
}

impl QueryStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStage::Done | QueryStage::Failed(_))
    }
}

/// Image bytes in, ranked and enriched neighbours out
pub struct SearchPipeline {
    index: Arc<IndexManager>,
    embedder: Arc<dyn ImageEmbedder>,
    images: Arc<dyn ImageRepository>,
    history: Arc<dyn SearchHistoryRepository>,
    storage: StorageConfig,
    config: SearchConfig,
}

struct QueryRun {
    query_id: Uuid,
    stage: QueryStage,
}

impl QueryRun {
    fn new() -> Self {
        Self {
            query_id: Uuid::new_v4(),
            stage: QueryStage::ReceivedImage,
        }
    }

    fn advance(&mut self, next: QueryStage) {
        if self.stage.is_terminal() {
            return;
        }
        debug!(query_id = %self.query_id, from = ?self.stage, to = ?next, "Query stage");
        self.stage = next;
    }

    /// Move to `Failed`, returning the stage the query had reached
    fn fail(&mut self, err: &ImageError) -> QueryStage {
        let reached = self.stage.clone();
        self.advance(QueryStage::Failed(err.to_string()));
        reached
    }
}

impl SearchPipeline {
    pub fn new(
        index: Arc<IndexManager>,
        embedder: Arc<dyn ImageEmbedder>,
        images: Arc<dyn ImageRepository>,
        history: Arc<dyn SearchHistoryRepository>,
        storage: StorageConfig,
        config: SearchConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            images,
            history,
            storage,
            config,
        }
    }

    /// `None` means the configured default; otherwise `1..=max_top_k`
    pub fn resolve_top_k(&self, top_k: Option<usize>) -> ImageResult<usize> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 || top_k > self.config.max_top_k {
            return Err(ImageError::Validation(format!(
                "top_k must be between 1 and {}",
                self.config.max_top_k
            )));
        }
        Ok(top_k)
    }

    pub async fn search(&self, upload: ImageUpload, top_k: Option<usize>) -> ImageResult<SearchResponse> {
        let top_k = self.resolve_top_k(top_k)?;
        let mut run = QueryRun::new();
        debug!(query_id = %run.query_id, top_k, filename = %upload.filename, "Query received");

        let results = match self.execute(&mut run, &upload.bytes, top_k).await {
            Ok(results) => results,
            Err(e) => {
                let reached = run.fail(&e);
                match &e {
                    ImageError::DimensionMismatch { .. } | ImageError::Internal(_) => {
                        error!(query_id = %run.query_id, stage = ?reached, error = %e, "Query failed")
                    }
                    _ => warn!(query_id = %run.query_id, stage = ?reached, error = %e, "Query failed"),
                }
                return Err(e);
            }
        };

        if self.config.record_history {
            self.record(run.query_id, &upload.filename, &results).await;
        }
        run.advance(QueryStage::Done);

        Ok(SearchResponse {
            query_id: run.query_id,
            query_image: upload.filename,
            results,
        })
    }

    async fn execute(&self, run: &mut QueryRun, bytes: &Bytes, top_k: usize) -> ImageResult<Vec<SearchHit>> {
        validate_image_async(bytes.clone()).await?;
        let embedding = self.embedder.embed(bytes).await?;
        run.advance(QueryStage::EmbeddingComputed);

        let raw = self.nearest(&embedding, top_k).await?;
        run.advance(QueryStage::RawResultsFetched);

        let hits = self.enrich(run.query_id, raw).await?;
        run.advance(QueryStage::ResultsEnriched);
        Ok(hits)
    }

    /// Search and map slots to ids under one read guard, released before any I/O
    async fn nearest(&self, embedding: &[f32], top_k: usize) -> ImageResult<Vec<(EntityId, f32)>> {
        let index = self
            .index
            .read()
            .await
            .map_err(|e| ImageError::IndexUnavailable(e.to_string()))?;

        match index.search_entities(embedding, top_k) {
            Ok(hits) => Ok(hits),
            Err(IndexError::NotInitialized) => Err(ImageError::NoData),
            Err(e) => Err(e.into()),
        }
    }

    /// Attach metadata, dropping ids whose record is gone and re-ranking
    async fn enrich(&self, query_id: Uuid, raw: Vec<(EntityId, f32)>) -> ImageResult<Vec<SearchHit>> {
        let ids: Vec<EntityId> = raw.iter().map(|(id, _)| *id).collect();
        let records: HashMap<EntityId, ImageRecord> = self
            .images
            .find_many(ids)
            .await?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        let found = raw.len();
        let hits: Vec<SearchHit> = raw
            .into_iter()
            .filter_map(|(id, score)| records.get(&id).map(|record| (score, record)))
            .enumerate()
            .map(|(rank, (score, record))| SearchHit {
                image_id: record.id,
                rank,
                score,
                filename: record.filename.clone(),
                url: self.storage.image_url(&record.filename),
            })
            .collect();

        if hits.len() < found {
            warn!(%query_id, dropped = found - hits.len(), "Results without metadata dropped");
        }
        Ok(hits)
    }

    async fn record(&self, query_id: Uuid, query_filename: &str, results: &[SearchHit]) {
        let record = NewSearchRecord {
            query_id,
            query_filename: query_filename.to_string(),
            results: results.to_vec(),
        };
        if let Err(e) = self.history.append(record).await {
            warn!(%query_id, error = %e, "Failed to record search history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockImageEmbedder;
    use crate::error::ImageError;
    use crate::models::EmbeddingRecord;
    use crate::repository::{
        EmbeddingStore, InMemoryEmbeddingStore, InMemoryImageRepository,
        InMemorySearchHistoryRepository, MockImageRepository, MockSearchHistoryRepository,
    };
    use crate::validation::fixtures;
    use chrono::Utc;

    fn record(id: EntityId, filename: &str) -> ImageRecord {
        ImageRecord {
            id,
            filename: filename.to_string(),
            filepath: format!("uploads/{}", filename),
            uploaded_at: Utc::now(),
        }
    }

    fn embedder_returning(vector: Vec<f32>) -> Arc<dyn ImageEmbedder> {
        let mut embedder = MockImageEmbedder::new();
        embedder.expect_embed().returning(move |_| Ok(vector.clone()));
        Arc::new(embedder)
    }

    async fn index_with(rows: Vec<(EntityId, Vec<f32>)>) -> Arc<IndexManager> {
        let store = InMemoryEmbeddingStore::new();
        for (image_id, vector) in rows {
            store.upsert(EmbeddingRecord { image_id, vector }).await.unwrap();
        }
        let manager = Arc::new(IndexManager::new(Arc::new(store)));
        manager.initialize().await.unwrap();
        manager
    }

    fn upload() -> ImageUpload {
        ImageUpload {
            filename: "query.png".into(),
            bytes: fixtures::png([10, 200, 30]).into(),
        }
    }

    fn pipeline(
        index: Arc<IndexManager>,
        embedder: Arc<dyn ImageEmbedder>,
        images: Arc<dyn ImageRepository>,
        history: Arc<dyn SearchHistoryRepository>,
    ) -> SearchPipeline {
        SearchPipeline::new(
            index,
            embedder,
            images,
            history,
            StorageConfig::default(),
            SearchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_metadata_is_dropped_and_reranked() {
        let index = index_with(vec![(1, vec![0.0, 0.0]), (2, vec![1.0, 0.0]), (3, vec![2.0, 0.0])]).await;

        let mut images = MockImageRepository::new();
        images
            .expect_find_many()
            .withf(|ids| ids == &vec![1, 2, 3])
            .returning(|_| Ok(vec![record(3, "c.png"), record(1, "a.png")]));

        let search = pipeline(
            index,
            embedder_returning(vec![0.0, 0.0]),
            Arc::new(images),
            Arc::new(InMemorySearchHistoryRepository::new()),
        );
        let response = search.search(upload(), Some(3)).await.unwrap();

        let ranked: Vec<(EntityId, usize)> =
            response.results.iter().map(|h| (h.image_id, h.rank)).collect();
        assert_eq!(ranked, vec![(1, 0), (3, 1)]);
        assert_eq!(response.results[1].score, 4.0);
        assert_eq!(response.results[0].url, "http://localhost:8000/uploads/a.png");
    }

    #[tokio::test]
    async fn test_history_failure_does_not_fail_query() {
        let index = index_with(vec![(1, vec![1.0])]).await;
        let images = InMemoryImageRepository::new();
        let mut history = MockSearchHistoryRepository::new();
        history
            .expect_append()
            .times(1)
            .returning(|_| Err(ImageError::StorageFailure("disk full".into())));

        let search = pipeline(index, embedder_returning(vec![1.0]), Arc::new(images), Arc::new(history));
        let response = search.search(upload(), None).await.unwrap();
        assert_eq!(response.query_image, "query.png");
    }

    #[tokio::test]
    async fn test_history_records_results() {
        let index = index_with(vec![(1, vec![1.0])]).await;
        let mut images = MockImageRepository::new();
        images.expect_find_many().returning(|_| Ok(vec![record(1, "a.png")]));
        let history = Arc::new(InMemorySearchHistoryRepository::new());

        let search = pipeline(index, embedder_returning(vec![1.0]), Arc::new(images), history.clone());
        let response = search.search(upload(), None).await.unwrap();

        let recorded = history.list_recent(10).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].query_id, response.query_id);
        assert_eq!(recorded[0].result_count, 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_no_data() {
        let index = index_with(vec![]).await;
        let search = pipeline(
            index,
            embedder_returning(vec![1.0]),
            Arc::new(InMemoryImageRepository::new()),
            Arc::new(InMemorySearchHistoryRepository::new()),
        );
        assert!(matches!(search.search(upload(), None).await, Err(ImageError::NoData)));
    }

    #[tokio::test]
    async fn test_uninitialized_index_is_unavailable() {
        let index = Arc::new(IndexManager::new(Arc::new(InMemoryEmbeddingStore::new())));
        let search = pipeline(
            index,
            embedder_returning(vec![1.0]),
            Arc::new(InMemoryImageRepository::new()),
            Arc::new(InMemorySearchHistoryRepository::new()),
        );
        assert!(matches!(
            search.search(upload(), None).await,
            Err(ImageError::IndexUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_image_skips_embedding() {
        let index = index_with(vec![(1, vec![1.0])]).await;
        let mut embedder = MockImageEmbedder::new();
        embedder.expect_embed().never();

        let search = pipeline(
            index,
            Arc::new(embedder),
            Arc::new(InMemoryImageRepository::new()),
            Arc::new(InMemorySearchHistoryRepository::new()),
        );
        let bad = ImageUpload {
            filename: "notes.txt".into(),
            bytes: b"plain text".to_vec().into(),
        };
        assert!(matches!(search.search(bad, None).await, Err(ImageError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let index = index_with(vec![(1, vec![1.0, 0.0])]).await;
        let search = pipeline(
            index,
            embedder_returning(vec![1.0, 0.0, 0.0]),
            Arc::new(InMemoryImageRepository::new()),
            Arc::new(InMemorySearchHistoryRepository::new()),
        );
        assert!(matches!(
            search.search(upload(), None).await,
            Err(ImageError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_failure_is_terminal_and_reports_reached_stage() {
        let mut run = QueryRun::new();
        run.advance(QueryStage::EmbeddingComputed);

        let reached = run.fail(&ImageError::NoData);
        assert_eq!(reached, QueryStage::EmbeddingComputed);
        assert_eq!(run.stage, QueryStage::Failed(ImageError::NoData.to_string()));

        run.advance(QueryStage::Done);
        assert!(matches!(run.stage, QueryStage::Failed(_)));
    }

    #[test]
    fn test_completed_query_ends_done() {
        let mut run = QueryRun::new();
        for stage in [
            QueryStage::EmbeddingComputed,
            QueryStage::RawResultsFetched,
            QueryStage::ResultsEnriched,
            QueryStage::Done,
        ] {
            run.advance(stage);
        }
        assert!(run.stage.is_terminal());
        assert_eq!(run.stage, QueryStage::Done);
    }

    #[test]
    fn test_resolve_top_k() {
        let search = SearchPipeline::new(
            Arc::new(IndexManager::new(Arc::new(InMemoryEmbeddingStore::new()))),
            embedder_returning(vec![]),
            Arc::new(InMemoryImageRepository::new()),
            Arc::new(InMemorySearchHistoryRepository::new()),
            StorageConfig::default(),
            SearchConfig::default(),
        );
        assert_eq!(search.resolve_top_k(None).unwrap(), 5);
        assert_eq!(search.resolve_top_k(Some(100)).unwrap(), 100);
        assert!(matches!(search.resolve_top_k(Some(0)), Err(ImageError::Validation(_))));
        assert!(matches!(search.resolve_top_k(Some(101)), Err(ImageError::Validation(_))));
    }
}
