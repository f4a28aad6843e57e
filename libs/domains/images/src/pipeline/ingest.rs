use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embedding::ImageEmbedder;
use crate::error::{ImageError, ImageResult};
use crate::index::{IndexManager, InsertOutcome};
use crate::models::{
    EmbeddingRecord, FailedUpload, ImageRecord, ImageUpload, IndexUpdate, IngestedImage, NewImage,
    UploadReport,
};
use crate::repository::{EmbeddingStore, ImageRepository};
use crate::storage::ImageStorage;
use crate::validation::validate_image_async;

/// Files of one batch processed at the same time
pub const INGEST_CONCURRENCY: usize = 4;

/// Validates, stores, embeds and indexes uploaded images
pub struct IngestPipeline {
    index: Arc<IndexManager>,
    embedder: Arc<dyn ImageEmbedder>,
    images: Arc<dyn ImageRepository>,
    embeddings: Arc<dyn EmbeddingStore>,
    storage: Arc<dyn ImageStorage>,
}

impl IngestPipeline {
    pub fn new(
        index: Arc<IndexManager>,
        embedder: Arc<dyn ImageEmbedder>,
        images: Arc<dyn ImageRepository>,
        embeddings: Arc<dyn EmbeddingStore>,
        storage: Arc<dyn ImageStorage>,
    ) -> Self {
        Self {
            index,
            embedder,
            images,
            embeddings,
            storage,
        }
    }

    /// Ingest one image.
    ///
    /// The embedding is durable before the index sees it. A failed index
    /// update is reported through [`IndexUpdate::Failed`] and never undoes the
    /// stored image.
    pub async fn ingest(&self, upload: ImageUpload) -> ImageResult<IngestedImage> {
        let info = validate_image_async(upload.bytes.clone()).await?;
        let filename = format!("{}.{}", Uuid::new_v4(), info.extension());

        let path = self.storage.save(&filename, &upload.bytes).await?;
        let record = match self
            .images
            .create(NewImage {
                filename: filename.clone(),
                filepath: path.clone(),
            })
            .await
        {
            Ok(record) => record,
            Err(e) => {
                self.discard_file(&filename).await;
                return Err(e);
            }
        };
        debug!(image_id = record.id, width = info.width, height = info.height, "Image stored");

        let vector = match self.embed_and_persist(&record, &upload.bytes).await {
            Ok(vector) => vector,
            Err(e) => {
                self.rollback(&record).await;
                return Err(e);
            }
        };

        let index = match self.index.apply_insert(record.id, vector).await {
            Ok(InsertOutcome::Inserted { slot } | InsertOutcome::AlreadyIndexed { slot }) => {
                debug!(image_id = record.id, slot, "Image indexed");
                IndexUpdate::Indexed
            }
            Ok(InsertOutcome::Initialized) => IndexUpdate::Indexed,
            Ok(InsertOutcome::Deferred) => IndexUpdate::Pending,
            Err(e) => {
                warn!(image_id = record.id, error = %e, "Index update failed, index is behind the store");
                IndexUpdate::Failed
            }
        };

        info!(image_id = record.id, filename = %filename, index = ?index, "Image ingested");
        Ok(IngestedImage {
            image_id: record.id,
            filename,
            original_filename: upload.filename,
            path,
            index,
        })
    }

    /// Ingest every file independently; one failure never aborts its siblings
    pub async fn ingest_batch(&self, uploads: Vec<ImageUpload>) -> ImageResult<UploadReport> {
        if uploads.is_empty() {
            return Err(ImageError::Validation("no files were uploaded".to_string()));
        }
        let total = uploads.len();

        let outcomes: Vec<(String, ImageResult<IngestedImage>)> = stream::iter(uploads)
            .map(|upload| async move {
                let name = upload.filename.clone();
                (name, self.ingest(upload).await)
            })
            .buffered(INGEST_CONCURRENCY)
            .collect()
            .await;

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        for (filename, outcome) in outcomes {
            match outcome {
                Ok(image) => uploaded.push(image),
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Upload rejected");
                    failed.push(FailedUpload {
                        filename,
                        error: client_message(&e),
                    });
                }
            }
        }

        Ok(UploadReport {
            message: format!("Uploaded {} of {} images", uploaded.len(), total),
            uploaded,
            failed,
        })
    }

    async fn embed_and_persist(&self, record: &ImageRecord, bytes: &[u8]) -> ImageResult<Vec<f32>> {
        let vector = self.embedder.embed(bytes).await?;
        self.embeddings
            .upsert(EmbeddingRecord {
                image_id: record.id,
                vector: vector.clone(),
            })
            .await?;
        Ok(vector)
    }

    async fn rollback(&self, record: &ImageRecord) {
        if let Err(e) = self.images.delete(record.id).await {
            warn!(image_id = record.id, error = %e, "Failed to remove image record during rollback");
        }
        self.discard_file(&record.filename).await;
    }

    async fn discard_file(&self, filename: &str) {
        if let Err(e) = self.storage.remove(filename).await {
            warn!(filename, error = %e, "Failed to remove stored file during rollback");
        }
    }
}

/// Per-file error text; server faults are not detailed to the client
fn client_message(err: &ImageError) -> String {
    match err {
        ImageError::StorageFailure(_) | ImageError::Internal(_) | ImageError::DimensionMismatch { .. } => {
            "Failed to store image".to_string()
        }
        other => other.to_string(),
    }
}
