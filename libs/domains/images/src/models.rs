use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::index::EntityId;

/// Upload history timestamp format
pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stored image metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImageRecord {
    /// Identifier assigned by the metadata store
    pub id: EntityId,
    /// Generated file name under the upload directory
    pub filename: String,
    /// Path the bytes were written to
    pub filepath: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Metadata for an image about to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub filename: String,
    pub filepath: String,
}

/// One row of the embedding store
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub image_id: EntityId,
    pub vector: Vec<f32>,
}

/// A raw upload as received from the client
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Client-supplied name, used for reporting only
    pub filename: String,
    pub bytes: Bytes,
}

/// One ranked, enriched search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchHit {
    pub image_id: EntityId,
    /// Position in the result list, 0 is the nearest
    pub rank: usize,
    /// Squared L2 distance to the query; lower is more similar
    pub score: f32,
    pub filename: String,
    pub url: String,
}

/// Response to a similarity query
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub query_id: Uuid,
    /// Client-supplied name of the query image
    pub query_image: String,
    pub results: Vec<SearchHit>,
}

/// Query parameters for `POST /search`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Number of results, defaults to the configured value
    pub top_k: Option<usize>,
}

/// Query parameters for history listings
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    #[validate(range(min = 1, max = 500))]
    #[serde(default = "default_history_limit")]
    pub limit: u64,
}

fn default_history_limit() -> u64 {
    50
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

/// A query to record in the search history
#[derive(Debug, Clone, PartialEq)]
pub struct NewSearchRecord {
    pub query_id: Uuid,
    pub query_filename: String,
    pub results: Vec<SearchHit>,
}

/// A recorded query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchHistoryEntry {
    pub query_id: Uuid,
    pub query_filename: String,
    pub result_count: usize,
    pub results: Vec<SearchHit>,
    pub created_at: DateTime<Utc>,
}

/// A successfully ingested file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IngestedImage {
    pub image_id: EntityId,
    /// Generated storage name
    pub filename: String,
    /// Name the client uploaded the file under
    pub original_filename: String,
    pub path: String,
    pub index: IndexUpdate,
}

/// What happened to the index for an ingested image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexUpdate {
    /// Searchable now
    Indexed,
    /// Buffered until the startup build completes; applied then unless it
    /// conflicts with the built index
    Pending,
    /// Index update failed; the image becomes searchable after a restart
    Failed,
}

/// A file rejected during a batch upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FailedUpload {
    pub filename: String,
    pub error: String,
}

/// Per-file outcome of a batch upload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadReport {
    pub message: String,
    pub uploaded: Vec<IngestedImage>,
    pub failed: Vec<FailedUpload>,
}

/// Upload history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadHistoryEntry {
    pub id: EntityId,
    pub filename: String,
    /// Upload time formatted as `%Y-%m-%d %H:%M:%S` (UTC)
    pub time: String,
    pub status: String,
}

impl From<ImageRecord> for UploadHistoryEntry {
    fn from(record: ImageRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            time: record.uploaded_at.format(HISTORY_TIME_FORMAT).to_string(),
            status: "Success".to_string(),
        }
    }
}

/// Lifecycle phase of the in-memory index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    /// Startup build has not completed
    Initializing,
    /// Built from an empty store, no uploads since
    Empty,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndexStatus {
    pub state: IndexPhase,
    pub vectors: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_images: u64,
    pub total_searches: u64,
    pub system_status: String,
    /// Five most recent uploads
    pub recent_activity: Vec<UploadHistoryEntry>,
    pub index: IndexStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    /// `OK` or `FAILED`
    pub database: String,
    pub index: IndexPhase,
}
