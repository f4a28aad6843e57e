use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State, rejection::QueryRejection},
    routing::{get, post},
};
use utoipa::{OpenApi, ToSchema};

use crate::error::{ErrorResponse, ImageError, ImageResult};
use crate::models::{
    DashboardStats, FailedUpload, HealthStatus, HistoryParams, ImageUpload, IndexPhase, IndexUpdate,
    IndexStatus, IngestedImage, SearchHistoryEntry, SearchHit, SearchParams, SearchResponse,
    UploadHistoryEntry, UploadReport,
};
use crate::service::ImageService;

/// Largest accepted request body
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const TAG: &str = "images";

#[derive(OpenApi)]
#[openapi(
    paths(upload_images, upload_history, search_similar, search_history, dashboard_stats, health),
    components(schemas(
        UploadForm,
        SearchForm,
        UploadReport,
        IngestedImage,
        IndexUpdate,
        FailedUpload,
        UploadHistoryEntry,
        SearchResponse,
        SearchHit,
        SearchHistoryEntry,
        DashboardStats,
        IndexStatus,
        IndexPhase,
        HealthStatus,
        ErrorResponse
    )),
    tags((name = TAG, description = "Image upload and similarity search"))
)]
pub struct ApiDoc;

/// Multipart body of `POST /upload`
#[derive(ToSchema)]
#[allow(dead_code)]
struct UploadForm {
    /// One part per image
    #[schema(value_type = Vec<String>)]
    files: Vec<Vec<u8>>,
}

/// Multipart body of `POST /search`
#[derive(ToSchema)]
#[allow(dead_code)]
struct SearchForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

pub fn router(service: Arc<ImageService>) -> Router {
    Router::new()
        // The web client posts to the slash-terminated forms
        .route("/upload", post(upload_images))
        .route("/upload/", post(upload_images))
        .route("/upload/history", get(upload_history))
        .route("/search", post(search_similar))
        .route("/search/", post(search_similar))
        .route("/search/history", get(search_history))
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Unwrap query parameters, reporting malformed ones as a JSON validation error
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> ImageResult<T> {
    query
        .map(|Query(params)| params)
        .map_err(|e| ImageError::Validation(e.body_text()))
}

/// Collect every part named `field` as an upload
async fn read_files(mut multipart: Multipart, field: &str) -> ImageResult<Vec<ImageUpload>> {
    let mut files = Vec::new();
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| ImageError::Validation(e.body_text()))?
    {
        if part.name() != Some(field) {
            continue;
        }
        let filename = part.file_name().unwrap_or("upload").to_string();
        let bytes = part
            .bytes()
            .await
            .map_err(|e| ImageError::Validation(e.body_text()))?;
        files.push(ImageUpload { filename, bytes });
    }
    Ok(files)
}

/// Upload one or more images
#[utoipa::path(
    post,
    path = "/upload",
    tag = TAG,
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-file upload outcome", body = UploadReport),
        (status = 400, description = "No files in the request", body = ErrorResponse)
    )
)]
async fn upload_images(
    State(service): State<Arc<ImageService>>,
    multipart: Multipart,
) -> ImageResult<Json<UploadReport>> {
    let files = read_files(multipart, "files").await?;
    Ok(Json(service.ingest_batch(files).await?))
}

/// Recent uploads, newest first
#[utoipa::path(
    get,
    path = "/upload/history",
    tag = TAG,
    params(HistoryParams),
    responses(
        (status = 200, description = "Upload history", body = Vec<UploadHistoryEntry>),
        (status = 400, description = "Invalid limit", body = ErrorResponse)
    )
)]
async fn upload_history(
    State(service): State<Arc<ImageService>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ImageResult<Json<Vec<UploadHistoryEntry>>> {
    Ok(Json(service.upload_history(query_params(params)?).await?))
}

/// Find the images most similar to the uploaded one
#[utoipa::path(
    post,
    path = "/search",
    tag = TAG,
    params(SearchParams),
    request_body(content = SearchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Ranked results", body = SearchResponse),
        (status = 400, description = "Invalid image or top_k", body = ErrorResponse),
        (status = 404, description = "No images indexed yet", body = ErrorResponse),
        (status = 503, description = "Index or embedding service unavailable", body = ErrorResponse)
    )
)]
async fn search_similar(
    State(service): State<Arc<ImageService>>,
    params: Result<Query<SearchParams>, QueryRejection>,
    multipart: Multipart,
) -> ImageResult<Json<SearchResponse>> {
    let params = query_params(params)?;
    let upload = read_files(multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ImageError::Validation("multipart field 'file' is required".to_string()))?;

    Ok(Json(service.search(upload, params.top_k).await?))
}

/// Recorded queries, newest first
#[utoipa::path(
    get,
    path = "/search/history",
    tag = TAG,
    params(HistoryParams),
    responses(
        (status = 200, description = "Search history", body = Vec<SearchHistoryEntry>),
        (status = 400, description = "Invalid limit", body = ErrorResponse)
    )
)]
async fn search_history(
    State(service): State<Arc<ImageService>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ImageResult<Json<Vec<SearchHistoryEntry>>> {
    Ok(Json(service.search_history(query_params(params)?).await?))
}

#[utoipa::path(
    get,
    path = "/dashboard/stats",
    tag = TAG,
    responses(
        (status = 200, description = "Totals and recent activity", body = DashboardStats),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
async fn dashboard_stats(State(service): State<Arc<ImageService>>) -> ImageResult<Json<DashboardStats>> {
    Ok(Json(service.dashboard_stats().await?))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = TAG,
    responses((status = 200, description = "Service health", body = HealthStatus))
)]
async fn health(State(service): State<Arc<ImageService>>) -> Json<HealthStatus> {
    Json(service.health().await)
}
