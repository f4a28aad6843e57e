use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::index::IndexError;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No images have been indexed yet")]
    NoData,

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ImageResult<T> = Result<T, ImageError>;

impl ImageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ImageError::InvalidImage(_) | ImageError::Validation(_) => StatusCode::BAD_REQUEST,
            ImageError::NoData => StatusCode::NOT_FOUND,
            ImageError::IndexUnavailable(_) | ImageError::EmbeddingUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ImageError::DimensionMismatch { .. }
            | ImageError::StorageFailure(_)
            | ImageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable identifier and monitoring code
    pub fn code(&self) -> (&'static str, i32) {
        match self {
            ImageError::InvalidImage(_) => ("INVALID_IMAGE", 1001),
            ImageError::Validation(_) => ("VALIDATION_ERROR", 1002),
            ImageError::NoData => ("NO_DATA", 1003),
            ImageError::IndexUnavailable(_) => ("INDEX_UNAVAILABLE", 1101),
            ImageError::EmbeddingUnavailable(_) => ("EMBEDDING_UNAVAILABLE", 1102),
            ImageError::DimensionMismatch { .. } => ("DIMENSION_MISMATCH", 2001),
            ImageError::StorageFailure(_) => ("STORAGE_FAILURE", 2002),
            ImageError::Internal(_) => ("INTERNAL_ERROR", 2003),
        }
    }

    /// Message safe to return to clients. Server faults never leak detail.
    fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

/// JSON body for every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: i32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for ImageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, code) = self.code();

        if status.is_server_error() {
            tracing::error!(error_code = code, error = %self, "Request failed");
        } else {
            tracing::info!(error_code = code, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            code,
            error: error.to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<IndexError> for ImageError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, actual } => {
                ImageError::DimensionMismatch { expected, actual }
            }
            IndexError::NotInitialized | IndexError::Initializing => {
                ImageError::IndexUnavailable(err.to_string())
            }
            other => ImageError::Internal(other.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for ImageError {
    fn from(err: sea_orm::DbErr) -> Self {
        ImageError::StorageFailure(format!("Database error: {}", err))
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        ImageError::StorageFailure(format!("I/O error: {}", err))
    }
}

impl From<reqwest::Error> for ImageError {
    fn from(err: reqwest::Error) -> Self {
        ImageError::EmbeddingUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ImageError {
    fn from(err: serde_json::Error) -> Self {
        ImageError::Internal(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for ImageError {
    fn from(err: validator::ValidationErrors) -> Self {
        ImageError::Validation(err.to_string())
    }
}
