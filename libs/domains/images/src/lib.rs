//! Image similarity search domain
//!
//! Uploaded images are embedded into fixed-length vectors and kept in an
//! in-memory exact nearest-neighbour index that is rebuilt from PostgreSQL at
//! startup.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Handlers   │  ← axum multipart endpoints
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ ImageService │  ← facade over the pipelines
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐     ┌──────────────┐
//! │  Pipelines   │────►│ IndexManager │  ← single writer, shared readers
//! └──────┬───────┘     └──────────────┘
//!        │
//! ┌──────▼───────┐
//! │ Collaborators│  ← embedder, stores, file storage (trait + impls)
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use domain_images::{
//!     Collaborators, HistogramEmbedder, ImageService, SearchConfig, StorageConfig, handlers,
//! };
//!
//! # async fn run() -> domain_images::ImageResult<()> {
//! let deps = Collaborators::in_memory(Arc::new(HistogramEmbedder::new(8)?));
//! let service = Arc::new(ImageService::new(deps, StorageConfig::default(), SearchConfig::default()));
//! service.initialize_index().await?;
//!
//! let router = handlers::router(service);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod storage;
pub mod validation;

pub use config::{EmbedderConfig, EmbedderKind, SearchConfig, StorageConfig};
pub use embedding::{HistogramEmbedder, HttpImageEmbedder, ImageEmbedder};
pub use error::{ErrorResponse, ImageError, ImageResult};
pub use index::{EntityId, IndexError, IndexManager, InsertOutcome, VectorIndex};
pub use models::*;
pub use postgres::{PgEmbeddingStore, PgImageRepository, PgSearchHistoryRepository};
pub use repository::{
    EmbeddingStore, ImageRepository, InMemoryEmbeddingStore, InMemoryImageRepository,
    InMemorySearchHistoryRepository, SearchHistoryRepository,
};
pub use service::{Collaborators, ImageService};
pub use storage::{ImageStorage, InMemoryImageStorage, LocalImageStorage};
pub use validation::{ImageInfo, validate_image, validate_image_async};
