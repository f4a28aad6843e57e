mod histogram;
mod http;
mod provider;

pub use histogram::HistogramEmbedder;
pub use http::HttpImageEmbedder;
pub use provider::ImageEmbedder;
#[cfg(test)]
pub use provider::MockImageEmbedder;

use std::sync::Arc;

use crate::config::{EmbedderConfig, EmbedderKind};
use crate::error::ImageResult;

/// Construct the embedder selected by `config`
pub fn from_config(config: &EmbedderConfig) -> ImageResult<Arc<dyn ImageEmbedder>> {
    let embedder: Arc<dyn ImageEmbedder> = match config.kind {
        EmbedderKind::Http => Arc::new(HttpImageEmbedder::new(config.clone())?),
        EmbedderKind::Histogram => Arc::new(HistogramEmbedder::new(config.histogram_bins)?),
    };
    tracing::info!(embedder = embedder.name(), dimension = ?embedder.dimension(), "Embedding provider ready");
    Ok(embedder)
}
