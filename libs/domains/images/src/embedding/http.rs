use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;

use super::ImageEmbedder;
use crate::config::EmbedderConfig;
use crate::error::{ImageError, ImageResult};

/// Calls an external embedding service.
///
/// `POST {url}/embed/image?model={model}` with the raw bytes as
/// `application/octet-stream`, answered by `{ "embedding": [..] }`.
pub struct HttpImageEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl HttpImageEmbedder {
    pub fn new(config: EmbedderConfig) -> ImageResult<Self> {
        let base = config
            .url
            .ok_or_else(|| ImageError::Internal("embedder url is not configured".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embed/image", base.trim_end_matches('/')),
            model: config.model,
        })
    }
}

#[async_trait]
impl ImageEmbedder for HttpImageEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, bytes: &[u8]) -> ImageResult<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("model", self.model.as_str())])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST
                | StatusCode::UNSUPPORTED_MEDIA_TYPE
                | StatusCode::UNPROCESSABLE_ENTITY => ImageError::InvalidImage(body),
                _ => ImageError::EmbeddingUnavailable(format!("{}: {}", status, body)),
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(ImageError::EmbeddingUnavailable(
                "embedding service returned an empty vector".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }
}
