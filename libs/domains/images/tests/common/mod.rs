//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use domain_images::*;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};

pub const BOUNDARY: &str = "imgsearch-test-boundary";

/// A solid-colour PNG; distinct colours give distinct bytes
pub fn png(rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Embedder returning a fixed vector per input, keyed by the exact bytes
#[derive(Default)]
pub struct LookupEmbedder {
    vectors: HashMap<Vec<u8>, Vec<f32>>,
}

impl LookupEmbedder {
    pub fn with(mut self, bytes: &[u8], vector: Vec<f32>) -> Self {
        self.vectors.insert(bytes.to_vec(), vector);
        self
    }
}

#[async_trait]
impl ImageEmbedder for LookupEmbedder {
    fn name(&self) -> &str {
        "lookup"
    }

    fn dimension(&self) -> Option<usize> {
        self.vectors.values().next().map(Vec::len)
    }

    async fn embed(&self, bytes: &[u8]) -> ImageResult<Vec<f32>> {
        self.vectors
            .get(bytes)
            .cloned()
            .ok_or_else(|| ImageError::InvalidImage("unknown fixture".to_string()))
    }
}

pub fn service_with(embedder: Arc<dyn ImageEmbedder>) -> Arc<ImageService> {
    Arc::new(ImageService::new(
        Collaborators::in_memory(embedder),
        StorageConfig::default(),
        SearchConfig::default(),
    ))
}

/// Build a `multipart/form-data` body with one part per `(name, filename, bytes)`
pub fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Body {
    let mut body = Vec::new();
    for (name, filename, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

pub async fn json_body<T: serde::de::DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
