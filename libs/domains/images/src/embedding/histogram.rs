use async_trait::async_trait;
use image::imageops::FilterType;

use super::ImageEmbedder;
use crate::config::MAX_HISTOGRAM_BINS;
use crate::error::{ImageError, ImageResult};

/// Input edge length the image is resized to before binning
const THUMBNAIL_SIZE: u32 = 224;

/// Deterministic local embedding: a joint RGB histogram.
///
/// Produces `bins^3` components that sum to 1. Decoding and binning run on
/// the blocking pool.
#[derive(Debug, Clone)]
pub struct HistogramEmbedder {
    bins: u32,
}

impl HistogramEmbedder {
    pub fn new(bins: u32) -> ImageResult<Self> {
        if !(1..=MAX_HISTOGRAM_BINS).contains(&bins) {
            return Err(ImageError::Internal(format!(
                "histogram bins must be between 1 and {}",
                MAX_HISTOGRAM_BINS
            )));
        }
        Ok(Self { bins })
    }

    fn histogram(bins: u32, bytes: &[u8]) -> ImageResult<Vec<f32>> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| ImageError::InvalidImage(e.to_string()))?;
        let thumbnail = decoded
            .resize_exact(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle)
            .to_rgb8();

        let bins = bins as usize;
        let mut counts = vec![0u32; bins * bins * bins];
        for pixel in thumbnail.pixels() {
            let [r, g, b] = pixel.0.map(|c| c as usize * bins / 256);
            counts[(r * bins + g) * bins + b] += 1;
        }

        let total = (THUMBNAIL_SIZE * THUMBNAIL_SIZE) as f32;
        Ok(counts.into_iter().map(|c| c as f32 / total).collect())
    }
}

#[async_trait]
impl ImageEmbedder for HistogramEmbedder {
    fn name(&self) -> &str {
        "rgb-histogram"
    }

    fn dimension(&self) -> Option<usize> {
        Some((self.bins * self.bins * self.bins) as usize)
    }

    async fn embed(&self, bytes: &[u8]) -> ImageResult<Vec<f32>> {
        let bins = self.bins;
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || Self::histogram(bins, &bytes))
            .await
            .map_err(|e| ImageError::Internal(format!("embedding task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::fixtures;

    #[tokio::test]
    async fn test_solid_colour_fills_one_bin() {
        let embedder = HistogramEmbedder::new(4).unwrap();
        let vector = embedder.embed(&fixtures::png([255, 0, 0])).await.unwrap();

        assert_eq!(vector.len(), 64);
        assert_eq!(embedder.dimension(), Some(64));
        // r=3, g=0, b=0
        assert!((vector[3 * 16] - 1.0).abs() < 1e-6);
        assert!((vector.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_deterministic_and_discriminative() {
        let embedder = HistogramEmbedder::new(8).unwrap();
        let red = fixtures::png([250, 10, 10]);

        let a = embedder.embed(&red).await.unwrap();
        let b = embedder.embed(&red).await.unwrap();
        let blue = embedder.embed(&fixtures::png([10, 10, 250])).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, blue);
    }

    #[tokio::test]
    async fn test_invalid_bytes() {
        let embedder = HistogramEmbedder::new(8).unwrap();
        let err = embedder.embed(b"garbage").await.unwrap_err();
        assert!(matches!(err, ImageError::InvalidImage(_)));
    }

    #[test]
    fn test_bins_bounds() {
        assert!(HistogramEmbedder::new(0).is_err());
        assert!(HistogramEmbedder::new(17).is_err());
    }
}
