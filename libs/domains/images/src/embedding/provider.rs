use async_trait::async_trait;

use crate::error::ImageResult;

/// Maps raw image bytes to a fixed-dimension vector.
///
/// The dimension must stay constant for the lifetime of the process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    fn name(&self) -> &str;

    /// Output dimension when known without calling the model
    fn dimension(&self) -> Option<usize>;

    async fn embed(&self, bytes: &[u8]) -> ImageResult<Vec<f32>>;
}
