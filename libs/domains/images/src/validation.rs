use std::io::Cursor;

use axum::body::Bytes;
use image::{ImageFormat, ImageReader};

use crate::error::{ImageError, ImageResult};

/// Decoded properties of an accepted upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// File extension for the decoded format
    pub fn extension(&self) -> &'static str {
        match self.format {
            ImageFormat::Jpeg => "jpg",
            _ => "png",
        }
    }
}

/// Fully decode `bytes` as PNG or JPEG.
///
/// The format is sniffed from the content; declared content types and file
/// names are never trusted.
pub fn validate_image(bytes: &[u8]) -> ImageResult<ImageInfo> {
    if bytes.is_empty() {
        return Err(ImageError::InvalidImage("empty file".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidImage(e.to_string()))?;

    let format = match reader.format() {
        Some(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => format,
        Some(other) => {
            return Err(ImageError::InvalidImage(format!(
                "unsupported format {:?}",
                other
            )));
        }
        None => return Err(ImageError::InvalidImage("unrecognized image data".to_string())),
    };

    let decoded = reader
        .decode()
        .map_err(|e| ImageError::InvalidImage(e.to_string()))?;

    Ok(ImageInfo {
        format,
        width: decoded.width(),
        height: decoded.height(),
    })
}

/// [`validate_image`] on the blocking pool; decoding a large upload must not
/// stall the async workers.
pub async fn validate_image_async(bytes: Bytes) -> ImageResult<ImageInfo> {
    tokio::task::spawn_blocking(move || validate_image(&bytes))
        .await
        .map_err(|e| ImageError::Internal(format!("validation task failed: {}", e)))?
}
