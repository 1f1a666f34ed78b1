//! File system image encoder.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kaiwa_core::generation::{EncodedImage, ImageEncoder};
use kaiwa_core::{KaiwaError, Result};
use std::path::Path;

/// Reads an image from disk and base64-encodes it.
///
/// The MIME type is guessed from the file extension; anything that is not
/// `image/*` is rejected.
#[derive(Debug, Clone, Default)]
pub struct FileImageEncoder;

impl FileImageEncoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageEncoder for FileImageEncoder {
    async fn encode(&self, path: &Path) -> Result<EncodedImage> {
        let shown = path.display().to_string();
        let mime = mime_guess::from_path(path)
            .first()
            .ok_or_else(|| KaiwaError::encode(&shown, "unknown file type"))?;
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(KaiwaError::encode(&shown, format!("{mime} is not an image")));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| KaiwaError::encode(&shown, e.to_string()))?;
        tracing::debug!(path = %shown, mime = %mime, bytes = bytes.len(), "encoded image");
        Ok(EncodedImage {
            mime_type: mime.essence_str().to_string(),
            data: STANDARD.encode(bytes),
        })
    }
}
