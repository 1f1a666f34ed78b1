//! Collaborator interfaces for text generation and image encoding.
//!
//! The coordinator only talks to these traits; `kaiwa-interaction` and
//! `kaiwa-infrastructure` provide the concrete implementations.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An image already converted into the inline wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    /// Base64 (standard alphabet, padded) image bytes
    pub data: String,
}

/// Turns an image reference into base64 inline data.
#[async_trait]
pub trait ImageEncoder: Send + Sync {
    /// # Errors
    ///
    /// Returns `KaiwaError::Encode` if the file cannot be read or is not an image.
    async fn encode(&self, path: &Path) -> Result<EncodedImage>;
}

/// Remote text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String>;

    async fn generate_text_with_image(&self, prompt: &str, image: &EncodedImage) -> Result<String>;
}

/// A model advertised by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Resource name, e.g. `models/gemini-2.5-flash`
    pub name: String,
    /// Also read from `supportedGenerationMethods`
    #[serde(
        default,
        rename = "supportedMethods",
        alias = "supportedGenerationMethods"
    )]
    pub supported_methods: Vec<String>,
}

impl ModelInfo {
    /// The short id usable in a generation URL (`gemini-2.5-flash`).
    pub fn short_name(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    /// Whether the model can serve `generateContent` requests.
    ///
    /// Models that advertise no methods at all are assumed to support it.
    pub fn supports_generation(&self) -> bool {
        self.supported_methods.is_empty()
            || self
                .supported_methods
                .iter()
                .any(|method| method == "generateContent")
    }
}

/// Lists the models available to the configured credentials and switches
/// between them.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// The model subsequent generation requests go to.
    fn current_model(&self) -> String;

    /// Routes subsequent generation requests to `model` (a short name such
    /// as `gemini-2.5-pro`). Requests already in flight are unaffected.
    fn select_model(&self, model: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_short_name() {
        let model = ModelInfo {
            name: "models/gemini-2.5-flash".into(),
            supported_methods: vec![],
        };
        assert_eq!(model.short_name(), "gemini-2.5-flash");
    }

    #[test]
    fn test_supports_generation() {
        let embed_only = ModelInfo {
            name: "models/text-embedding-004".into(),
            supported_methods: vec!["embedContent".into()],
        };
        let chat = ModelInfo {
            name: "models/gemini-2.5-pro".into(),
            supported_methods: vec!["generateContent".into(), "countTokens".into()],
        };
        assert!(!embed_only.supports_generation());
        assert!(chat.supports_generation());
    }
}
