//! Secret management service trait.
//!
//! Defines the interface for loading the credential pool (API keys).

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Contents of `secret.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(default)]
    pub gemini: Option<GeminiSecret>,
}

/// Gemini credentials.
///
/// `api_keys` is the ordered credential pool; the older single `api_key`
/// field is still accepted and appended after it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiSecret {
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl SecretConfig {
    /// The ordered, de-duplicated, non-blank credential pool.
    pub fn credential_pool(&self) -> Vec<String> {
        let Some(gemini) = &self.gemini else {
            return Vec::new();
        };
        let mut pool: Vec<String> = Vec::new();
        for key in gemini.api_keys.iter().chain(gemini.api_key.iter()) {
            let key = key.trim();
            if !key.is_empty() && !pool.iter().any(|existing| existing == key) {
                pool.push(key.to_string());
            }
        }
        pool
    }
}

/// Service for managing secret configuration.
///
/// # Security Note
///
/// Implementations should ensure that:
/// - Secret files have appropriate permissions (e.g., 600 on Unix)
/// - Secrets are never logged or exposed in error messages
#[async_trait::async_trait]
pub trait SecretService: Send + Sync {
    async fn load_secrets(&self) -> Result<SecretConfig>;

    async fn secret_file_exists(&self) -> bool;
}
