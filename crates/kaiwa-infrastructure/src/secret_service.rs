//! Secret service implementation.
//!
//! Reads the credential pool from `secret.json`. The `KAIWA_API_KEYS`
//! environment variable (comma separated) takes precedence over the file.

use crate::paths::KaiwaPaths;
use kaiwa_core::secret::{GeminiSecret, SecretConfig, SecretService};
use kaiwa_core::{KaiwaError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const API_KEYS_ENV: &str = "KAIWA_API_KEYS";

/// Service for loading secret configuration.
///
/// The parsed file is cached after the first successful load.
#[derive(Debug, Clone)]
pub struct SecretServiceImpl {
    path: PathBuf,
    env_override: Option<String>,
    secrets: Arc<RwLock<Option<SecretConfig>>>,
}

impl SecretServiceImpl {
    /// Creates a service for the secret file under `paths`, honoring the
    /// environment override.
    pub fn new(paths: &KaiwaPaths) -> Result<Self> {
        let path = paths
            .secret_file()
            .map_err(|e| KaiwaError::config(e.to_string()))?;
        Ok(Self::with_path(path).with_env_override(std::env::var(API_KEYS_ENV).ok()))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_override: None,
            secrets: Arc::new(RwLock::new(None)),
        }
    }

    /// Comma separated keys that replace the file contents when non-blank.
    pub fn with_env_override(mut self, value: Option<String>) -> Self {
        self.env_override = value.filter(|raw| !raw.trim().is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_secrets_internal(&self) -> Result<SecretConfig> {
        if let Some(raw) = &self.env_override {
            tracing::debug!("using credential pool from {API_KEYS_ENV}");
            return Ok(SecretConfig {
                gemini: Some(GeminiSecret {
                    api_keys: raw.split(',').map(str::to_string).collect(),
                    api_key: None,
                }),
            });
        }

        {
            let cached = self.secrets.read().unwrap_or_else(|p| p.into_inner());
            if let Some(secrets) = cached.as_ref() {
                return Ok(secrets.clone());
            }
        }

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KaiwaError::config(format!(
                    "no secret file at {}; add your API keys there or set {API_KEYS_ENV}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(KaiwaError::config(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };
        // The serde error never echoes key material, only positions.
        let loaded: SecretConfig = serde_json::from_str(&raw)
            .map_err(|e| KaiwaError::config(format!("invalid {}: {e}", self.path.display())))?;

        let mut slot = self.secrets.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(loaded.clone());
        Ok(loaded)
    }
}

#[async_trait::async_trait]
impl SecretService for SecretServiceImpl {
    async fn load_secrets(&self) -> Result<SecretConfig> {
        self.load_secrets_internal()
    }

    async fn secret_file_exists(&self) -> bool {
        self.path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_loads_pool_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secret.json");
        std::fs::write(&path, r#"{"gemini":{"api_keys":["A","B"],"api_key":"C"}}"#).unwrap();

        let service = SecretServiceImpl::with_path(&path);
        assert!(service.secret_file_exists().await);
        let secrets = service.load_secrets().await.unwrap();
        assert_eq!(secrets.credential_pool(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let service = SecretServiceImpl::with_path(temp_dir.path().join("secret.json"));
        assert!(!service.secret_file_exists().await);
        let err = service.load_secrets().await.unwrap_err();
        assert!(matches!(err, KaiwaError::Config(_)));
    }

    #[tokio::test]
    async fn test_env_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secret.json");
        std::fs::write(&path, r#"{"gemini":{"api_keys":["file-key"]}}"#).unwrap();

        let service =
            SecretServiceImpl::with_path(&path).with_env_override(Some("env-a, env-b".into()));
        let pool = service.load_secrets().await.unwrap().credential_pool();
        assert_eq!(pool, vec!["env-a", "env-b"]);
    }

    #[tokio::test]
    async fn test_blank_env_override_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secret.json");
        std::fs::write(&path, r#"{"gemini":{"api_keys":["file-key"]}}"#).unwrap();

        let service = SecretServiceImpl::with_path(&path).with_env_override(Some("  ".into()));
        let pool = service.load_secrets().await.unwrap().credential_pool();
        assert_eq!(pool, vec!["file-key"]);
    }

    #[tokio::test]
    async fn test_template_file_has_empty_pool() {
        let temp_dir = TempDir::new().unwrap();
        let paths = KaiwaPaths::new(Some(temp_dir.path()));
        let path = paths.ensure_secret_file().unwrap();

        let service = SecretServiceImpl::with_path(path);
        let pool = service.load_secrets().await.unwrap().credential_pool();
        assert!(pool.is_empty());
    }
}
