//! Configuration service implementation.
//!
//! Loads `config.toml` from the kaiwa config directory and caches the result.

use crate::paths::KaiwaPaths;
use kaiwa_core::config::KaiwaConfig;
use kaiwa_core::{KaiwaError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the root configuration.
///
/// A missing file yields `KaiwaConfig::default()`; a file that exists but
/// does not parse is reported as a `Config` error rather than silently
/// replaced.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    config: Arc<RwLock<Option<KaiwaConfig>>>,
}

impl ConfigService {
    pub fn new(paths: &KaiwaPaths) -> Result<Self> {
        let path = paths
            .config_file()
            .map_err(|e| KaiwaError::config(e.to_string()))?;
        Ok(Self::with_path(path))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<KaiwaConfig> {
        {
            let cached = self.config.read().unwrap_or_else(|p| p.into_inner());
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }

        let loaded = Self::load_config(&self.path)?;
        let mut slot = self.config.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(loaded.clone());
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut slot = self.config.write().unwrap_or_else(|p| p.into_inner());
        *slot = None;
    }

    fn load_config(path: &Path) -> Result<KaiwaConfig> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(KaiwaConfig::default());
            }
            Err(e) => {
                return Err(KaiwaError::config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        let config: KaiwaConfig = toml::from_str(&raw)
            .map_err(|e| KaiwaError::config(format!("invalid {}: {e}", path.display())))?;
        tracing::debug!(
            path = %path.display(),
            model = %config.generation.model,
            backend = ?config.storage.backend,
            "loaded configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaiwa_core::config::{DEFAULT_MODEL, StorageBackend};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(temp_dir.path().join("config.toml"));
        let config = service.get_config().unwrap();
        assert_eq!(config.generation.model, DEFAULT_MODEL);
        assert_eq!(config.storage.backend, StorageBackend::Json);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[generation]
model = "gemini-2.0-pro"
timeout_secs = 30

[storage]
backend = "sqlite"

[[prompts]]
id = "haiku"
title = "Haiku"
text = "Write a haiku about"
"#,
        )
        .unwrap();

        let config = ConfigService::with_path(&path).get_config().unwrap();
        assert_eq!(config.generation.model, "gemini-2.0-pro");
        assert_eq!(config.generation.timeout_secs, Some(30));
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.prompt_templates().len(), 1);
        assert!(config.generation.api_root.starts_with("https://"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nbackend = \"mongo\"\n").unwrap();

        let err = ConfigService::with_path(&path).get_config().unwrap_err();
        assert!(matches!(err, KaiwaError::Config(_)));
    }

    #[test]
    fn test_cache_until_invalidated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let service = ConfigService::with_path(&path);
        assert_eq!(service.get_config().unwrap().generation.model, DEFAULT_MODEL);

        std::fs::write(&path, "[generation]\nmodel = \"other\"\n").unwrap();
        assert_eq!(service.get_config().unwrap().generation.model, DEFAULT_MODEL);

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().generation.model, "other");
    }
}
