//! Unified path management for kaiwa configuration and history files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/kaiwa/
//! ├── config.toml      # Application configuration
//! ├── secret.json      # Credential pool
//! ├── history.json     # Chat history (JSON backend)
//! ├── history.db       # Chat history (SQLite backend)
//! └── logs/
//!     └── kaiwa.log.YYYY-MM-DD
//! ```

use kaiwa_core::secret::{GeminiSecret, SecretConfig};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "kaiwa";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Resolves every file location kaiwa uses.
///
/// With a base path every file lives directly under it; otherwise the
/// platform config directory (`dirs::config_dir()`) joined with `kaiwa` is used.
#[derive(Debug, Clone)]
pub struct KaiwaPaths {
    base: Option<PathBuf>,
}

impl KaiwaPaths {
    pub fn new(base: Option<&Path>) -> Self {
        Self {
            base: base.map(Path::to_path_buf),
        }
    }

    /// Returns the kaiwa configuration directory.
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(PathError::ConfigDirNotFound),
        }
    }

    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("config.toml"))
    }

    /// Returns the path to the secrets file.
    ///
    /// # Security Note
    ///
    /// Ensure this file has appropriate permissions (e.g., 600) to prevent
    /// unauthorized access.
    pub fn secret_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("secret.json"))
    }

    pub fn json_store_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("history.json"))
    }

    pub fn sqlite_store_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("history.db"))
    }

    pub fn logs_dir(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("logs"))
    }

    /// Ensures the secret file exists, creating it with an empty template if it doesn't.
    ///
    /// On Unix the file is created with mode 600.
    pub fn ensure_secret_file(&self) -> Result<PathBuf, std::io::Error> {
        let secret_path = self
            .secret_file()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()))?;

        if secret_path.exists() {
            return Ok(secret_path);
        }

        if let Some(parent) = secret_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = SecretConfig {
            gemini: Some(GeminiSecret {
                api_keys: vec![String::new()],
                api_key: None,
            }),
        };
        let template_json = serde_json::to_string_pretty(&template)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&secret_path, template_json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&secret_path, permissions)?;
        }

        Ok(secret_path)
    }
}

impl Default for KaiwaPaths {
    fn default() -> Self {
        Self::new(None)
    }
}
