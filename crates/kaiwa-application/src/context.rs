//! Application wiring.
//!
//! `AppContext` is built once by the host and handed to whatever needs the
//! coordinator or the configuration; nothing in the application layer reads
//! process-wide state.

use crate::controllers::{ChatController, HistoryController, PromptController, SettingsController};
use crate::coordinator::ChatCoordinator;
use anyhow::{Context, Result, bail};
use kaiwa_core::config::{KaiwaConfig, StorageBackend};
use kaiwa_core::secret::SecretService;
use kaiwa_core::session::ChatStore;
use kaiwa_infrastructure::{
    ConfigService, FileImageEncoder, JsonChatStore, KaiwaPaths, SecretServiceImpl, SqliteChatStore,
};
use kaiwa_interaction::GeminiClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a host needs to drive the chat screens.
pub struct AppContext {
    pub paths: KaiwaPaths,
    pub config: KaiwaConfig,
    pub coordinator: Arc<ChatCoordinator>,
}

impl AppContext {
    /// Loads configuration and credentials from `config_dir` (or the
    /// platform default) and wires the store and the generation client.
    pub async fn bootstrap(config_dir: Option<&Path>) -> Result<Self> {
        let paths = KaiwaPaths::new(config_dir);
        let config = ConfigService::new(&paths)?
            .get_config()
            .context("Failed to load config.toml")?;

        let secrets = SecretServiceImpl::new(&paths)?;
        if !secrets.secret_file_exists().await {
            let created = paths
                .ensure_secret_file()
                .context("Failed to create secret.json template")?;
            tracing::info!(path = %created.display(), "created secret file template");
        }
        let credentials = secrets.load_secrets().await?.credential_pool();
        if credentials.is_empty() {
            bail!(
                "No API keys configured. Add them to {} or set {}.",
                secrets.path().display(),
                kaiwa_infrastructure::secret_service::API_KEYS_ENV
            );
        }

        Self::build(paths, config, credentials)
    }

    /// Wires the application from already loaded parts.
    pub fn build(paths: KaiwaPaths, config: KaiwaConfig, credentials: Vec<String>) -> Result<Self> {
        let store = open_store(&paths, &config)?;
        let client = Arc::new(GeminiClient::from_config(credentials, &config.generation)?);
        tracing::info!(
            backend = ?config.storage.backend,
            model = %config.generation.model,
            credentials = client.credential_count(),
            "application ready"
        );

        let coordinator = ChatCoordinator::new(store, client.clone(), Arc::new(FileImageEncoder::new()))
            .with_model_catalog(client);
        Ok(Self {
            paths,
            config,
            coordinator: Arc::new(coordinator),
        })
    }

    pub fn chat_controller(&self) -> ChatController {
        ChatController::new(Arc::clone(&self.coordinator))
    }

    pub fn history_controller(&self) -> HistoryController {
        HistoryController::new(Arc::clone(&self.coordinator))
    }

    pub fn prompt_controller(&self) -> PromptController {
        PromptController::new(self.config.prompt_templates())
    }

    pub fn settings_controller(&self) -> SettingsController {
        SettingsController::new(Arc::clone(&self.coordinator), self.config.generation.model.clone())
    }
}

fn store_path(paths: &KaiwaPaths, config: &KaiwaConfig) -> Result<PathBuf> {
    if let Some(path) = &config.storage.path {
        return Ok(path.clone());
    }
    let path = match config.storage.backend {
        StorageBackend::Json => paths.json_store_file(),
        StorageBackend::Sqlite => paths.sqlite_store_file(),
    };
    Ok(path?)
}

fn open_store(paths: &KaiwaPaths, config: &KaiwaConfig) -> Result<Arc<dyn ChatStore>> {
    let path = store_path(paths, config)?;
    let store: Arc<dyn ChatStore> = match config.storage.backend {
        StorageBackend::Json => Arc::new(
            JsonChatStore::open(path.clone())
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        StorageBackend::Sqlite => Arc::new(
            SqliteChatStore::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
    };
    Ok(store)
}
