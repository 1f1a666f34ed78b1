//! Application configuration model (`config.toml`).
//!
//! Every field has a default so that a missing or partial file still yields
//! a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KaiwaConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Prompt templates offered on the prompt screen
    #[serde(default)]
    pub prompts: Vec<PromptTemplate>,
}

impl KaiwaConfig {
    /// Configured prompts, or the built-in set when none are configured.
    pub fn prompt_templates(&self) -> Vec<PromptTemplate> {
        if self.prompts.is_empty() {
            PromptTemplate::builtin()
        } else {
            self.prompts.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_api_root")]
    pub api_root: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout; `None` leaves the transport default in place
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl GenerationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            model: default_model(),
            timeout_secs: None,
            system_instruction: None,
        }
    }
}

fn default_api_root() -> String {
    DEFAULT_API_ROOT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Which persistence engine backs the chat store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Single JSON document, rewritten atomically on every mutation
    #[default]
    Json,
    /// SQLite database with `session` and `message` tables
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Overrides the default file location inside the config directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A canned prompt the user can start a chat from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub title: String,
    pub text: String,
}

impl PromptTemplate {
    pub fn new(id: &str, title: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    pub fn builtin() -> Vec<PromptTemplate> {
        vec![
            Self::new(
                "summarize",
                "Summarize",
                "Summarize the following text in three bullet points:",
            ),
            Self::new(
                "explain-code",
                "Explain code",
                "Explain what this code does, step by step:",
            ),
            Self::new(
                "translate",
                "Translate",
                "Translate the following text into English:",
            ),
            Self::new(
                "describe-image",
                "Describe image",
                "Describe the attached image in detail.",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: KaiwaConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.generation.api_root, DEFAULT_API_ROOT);
        assert_eq!(config.generation.model, DEFAULT_MODEL);
        assert_eq!(config.generation.timeout(), None);
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.prompt_templates(), PromptTemplate::builtin());
    }

    #[test]
    fn test_timeout_is_optional() {
        let config: GenerationConfig = serde_json::from_str(r#"{"timeout_secs": 30}"#).unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }
}
