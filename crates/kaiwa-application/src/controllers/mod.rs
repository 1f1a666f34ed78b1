//! Per-screen controllers, each a [`Controller`](kaiwa_core::engine::Controller)
//! over its own state engine.

pub mod chat;
pub mod history;
pub mod prompt;
pub mod settings;

pub use chat::{ChatController, ChatEffect, ChatEvent, ChatState};
pub use history::{HistoryController, HistoryEffect, HistoryEvent, HistoryState};
pub use prompt::{PromptController, PromptEffect, PromptEvent, PromptState};
pub use settings::{SettingsController, SettingsEffect, SettingsEvent, SettingsState};
