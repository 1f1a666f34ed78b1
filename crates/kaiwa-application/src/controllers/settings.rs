//! Settings screen controller.

use crate::coordinator::ChatCoordinator;
use kaiwa_core::KaiwaError;
use kaiwa_core::engine::{Controller, StateEngine};
use kaiwa_core::generation::ModelInfo;
use kaiwa_core::session::Session;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsState {
    pub model: String,
    /// Short names of the models that support generation
    pub available_models: Vec<String>,
    pub is_loading: bool,
    pub session_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEvent {
    LoadModels,
    SelectModel(String),
    ClearHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEffect {
    ShowError(String),
    ShowMessage(String),
    /// Later turns go to this model.
    ModelChanged(String),
}

pub struct SettingsController {
    engine: StateEngine<SettingsState, SettingsEffect>,
    coordinator: Arc<ChatCoordinator>,
}

impl SettingsController {
    /// Must be called from within a tokio runtime.
    pub fn new(coordinator: Arc<ChatCoordinator>, model: impl Into<String>) -> Self {
        let engine = StateEngine::new(SettingsState {
            model: model.into(),
            ..SettingsState::default()
        });
        let source = Arc::clone(&coordinator);
        engine.collect_from(
            async move { Ok::<_, KaiwaError>(source.observe_sessions().await) },
            |state: &SettingsState, sessions: Vec<Session>| SettingsState {
                session_count: sessions.len(),
                ..state.clone()
            },
            |err| SettingsEffect::ShowError(err.user_message()),
        );
        Self {
            engine,
            coordinator,
        }
    }

    fn load_models(&self) {
        self.engine.set_state(|state| SettingsState {
            is_loading: true,
            ..state.clone()
        });
        let coordinator = Arc::clone(&self.coordinator);
        let engine = self.engine.clone();
        self.engine.launch(
            async move {
                let models = coordinator.list_models().await?;
                let available: Vec<String> = models
                    .iter()
                    .filter(|model| model.supports_generation())
                    .map(ModelInfo::short_name)
                    .map(str::to_string)
                    .collect();
                tracing::debug!(count = available.len(), "loaded model list");
                engine.set_state(|state| SettingsState {
                    available_models: available,
                    ..state.clone()
                });
                Ok(())
            },
            |err| SettingsEffect::ShowError(err.user_message()),
            |state| SettingsState {
                is_loading: false,
                ..state.clone()
            },
        );
    }

    fn select_model(&self, model: String) {
        let state = self.engine.current_state();
        if !state.available_models.is_empty() && !state.available_models.contains(&model) {
            self.engine
                .set_effect(|| SettingsEffect::ShowError(format!("Unknown model '{model}'.")));
            return;
        }
        if state.model == model {
            return;
        }
        if let Err(err) = self.coordinator.select_model(&model) {
            tracing::warn!(model = %model, error = %err, "model switch rejected");
            self.engine.set_effect(|| SettingsEffect::ShowError(err.user_message()));
            return;
        }
        tracing::info!(model = %model, "model selected");
        self.engine.set_state(|state| SettingsState {
            model: model.clone(),
            ..state.clone()
        });
        self.engine.set_effect(|| SettingsEffect::ModelChanged(model));
    }
}

impl Controller for SettingsController {
    type State = SettingsState;
    type Event = SettingsEvent;
    type Effect = SettingsEffect;

    fn engine(&self) -> &StateEngine<SettingsState, SettingsEffect> {
        &self.engine
    }

    fn handle_event(&self, event: SettingsEvent) {
        match event {
            SettingsEvent::LoadModels => self.load_models(),
            SettingsEvent::SelectModel(model) => self.select_model(model),
            SettingsEvent::ClearHistory => {
                self.engine.set_state(|state| SettingsState {
                    is_loading: true,
                    ..state.clone()
                });
                let coordinator = Arc::clone(&self.coordinator);
                let engine = self.engine.clone();
                self.engine.launch(
                    async move {
                        coordinator.clear_history().await?;
                        engine.set_effect(|| SettingsEffect::ShowMessage("History cleared.".into()));
                        Ok(())
                    },
                    |err| SettingsEffect::ShowError(err.user_message()),
                    |state| SettingsState {
                        is_loading: false,
                        ..state.clone()
                    },
                );
            }
        }
    }
}

impl Drop for SettingsController {
    fn drop(&mut self) {
        self.dispose();
    }
}
