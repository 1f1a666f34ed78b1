//! Prompt picker controller.
//!
//! Purely local: filtering and selection never touch the store.

use kaiwa_core::config::PromptTemplate;
use kaiwa_core::engine::{Controller, StateEngine};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptState {
    pub prompts: Vec<PromptTemplate>,
    pub query: String,
    /// `prompts` filtered by `query`
    pub visible: Vec<PromptTemplate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptEvent {
    QueryChanged(String),
    SelectPrompt(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptEffect {
    StartChatWithPrompt(String),
    ShowError(String),
}

pub struct PromptController {
    engine: StateEngine<PromptState, PromptEffect>,
}

impl PromptController {
    pub fn new(prompts: Vec<PromptTemplate>) -> Self {
        let engine = StateEngine::new(PromptState {
            visible: prompts.clone(),
            prompts,
            query: String::new(),
        });
        Self { engine }
    }
}

/// Case-insensitive match on title or text.
fn matches_query(prompt: &PromptTemplate, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    query.is_empty()
        || prompt.title.to_lowercase().contains(&query)
        || prompt.text.to_lowercase().contains(&query)
}

impl Controller for PromptController {
    type State = PromptState;
    type Event = PromptEvent;
    type Effect = PromptEffect;

    fn engine(&self) -> &StateEngine<PromptState, PromptEffect> {
        &self.engine
    }

    fn handle_event(&self, event: PromptEvent) {
        match event {
            PromptEvent::QueryChanged(query) => self.engine.set_state(|state| PromptState {
                visible: state
                    .prompts
                    .iter()
                    .filter(|prompt| matches_query(prompt, &query))
                    .cloned()
                    .collect(),
                prompts: state.prompts.clone(),
                query,
            }),
            PromptEvent::SelectPrompt(id) => {
                let state = self.engine.current_state();
                match state.prompts.into_iter().find(|prompt| prompt.id == id) {
                    Some(prompt) => self
                        .engine
                        .set_effect(|| PromptEffect::StartChatWithPrompt(prompt.text)),
                    None => self
                        .engine
                        .set_effect(|| PromptEffect::ShowError(format!("Unknown prompt '{id}'."))),
                }
            }
        }
    }
}

impl Drop for PromptController {
    fn drop(&mut self) {
        self.dispose();
    }
}
