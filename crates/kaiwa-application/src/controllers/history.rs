//! History screen controller.

use crate::coordinator::ChatCoordinator;
use kaiwa_core::{KaiwaError, Result};
use kaiwa_core::engine::{Controller, StateEngine};
use kaiwa_core::session::Session;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryState {
    /// Most recently updated first
    pub sessions: Vec<Session>,
    pub is_loading: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    CreateSession(String),
    OpenSession(String),
    DeleteSession(String),
    ClearAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEffect {
    NavigateToChat(String),
    ShowError(String),
    ShowMessage(String),
}

/// Lists the stored sessions and manages them.
pub struct HistoryController {
    engine: StateEngine<HistoryState, HistoryEffect>,
    coordinator: Arc<ChatCoordinator>,
}

impl HistoryController {
    /// Creates the controller and starts following the session list.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(coordinator: Arc<ChatCoordinator>) -> Self {
        let engine = StateEngine::new(HistoryState::default());
        let source = Arc::clone(&coordinator);
        engine.collect_from(
            async move { Ok::<_, KaiwaError>(source.observe_sessions().await) },
            |state: &HistoryState, sessions: Vec<Session>| HistoryState {
                sessions,
                ..state.clone()
            },
            |err| HistoryEffect::ShowError(err.user_message()),
        );
        Self {
            engine,
            coordinator,
        }
    }

    /// Runs `work` with the loading flag raised for its duration.
    fn run<Fut>(&self, work: Fut)
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.engine.set_state(|state| HistoryState {
            is_loading: true,
            ..state.clone()
        });
        self.engine.launch(
            work,
            |err| HistoryEffect::ShowError(err.user_message()),
            |state| HistoryState {
                is_loading: false,
                ..state.clone()
            },
        );
    }
}

impl Controller for HistoryController {
    type State = HistoryState;
    type Event = HistoryEvent;
    type Effect = HistoryEffect;

    fn engine(&self) -> &StateEngine<HistoryState, HistoryEffect> {
        &self.engine
    }

    fn handle_event(&self, event: HistoryEvent) {
        let coordinator = Arc::clone(&self.coordinator);
        let engine = self.engine.clone();
        match event {
            HistoryEvent::CreateSession(title) => self.run(async move {
                let id = coordinator.create_session(&title).await?;
                engine.set_effect(|| HistoryEffect::NavigateToChat(id));
                Ok(())
            }),
            HistoryEvent::OpenSession(id) => {
                self.engine.set_effect(|| HistoryEffect::NavigateToChat(id));
            }
            HistoryEvent::DeleteSession(id) => self.run(async move {
                coordinator.delete_session(&id).await?;
                engine.set_effect(|| HistoryEffect::ShowMessage("Conversation deleted.".into()));
                Ok(())
            }),
            HistoryEvent::ClearAll => self.run(async move {
                coordinator.clear_history().await?;
                engine.set_effect(|| HistoryEffect::ShowMessage("History cleared.".into()));
                Ok(())
            }),
        }
    }
}

impl Drop for HistoryController {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::testing::{FakeEncoder, ScriptedGenerator};
    use kaiwa_core::session::{ChatStore, Message};
    use kaiwa_infrastructure::JsonChatStore;
    use std::time::Duration;

    fn setup() -> (HistoryController, Arc<JsonChatStore>) {
        let store = Arc::new(JsonChatStore::in_memory());
        let coordinator = Arc::new(ChatCoordinator::new(
            store.clone(),
            Arc::new(ScriptedGenerator::default()),
            Arc::new(FakeEncoder),
        ));
        (HistoryController::new(coordinator), store)
    }

    async fn wait_for_sessions(controller: &HistoryController, count: usize) -> HistoryState {
        let mut states = controller.state_stream();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            states.wait_for(|s| !s.is_loading && s.sessions.len() == count),
        )
        .await
        .expect("session list did not update")
        .unwrap()
        .clone();
        state
    }

    #[tokio::test]
    async fn test_create_session_navigates_to_it() {
        let (controller, _store) = setup();
        let mut effects = controller.effect_stream();

        controller.handle_event(HistoryEvent::CreateSession("Trip planning".into()));

        let state = wait_for_sessions(&controller, 1).await;
        assert_eq!(state.sessions[0].title, "Trip planning");
        assert_eq!(
            effects.recv().await.unwrap(),
            HistoryEffect::NavigateToChat(state.sessions[0].id.clone())
        );
    }

    #[tokio::test]
    async fn test_blank_title_shows_error() {
        let (controller, _store) = setup();
        let mut effects = controller.effect_stream();

        controller.handle_event(HistoryEvent::CreateSession("  ".into()));

        assert!(matches!(effects.recv().await.unwrap(), HistoryEffect::ShowError(_)));
        assert!(!controller.current_state().is_loading);
    }

    #[tokio::test]
    async fn test_delete_removes_session_and_messages() {
        let (controller, store) = setup();
        store.create_session("a", "A").await.unwrap();
        store.create_session("b", "B").await.unwrap();
        store.insert_message(&Message::user("a", "x", None)).await.unwrap();
        wait_for_sessions(&controller, 2).await;
        let mut effects = controller.effect_stream();

        controller.handle_event(HistoryEvent::DeleteSession("a".into()));

        let state = wait_for_sessions(&controller, 1).await;
        assert_eq!(state.sessions[0].id, "b");
        assert!(store.list_messages("a").await.unwrap().is_empty());
        assert!(matches!(effects.recv().await.unwrap(), HistoryEffect::ShowMessage(_)));
    }

    #[tokio::test]
    async fn test_clear_all_empties_the_list() {
        let (controller, store) = setup();
        store.create_session("a", "A").await.unwrap();
        wait_for_sessions(&controller, 1).await;

        controller.handle_event(HistoryEvent::ClearAll);

        wait_for_sessions(&controller, 0).await;
    }

    #[tokio::test]
    async fn test_open_session_is_pure_navigation() {
        let (controller, _store) = setup();
        let mut effects = controller.effect_stream();

        controller.handle_event(HistoryEvent::OpenSession("a".into()));

        assert_eq!(
            effects.recv().await.unwrap(),
            HistoryEffect::NavigateToChat("a".into())
        );
        assert!(!controller.current_state().is_loading);
    }
}
