//! Chat screen controller.

use crate::coordinator::ChatCoordinator;
use kaiwa_core::engine::{Controller, StateEngine};
use kaiwa_core::session::Message;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// `None` until the first message of a new chat is sent
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
    pub input: String,
    pub image_path: Option<String>,
    pub is_loading: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    InputChanged(String),
    ImageSelected(String),
    ImageCleared,
    SendMessage,
    OpenSession(String),
    NewChat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEffect {
    ShowError(String),
    /// The reply of the turn that just completed
    MessageSent(Message),
    ScrollToBottom,
}

/// Drives one conversation: the input box, the attached image and the
/// message list of the open session.
pub struct ChatController {
    engine: StateEngine<ChatState, ChatEffect>,
    coordinator: Arc<ChatCoordinator>,
    /// Message subscription of the open session
    subscription: Mutex<Option<CancellationToken>>,
}

impl ChatController {
    pub fn new(coordinator: Arc<ChatCoordinator>) -> Self {
        Self {
            engine: StateEngine::new(ChatState::default()),
            coordinator,
            subscription: Mutex::new(None),
        }
    }

    /// Creates a controller with `session_id` already open.
    pub fn for_session(coordinator: Arc<ChatCoordinator>, session_id: impl Into<String>) -> Self {
        let controller = Self::new(coordinator);
        controller.open_session(session_id.into());
        controller
    }

    fn replace_subscription(&self, next: Option<CancellationToken>) {
        let mut slot = self.subscription.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = std::mem::replace(&mut *slot, next) {
            previous.cancel();
        }
    }

    fn open_session(&self, session_id: String) {
        self.engine.set_state(|state| ChatState {
            session_id: Some(session_id.clone()),
            is_loading: state.is_loading,
            ..ChatState::default()
        });

        let coordinator = Arc::clone(&self.coordinator);
        let key = session_id.clone();
        let token = self.engine.collect_from(
            async move { coordinator.observe_messages(&key).await },
            move |state: &ChatState, messages: Vec<Message>| {
                // A snapshot from a session that has since been closed.
                if state.session_id.as_deref() != Some(session_id.as_str()) {
                    return state.clone();
                }
                ChatState {
                    messages,
                    ..state.clone()
                }
            },
            |err| ChatEffect::ShowError(err.user_message()),
        );
        self.replace_subscription(Some(token));
    }

    fn send_message(&self) {
        // Checked and flipped in one step so two sends cannot both start a turn.
        let mut blank = false;
        let mut request = None;
        self.engine.try_set_state(|state| {
            if state.is_loading {
                return None;
            }
            if state.input.trim().is_empty() {
                blank = true;
                return None;
            }
            request = Some((
                state.session_id.clone(),
                state.input.clone(),
                state.image_path.clone(),
            ));
            Some(ChatState {
                input: String::new(),
                image_path: None,
                is_loading: true,
                ..state.clone()
            })
        });
        if blank {
            self.engine
                .set_effect(|| ChatEffect::ShowError("Message cannot be empty.".to_string()));
            return;
        }
        let Some((session_id, content, image_path)) = request else {
            tracing::debug!("send ignored: a turn is already in flight");
            return;
        };

        let session_id = match session_id {
            Some(id) => id,
            None => {
                let id = self.coordinator.new_session_id();
                self.open_session(id.clone());
                id
            }
        };

        let coordinator = Arc::clone(&self.coordinator);
        let engine = self.engine.clone();
        self.engine.launch(
            async move {
                let reply = coordinator
                    .send_message(&session_id, &content, image_path.as_deref())
                    .await?;
                engine.set_effect(|| ChatEffect::MessageSent(reply));
                engine.set_effect(|| ChatEffect::ScrollToBottom);
                Ok(())
            },
            |err| ChatEffect::ShowError(err.user_message()),
            |state| ChatState {
                is_loading: false,
                ..state.clone()
            },
        );
    }
}

impl Controller for ChatController {
    type State = ChatState;
    type Event = ChatEvent;
    type Effect = ChatEffect;

    fn engine(&self) -> &StateEngine<ChatState, ChatEffect> {
        &self.engine
    }

    fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::InputChanged(input) => self.engine.set_state(|state| ChatState {
                input,
                ..state.clone()
            }),
            ChatEvent::ImageSelected(path) => self.engine.set_state(|state| ChatState {
                image_path: Some(path),
                ..state.clone()
            }),
            ChatEvent::ImageCleared => self.engine.set_state(|state| ChatState {
                image_path: None,
                ..state.clone()
            }),
            ChatEvent::SendMessage => self.send_message(),
            ChatEvent::OpenSession(session_id) => self.open_session(session_id),
            ChatEvent::NewChat => {
                self.replace_subscription(None);
                self.engine.set_state(|state| ChatState {
                    is_loading: state.is_loading,
                    ..ChatState::default()
                });
            }
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.dispose();
    }
}
