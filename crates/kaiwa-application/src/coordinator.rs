//! Chat coordinator.
//!
//! Orchestrates the chat store and the generation client to implement the
//! user-facing operations: sending a turn, creating and deleting sessions and
//! clearing history.

use kaiwa_core::generation::{ImageEncoder, ModelCatalog, ModelInfo, TextGenerator};
use kaiwa_core::session::{ChatStore, Message, MessagesWatcher, Session, SessionsWatcher};
use kaiwa_core::{KaiwaError, Result};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Characters of the first message used as the title of an implicit session.
const IMPLICIT_TITLE_CHARS: usize = 40;

/// Coordinates the store and the generation client.
///
/// The coordinator holds no chat state of its own; controllers read through
/// the store's watch channels.
pub struct ChatCoordinator {
    store: Arc<dyn ChatStore>,
    generator: Arc<dyn TextGenerator>,
    image_encoder: Arc<dyn ImageEncoder>,
    catalog: Option<Arc<dyn ModelCatalog>>,
}

impl ChatCoordinator {
    pub fn new(
        store: Arc<dyn ChatStore>,
        generator: Arc<dyn TextGenerator>,
        image_encoder: Arc<dyn ImageEncoder>,
    ) -> Self {
        Self {
            store,
            generator,
            image_encoder,
            catalog: None,
        }
    }

    /// Enables [`list_models`](Self::list_models).
    pub fn with_model_catalog(mut self, catalog: Arc<dyn ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn new_session_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Sends one user turn and returns the assistant's reply.
    ///
    /// The user message is persisted before the generation call. The
    /// assistant message and the session summary are written together, in
    /// one store mutation, only when the call succeeds; on failure the user
    /// message stays and the summary is left untouched.
    ///
    /// # Errors
    ///
    /// - `Validation` if `content` is blank
    /// - `Encode` if `image_path` cannot be read as an image
    /// - any store or generation error, unchanged
    pub async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        image_path: Option<&str>,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(KaiwaError::validation("Message cannot be empty."));
        }

        if self.store.find_session(session_id).await?.is_none() {
            let title: String = content.trim().chars().take(IMPLICIT_TITLE_CHARS).collect();
            self.store.create_session(session_id, &title).await?;
        }

        let user_message = Message::user(session_id, content, image_path.map(str::to_string));
        self.store.insert_message(&user_message).await?;

        let reply = match image_path {
            Some(path) => {
                let image = self.image_encoder.encode(Path::new(path)).await?;
                self.generator.generate_text_with_image(content, &image).await?
            }
            None => self.generator.generate_text(content).await?,
        };

        let assistant_message = Message::assistant(session_id, reply);
        self.store
            .append_reply(&assistant_message, content, image_path.is_some())
            .await?;

        tracing::info!(session_id, has_image = image_path.is_some(), "completed chat turn");
        Ok(assistant_message)
    }

    /// Creates an empty session and returns its id.
    pub async fn create_session(&self, title: &str) -> Result<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(KaiwaError::validation("Session title cannot be empty."));
        }
        let session = self.store.create_session(&self.new_session_id(), title).await?;
        Ok(session.id)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.store.delete_session(session_id).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.store.clear_all().await
    }

    pub async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.store.find_session(session_id).await
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        self.store.list_messages(session_id).await
    }

    pub async fn observe_sessions(&self) -> SessionsWatcher {
        self.store.observe_sessions().await
    }

    pub async fn observe_messages(&self, session_id: &str) -> Result<MessagesWatcher> {
        self.store.observe_messages(session_id).await
    }

    fn catalog(&self) -> Result<&Arc<dyn ModelCatalog>> {
        self.catalog
            .as_ref()
            .ok_or_else(|| KaiwaError::config("model selection is not available"))
    }

    /// Models the configured credentials can use.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.catalog()?.list_models().await
    }

    /// The model new turns are sent to.
    pub fn current_model(&self) -> Result<String> {
        Ok(self.catalog()?.current_model())
    }

    /// Sends every later turn to `model`.
    pub fn select_model(&self, model: &str) -> Result<()> {
        let model = model.trim();
        if model.is_empty() {
            return Err(KaiwaError::validation("Model name cannot be empty."));
        }
        self.catalog()?.select_model(model);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by the coordinator and controller tests.

    use super::*;
    use async_trait::async_trait;
    use kaiwa_core::generation::EncodedImage;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays queued results; answers "ok" once the queue is empty.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String>>>,
        pub prompts: Mutex<Vec<(String, Option<EncodedImage>)>>,
        delay: Option<Duration>,
        model: Mutex<String>,
    }

    impl ScriptedGenerator {
        pub fn replying(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        async fn next(&self, prompt: &str, image: Option<&EncodedImage>) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), image.cloned()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok("ok".to_string()))
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate_text(&self, prompt: &str) -> Result<String> {
            self.next(prompt, None).await
        }

        async fn generate_text_with_image(&self, prompt: &str, image: &EncodedImage) -> Result<String> {
            self.next(prompt, Some(image)).await
        }
    }

    #[async_trait]
    impl ModelCatalog for ScriptedGenerator {
        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(vec![
                ModelInfo {
                    name: "models/gemini-2.5-flash".into(),
                    supported_methods: vec!["generateContent".into()],
                },
                ModelInfo {
                    name: "models/gemini-2.5-pro".into(),
                    supported_methods: vec!["generateContent".into()],
                },
                ModelInfo {
                    name: "models/text-embedding-004".into(),
                    supported_methods: vec!["embedContent".into()],
                },
            ])
        }

        fn current_model(&self) -> String {
            self.model.lock().unwrap().clone()
        }

        fn select_model(&self, model: &str) {
            *self.model.lock().unwrap() = model.to_string();
        }
    }

    /// Encodes any path ending in `.png`; everything else fails.
    pub struct FakeEncoder;

    #[async_trait]
    impl ImageEncoder for FakeEncoder {
        async fn encode(&self, path: &Path) -> Result<EncodedImage> {
            if path.extension().is_some_and(|ext| ext == "png") {
                Ok(EncodedImage {
                    mime_type: "image/png".into(),
                    data: "AAAA".into(),
                })
            } else {
                Err(KaiwaError::encode(path.display().to_string(), "not an image"))
            }
        }
    }
}
