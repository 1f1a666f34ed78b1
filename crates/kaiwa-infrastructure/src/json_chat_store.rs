//! JSON document backed `ChatStore`.
//!
//! The whole history lives in one document:
//!
//! ```text
//! { "sessions": [ ... ], "messages": [ ... ] }
//! ```
//!
//! Reads are served from an in-memory mirror. A mutation is applied to a copy
//! of the mirror, the copy is written to disk atomically, and only then does
//! it replace the mirror and get published to watchers. A failed write leaves
//! both the mirror and the file at the previous state.

use crate::change_feed::ChangeFeed;
use crate::storage::AtomicJsonFile;
use async_trait::async_trait;
use kaiwa_core::session::{
    ChatStore, Message, MessagesWatcher, Session, SessionsWatcher, sort_recent_first,
};
use kaiwa_core::{KaiwaError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;

/// On-disk layout of the history file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDocument {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ChatDocument {
    fn sessions_recent_first(&self) -> Vec<Session> {
        let mut sessions = self.sessions.clone();
        sort_recent_first(&mut sessions);
        sessions
    }

    fn messages_for(&self, session_id: &str) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|message| message.session_id == session_id)
            .cloned()
            .collect()
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| session.id == id)
    }

    fn has_session(&self, id: &str) -> bool {
        self.sessions.iter().any(|session| session.id == id)
    }
}

/// Which watchers a committed mutation has to notify.
enum Affected {
    Sessions,
    Messages(String),
    SessionAndMessages(String),
    Everything,
}

pub struct JsonChatStore {
    mirror: RwLock<ChatDocument>,
    /// Serializes mutations; held across the durable write and the publish.
    writer: Mutex<()>,
    file: Option<Arc<AtomicJsonFile<ChatDocument>>>,
    feed: ChangeFeed,
}

impl JsonChatStore {
    /// Opens (or lazily creates) the history document at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if an existing file cannot be read or parsed.
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = AtomicJsonFile::<ChatDocument>::new(path);
        let document = file.load()?.unwrap_or_default();
        tracing::info!(
            path = %file.path().display(),
            sessions = document.sessions.len(),
            messages = document.messages.len(),
            "opened JSON chat store"
        );
        Ok(Self::with_document(document, Some(Arc::new(file))))
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::with_document(ChatDocument::default(), None)
    }

    fn with_document(
        document: ChatDocument,
        file: Option<Arc<AtomicJsonFile<ChatDocument>>>,
    ) -> Self {
        let feed = ChangeFeed::new(document.sessions_recent_first());
        Self {
            mirror: RwLock::new(document),
            writer: Mutex::new(()),
            file,
            feed,
        }
    }

    fn read_mirror(&self) -> RwLockReadGuard<'_, ChatDocument> {
        self.mirror.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_mirror(&self) -> RwLockWriteGuard<'_, ChatDocument> {
        self.mirror.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies `change` to a copy of the document, persists it, swaps the
    /// mirror and notifies watchers. Returns whatever `change` produced.
    async fn commit<R>(
        &self,
        change: impl FnOnce(&mut ChatDocument) -> Result<(R, Affected)>,
    ) -> Result<R> {
        let _writer = self.writer.lock().await;

        let mut next = self.read_mirror().clone();
        let (outcome, affected) = change(&mut next)?;

        self.flush(&next).await?;

        *self.write_mirror() = next.clone();
        self.publish(&next, affected);
        Ok(outcome)
    }

    async fn flush(&self, document: &ChatDocument) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let file = Arc::clone(file);
        let document = document.clone();
        tokio::task::spawn_blocking(move || file.save(&document))
            .await
            .map_err(|e| KaiwaError::internal(format!("store flush task failed: {e}")))?
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to write chat history");
                KaiwaError::from(e)
            })
    }

    fn publish(&self, document: &ChatDocument, affected: Affected) {
        match affected {
            Affected::Sessions => {
                self.feed.publish_sessions(document.sessions_recent_first());
            }
            Affected::Messages(session_id) => {
                self.feed
                    .publish_messages(&session_id, document.messages_for(&session_id));
            }
            Affected::SessionAndMessages(session_id) => {
                self.feed.publish_sessions(document.sessions_recent_first());
                self.feed
                    .publish_messages(&session_id, document.messages_for(&session_id));
            }
            Affected::Everything => {
                self.feed.publish_sessions(document.sessions_recent_first());
                self.feed.publish_all_cleared();
            }
        }
    }
}

#[async_trait]
impl ChatStore for JsonChatStore {
    async fn observe_messages(&self, session_id: &str) -> Result<MessagesWatcher> {
        // The writer keeps a commit from publishing between the snapshot and
        // the subscription.
        let _writer = self.writer.lock().await;
        Ok(self
            .feed
            .subscribe_messages(session_id, || self.read_mirror().messages_for(session_id)))
    }

    async fn observe_sessions(&self) -> SessionsWatcher {
        self.feed.subscribe_sessions()
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        let message = message.clone();
        self.commit(move |document| {
            if !document.has_session(&message.session_id) {
                return Err(KaiwaError::not_found("session", &message.session_id));
            }
            if document.messages.iter().any(|existing| existing.id == message.id) {
                return Err(KaiwaError::validation(format!(
                    "message id '{}' is already in use",
                    message.id
                )));
            }
            tracing::debug!(
                session_id = %message.session_id,
                is_user = message.is_user,
                "appending message"
            );
            let session_id = message.session_id.clone();
            document.messages.push(message);
            Ok(((), Affected::Messages(session_id)))
        })
        .await
    }

    async fn append_reply(
        &self,
        reply: &Message,
        last_message: &str,
        has_image: bool,
    ) -> Result<()> {
        let reply = reply.clone();
        self.commit(move |document| {
            if document.messages.iter().any(|existing| existing.id == reply.id) {
                return Err(KaiwaError::validation(format!(
                    "message id '{}' is already in use",
                    reply.id
                )));
            }
            let session_id = reply.session_id.clone();
            let session = document
                .session_mut(&session_id)
                .ok_or_else(|| KaiwaError::not_found("session", &session_id))?;
            session.apply_summary(last_message, has_image);
            document.messages.push(reply);
            tracing::debug!(session_id = %session_id, "appended reply");
            Ok(((), Affected::SessionAndMessages(session_id)))
        })
        .await
    }

    async fn create_session(&self, id: &str, title: &str) -> Result<Session> {
        let session = Session::new(id, title);
        self.commit(move |document| {
            if document.has_session(&session.id) {
                return Err(KaiwaError::validation(format!(
                    "session id '{}' is already in use",
                    session.id
                )));
            }
            tracing::info!(session_id = %session.id, "created session");
            document.sessions.push(session.clone());
            Ok((session, Affected::Sessions))
        })
        .await
    }

    async fn update_session(&self, id: &str, last_message: &str, has_image: bool) -> Result<()> {
        self.commit(|document| {
            let session = document
                .session_mut(id)
                .ok_or_else(|| KaiwaError::not_found("session", id))?;
            session.apply_summary(last_message, has_image);
            Ok(((), Affected::Sessions))
        })
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let exists = self.read_mirror().has_session(id);
        if !exists {
            return Ok(());
        }
        self.commit(|document| {
            document.sessions.retain(|session| session.id != id);
            document.messages.retain(|message| message.session_id != id);
            tracing::info!(session_id = %id, "deleted session");
            Ok(((), Affected::SessionAndMessages(id.to_string())))
        })
        .await
    }

    async fn clear_all(&self) -> Result<()> {
        self.commit(|document| {
            *document = ChatDocument::default();
            tracing::info!("cleared all chat history");
            Ok(((), Affected::Everything))
        })
        .await
    }

    async fn find_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self
            .read_mirror()
            .sessions
            .iter()
            .find(|session| session.id == id)
            .cloned())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.read_mirror().messages_for(session_id))
    }
}
