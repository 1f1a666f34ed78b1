//! Chat store trait.
//!
//! Defines the interface for persisting sessions and messages and for
//! observing them as continuously updated snapshots.

use super::message::Message;
use super::model::Session;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::watch;

/// A receiver that always holds the latest message list of one session.
pub type MessagesWatcher = watch::Receiver<Vec<Message>>;

/// A receiver that always holds the latest session list.
pub type SessionsWatcher = watch::Receiver<Vec<Session>>;

/// Durable, observable repository of sessions and messages.
///
/// # Implementation Notes
///
/// Implementations must:
/// - Serialize every mutation (single writer); readers never see a partial write
/// - Make a mutation visible to all watchers before the mutating call returns
/// - Report medium failures as `KaiwaError::Persistence` instead of dropping them
/// - Keep messages of a session in insertion order
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Subscribes to the messages of one session.
    ///
    /// The receiver is primed with the current snapshot and re-emits the full
    /// filtered list after every mutation affecting that session.
    ///
    /// Fails with `Persistence` if the initial snapshot cannot be read.
    async fn observe_messages(&self, session_id: &str) -> Result<MessagesWatcher>;

    /// Subscribes to the session list, most recently updated first.
    async fn observe_sessions(&self) -> SessionsWatcher;

    /// Appends a message.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The message is persisted and visible to all watchers
    /// - `Err(NotFound)`: The referenced session does not exist
    /// - `Err(Persistence)`: The medium could not be written
    async fn insert_message(&self, message: &Message) -> Result<()>;

    /// Appends an assistant reply and rewrites the session summary in one
    /// mutation: either both are persisted or neither is.
    ///
    /// # Returns
    ///
    /// - `Err(NotFound)`: The referenced session does not exist
    /// - `Err(Persistence)`: The medium could not be written
    async fn append_reply(
        &self,
        reply: &Message,
        last_message: &str,
        has_image: bool,
    ) -> Result<()>;

    /// Persists a new, empty session.
    ///
    /// Fails with `Validation` if a session with this id already exists.
    async fn create_session(&self, id: &str, title: &str) -> Result<Session>;

    /// Rewrites the summary fields of a session and bumps its timestamp.
    async fn update_session(&self, id: &str, last_message: &str, has_image: bool) -> Result<()>;

    /// Deletes a session together with all of its messages.
    ///
    /// Deleting an unknown id succeeds without effect.
    async fn delete_session(&self, id: &str) -> Result<()>;

    /// Deletes every session and message.
    async fn clear_all(&self) -> Result<()>;

    /// Finds a session by its ID.
    async fn find_session(&self, id: &str) -> Result<Option<Session>>;

    /// Returns the current messages of a session in insertion order.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>>;
}
