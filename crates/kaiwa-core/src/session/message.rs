//! Conversation message type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One turn (user or assistant) belonging to a session.
///
/// Messages are immutable once created; the store only ever appends them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    /// Reference to an external image file attached to a user turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

impl Message {
    /// Creates a user turn with a fresh id.
    pub fn user(
        session_id: impl Into<String>,
        content: impl Into<String>,
        image_path: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            image_path,
            is_user: true,
            timestamp: Utc::now(),
            session_id: session_id.into(),
        }
    }

    /// Creates an assistant turn with a fresh id.
    pub fn assistant(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            image_path: None,
            is_user: false,
            timestamp: Utc::now(),
            session_id: session_id.into(),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_path.is_some()
    }
}
