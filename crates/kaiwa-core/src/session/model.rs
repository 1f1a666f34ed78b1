//! Session domain model.
//!
//! A session is the summary record of one conversation thread. Its
//! `last_message`, `timestamp` and `has_image` fields are written alongside
//! each successful turn rather than recomputed from the message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A labeled conversation thread with a rolling summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Human-readable session title
    pub title: String,
    /// Content of the last user turn that completed successfully
    #[serde(default)]
    pub last_message: String,
    /// When the summary was last written (creation time for empty sessions)
    pub timestamp: DateTime<Utc>,
    /// Whether the last successful turn carried an image
    #[serde(default)]
    pub has_image: bool,
}

impl Session {
    /// Creates an empty session with no history.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            last_message: String::new(),
            timestamp: Utc::now(),
            has_image: false,
        }
    }

    /// Applies a summary update for a completed turn.
    pub fn apply_summary(&mut self, last_message: &str, has_image: bool) {
        self.last_message = last_message.to_string();
        self.has_image = has_image;
        self.timestamp = Utc::now();
    }
}

/// Orders sessions most recently updated first, keeping the relative order of
/// sessions that share a timestamp.
pub fn sort_recent_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("s-1", "Trip planning");
        assert_eq!(session.title, "Trip planning");
        assert!(session.last_message.is_empty());
        assert!(!session.has_image);
    }

    #[test]
    fn test_sort_recent_first() {
        let mut older = Session::new("a", "older");
        older.timestamp = Utc::now() - Duration::minutes(5);
        let newer = Session::new("b", "newer");
        let mut sessions = vec![older, newer];

        sort_recent_first(&mut sessions);

        assert_eq!(sessions[0].id, "b");
        assert_eq!(sessions[1].id, "a");
    }

    #[test]
    fn test_serializes_camel_case() {
        let session = Session::new("s-1", "t");
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("lastMessage").is_some());
        assert!(json.get("hasImage").is_some());
    }
}
