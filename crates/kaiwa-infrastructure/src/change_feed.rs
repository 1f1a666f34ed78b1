//! Watch-channel fan-out shared by the store implementations.
//!
//! Stores call into the feed after a mutation has been made durable; the feed
//! pushes fresh snapshots to the session watcher and to the message watchers
//! of the affected sessions only.

use kaiwa_core::session::{Message, MessagesWatcher, Session, SessionsWatcher};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

pub struct ChangeFeed {
    sessions: watch::Sender<Vec<Session>>,
    messages: Mutex<HashMap<String, watch::Sender<Vec<Message>>>>,
}

impl ChangeFeed {
    /// Creates a feed primed with the current session list.
    pub fn new(sessions: Vec<Session>) -> Self {
        let (sessions, _) = watch::channel(sessions);
        Self {
            sessions,
            messages: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe_sessions(&self) -> SessionsWatcher {
        self.sessions.subscribe()
    }

    /// Subscribes to one session's messages.
    ///
    /// `snapshot` is only called when no watcher exists for the session yet;
    /// otherwise the existing channel already holds the latest list.
    pub fn subscribe_messages(
        &self,
        session_id: &str,
        snapshot: impl FnOnce() -> Vec<Message>,
    ) -> MessagesWatcher {
        let mut watchers = self.lock_messages();
        watchers
            .entry(session_id.to_string())
            .or_insert_with(|| watch::channel(snapshot()).0)
            .subscribe()
    }

    pub fn publish_sessions(&self, sessions: Vec<Session>) {
        self.sessions.send_replace(sessions);
    }

    /// Pushes a new message list for one session.
    ///
    /// Watchers whose receivers have all been dropped are pruned here.
    pub fn publish_messages(&self, session_id: &str, messages: Vec<Message>) {
        let mut watchers = self.lock_messages();
        if let Some(sender) = watchers.get(session_id) {
            if sender.receiver_count() == 0 {
                watchers.remove(session_id);
            } else {
                sender.send_replace(messages);
            }
        }
    }

    /// Empties the message list of every watched session.
    pub fn publish_all_cleared(&self) {
        let mut watchers = self.lock_messages();
        watchers.retain(|_, sender| sender.receiver_count() > 0);
        for sender in watchers.values() {
            sender.send_replace(Vec::new());
        }
    }

    fn lock_messages(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<Vec<Message>>>> {
        // A poisoned map only means a publisher panicked mid-insert; the
        // senders themselves are still valid.
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_affected_session_is_notified() {
        let feed = ChangeFeed::new(Vec::new());
        let a = feed.subscribe_messages("a", Vec::new);
        let b = feed.subscribe_messages("b", Vec::new);

        feed.publish_messages("a", vec![Message::user("a", "hi", None)]);

        assert!(a.has_changed().unwrap());
        assert!(!b.has_changed().unwrap());
        assert_eq!(a.borrow().len(), 1);
    }

    #[test]
    fn test_second_subscriber_shares_latest_snapshot() {
        let feed = ChangeFeed::new(Vec::new());
        let _first = feed.subscribe_messages("a", Vec::new);
        feed.publish_messages("a", vec![Message::user("a", "hi", None)]);

        let second = feed.subscribe_messages("a", || panic!("snapshot must not be rebuilt"));
        assert_eq!(second.borrow().len(), 1);
    }

    #[test]
    fn test_dropped_watchers_are_pruned() {
        let feed = ChangeFeed::new(Vec::new());
        drop(feed.subscribe_messages("a", Vec::new));

        feed.publish_messages("a", Vec::new());

        let fresh = feed.subscribe_messages("a", || vec![Message::user("a", "rebuilt", None)]);
        assert_eq!(fresh.borrow()[0].content, "rebuilt");
    }
}
