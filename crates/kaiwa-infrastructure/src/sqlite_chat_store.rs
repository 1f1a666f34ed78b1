//! SQLite backed `ChatStore`.
//!
//! Two tables, `session` and `message`, with `message.session_id` referencing
//! `session.id` (cascading deletes). Booleans are stored as 0/1 integers and
//! timestamps as epoch milliseconds. Message order is the autoincrement `seq`.

use crate::change_feed::ChangeFeed;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kaiwa_core::session::{ChatStore, Message, MessagesWatcher, Session, SessionsWatcher};
use kaiwa_core::{KaiwaError, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS session (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        last_message TEXT NOT NULL DEFAULT '',
        timestamp INTEGER NOT NULL,
        has_image INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS message (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        content TEXT NOT NULL,
        image_path TEXT,
        is_user INTEGER NOT NULL,
        timestamp INTEGER NOT NULL,
        session_id TEXT NOT NULL REFERENCES session(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_message_session ON message(session_id, seq);
";

fn sql_err(err: rusqlite::Error) -> KaiwaError {
    KaiwaError::persistence(format!("SQLite: {err}"))
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn query_sessions(conn: &Connection) -> Result<Vec<Session>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, title, last_message, timestamp, has_image
             FROM session ORDER BY timestamp DESC, rowid ASC",
        )
        .map_err(sql_err)?;
    let sessions = stmt
        .query_map([], |row| {
            Ok(Session {
                id: row.get(0)?,
                title: row.get(1)?,
                last_message: row.get(2)?,
                timestamp: from_millis(row.get(3)?),
                has_image: row.get::<_, i64>(4)? != 0,
            })
        })
        .map_err(sql_err)?
        .collect::<rusqlite::Result<Vec<Session>>>()
        .map_err(sql_err)?;
    Ok(sessions)
}

fn query_messages(conn: &Connection, session_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, content, image_path, is_user, timestamp, session_id
             FROM message WHERE session_id = ?1 ORDER BY seq ASC",
        )
        .map_err(sql_err)?;
    let messages = stmt
        .query_map(params![session_id], |row| {
            Ok(Message {
                id: row.get(0)?,
                content: row.get(1)?,
                image_path: row.get(2)?,
                is_user: row.get::<_, i64>(3)? != 0,
                timestamp: from_millis(row.get(4)?),
                session_id: row.get(5)?,
            })
        })
        .map_err(sql_err)?
        .collect::<rusqlite::Result<Vec<Message>>>()
        .map_err(sql_err)?;
    Ok(messages)
}

fn session_exists(tx: &Transaction<'_>, id: &str) -> Result<bool> {
    tx.query_row("SELECT 1 FROM session WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|row| row.is_some())
        .map_err(sql_err)
}

/// Which watchers a mutation has to refresh.
enum Refresh {
    Nothing,
    Sessions,
    Messages(String),
    SessionAndMessages(String),
    Everything,
}

/// Snapshots read inside the mutating transaction, published after commit.
struct Snapshot {
    sessions: Option<Vec<Session>>,
    messages: Option<(String, Vec<Message>)>,
    cleared: bool,
}

impl Snapshot {
    fn read(conn: &Connection, refresh: Refresh) -> Result<Self> {
        let (with_sessions, messages_of, cleared) = match refresh {
            Refresh::Nothing => (false, None, false),
            Refresh::Sessions => (true, None, false),
            Refresh::Messages(id) => (false, Some(id), false),
            Refresh::SessionAndMessages(id) => (true, Some(id), false),
            Refresh::Everything => (true, None, true),
        };
        let sessions = if with_sessions {
            Some(query_sessions(conn)?)
        } else {
            None
        };
        let messages = match messages_of {
            Some(id) => {
                let messages = query_messages(conn, &id)?;
                Some((id, messages))
            }
            None => None,
        };
        Ok(Self {
            sessions,
            messages,
            cleared,
        })
    }
}

pub struct SqliteChatStore {
    conn: Arc<Mutex<Connection>>,
    /// Serializes mutations together with their publish step.
    writer: tokio::sync::Mutex<()>,
    feed: ChangeFeed,
}

impl SqliteChatStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        tracing::info!(path = %path.display(), "opened SQLite chat store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(sql_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        let sessions = query_sessions(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            writer: tokio::sync::Mutex::new(()),
            feed: ChangeFeed::new(sessions),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| KaiwaError::internal(format!("SQLite task failed: {e}")))?
    }

    /// Runs `f` in a transaction under the writer lock, reads the snapshots
    /// it asks for before committing, and publishes them once committed.
    ///
    /// A failing snapshot read rolls the mutation back, so an error is never
    /// returned for a change that reached the database.
    async fn mutate<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<(R, Refresh)> + Send + 'static,
    {
        let _writer = self.writer.lock().await;
        let (outcome, snapshot) = self
            .with_conn(move |conn| {
                let tx = conn.transaction().map_err(sql_err)?;
                let (outcome, refresh) = f(&tx)?;
                let snapshot = Snapshot::read(&tx, refresh)?;
                tx.commit().map_err(sql_err)?;
                Ok((outcome, snapshot))
            })
            .await?;
        self.publish(snapshot);
        Ok(outcome)
    }

    fn publish(&self, snapshot: Snapshot) {
        if let Some(sessions) = snapshot.sessions {
            self.feed.publish_sessions(sessions);
        }
        if let Some((session_id, messages)) = snapshot.messages {
            self.feed.publish_messages(&session_id, messages);
        }
        if snapshot.cleared {
            self.feed.publish_all_cleared();
        }
    }
}

fn insert_message_row(tx: &Transaction<'_>, row: &Message) -> Result<()> {
    if !session_exists(tx, &row.session_id)? {
        return Err(KaiwaError::not_found("session", &row.session_id));
    }
    tx.execute(
        "INSERT INTO message (id, content, image_path, is_user, timestamp, session_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.content,
            row.image_path,
            row.is_user as i64,
            row.timestamp.timestamp_millis(),
            row.session_id
        ],
    )
    .map_err(sql_err)?;
    Ok(())
}

fn update_summary(tx: &Transaction<'_>, id: &str, last_message: &str, has_image: bool) -> Result<()> {
    let updated = tx
        .execute(
            "UPDATE session SET last_message = ?1, has_image = ?2, timestamp = ?3
             WHERE id = ?4",
            params![last_message, has_image as i64, Utc::now().timestamp_millis(), id],
        )
        .map_err(sql_err)?;
    if updated == 0 {
        return Err(KaiwaError::not_found("session", id));
    }
    Ok(())
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn observe_messages(&self, session_id: &str) -> Result<MessagesWatcher> {
        // Holding the writer keeps a concurrent mutation from publishing
        // between the snapshot query and the subscription.
        let _writer = self.writer.lock().await;
        let id = session_id.to_string();
        let snapshot = self
            .with_conn(move |conn| query_messages(conn, &id))
            .await?;
        Ok(self.feed.subscribe_messages(session_id, move || snapshot))
    }

    async fn observe_sessions(&self) -> SessionsWatcher {
        self.feed.subscribe_sessions()
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        let row = message.clone();
        self.mutate(move |tx| {
            insert_message_row(tx, &row)?;
            Ok(((), Refresh::Messages(row.session_id)))
        })
        .await?;
        tracing::debug!(session_id = %message.session_id, is_user = message.is_user, "appended message");
        Ok(())
    }

    async fn append_reply(
        &self,
        reply: &Message,
        last_message: &str,
        has_image: bool,
    ) -> Result<()> {
        let row = reply.clone();
        let summary = last_message.to_string();
        self.mutate(move |tx| {
            insert_message_row(tx, &row)?;
            update_summary(tx, &row.session_id, &summary, has_image)?;
            Ok(((), Refresh::SessionAndMessages(row.session_id)))
        })
        .await?;
        tracing::debug!(session_id = %reply.session_id, "appended reply");
        Ok(())
    }

    async fn create_session(&self, id: &str, title: &str) -> Result<Session> {
        let session = Session::new(id, title);
        let row = session.clone();
        self.mutate(move |tx| {
            if session_exists(tx, &row.id)? {
                return Err(KaiwaError::validation(format!(
                    "session id '{}' is already in use",
                    row.id
                )));
            }
            tx.execute(
                "INSERT INTO session (id, title, last_message, timestamp, has_image)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.id,
                    row.title,
                    row.last_message,
                    row.timestamp.timestamp_millis(),
                    row.has_image as i64
                ],
            )
            .map_err(sql_err)?;
            Ok(((), Refresh::Sessions))
        })
        .await?;
        tracing::info!(session_id = %id, "created session");
        Ok(session)
    }

    async fn update_session(&self, id: &str, last_message: &str, has_image: bool) -> Result<()> {
        let key = id.to_string();
        let text = last_message.to_string();
        self.mutate(move |tx| {
            update_summary(tx, &key, &text, has_image)?;
            Ok(((), Refresh::Sessions))
        })
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let key = id.to_string();
        let deleted = self
            .mutate(move |tx| {
                tx.execute("DELETE FROM message WHERE session_id = ?1", params![key])
                    .map_err(sql_err)?;
                let deleted = tx
                    .execute("DELETE FROM session WHERE id = ?1", params![key])
                    .map_err(sql_err)?;
                let refresh = if deleted == 0 {
                    Refresh::Nothing
                } else {
                    Refresh::SessionAndMessages(key)
                };
                Ok((deleted, refresh))
            })
            .await?;
        if deleted > 0 {
            tracing::info!(session_id = %id, "deleted session");
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.mutate(|tx| {
            tx.execute("DELETE FROM message", []).map_err(sql_err)?;
            tx.execute("DELETE FROM session", []).map_err(sql_err)?;
            Ok(((), Refresh::Everything))
        })
        .await?;
        tracing::info!("cleared all chat history");
        Ok(())
    }

    async fn find_session(&self, id: &str) -> Result<Option<Session>> {
        let key = id.to_string();
        let sessions = self.with_conn(|conn| query_sessions(conn)).await?;
        Ok(sessions.into_iter().find(|session| session.id == key))
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let id = session_id.to_string();
        self.with_conn(move |conn| query_messages(conn, &id)).await
    }
}
