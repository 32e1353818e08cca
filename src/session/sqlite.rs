use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use super::SessionStore;
use crate::error::ParleyError;
use crate::types::Message;

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_messages_session
    ON session_messages(session_id, seq);
"#;

/// SQLite-backed store; one row per message, ordered by insertion sequence.
///
/// Queries run on the blocking pool so the async turn loop never stalls on
/// disk I/O.
#[derive(Clone)]
pub struct SqliteSessionStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Open (or create) a database at `path`. `":memory:"` opens a private
    /// in-memory database that lives as long as this store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ParleyError> {
        let path = path.as_ref();
        let connection = if path.as_os_str() == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ParleyError::Persistence(e.to_string()))?;
            }
            Connection::open(path)?
        };
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn open_in_memory() -> Result<Self, ParleyError> {
        Self::open(IN_MEMORY)
    }

    async fn with_connection<T, F>(&self, func: F) -> Result<T, ParleyError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ParleyError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| ParleyError::Persistence("session database lock poisoned".into()))?;
            func(&guard)
        })
        .await
        .map_err(|e| ParleyError::Persistence(format!("storage task failed: {e}")))?
    }
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, ParleyError> {
        let session_id = session_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM session_messages WHERE session_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;

            let mut messages = Vec::new();
            for body in rows {
                let body = body?;
                let message: Message = serde_json::from_str(&body).map_err(|e| {
                    ParleyError::Persistence(format!("corrupt message row: {e}"))
                })?;
                messages.push(message);
            }
            Ok(messages)
        })
        .await
    }

    async fn append(&self, session_id: &str, message: &Message) -> Result<(), ParleyError> {
        let session_id = session_id.to_string();
        let role = message.role.to_string();
        let body = serde_json::to_string(message)?;
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO session_messages (session_id, role, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, role, body, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<String>, ParleyError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT session_id FROM session_messages ORDER BY session_id ASC",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}
