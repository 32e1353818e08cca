//! Durable session memory keyed by session id.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemorySessionStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteSessionStore, IN_MEMORY};

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::Message;

/// Storage abstraction for persisted conversation history.
///
/// Stores only ever grow: `append` adds one message to the end of a
/// session and `load` returns everything appended so far, in order.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the full history for `session_id`. Unknown ids yield an empty history.
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, ParleyError>;

    /// Durably append one message to `session_id`.
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), ParleyError>;

    /// Known session ids, sorted.
    async fn list(&self) -> Result<Vec<String>, ParleyError>;
}
