//! A conversation handle: session id plus its in-memory history.

use serde::{Deserialize, Serialize};

use crate::store::MessageStore;
use crate::turn::TurnState;
use crate::types::{Message, Role};

/// One conversation.
///
/// A turn takes `&mut Session`, so a single session can never run two turns
/// at once. Different sessions are independent and may run concurrently.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    messages: MessageStore,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub message_count: usize,
    /// State an interrupted turn would resume in; `None` when the last turn
    /// finished (or nothing has happened yet). The next turn closes any
    /// pending tool calls before it appends its user message.
    pub next: Option<TurnState>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: MessageStore::new(),
        }
    }

    /// A session with a random id, for conversations that are never persisted.
    pub fn ephemeral() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// A session seeded with previously stored history.
    pub fn with_history(id: impl Into<String>, history: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages: MessageStore::from_messages(history),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub(crate) fn append(&mut self, message: Message) {
        self.messages.append(message);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let next = if !self.messages.pending_tool_calls().is_empty() {
            Some(TurnState::AwaitingToolResults)
        } else {
            match self.messages.last() {
                Some(last) if last.role == Role::User || last.role == Role::Tool => {
                    Some(TurnState::AwaitingGeneration)
                }
                _ => None,
            }
        };
        SessionSnapshot {
            session_id: self.id.clone(),
            message_count: self.messages.len(),
            next,
        }
    }
}
