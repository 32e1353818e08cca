//! Append-only message history for one session.

use std::collections::HashSet;

use crate::types::{Message, Role, ToolCallRequest};

/// Ordered, append-only sequence of conversation messages.
///
/// Insertion order is conversation order and is handed verbatim to the
/// response generator. Entries are never edited or reordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Add a message to the end of the history.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The full ordered history.
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Tool calls from the trailing assistant request that have no result yet.
    ///
    /// Non-empty only when the history ends with a tool request followed by
    /// fewer results than it asked for, i.e. a turn stopped mid-dispatch.
    pub fn pending_tool_calls(&self) -> Vec<ToolCallRequest> {
        let Some(request_idx) = self.messages.iter().rposition(Message::has_tool_calls) else {
            return Vec::new();
        };
        let tail = &self.messages[request_idx + 1..];
        if tail.iter().any(|m| m.role != Role::Tool) {
            return Vec::new();
        }

        let answered: HashSet<&str> = tail
            .iter()
            .filter_map(|m| m.tool_result_part())
            .map(|r| r.tool_call_id.as_str())
            .collect();
        self.messages[request_idx]
            .tool_calls()
            .into_iter()
            .filter(|call| !answered.contains(call.id.as_str()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
