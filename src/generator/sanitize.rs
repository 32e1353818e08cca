//! Transcript repair before a history goes over the wire.
//!
//! Anthropic rejects a `tool_use` block that is not answered by a
//! `tool_result` in the next user message, and a `tool_result` that answers
//! nothing. Stored histories can hold either shape after a crash or a
//! cancelled turn, so requests are built from a paired copy.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::types::{Message, Role};

pub(crate) const MISSING_RESULT: &str =
    "missing tool result in transcript; inserted synthetic error result";

/// Every assistant tool call is followed by exactly one result for it, in
/// call order. Missing results become error results; orphaned or duplicate
/// results are dropped.
pub(crate) fn pair_tool_results(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut answered: HashSet<String> = HashSet::new();

    let mut i = 0usize;
    while i < messages.len() {
        let msg = &messages[i];
        if msg.role == Role::Tool {
            debug!("dropping tool result with no matching call");
            i += 1;
            continue;
        }

        let calls = msg.tool_calls();
        if msg.role != Role::Assistant || calls.is_empty() {
            out.push(msg.clone());
            i += 1;
            continue;
        }

        let ids: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        let mut span: HashMap<String, Message> = HashMap::new();
        let mut j = i + 1;
        while j < messages.len() && messages[j].role == Role::Tool {
            if let Some(result) = messages[j].tool_result_part() {
                let id = result.tool_call_id.as_str();
                if ids.contains(id) && !answered.contains(id) {
                    answered.insert(id.to_string());
                    span.insert(id.to_string(), messages[j].clone());
                }
            }
            j += 1;
        }

        out.push(msg.clone());
        for call in calls {
            match span.remove(&call.id) {
                Some(result) => out.push(result),
                None => {
                    debug!(tool_call_id = %call.id, "inserting result for unanswered tool call");
                    out.push(Message::tool_result(
                        call.id.clone(),
                        serde_json::json!({ "error": MISSING_RESULT }),
                        true,
                    ));
                }
            }
        }
        i = j;
    }

    out
}
