//! Turn event stream types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{Message, ToolCallRequest, ToolResult};

use super::TurnId;

/// States of the turn state machine.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    AwaitingGeneration,
    AwaitingToolResults,
    Done,
}

/// Concrete event payloads emitted by the turn controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventPayload {
    Started,
    StateChanged {
        from: TurnState,
        to: TurnState,
    },
    RoundStarted {
        round: usize,
    },
    MessageAppended {
        message: Message,
    },
    ToolStarted {
        call: ToolCallRequest,
    },
    ToolFinished {
        tool_name: String,
        result: ToolResult,
    },
    PersistenceFailed {
        error: String,
    },
    Completed {
        rounds: usize,
        reply: Message,
    },
    Failed {
        error: String,
    },
}

/// Envelope for turn events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEvent {
    pub turn_id: TurnId,
    pub session_id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TurnEventPayload,
}

/// Callback receiving every event of every turn.
pub type TurnEventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

pub(crate) struct TurnEventEmitter {
    turn_id: TurnId,
    session_id: String,
    seq: AtomicU64,
    sink: Option<TurnEventSink>,
}

impl TurnEventEmitter {
    pub(crate) fn new(turn_id: TurnId, session_id: &str, sink: Option<TurnEventSink>) -> Self {
        Self {
            turn_id,
            session_id: session_id.to_string(),
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: TurnEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(TurnEvent {
            turn_id: self.turn_id,
            session_id: self.session_id.clone(),
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}
