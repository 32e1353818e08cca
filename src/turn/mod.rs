//! One user turn: generation rounds interleaved with tool dispatch.
//!
//! A turn starts in [`TurnState::AwaitingGeneration`]. Each generation step
//! either answers (moving to [`TurnState::Done`]) or asks for tools (moving to
//! [`TurnState::AwaitingToolResults`]); once every requested tool has a result
//! the turn goes back to generation.

mod controller;
mod events;

pub use controller::{
    PersistencePolicy, TurnController, TurnOptions, TurnOutcome, INTERRUPTED_CALL,
};
pub use events::{TurnEvent, TurnEventPayload, TurnEventSink, TurnState};

/// Identifier for one turn, shared by every event the turn emits.
pub type TurnId = uuid::Uuid;
