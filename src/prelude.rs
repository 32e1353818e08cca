//! Convenience re-exports for common use.

pub use crate::agent::{Agent, AgentBuilder, AgentShape, Session, SessionSnapshot};
pub use crate::config::ParleyConfig;
pub use crate::error::{ParleyError, Result};
pub use crate::generator::{Generation, GenerationRequest, ResponseGenerator};
pub use crate::session::{MemorySessionStore, SessionStore};
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolExecutionContext, ToolParameters, ToolRegistry};
pub use crate::turn::{PersistencePolicy, TurnEvent, TurnEventPayload, TurnOutcome, TurnState};
pub use crate::types::{ContentPart, GenerationSettings, Message, Role, ToolCallRequest, ToolResult, Usage};
