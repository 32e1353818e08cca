//! Response generator boundary.
//!
//! The turn loop treats the language model as an opaque collaborator: it
//! hands over the ordered history plus the available tool schemas and gets
//! back either final text or a set of tool call requests.

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "anthropic")]
mod sanitize;

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::tools::ToolDefinition;
use crate::types::{FinishReason, GenerationSettings, Message, ToolCallRequest, Usage};

/// Input for one generation step.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// System prompt, kept out of the stored history.
    pub system: Option<String>,
    pub messages: Vec<Message>,
    /// Tools the generator may request. Empty means tools are disabled.
    pub tools: Vec<ToolDefinition>,
    pub settings: GenerationSettings,
}

/// Output of one generation step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

impl Generation {
    /// A final text answer.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Self::default()
        }
    }

    /// A request to invoke one or more tools.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some(FinishReason::ToolCalls),
            ..Self::default()
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Convert into the assistant message that gets appended to history.
    pub fn into_message(self) -> Message {
        if self.tool_calls.is_empty() {
            Message::assistant(self.text)
        } else {
            Message::assistant_with_tool_calls(self.text, self.tool_calls)
        }
    }
}

/// Produces the next assistant step from the conversation so far.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Short name used in logs (e.g. "anthropic").
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ParleyError>;
}
