//! Process-wide set of tools available to the generator.

use std::sync::Arc;
use std::time::Duration;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::ToolDefinition;
use crate::error::ParleyError;
use crate::util::timeout::with_optional_timeout;

/// Maps tool names to invocable tools.
///
/// Configured once at startup and shared behind an `Arc`; every method
/// takes `&self`, so concurrent invocations from different sessions are
/// fine as long as the tools themselves are `Send + Sync`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    call_timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            tracing::warn!(tool = tool.name(), "replacing previously registered tool");
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Bound every invocation by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, ParleyError> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| ParleyError::ToolNotFound(name.to_string()))
    }

    /// Run a resolved tool, applying the registry's call timeout.
    pub async fn invoke(
        &self,
        tool: &dyn Tool,
        arguments: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError> {
        let args = ToolArguments::new(arguments);
        with_optional_timeout(self.call_timeout, tool.execute(&args, ctx)).await
    }

    /// Schemas for every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters().schema.clone(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
