//! The user-facing agent: a turn controller plus session bookkeeping.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::ParleyConfig;
use crate::error::ParleyError;
use crate::generator::ResponseGenerator;
use crate::session::SessionStore;
use crate::tools::{Tool, ToolRegistry};
use crate::turn::{PersistencePolicy, TurnController, TurnEventSink, TurnOptions, TurnOutcome};

use super::session::Session;

/// Preset wirings of the agent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentShape {
    /// Plain chatbot: no tools, history kept only in memory.
    Basic,
    /// Web search available, history kept only in memory.
    WithTools,
    /// Web search plus durable session memory.
    #[default]
    WithMemory,
}

impl AgentShape {
    pub fn uses_tools(self) -> bool {
        !matches!(self, AgentShape::Basic)
    }

    pub fn uses_memory(self) -> bool {
        matches!(self, AgentShape::WithMemory)
    }
}

/// An AI agent that runs turns against sessions.
///
/// All methods take `&self`; one agent can serve many sessions at once.
pub struct Agent {
    controller: TurnController,
}

impl Agent {
    pub fn builder(generator: Arc<dyn ResponseGenerator>) -> AgentBuilder {
        AgentBuilder::new(generator)
    }

    /// Wire an agent from configuration.
    ///
    /// Needs `ANTHROPIC_API_KEY`; tool shapes also need `TAVILY_API_KEY`.
    #[cfg(all(feature = "anthropic", feature = "web-search", feature = "sqlite"))]
    pub fn from_config(config: &ParleyConfig, shape: AgentShape) -> Result<Self, ParleyError> {
        Ok(AgentBuilder::from_config(config, shape)?.build())
    }

    /// Open a session, loading its history from the store when one is configured.
    pub async fn open_session(&self, session_id: &str) -> Result<Session, ParleyError> {
        match self.controller.store() {
            Some(store) => {
                let history = store.load(session_id).await?;
                tracing::debug!(session = session_id, messages = history.len(), "session loaded");
                Ok(Session::with_history(session_id, history))
            }
            None => Ok(Session::new(session_id)),
        }
    }

    /// A fresh session with a random id.
    pub fn new_session(&self) -> Session {
        Session::ephemeral()
    }

    /// Run one turn: `text` goes in as the user message, the final reply comes out.
    pub async fn send(
        &self,
        session: &mut Session,
        text: impl Into<String>,
    ) -> Result<TurnOutcome, ParleyError> {
        self.controller.run_turn(session, text).await
    }

    pub fn has_tools(&self) -> bool {
        self.controller.tools().is_some_and(|tools| !tools.is_empty())
    }

    pub fn has_memory(&self) -> bool {
        self.controller.store().is_some()
    }

    pub fn options(&self) -> &TurnOptions {
        self.controller.options()
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    generator: Arc<dyn ResponseGenerator>,
    tools: ToolRegistry,
    store: Option<Arc<dyn SessionStore>>,
    options: TurnOptions,
    event_sink: Option<TurnEventSink>,
}

impl AgentBuilder {
    pub fn new(generator: Arc<dyn ResponseGenerator>) -> Self {
        Self {
            generator,
            tools: ToolRegistry::new(),
            store: None,
            options: TurnOptions::default(),
            event_sink: None,
        }
    }

    /// A builder wired for `shape`: Anthropic generator, web search when the
    /// shape uses tools, and the SQLite store at `session_db` when it uses memory.
    #[cfg(all(feature = "anthropic", feature = "web-search", feature = "sqlite"))]
    pub fn from_config(config: &ParleyConfig, shape: AgentShape) -> Result<Self, ParleyError> {
        use crate::generator::anthropic::AnthropicGenerator;
        use crate::session::SqliteSessionStore;
        use crate::tools::web_search::WebSearchTool;

        let mut generator = AnthropicGenerator::new(config.require_anthropic_key()?, &config.model);
        if let Some(url) = &config.anthropic_base_url {
            generator = generator.with_base_url(url);
        }
        let mut builder = Self::new(Arc::new(generator)).with_config(config);

        if shape.uses_tools() {
            let key = config.tavily_api_key.as_deref().ok_or_else(|| {
                ParleyError::Configuration("Missing TAVILY_API_KEY".into())
            })?;
            let mut search = WebSearchTool::new(key).with_max_results(config.search_max_results);
            if let Some(url) = &config.tavily_base_url {
                search = search.with_base_url(url);
            }
            builder = builder.with_tool(Arc::new(search));
        }

        if shape.uses_memory() {
            let store = SqliteSessionStore::open(&config.session_db)?;
            builder = builder.with_store(Arc::new(store));
        }

        Ok(builder)
    }

    /// Take turn options and the tool timeout from configuration.
    pub fn with_config(mut self, config: &ParleyConfig) -> Self {
        self.options = TurnOptions::from_config(config);
        if let Some(timeout) = config.tool_timeout() {
            self.tools = self.tools.with_call_timeout(timeout);
        }
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_options(mut self, options: TurnOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.options.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_persistence(mut self, policy: PersistencePolicy) -> Self {
        self.options.persistence = policy;
        self
    }

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn build(self) -> Agent {
        let mut controller = TurnController::new(self.generator).with_options(self.options);
        if !self.tools.is_empty() {
            controller = controller.with_tools(Arc::new(self.tools));
        }
        if let Some(store) = self.store {
            controller = controller.with_store(store);
        }
        if let Some(sink) = self.event_sink {
            controller = controller.with_event_sink(sink);
        }
        Agent { controller }
    }
}
