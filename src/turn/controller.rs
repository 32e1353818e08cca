//! The turn state machine: generate, dispatch tools, repeat until a final answer.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::Session;
use crate::config::ParleyConfig;
use crate::error::ParleyError;
use crate::generator::{Generation, GenerationRequest, ResponseGenerator};
use crate::session::SessionStore;
use crate::tools::{ToolExecutionContext, ToolRegistry};
use crate::types::{GenerationSettings, Message, ToolCallRequest, ToolResult, Usage};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_optional_timeout;

use super::events::{TurnEventEmitter, TurnEventPayload, TurnEventSink, TurnState};
use super::TurnId;

/// Error text recorded for tool calls whose turn ended before they produced a result.
pub const INTERRUPTED_CALL: &str = "interrupted: the turn ended before this tool call finished";

/// What to do when a message cannot be written to the session store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Keep going in memory; report the failure on the outcome and as an event.
    /// A failed write is not retried (at-most-once).
    #[default]
    BestEffort,
    /// Abort the turn with [`ParleyError::Persistence`].
    Strict,
}

/// Tunables for the turn loop.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Upper bound on generation steps per turn.
    pub max_rounds: usize,
    pub generation_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub persistence: PersistencePolicy,
    pub system_prompt: Option<String>,
    pub settings: GenerationSettings,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_rounds: crate::config::DEFAULT_MAX_ROUNDS,
            generation_timeout: None,
            retry: RetryPolicy::none(),
            persistence: PersistencePolicy::default(),
            system_prompt: None,
            settings: GenerationSettings::default(),
        }
    }
}

impl TurnOptions {
    pub fn from_config(config: &ParleyConfig) -> Self {
        Self {
            max_rounds: config.max_rounds.max(1),
            generation_timeout: config.generation_timeout(),
            retry: config.retry.policy(),
            persistence: PersistencePolicy::default(),
            system_prompt: config.system_prompt.clone(),
            settings: GenerationSettings {
                max_tokens: config.max_tokens,
                ..GenerationSettings::default()
            },
        }
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    /// The final assistant message, already appended to the session.
    pub reply: Message,
    /// Generation steps taken, including the final one.
    pub rounds: usize,
    pub tool_calls: usize,
    pub usage: Usage,
    /// Store writes that failed under [`PersistencePolicy::BestEffort`].
    pub persistence_failures: Vec<String>,
}

impl TurnOutcome {
    pub fn text(&self) -> String {
        self.reply.text()
    }
}

enum Phase {
    Generate,
    Dispatch(Vec<ToolCallRequest>),
}

impl Phase {
    fn state(&self) -> TurnState {
        match self {
            Phase::Generate => TurnState::AwaitingGeneration,
            Phase::Dispatch(_) => TurnState::AwaitingToolResults,
        }
    }
}

/// Runs one user turn to completion against a session.
///
/// Tools and persistence are both optional, so the same controller serves a
/// plain chatbot, a tool-using agent, and an agent with durable memory.
pub struct TurnController {
    generator: Arc<dyn ResponseGenerator>,
    tools: Option<Arc<ToolRegistry>>,
    store: Option<Arc<dyn SessionStore>>,
    options: TurnOptions,
    event_sink: Option<TurnEventSink>,
}

impl TurnController {
    pub fn new(generator: Arc<dyn ResponseGenerator>) -> Self {
        Self {
            generator,
            tools: None,
            store: None,
            options: TurnOptions::default(),
            event_sink: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
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

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    pub fn tools(&self) -> Option<&Arc<ToolRegistry>> {
        self.tools.as_ref()
    }

    pub fn store(&self) -> Option<&Arc<dyn SessionStore>> {
        self.store.as_ref()
    }

    /// Append `input` as a user message and drive the turn to a final reply.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        input: impl Into<String>,
    ) -> Result<TurnOutcome, ParleyError> {
        let turn_id = Uuid::new_v4();
        let emitter = TurnEventEmitter::new(turn_id, session.id(), self.event_sink.clone());
        emitter.emit(TurnEventPayload::Started);

        let result = self.drive(turn_id, session, input.into(), &emitter).await;
        match &result {
            Ok(outcome) => {
                info!(
                    session = session.id(),
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls,
                    "turn completed"
                );
                emitter.emit(TurnEventPayload::Completed {
                    rounds: outcome.rounds,
                    reply: outcome.reply.clone(),
                });
            }
            Err(err) => {
                warn!(session = session.id(), error = %err, "turn failed");
                emitter.emit(TurnEventPayload::Failed {
                    error: err.to_string(),
                });
            }
        }
        result
    }

    async fn drive(
        &self,
        turn_id: TurnId,
        session: &mut Session,
        input: String,
        emitter: &TurnEventEmitter,
    ) -> Result<TurnOutcome, ParleyError> {
        let mut persistence_failures = Vec::new();
        self.close_pending_calls(session, emitter, &mut persistence_failures)
            .await?;
        self.record(session, Message::user(input), emitter, &mut persistence_failures)
            .await?;

        let mut phase = Phase::Generate;
        let mut rounds = 0usize;
        let mut tool_calls = 0usize;
        let mut usage = Usage::default();

        let reply = loop {
            match phase {
                Phase::Generate => {
                    rounds += 1;
                    if rounds > self.options.max_rounds {
                        return Err(ParleyError::RoundLimitExceeded {
                            max_rounds: self.options.max_rounds,
                        });
                    }
                    emitter.emit(TurnEventPayload::RoundStarted { round: rounds });

                    let generation = self.generate(session.messages().all()).await?;
                    usage += generation.usage;
                    debug!(
                        session = session.id(),
                        round = rounds,
                        tool_calls = generation.tool_calls.len(),
                        text_len = generation.text.len(),
                        "generation complete"
                    );

                    if !generation.requests_tools() {
                        let reply = generation.into_message();
                        self.record(session, reply.clone(), emitter, &mut persistence_failures)
                            .await?;
                        transition(emitter, TurnState::AwaitingGeneration, TurnState::Done);
                        break reply;
                    }

                    let calls = generation.tool_calls.clone();
                    self.record(
                        session,
                        generation.into_message(),
                        emitter,
                        &mut persistence_failures,
                    )
                    .await?;
                    phase = Phase::Dispatch(calls);
                    transition(emitter, TurnState::AwaitingGeneration, phase.state());
                }
                Phase::Dispatch(ref calls) => {
                    tool_calls += calls.len();
                    let results = self.dispatch(session.id(), calls, emitter).await;
                    for result in results {
                        let message =
                            Message::tool_result(result.tool_call_id, result.content, result.is_error);
                        self.record(session, message, emitter, &mut persistence_failures)
                            .await?;
                    }
                    let from = phase.state();
                    phase = Phase::Generate;
                    transition(emitter, from, phase.state());
                }
            }
        };

        Ok(TurnOutcome {
            turn_id,
            reply,
            rounds,
            tool_calls,
            usage,
            persistence_failures,
        })
    }

    /// Give every call left unanswered by an interrupted turn an error result,
    /// so the history never holds a tool request without its results.
    ///
    /// Pending calls are not re-run.
    async fn close_pending_calls(
        &self,
        session: &mut Session,
        emitter: &TurnEventEmitter,
        failures: &mut Vec<String>,
    ) -> Result<(), ParleyError> {
        let pending = session.messages().pending_tool_calls();
        if pending.is_empty() {
            return Ok(());
        }
        warn!(
            session = session.id(),
            pending = pending.len(),
            "closing tool calls left unanswered by an interrupted turn"
        );
        transition(emitter, TurnState::AwaitingToolResults, TurnState::AwaitingGeneration);

        for call in pending {
            let result = ToolResult {
                tool_call_id: call.id,
                content: serde_json::json!({ "error": INTERRUPTED_CALL }),
                is_error: true,
            };
            emitter.emit(TurnEventPayload::ToolFinished {
                tool_name: call.name,
                result: result.clone(),
            });
            let message = Message::tool_result(result.tool_call_id, result.content, true);
            self.record(session, message, emitter, failures).await?;
        }
        Ok(())
    }

    async fn generate(&self, history: &[Message]) -> Result<Generation, ParleyError> {
        let request = GenerationRequest {
            system: self.options.system_prompt.clone(),
            messages: history.to_vec(),
            tools: self
                .tools
                .as_ref()
                .map(|registry| registry.definitions())
                .unwrap_or_default(),
            settings: self.options.settings.clone(),
        };

        self.options
            .retry
            .execute(|| {
                with_optional_timeout(
                    self.options.generation_timeout,
                    self.generator.generate(&request),
                )
            })
            .await
            .map_err(|err| match err {
                ParleyError::Generation(_) => err,
                other => ParleyError::Generation(format!("{}: {other}", self.generator.name())),
            })
    }

    /// Run every call of one round concurrently and return results in request order.
    async fn dispatch(
        &self,
        session_id: &str,
        calls: &[ToolCallRequest],
        emitter: &TurnEventEmitter,
    ) -> Vec<ToolResult> {
        join_all(
            calls
                .iter()
                .map(|call| self.execute_call(session_id, call, emitter)),
        )
        .await
    }

    async fn execute_call(
        &self,
        session_id: &str,
        call: &ToolCallRequest,
        emitter: &TurnEventEmitter,
    ) -> ToolResult {
        emitter.emit(TurnEventPayload::ToolStarted { call: call.clone() });

        let ctx = ToolExecutionContext {
            session_id: Some(session_id.to_string()),
            tool_call_id: Some(call.id.clone()),
        };
        let outcome = match &self.tools {
            Some(registry) => match registry.resolve(&call.name) {
                Ok(tool) => registry.invoke(tool.as_ref(), call.arguments.clone(), &ctx).await,
                Err(err) => Err(err),
            },
            None => Err(ParleyError::ToolNotFound(call.name.clone())),
        };

        let result = match outcome {
            Ok(content) => ToolResult {
                tool_call_id: call.id.clone(),
                content,
                is_error: false,
            },
            Err(err) => {
                warn!(tool = %call.name, call_id = %call.id, error = %err, "tool call failed");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: serde_json::json!({ "error": err.to_string() }),
                    is_error: true,
                }
            }
        };

        emitter.emit(TurnEventPayload::ToolFinished {
            tool_name: call.name.clone(),
            result: result.clone(),
        });
        result
    }

    /// Append to the in-memory history, then to the session store if configured.
    async fn record(
        &self,
        session: &mut Session,
        message: Message,
        emitter: &TurnEventEmitter,
        failures: &mut Vec<String>,
    ) -> Result<(), ParleyError> {
        session.append(message.clone());
        emitter.emit(TurnEventPayload::MessageAppended {
            message: message.clone(),
        });

        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Err(err) = store.append(session.id(), &message).await {
            let error = match err {
                ParleyError::Persistence(detail) => detail,
                other => other.to_string(),
            };
            warn!(session = session.id(), %error, "failed to persist message");
            emitter.emit(TurnEventPayload::PersistenceFailed {
                error: error.clone(),
            });
            match self.options.persistence {
                PersistencePolicy::Strict => return Err(ParleyError::Persistence(error)),
                PersistencePolicy::BestEffort => failures.push(error),
            }
        }
        Ok(())
    }
}

fn transition(emitter: &TurnEventEmitter, from: TurnState, to: TurnState) {
    emitter.emit(TurnEventPayload::StateChanged { from, to });
}
