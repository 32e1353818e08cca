//! Shared test helpers: a scripted generator, stub tools, and a failing store.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use parley::error::ParleyError;
use parley::generator::{Generation, GenerationRequest, ResponseGenerator};
use parley::session::SessionStore;
use parley::tools::{FnTool, Tool, ToolParameters};
use parley::types::{Message, ToolCallRequest, Usage};

/// A generator that replays queued steps and records every request it sees.
#[derive(Default)]
pub struct MockGenerator {
    steps: Mutex<VecDeque<Result<Generation, ParleyError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a final text answer.
    pub fn queue_response(&self, text: &str) {
        let mut generation = Generation::text(text);
        generation.usage = Usage {
            input_tokens: 10,
            output_tokens: 20,
        };
        self.steps.lock().unwrap().push_back(Ok(generation));
    }

    /// Queue a single tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.queue_tool_calls(vec![(id, name, args)]);
    }

    /// Queue one step requesting several tools at once.
    pub fn queue_tool_calls(&self, calls: Vec<(&str, &str, serde_json::Value)>) {
        let calls = calls
            .into_iter()
            .map(|(id, name, arguments)| ToolCallRequest {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })
            .collect();
        let mut generation = Generation::tool_calls(calls);
        generation.usage = Usage {
            input_tokens: 10,
            output_tokens: 5,
        };
        self.steps.lock().unwrap().push_back(Ok(generation));
    }

    pub fn queue_error(&self, error: ParleyError) {
        self.steps.lock().unwrap().push_back(Err(error));
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ParleyError> {
        self.requests.lock().unwrap().push(request.clone());
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Generation::text("Mock response")))
    }
}

/// A generator that never answers within any reasonable timeout.
#[derive(Default)]
pub struct HangingGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ResponseGenerator for HangingGenerator {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, ParleyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Generation::text("too late"))
    }
}

/// A tool that returns `reply` and counts its invocations.
pub fn counting_tool(name: &str, reply: serde_json::Value, calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        name,
        "test tool",
        ToolParameters::empty(),
        move |_args, _ctx| {
            let reply = reply.clone();
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(reply)
            }
        },
    ))
}

/// A tool that sleeps for `delay` before answering.
pub fn slow_tool(name: &str, delay: Duration) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        name,
        "sleeps, then answers",
        ToolParameters::empty(),
        move |_args, _ctx| async move {
            tokio::time::sleep(delay).await;
            Ok(serde_json::json!("finally"))
        },
    ))
}

/// A store whose writes always fail; reads return nothing.
#[derive(Default)]
pub struct FailingStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn load(&self, _session_id: &str) -> Result<Vec<Message>, ParleyError> {
        Ok(Vec::new())
    }

    async fn append(&self, _session_id: &str, _message: &Message) -> Result<(), ParleyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ParleyError::Persistence("disk full".into()))
    }

    async fn list(&self) -> Result<Vec<String>, ParleyError> {
        Ok(Vec::new())
    }
}
