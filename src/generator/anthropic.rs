//! Anthropic Messages API generator.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::sanitize::pair_tool_results;
use super::{Generation, GenerationRequest, ResponseGenerator};
use crate::error::ParleyError;
use crate::http::{anthropic_headers, shared_client, status_to_error};
use crate::types::{ContentPart, FinishReason, Role, ToolCallRequest, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicGenerator {
    model: String,
    api_key: String,
    base_url: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = Vec::new();
        let mut system_parts: Vec<String> = request.system.iter().cloned().collect();

        for msg in &pair_tool_results(&request.messages) {
            match msg.role {
                Role::System => system_parts.push(msg.text()),
                Role::User => {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": msg.text(),
                    }));
                }
                Role::Assistant => {
                    let content: Vec<serde_json::Value> = msg
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::Text { text } if !text.is_empty() => {
                                Some(serde_json::json!({"type": "text", "text": text}))
                            }
                            ContentPart::ToolCall(tc) => Some(serde_json::json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.name,
                                "input": tc.arguments,
                            })),
                            _ => None,
                        })
                        .collect();
                    if !content.is_empty() {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": content,
                        }));
                    }
                }
                Role::Tool => {
                    let Some(tr) = msg.tool_result_part() else {
                        continue;
                    };
                    let block = serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": tr.tool_call_id,
                        "content": tool_content_to_string(&tr.content),
                        "is_error": tr.is_error,
                    });
                    // Results answering one assistant turn share a single user message.
                    if let Some(blocks) = messages
                        .last_mut()
                        .filter(|last| is_tool_result_message(last))
                        .and_then(|last| last["content"].as_array_mut())
                    {
                        blocks.push(block);
                    } else {
                        messages.push(serde_json::json!({
                            "role": "user",
                            "content": [block],
                        }));
                    }
                }
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert("system".into(), system_parts.join("\n").into());
            }
            if let Some(temp) = request.settings.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if let Some(top_p) = request.settings.top_p {
                obj.insert("top_p".into(), top_p.into());
            }
            if let Some(ref stops) = request.settings.stop_sequences {
                obj.insert("stop_sequences".into(), serde_json::json!(stops));
            }
            if !request.tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }
}

fn is_tool_result_message(value: &serde_json::Value) -> bool {
    value["role"] == "user"
        && value["content"]
            .as_array()
            .and_then(|blocks| blocks.first())
            .is_some_and(|b| b["type"] == "tool_result")
}

fn tool_content_to_string(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ResponseGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ParleyError> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "anthropic generate"
        );

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| ParleyError::Generation(format!("malformed response: {e}")))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in data.content {
            match block {
                AnthropicContentBlock::Text { text: t } => text.push_str(&t),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCallRequest {
                        id,
                        name,
                        arguments: input,
                    });
                }
                AnthropicContentBlock::Other => {}
            }
        }

        let finish_reason = data.stop_reason.as_deref().map(|r| match r {
            "tool_use" => FinishReason::ToolCalls,
            "max_tokens" => FinishReason::Length,
            _ => FinishReason::Stop,
        });

        Ok(Generation {
            text,
            tool_calls,
            finish_reason,
            usage: Usage {
                input_tokens: data.usage.input_tokens,
                output_tokens: data.usage.output_tokens,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDefinition;
    use crate::types::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: "web_search".into(),
            arguments: serde_json::json!({"query": id}),
        }
    }

    #[test]
    fn unanswered_tool_use_is_answered_before_the_next_user_message() {
        let generator = AnthropicGenerator::new("k", DEFAULT_MODEL);
        let request = GenerationRequest {
            messages: vec![
                Message::user("compare"),
                Message::assistant_with_tool_calls("", vec![call("a")]),
                Message::user("are you there?"),
            ],
            ..GenerationRequest::default()
        };

        let body = generator.build_request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "a");
        assert_eq!(messages[2]["content"][0]["is_error"], true);
        assert_eq!(messages[3]["content"], "are you there?");
    }

    #[test]
    fn tool_results_for_one_turn_share_a_user_message() {
        let generator = AnthropicGenerator::new("k", DEFAULT_MODEL);
        let request = GenerationRequest {
            system: Some("be brief".into()),
            messages: vec![
                Message::user("compare"),
                Message::assistant_with_tool_calls("", vec![call("a"), call("b")]),
                Message::tool_result("a", serde_json::json!("first"), false),
                Message::tool_result("b", serde_json::json!({"error": "x"}), true),
            ],
            ..GenerationRequest::default()
        };

        let body = generator.build_request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["content"], "first");
        assert_eq!(results[1]["is_error"], true);
        assert_eq!(body["system"], "be brief");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tool_definitions_use_input_schema() {
        let generator = AnthropicGenerator::new("k", DEFAULT_MODEL);
        let request = GenerationRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "web_search".into(),
                description: "search".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ..GenerationRequest::default()
        };
        let body = generator.build_request_body(&request);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn parses_tool_use_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(body_partial_json(serde_json::json!({"model": DEFAULT_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "Let me look."},
                    {"type": "tool_use", "id": "toolu_1", "name": "web_search", "input": {"query": "weather"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 12, "output_tokens": 7}
            })))
            .mount(&server)
            .await;

        let generator = AnthropicGenerator::new("sk-test", DEFAULT_MODEL).with_base_url(server.uri());
        let request = GenerationRequest {
            messages: vec![Message::user("weather?")],
            ..GenerationRequest::default()
        };
        let out = generator.generate(&request).await.unwrap();

        assert_eq!(out.text, "Let me look.");
        assert_eq!(out.tool_calls, vec![ToolCallRequest {
            id: "toolu_1".into(),
            name: "web_search".into(),
            arguments: serde_json::json!({"query": "weather"}),
        }]);
        assert_eq!(out.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(out.usage.total(), 19);
    }

    #[tokio::test]
    async fn overloaded_upstream_is_retryable_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let generator = AnthropicGenerator::new("sk-test", DEFAULT_MODEL).with_base_url(server.uri());
        let err = generator
            .generate(&GenerationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Api { status: 529, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_generation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let generator = AnthropicGenerator::new("sk-test", DEFAULT_MODEL).with_base_url(server.uri());
        let err = generator
            .generate(&GenerationRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Generation(_)));
    }
}
