//! Web search tool backed by the Tavily search API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::ToolParameters;
use crate::error::ParleyError;
use crate::http::{shared_client, status_to_error};

pub const TOOL_NAME: &str = "web_search";
pub const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
pub const DEFAULT_MAX_RESULTS: u32 = 2;

/// Searches the web and returns at most `max_results` hits.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    api_key: String,
    base_url: String,
    max_results: u32,
    parameters: ToolParameters,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            parameters: ToolParameters::object()
                .string("query", "The search query", true)
                .build(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// One search result as returned to the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns a list of results with url, title and content."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ParleyError> {
        let SearchArgs { query } = args.deserialize()?;
        let query = query.as_str();
        let url = format!("{}/search", self.base_url);
        debug!(query, max_results = self.max_results, "web search");

        let resp = shared_client()
            .post(&url)
            .json(&SearchRequest {
                api_key: &self.api_key,
                query,
                max_results: self.max_results,
            })
            .send()
            .await
            .map_err(|e| ParleyError::tool(TOOL_NAME, e.to_string()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            let err = status_to_error(status, &body);
            return Err(ParleyError::tool(TOOL_NAME, err.to_string()));
        }

        let data: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ParleyError::tool(TOOL_NAME, format!("malformed response: {e}")))?;

        let hits: Vec<SearchHit> = data
            .results
            .into_iter()
            .take(self.max_results as usize)
            .collect();
        Ok(serde_json::to_value(hits)?)
    }
}
