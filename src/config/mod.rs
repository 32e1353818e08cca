//! Configuration (layered: explicit > environment > TOML file > defaults).
//!
//! Nothing here reads ambient state on its own: callers build a
//! [`ParleyConfig`] once and pass it to the constructors that need it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ParleyError;
use crate::util::retry::RetryPolicy;

pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_MAX_ROUNDS: usize = 10;
pub const DEFAULT_SEARCH_MAX_RESULTS: u32 = 2;

/// Retry knobs for generation calls, in milliseconds so they fit TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

/// Everything needed to wire a generator, the tool registry, and session storage.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParleyConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: Option<String>,
    pub search_max_results: u32,
    pub max_rounds: usize,
    pub generation_timeout_ms: Option<u64>,
    pub tool_timeout_ms: Option<u64>,
    pub retry: RetrySettings,
    /// SQLite path for session memory; `":memory:"` keeps it in-process.
    pub session_db: String,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: None,
            system_prompt: None,
            tavily_api_key: None,
            tavily_base_url: None,
            search_max_results: DEFAULT_SEARCH_MAX_RESULTS,
            max_rounds: DEFAULT_MAX_ROUNDS,
            generation_timeout_ms: Some(120_000),
            tool_timeout_ms: Some(30_000),
            retry: RetrySettings::default(),
            session_db: ":memory:".to_string(),
        }
    }
}

impl std::fmt::Debug for ParleyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyConfig")
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| ".."))
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("model", &self.model)
            .field("tavily_api_key", &self.tavily_api_key.as_ref().map(|_| ".."))
            .field("search_max_results", &self.search_max_results)
            .field("max_rounds", &self.max_rounds)
            .field("session_db", &self.session_db)
            .finish_non_exhaustive()
    }
}

impl ParleyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.env` if present, then apply process environment variables.
    pub fn from_env() -> Self {
        Self::default().merge_env(&process_env())
    }

    /// The optional TOML file first, then `.env` and the process environment
    /// on top of it.
    pub fn load(toml: Option<&Path>) -> Result<Self, ParleyError> {
        let base = match toml {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(base.merge_env(&process_env()))
    }

    /// Defaults overlaid with an explicit variable map.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Self {
        Self::default().merge_env(vars)
    }

    /// Parse a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ParleyError> {
        toml::from_str(raw).map_err(|e| ParleyError::Configuration(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ParleyError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ParleyError::Configuration(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Overlay values from an environment map. Unset or empty variables leave
    /// the current value alone.
    pub fn merge_env(mut self, vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();

        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_BASE_URL") {
            self.anthropic_base_url = Some(v);
        }
        if let Some(v) = get("TAVILY_API_KEY") {
            self.tavily_api_key = Some(v);
        }
        if let Some(v) = get("TAVILY_BASE_URL") {
            self.tavily_base_url = Some(v);
        }
        if let Some(v) = get("PARLEY_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("PARLEY_SESSION_DB") {
            self.session_db = v;
        }
        if let Some(n) = get("PARLEY_MAX_ROUNDS").and_then(|v| v.parse().ok()) {
            self.max_rounds = n;
        }
        self
    }

    /// The Anthropic key, or a configuration error naming the variable.
    pub fn require_anthropic_key(&self) -> Result<&str, ParleyError> {
        self.anthropic_api_key
            .as_deref()
            .ok_or_else(|| ParleyError::Configuration("Missing ANTHROPIC_API_KEY".into()))
    }

    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_ms.map(Duration::from_millis)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }
}

fn process_env() -> HashMap<String, String> {
    let _ = dotenvy::dotenv();
    std::env::vars().collect()
}

/// Default location for persistent session databases (`~/.parley/sessions.db`).
pub fn default_session_db() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".parley"))
        .unwrap_or_else(|| PathBuf::from(".parley"))
        .join("sessions.db")
}
