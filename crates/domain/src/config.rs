use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Collect configuration issues. Errors abort startup; warnings are
    /// logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.agent.max_turns == 0 {
            issues.push(ConfigIssue::error("agent.max_turns must be at least 1"));
        }
        if self.agent.max_iterations == 0 {
            issues.push(ConfigIssue::error("agent.max_iterations must be at least 1"));
        }
        if self.agent.token_budget < self.agent.subagent_token_budget {
            issues.push(ConfigIssue::warning(
                "agent.token_budget is below agent.subagent_token_budget",
            ));
        }
        if self.workers.endpoints.is_empty() {
            issues.push(ConfigIssue::warning(
                "no worker endpoints configured — long-process tools will fail to dispatch",
            ));
        }
        for (kind, url) in &self.workers.endpoints {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                issues.push(ConfigIssue::error(format!(
                    "workers.endpoints.{kind}: '{url}' is not an http(s) URL"
                )));
            }
        }
        if self.auth.shared_secret.is_none() {
            issues.push(ConfigIssue::warning(
                "auth.shared_secret is not set — token verification runs in dev mode",
            ));
        }
        issues
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            message: message.into(),
        }
    }
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Origins allowed for CORS. Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            allowed_origins: d_cors_origins(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for the bundled token verifier. `None` = dev mode
    /// (every token accepted).
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// TTL of the ephemeral auth session record, in seconds.
    #[serde(default = "d_3600")]
    pub session_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            session_ttl_secs: 3600,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_model")]
    pub default_model: String,
    #[serde(default = "d_120000")]
    pub timeout_ms: u64,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_base_url(),
            api_key_env: d_api_key_env(),
            default_model: d_model(),
            timeout_ms: 120_000,
            system_prompt: d_system_prompt(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent loop budgets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Outer-loop retry budget for one user message.
    #[serde(default = "d_3u32")]
    pub max_iterations: u32,
    /// Inner-loop turn budget per iteration.
    #[serde(default = "d_8u32")]
    pub max_turns: u32,
    /// Context token budget for the main brain; reaching it triggers
    /// summarize-and-reseed before the next turn.
    #[serde(default = "d_80000")]
    pub token_budget: u32,
    /// Turn and token budgets reserved for delegated sub-agents.
    #[serde(default = "d_7u32")]
    pub subagent_max_turns: u32,
    #[serde(default = "d_15000")]
    pub subagent_token_budget: u32,
    /// Tool results longer than this are truncated before being folded
    /// into the next turn's input.
    #[serde(default = "d_1500")]
    pub tool_result_max_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_turns: 8,
            token_budget: 80_000,
            subagent_max_turns: 7,
            subagent_token_budget: 15_000,
            tool_result_max_chars: 1500,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context cache / presence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Freshness window of the per-thread context cache, in seconds.
    #[serde(default = "d_300")]
    pub cache_ttl_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// A heartbeat younger than this many seconds classifies the user as
    /// UI-attached; at or beyond it, backend-only.
    #[serde(default = "d_300")]
    pub heartbeat_fresh_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_fresh_secs: 300,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker fleet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Worker endpoint URL per worker kind id (e.g. `ap_bookkeeper`).
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default = "d_10000")]
    pub dispatch_timeout_ms: u64,
    /// Public base URL workers call back on (`{base}/lpt/callback`).
    #[serde(default = "d_callback_base")]
    pub callback_base_url: String,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            dispatch_timeout_ms: 10_000,
            callback_base_url: d_callback_base(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_60")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 60,
        }
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8710
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into(), "http://127.0.0.1:3000".into()]
}
fn d_llm_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn d_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn d_system_prompt() -> String {
    "You are Fiscus, a back-office operations assistant. Use the available \
     tools to answer questions and launch accounting workflows. Call \
     TERMINATE_TASK with a conclusion once the mission is complete."
        .into()
}
fn d_callback_base() -> String {
    "http://127.0.0.1:8710".into()
}
fn d_3600() -> u64 {
    3600
}
fn d_120000() -> u64 {
    120_000
}
fn d_10000() -> u64 {
    10_000
}
fn d_300() -> u64 {
    300
}
fn d_60() -> u64 {
    60
}
fn d_3u32() -> u32 {
    3
}
fn d_7u32() -> u32 {
    7
}
fn d_8u32() -> u32 {
    8
}
fn d_80000() -> u32 {
    80_000
}
fn d_15000() -> u32 {
    15_000
}
fn d_1500() -> usize {
    1500
}
fn d_true() -> bool {
    true
}
