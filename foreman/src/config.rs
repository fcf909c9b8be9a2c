//! Engine configuration: defaults plus environment overrides.
//!
//! `config::load_and_apply` (the workspace config crate) populates the process
//! environment first; `EngineConfig::from_env` then reads the recognized set.

use std::time::Duration;

use crate::tool_source::McpTransport;

#[derive(Clone, Debug)]
pub struct McpServerConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub transport: McpTransport,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Model family for coordinator, react agent, workers, validator.
    pub basic_model: String,
    /// Model family for planner, reflector, reporter.
    pub reasoning_model: String,
    pub max_replan_iterations: u32,
    pub react_max_iterations: u32,
    pub react_max_errors: u32,
    pub tool_output_token_budget: u32,
    pub tool_timeout: Duration,
    pub llm_concurrency: usize,
    pub tokens_per_char: f64,
    pub react_deadline: Duration,
    pub pipeline_deadline: Duration,
    pub mcp: Option<McpServerConfig>,
    pub provider_sync_url: Option<String>,
    pub pm_api_base_url: Option<String>,
    pub search_api_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            basic_model: "mid-chat".into(),
            reasoning_model: "reasoning".into(),
            max_replan_iterations: 3,
            react_max_iterations: 8,
            react_max_errors: 2,
            tool_output_token_budget: 5000,
            tool_timeout: Duration::from_secs(30),
            llm_concurrency: 16,
            tokens_per_char: 0.25,
            react_deadline: Duration::from_secs(5 * 60),
            pipeline_deadline: Duration::from_secs(15 * 60),
            mcp: None,
            provider_sync_url: None,
            pm_api_base_url: None,
            search_api_url: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mcp = std::env::var("PM_MCP_SERVER_URL").ok().map(|url| {
            let transport = std::env::var("PM_MCP_TRANSPORT")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or_default();
            McpServerConfig {
                url,
                api_key: std::env::var("PM_MCP_API_KEY").ok(),
                transport,
            }
        });
        Self {
            basic_model: std::env::var("BASIC_MODEL").unwrap_or(defaults.basic_model),
            reasoning_model: std::env::var("REASONING_MODEL")
                .unwrap_or(defaults.reasoning_model),
            max_replan_iterations: env_parse(
                "MAX_REPLAN_ITERATIONS",
                defaults.max_replan_iterations,
            ),
            react_max_iterations: env_parse(
                "REACT_MAX_ITERATIONS",
                defaults.react_max_iterations,
            ),
            react_max_errors: env_parse("REACT_MAX_ERRORS", defaults.react_max_errors),
            tool_output_token_budget: env_parse(
                "TOOL_OUTPUT_TOKEN_BUDGET",
                defaults.tool_output_token_budget,
            ),
            tool_timeout: Duration::from_secs(env_parse("TOOL_TIMEOUT_SECS", 30u64)),
            llm_concurrency: env_parse("LLM_CONCURRENCY", defaults.llm_concurrency),
            tokens_per_char: env_parse("TOKENS_PER_CHAR", defaults.tokens_per_char),
            react_deadline: defaults.react_deadline,
            pipeline_deadline: defaults.pipeline_deadline,
            mcp,
            provider_sync_url: std::env::var("PROVIDER_SYNC_URL").ok(),
            pm_api_base_url: std::env::var("PM_API_BASE_URL").ok(),
            search_api_url: std::env::var("SEARCH_API_URL").ok(),
        }
    }
}
