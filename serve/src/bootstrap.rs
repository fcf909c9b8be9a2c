//! Engine assembly: LLM clients, builtin tools, MCP servers, scopes.

use std::collections::HashMap;
use std::sync::Arc;

use foreman::tokens::{ModelTable, TokenCounter};
use foreman::tool_source::{
    McpToolSource, McpTransport, ProviderSyncClient, ProviderSyncRequest, ToolSource,
};
use foreman::tools::{
    register_source, BackendApiCall, CrawlTool, EscalateToPlanner, PmBridge, ResolveProjectKey,
    WebSearchTool,
};
use foreman::{configure_scopes, ChatOpenAI, Context, Engine, EngineConfig, ToolRegistry};
use tokio::sync::Semaphore;

/// Builds the engine from the environment. Missing optional backends (search
/// endpoint, PM REST API, MCP server) just narrow the tool set.
pub async fn build_engine() -> Result<Engine, String> {
    let config = EngineConfig::from_env();
    let api_base =
        std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY is not set")?;
    let semaphore = Arc::new(Semaphore::new(config.llm_concurrency));

    let basic = Arc::new(ChatOpenAI::new(
        api_base.clone(),
        api_key.clone(),
        config.basic_model.clone(),
        Arc::clone(&semaphore),
    ));
    let reasoning = Arc::new(ChatOpenAI::new(
        api_base,
        api_key,
        config.reasoning_model.clone(),
        semaphore,
    ));

    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(EscalateToPlanner));
    registry.register(Arc::new(CrawlTool::new()));
    if let Some(ref url) = config.search_api_url {
        registry.register(Arc::new(WebSearchTool::new(url.clone(), None)));
    }
    if let Some(ref base) = config.pm_api_base_url {
        let key = std::env::var("PM_API_KEY").ok();
        registry.register(Arc::new(ResolveProjectKey::new(base.clone(), key.clone())));
        registry.register(Arc::new(BackendApiCall::new(base.clone(), key)));
    }

    let mut pm_tool_names = Vec::new();
    if let Some(ref mcp) = config.mcp {
        let source = connect_mcp(&config, mcp).await?;

        let mut bridge = PmBridge::new(source);
        if let Some(ref sync_url) = config.provider_sync_url {
            let client = Arc::new(ProviderSyncClient::new(
                sync_url.clone(),
                mcp.api_key.clone(),
            ));
            let request = ProviderSyncRequest {
                provider_type: std::env::var("PM_PROVIDER_TYPE").unwrap_or_default(),
                base_url: std::env::var("PM_PROVIDER_BASE_URL").unwrap_or_default(),
                api_key: std::env::var("PM_PROVIDER_API_KEY").ok(),
                api_token: std::env::var("PM_PROVIDER_API_TOKEN").ok(),
            };
            // Startup sweep: reconcile provider credentials once.
            if let Err(e) = client.sync(&request).await {
                tracing::warn!(error = %e, "startup provider sync failed");
            }
            bridge = bridge.with_provider_sync(client, request);
        }

        pm_tool_names = register_source(&registry, Arc::new(bridge))
            .await
            .map_err(|e| format!("MCP tools/list: {e}"))?;
        tracing::info!(tools = pm_tool_names.len(), "PM tool server connected");
    }
    configure_scopes(&registry, &pm_tool_names);

    let context = Context {
        counter: TokenCounter::new(config.tokens_per_char),
        config,
        basic_llm: basic,
        reasoning_llm: reasoning,
        tools: registry,
        models: ModelTable::builtin().clone(),
    };
    Ok(Engine::new(context))
}

async fn connect_mcp(
    config: &EngineConfig,
    mcp: &foreman::McpServerConfig,
) -> Result<Arc<dyn ToolSource>, String> {
    let source: Arc<dyn ToolSource> = match mcp.transport {
        McpTransport::Stdio => {
            let command = std::env::var("PM_MCP_COMMAND")
                .map_err(|_| "stdio MCP transport requires PM_MCP_COMMAND")?;
            let args: Vec<String> = std::env::var("PM_MCP_ARGS")
                .map(|a| a.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            let mut env = HashMap::new();
            if let Some(ref key) = mcp.api_key {
                env.insert("PM_MCP_API_KEY".to_string(), key.clone());
            }
            Arc::new(
                McpToolSource::connect_stdio(&command, &args, &env, config.tool_timeout)
                    .await
                    .map_err(|e| format!("MCP spawn: {e}"))?,
            )
        }
        transport => {
            let headers = mcp
                .api_key
                .iter()
                .map(|k| ("Authorization".to_string(), format!("Bearer {k}")))
                .collect();
            Arc::new(
                McpToolSource::connect_http(
                    mcp.url.clone(),
                    headers,
                    transport,
                    config.tool_timeout,
                )
                .await
                .map_err(|e| format!("MCP connect: {e}"))?,
            )
        }
    };
    Ok(source)
}
