//! PM-backend tools and the provider bridge.
//!
//! PM tools are served by the tool-protocol server; [`PmBridge`] wraps that
//! source with two behaviors the workers rely on: composite project-id
//! normalization (`"<provider-uuid>:<project-key>"` is split and both forms
//! are passed), and a single provider re-sync + retry when a call fails with
//! a provider-mismatch error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Tool;
use crate::tool_source::{
    is_provider_mismatch, ProviderSyncClient, ProviderSyncRequest, ToolCallContent, ToolSource,
    ToolSourceError, ToolSpec,
};

/// Splits a composite `"<provider-uuid>:<project-key>"` id. Plain ids come
/// back as the key with no provider part.
pub fn split_project_id(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((provider, key)) if !provider.is_empty() && !key.is_empty() => (Some(provider), key),
        _ => (None, raw),
    }
}

fn normalize_args(mut args: Value) -> Value {
    let composite = args
        .get("project_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(raw) = composite {
        if let (Some(provider), key) = split_project_id(&raw) {
            if let Some(obj) = args.as_object_mut() {
                obj.insert("project_id".into(), Value::String(provider.to_string()));
                obj.insert("project_key".into(), Value::String(key.to_string()));
            }
        }
    }
    args
}

/// Wraps the PM tool source with id normalization and mismatch recovery.
pub struct PmBridge {
    source: Arc<dyn ToolSource>,
    sync: Option<Arc<ProviderSyncClient>>,
    sync_request: ProviderSyncRequest,
}

impl PmBridge {
    pub fn new(source: Arc<dyn ToolSource>) -> Self {
        Self {
            source,
            sync: None,
            sync_request: ProviderSyncRequest::default(),
        }
    }

    pub fn with_provider_sync(
        mut self,
        client: Arc<ProviderSyncClient>,
        request: ProviderSyncRequest,
    ) -> Self {
        self.sync = Some(client);
        self.sync_request = request;
        self
    }

    /// One call with normalization; on provider mismatch, one re-sync and
    /// exactly one retry.
    pub async fn call(
        &self,
        name: &str,
        args: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        let args = normalize_args(args);
        match self.source.call_tool(name, args.clone()).await {
            Ok(out) => Ok(out),
            Err(err) => {
                let text = err.to_string();
                let Some(ref sync) = self.sync else {
                    return Err(err);
                };
                if !is_provider_mismatch(&text) {
                    return Err(err);
                }
                tracing::warn!(tool = name, "provider mismatch, re-syncing once");
                sync.sync(&self.sync_request).await?;
                self.source.call_tool(name, args).await
            }
        }
    }
}

/// The bridge is itself a `ToolSource`, so the PM server registers through
/// the standard source adapter with the bridge in every call path.
#[async_trait]
impl ToolSource for PmBridge {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError> {
        self.source.list_tools().await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        self.call(name, arguments).await
    }
}

/// Returns the project bound to the current request, or an explanation when
/// none is set. Registered per request.
pub struct GetCurrentProject {
    project_id: Option<String>,
}

impl GetCurrentProject {
    pub fn new(project_id: Option<String>) -> Self {
        Self { project_id }
    }
}

#[async_trait]
impl Tool for GetCurrentProject {
    fn name(&self) -> &str {
        "get_current_project"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_current_project".into(),
            description: Some(
                "Return the project id the user is currently working in.".into(),
            ),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _args: Value) -> Result<ToolCallContent, ToolSourceError> {
        let text = match &self.project_id {
            Some(id) => serde_json::json!({"project_id": id}).to_string(),
            None => serde_json::json!({
                "project_id": null,
                "note": "no project bound to this conversation"
            })
            .to_string(),
        };
        Ok(ToolCallContent { text })
    }
}

/// Resolves a human project key to its provider-qualified id via the PM
/// backend.
pub struct ResolveProjectKey {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ResolveProjectKey {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Tool for ResolveProjectKey {
    fn name(&self) -> &str {
        "resolve_project_key"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "resolve_project_key".into(),
            description: Some(
                "Resolve a short project key (e.g. \"478\") to its provider-qualified id."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"project_key": {"type": "string"}},
                "required": ["project_key"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError> {
        let key = args
            .get("project_key")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ToolSourceError::InvalidArguments("project_key is required".into())
            })?;
        let url = format!(
            "{}/projects/resolve/{}",
            self.base_url.trim_end_matches('/'),
            key
        );
        let mut req = self.http.get(&url);
        if let Some(ref k) = self.api_key {
            req = req.bearer_auth(k);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(ToolSourceError::Remote {
                status,
                message: text,
            });
        }
        Ok(ToolCallContent { text })
    }
}

/// Generic escape hatch to the PM microservice REST API.
pub struct BackendApiCall {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl BackendApiCall {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Tool for BackendApiCall {
    fn name(&self) -> &str {
        "backend_api_call"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "backend_api_call".into(),
            description: Some(
                "Call the PM backend REST API directly. Use only when no dedicated tool fits."
                    .into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "method": {"type": "string", "enum": ["GET", "POST"]},
                    "path": {"type": "string"},
                    "body": {"type": "object"}
                },
                "required": ["method", "path"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError> {
        let method = args
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let path = args.get("path").and_then(Value::as_str).ok_or_else(|| {
            ToolSourceError::InvalidArguments("path is required".into())
        })?;
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut req = match method.as_str() {
            "GET" => self.http.get(&url),
            "POST" => {
                let body = args.get("body").cloned().unwrap_or(Value::Null);
                self.http.post(&url).json(&body)
            }
            other => {
                return Err(ToolSourceError::InvalidArguments(format!(
                    "unsupported method {other}"
                )))
            }
        };
        if let Some(ref k) = self.api_key {
            req = req.bearer_auth(k);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(ToolSourceError::Remote {
                status,
                message: text,
            });
        }
        Ok(ToolCallContent { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockToolSource;

    #[test]
    fn composite_ids_split_into_provider_and_key() {
        assert_eq!(
            split_project_id("PROV:478"),
            (Some("PROV"), "478")
        );
        assert_eq!(split_project_id("478"), (None, "478"));
        assert_eq!(split_project_id(":478"), (None, ":478"));
    }

    #[test]
    fn normalize_passes_both_forms() {
        let out = normalize_args(serde_json::json!({"project_id": "PROV:478"}));
        assert_eq!(out["project_id"], "PROV");
        assert_eq!(out["project_key"], "478");
        let untouched = normalize_args(serde_json::json!({"project_id": "478"}));
        assert_eq!(untouched["project_id"], "478");
        assert!(untouched.get("project_key").is_none());
    }

    #[tokio::test]
    async fn bridge_without_sync_passes_errors_through() {
        let source = Arc::new(MockToolSource::new().with_tool("list_sprints", "[]"));
        let bridge = PmBridge::new(source);
        let err = bridge
            .call("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolSourceError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn get_current_project_reports_binding() {
        let bound = GetCurrentProject::new(Some("PROV:478".into()));
        let out = bound.call(serde_json::json!({})).await.unwrap();
        assert!(out.text.contains("PROV:478"));
        let unbound = GetCurrentProject::new(None);
        let out = unbound.call(serde_json::json!({})).await.unwrap();
        assert!(out.text.contains("null"));
    }
}
