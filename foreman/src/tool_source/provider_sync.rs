//! Provider-sync contract: reconcile PM-provider credentials with the tool
//! server. Called on configuration change, startup sweep, and once per
//! observed provider-mismatch tool error (the bridge never retries more than
//! once per mismatch).

use serde::{Deserialize, Serialize};

use super::ToolSourceError;

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProviderSyncRequest {
    pub provider_type: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderSyncResponse {
    pub mcp_provider_id: String,
    pub action: SyncAction,
}

/// True when a tool error indicates the provider registration is stale and a
/// re-sync might fix it.
pub fn is_provider_mismatch(error_text: &str) -> bool {
    error_text.to_lowercase().contains("provider mismatch")
}

/// Client for `POST /providers/sync` on the tool server.
pub struct ProviderSyncClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ProviderSyncClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub async fn sync(
        &self,
        request: &ProviderSyncRequest,
    ) -> Result<ProviderSyncResponse, ToolSourceError> {
        let url = format!("{}/providers/sync", self.base_url.trim_end_matches('/'));
        let mut req = self.http.post(&url).json(request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let message = resp.text().await.unwrap_or_default();
            return Err(ToolSourceError::Remote { status, message });
        }
        resp.json()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_detection_is_case_insensitive() {
        assert!(is_provider_mismatch("Provider Mismatch: expected jira"));
        assert!(is_provider_mismatch("error: provider mismatch"));
        assert!(!is_provider_mismatch("invalid uuid"));
    }

    #[test]
    fn sync_response_parses_action() {
        let resp: ProviderSyncResponse = serde_json::from_str(
            r#"{"mcp_provider_id": "prov-1", "action": "created"}"#,
        )
        .unwrap();
        assert_eq!(resp.action, SyncAction::Created);
    }

    #[test]
    fn request_omits_absent_credentials() {
        let v = serde_json::to_value(ProviderSyncRequest {
            provider_type: "jira".into(),
            base_url: "https://example.test".into(),
            api_key: None,
            api_token: None,
        })
        .unwrap();
        assert!(v.get("api_key").is_none());
        assert!(v.get("api_token").is_none());
    }
}
