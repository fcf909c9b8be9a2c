//! Web tools for the researcher and the react agent: search and page fetch.

use async_trait::async_trait;
use serde_json::Value;

use super::Tool;
use crate::tool_source::{ToolCallContent, ToolSourceError, ToolSpec};

const CRAWL_MAX_CHARS: usize = 12_000;

/// Search against a configurable HTTP endpoint (`?q=<query>&count=<n>`).
pub struct WebSearchTool {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search".into(),
            description: Some("Search the web and return result snippets.".into()),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_results": {"type": "integer", "default": 5}
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolSourceError::InvalidArguments("query is required".into()))?;
        let count = args
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(5);
        let mut req = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query), ("count", &count.to_string())]);
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

/// Fetches a URL and returns its text content with markup stripped.
pub struct CrawlTool {
    http: reqwest::Client,
}

impl Default for CrawlTool {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlTool {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

/// Removes tags, scripts, and styles; collapses whitespace runs.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices().peekable();
    let lower = html.to_lowercase();
    let mut skip_until: Option<&str> = None;
    while let Some((i, c)) = chars.next() {
        if let Some(end_tag) = skip_until {
            if lower[i..].starts_with(end_tag) {
                for _ in 0..end_tag.len().saturating_sub(1) {
                    chars.next();
                }
                skip_until = None;
            }
            continue;
        }
        if c == '<' {
            if lower[i..].starts_with("<script") {
                skip_until = Some("</script>");
            } else if lower[i..].starts_with("<style") {
                skip_until = Some("</style>");
            }
            for (_, t) in chars.by_ref() {
                if t == '>' {
                    break;
                }
            }
            out.push(' ');
            continue;
        }
        out.push(c);
    }
    let mut collapsed = String::with_capacity(out.len());
    let mut last_ws = false;
    for c in out.chars() {
        if c.is_whitespace() {
            if !last_ws {
                collapsed.push(' ');
            }
            last_ws = true;
        } else {
            collapsed.push(c);
            last_ws = false;
        }
    }
    collapsed.trim().to_string()
}

#[async_trait]
impl Tool for CrawlTool {
    fn name(&self) -> &str {
        "crawl"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "crawl".into(),
            description: Some("Fetch a web page and return its readable text.".into()),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolSourceError> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolSourceError::InvalidArguments("url is required".into()))?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(ToolSourceError::Remote {
                status,
                message: body,
            });
        }
        let mut text = strip_markup(&body);
        if text.len() > CRAWL_MAX_CHARS {
            let mut cut = CRAWL_MAX_CHARS;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Ok(ToolCallContent { text })
    }
}
