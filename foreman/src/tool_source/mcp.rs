//! MCP tool source: JSON-RPC over stdio, HTTP, or SSE.
//!
//! Stdio spawns the server process and frames newline-delimited JSON-RPC on
//! its stdin/stdout. HTTP POSTs each request to the server URL; the response
//! may be plain JSON or a `text/event-stream` body whose `data:` lines carry
//! the JSON-RPC message (the SSE transport forces the latter via `Accept`).
//! `tools/list` and `tools/call` results are mapped to [`ToolSpec`] /
//! [`ToolCallContent`], honoring `isError` and the `structuredContent`
//! fallback.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{ToolCallContent, ToolSource, ToolSourceError, ToolSpec};

const PROTOCOL_VERSION: &str = "2025-03-26";

/// Transport selector, parsed from `PM_MCP_TRANSPORT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum McpTransport {
    Stdio,
    #[default]
    Http,
    Sse,
}

impl std::str::FromStr for McpTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            "sse" => Ok(Self::Sse),
            _ => Err(format!("unknown MCP transport: {s} (use stdio, http, or sse)")),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

/// One JSON-RPC response message, as both sessions hand it back.
#[derive(Deserialize, Debug)]
pub struct RpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

fn rpc_body(id: &str, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Extracts the JSON-RPC message matching `id` from an SSE body.
fn parse_sse_rpc(body: &str, id: &str) -> Result<RpcMessage, ToolSourceError> {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let Ok(msg) = serde_json::from_str::<RpcMessage>(data.trim()) else {
            continue;
        };
        if msg.id.as_ref().and_then(Value::as_str) == Some(id) {
            return Ok(msg);
        }
    }
    Err(ToolSourceError::Transport(format!(
        "no SSE data line matched request id {id}"
    )))
}

/// Stdio session: spawned server process with line-framed JSON-RPC.
pub struct McpStdioSession {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    _child: Child,
}

impl McpStdioSession {
    pub async fn new(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, ToolSourceError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolSourceError::Transport(format!("spawn {command}: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolSourceError::Transport("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolSourceError::Transport("child stdout unavailable".into()))?;
        let session = Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            _child: child,
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn initialize(&self) -> Result<(), ToolSourceError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "foreman", "version": env!("CARGO_PKG_VERSION")},
        });
        self.request("foreman-initialize", "initialize", params)
            .await?;
        self.notify("notifications/initialized", Value::Object(Default::default()))
            .await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolSourceError> {
        let body = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params});
        let mut stdin = self.stdin.lock().await;
        let line = format!("{}\n", body);
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))
    }

    /// Sends one request and reads lines until the matching response id.
    pub async fn request(
        &self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<RpcMessage, ToolSourceError> {
        {
            let mut stdin = self.stdin.lock().await;
            let line = format!("{}\n", rpc_body(id, method, params));
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        }
        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let n = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
            if n == 0 {
                return Err(ToolSourceError::Transport("server closed stdout".into()));
            }
            let Ok(msg) = serde_json::from_str::<RpcMessage>(line.trim()) else {
                continue; // log lines and notifications are skipped
            };
            if msg.id.as_ref().and_then(Value::as_str) == Some(id) {
                return Ok(msg);
            }
        }
    }
}

/// HTTP session: one POST per JSON-RPC request, with optional SSE responses.
pub struct McpHttpSession {
    http: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    force_sse: bool,
    session_id: Mutex<Option<String>>,
}

impl McpHttpSession {
    pub async fn new(
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        force_sse: bool,
    ) -> Result<Self, ToolSourceError> {
        let session = Self {
            http: reqwest::Client::new(),
            url: url.into(),
            headers,
            force_sse,
            session_id: Mutex::new(None),
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn initialize(&self) -> Result<(), ToolSourceError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "foreman", "version": env!("CARGO_PKG_VERSION")},
        });
        let body = rpc_body("foreman-initialize", "initialize", params);
        let resp = self
            .post(&body)
            .await
            .map_err(|e| ToolSourceError::Transport(format!("initialize HTTP: {e}")))?;
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 202 {
            return Err(ToolSourceError::Transport(format!(
                "initialize HTTP status {status}"
            )));
        }
        if let Some(sid) = resp
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(sid.to_string());
        }
        // Initialized notification; servers may answer 202 with no body.
        let note = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {},
        });
        let _ = self.post(&note).await;
        Ok(())
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, reqwest::Error> {
        let mut req = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(
                "Accept",
                if self.force_sse {
                    "text/event-stream"
                } else {
                    "application/json, text/event-stream"
                },
            )
            .json(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(sid) = self.session_id.lock().await.clone() {
            req = req.header("MCP-Session-Id", sid);
        }
        req.send().await
    }

    /// One JSON-RPC round-trip. 429/5xx are retried with full-jitter backoff
    /// (200ms base, doubled, 3 attempts); other 4xx surface immediately.
    pub async fn request(
        &self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<RpcMessage, ToolSourceError> {
        const ATTEMPTS: u32 = 3;
        let body = rpc_body(id, method, params);
        let mut last = None;
        for attempt in 0..ATTEMPTS {
            match self.request_once(&body, id).await {
                Err(ToolSourceError::Remote { status, message })
                    if status == 429 || status >= 500 =>
                {
                    tracing::warn!(method, status, attempt, "tool server busy, retrying");
                    last = Some(ToolSourceError::Remote { status, message });
                    let ceiling = 200u64 * 2u64.pow(attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(fastrand::u64(
                        0..=ceiling,
                    )))
                    .await;
                }
                other => return other,
            }
        }
        Err(last.unwrap_or_else(|| ToolSourceError::Transport("retries exhausted".into())))
    }

    async fn request_once(&self, body: &Value, id: &str) -> Result<RpcMessage, ToolSourceError> {
        let resp = self
            .post(body)
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
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
        if content_type.starts_with("text/event-stream") {
            return parse_sse_rpc(&text, id);
        }
        serde_json::from_str(&text).map_err(|e| ToolSourceError::Transport(e.to_string()))
    }
}

enum SessionKind {
    Stdio(McpStdioSession),
    Http(McpHttpSession),
}

/// Tool source backed by an MCP server.
///
/// Holds one session for the process lifetime; per-call deadlines are applied
/// around each request.
pub struct McpToolSource {
    session: SessionKind,
    request_timeout: Duration,
}

impl McpToolSource {
    pub async fn connect_stdio(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, ToolSourceError> {
        Ok(Self {
            session: SessionKind::Stdio(McpStdioSession::new(command, args, env).await?),
            request_timeout,
        })
    }

    /// Connects over HTTP (or SSE when `transport` says so). `headers`
    /// typically carry the bearer secret.
    pub async fn connect_http(
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        transport: McpTransport,
        request_timeout: Duration,
    ) -> Result<Self, ToolSourceError> {
        let force_sse = transport == McpTransport::Sse;
        Ok(Self {
            session: SessionKind::Http(McpHttpSession::new(url, headers, force_sse).await?),
            request_timeout,
        })
    }

    async fn request(
        &self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<RpcMessage, ToolSourceError> {
        let fut = async {
            match &self.session {
                SessionKind::Stdio(s) => s.request(id, method, params).await,
                SessionKind::Http(s) => s.request(id, method, params).await,
            }
        };
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| {
                ToolSourceError::Timeout(format!(
                    "{method} exceeded {}s",
                    self.request_timeout.as_secs()
                ))
            })?
    }
}

fn parse_list_tools(msg: RpcMessage) -> Result<Vec<ToolSpec>, ToolSourceError> {
    if let Some(err) = msg.error {
        return Err(ToolSourceError::JsonRpc(err.message));
    }
    let tools = msg
        .result
        .and_then(|r| r.get("tools").cloned())
        .ok_or_else(|| ToolSourceError::Transport("no tools in response".into()))?;
    let tools = tools
        .as_array()
        .ok_or_else(|| ToolSourceError::Transport("tools not an array".into()))?;
    let mut specs = Vec::with_capacity(tools.len());
    for t in tools {
        let obj = t
            .as_object()
            .ok_or_else(|| ToolSourceError::Transport("tool item not an object".into()))?;
        specs.push(ToolSpec {
            name: obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            input_schema: obj
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default())),
        });
    }
    Ok(specs)
}

fn parse_call_tool(msg: RpcMessage) -> Result<ToolCallContent, ToolSourceError> {
    if let Some(err) = msg.error {
        return Err(ToolSourceError::JsonRpc(err.message));
    }
    let result = msg
        .result
        .ok_or_else(|| ToolSourceError::Transport("no result in tools/call response".into()))?;
    if result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let message = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|b| b.get("text").and_then(Value::as_str))
            .unwrap_or("tool returned error")
            .to_string();
        return Err(ToolSourceError::JsonRpc(message));
    }
    let mut parts = Vec::new();
    if let Some(content) = result.get("content").and_then(Value::as_array) {
        for block in content {
            if block.get("type").and_then(Value::as_str) == Some("text") {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    parts.push(t);
                }
            }
        }
    }
    let mut text = parts.join("\n").trim().to_string();
    if text.is_empty() {
        if let Some(structured) = result.get("structuredContent") {
            text = structured.to_string();
        }
    }
    if text.is_empty() {
        return Err(ToolSourceError::Transport(
            "no text or structuredContent in tools/call response".into(),
        ));
    }
    Ok(ToolCallContent { text })
}

#[async_trait]
impl ToolSource for McpToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolSourceError> {
        let msg = self
            .request(
                "foreman-tools-list",
                "tools/list",
                Value::Object(Default::default()),
            )
            .await?;
        parse_list_tools(msg)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, ToolSourceError> {
        let id = format!("foreman-call-{name}");
        let params = serde_json::json!({"name": name, "arguments": arguments});
        let msg = self.request(&id, "tools/call", params).await?;
        parse_call_tool(msg)
    }
}
