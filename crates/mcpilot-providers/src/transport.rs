//! Provider transport: how the pool talks to one tool-provider process.
//!
//! The wire format is newline-delimited JSON-RPC 2.0 over the child's
//! stdin/stdout, which is the Model Context Protocol stdio transport.
//! Only three exchanges matter here: the `initialize` handshake,
//! `tools/list`, and `tools/call`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use mcpilot_core::config::ServerConfig;
use mcpilot_core::{Error, Result, ToolDescriptor};

/// MCP protocol revision sent in the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ─────────────────────────────────────────────
// Transport trait
// ─────────────────────────────────────────────

/// The two operations the core needs from a provider, plus teardown.
///
/// Implementations are driven by one caller at a time; the session holds
/// them behind a lock.
#[async_trait]
pub trait ToolTransport: Send {
    /// Complete whatever handshake the transport needs. Default: none.
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Discover the provider's tool catalogue.
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke one tool with already-coerced arguments.
    ///
    /// A provider-reported failure is `Error::ToolExecution`; a dead
    /// connection is `Error::ProviderClosed`.
    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<String>;

    /// Release the connection. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

// ─────────────────────────────────────────────
// JSON-RPC client
// ─────────────────────────────────────────────

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line-oriented JSON-RPC client over any byte stream pair.
pub struct RpcClient {
    provider: String,
    reader: BoxedReader,
    writer: BoxedWriter,
    next_id: u64,
}

impl RpcClient {
    pub fn new<R, W>(provider: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            provider: provider.into(),
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
            next_id: 1,
        }
    }

    /// Send a request and wait for the response with the same id.
    ///
    /// Non-JSON lines and messages for other ids (server notifications,
    /// late replies to abandoned calls) are skipped. A JSON-RPC `error`
    /// object becomes `Error::ToolExecution` labelled with the method.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.send(&message).await?;

        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|_| Error::ProviderClosed(self.provider.clone()))?;
            if read == 0 {
                return Err(Error::ProviderClosed(self.provider.clone()));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let reply: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(_) => {
                    debug!(provider = %self.provider, line = trimmed, "skipping non-JSON output");
                    continue;
                }
            };

            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                debug!(provider = %self.provider, method = ?reply.get("method"), "skipping unrelated message");
                continue;
            }

            if let Some(err) = reply.get("error") {
                let message = err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
                return Err(Error::ToolExecution {
                    provider: self.provider.clone(),
                    tool: method.to_string(),
                    message: format!("{message} (code {code})"),
                });
            }

            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    /// Send a notification (no id, no reply).
    pub async fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.send(&message).await
    }

    async fn send(&mut self, message: &Value) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|_| Error::ProviderClosed(self.provider.clone()))?;
        self.writer
            .flush()
            .await
            .map_err(|_| Error::ProviderClosed(self.provider.clone()))
    }
}

// ─────────────────────────────────────────────
// Wire payloads
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<WireTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    is_error: bool,
}

/// Flatten `tools/call` content into the string handed back to the model.
///
/// One item yields its text; several yield `[a, b, c]`. Non-text items are
/// rendered as JSON.
fn render_content(content: &[Value]) -> String {
    let parts: Vec<String> = content
        .iter()
        .map(|item| match item.get("text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => item.to_string(),
        })
        .collect();

    match parts.as_slice() {
        [single] => single.clone(),
        _ => format!("[{}]", parts.join(", ")),
    }
}

// ─────────────────────────────────────────────
// Stdio / stream transport
// ─────────────────────────────────────────────

/// MCP transport over a child process (or any stream pair, for tests).
pub struct RpcTransport {
    provider: String,
    rpc: RpcClient,
    child: Option<Child>,
}

impl RpcTransport {
    /// Launch the provider process described by `config`.
    ///
    /// `config` should already have its `${VAR}` references resolved.
    /// stderr is inherited so provider diagnostics stay visible.
    pub fn spawn(config: &ServerConfig) -> Result<Self> {
        info!(
            provider = %config.id,
            command = %config.command,
            args = ?config.args,
            "launching tool provider"
        );

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::launch(&config.id, format!("failed to spawn '{}': {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::launch(&config.id, "child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::launch(&config.id, "child stdout unavailable"))?;

        Ok(Self {
            provider: config.id.clone(),
            rpc: RpcClient::new(config.id.clone(), stdout, stdin),
            child: Some(child),
        })
    }

    /// Wrap an existing stream pair (no child process).
    pub fn from_streams<R, W>(provider: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let provider = provider.into();
        Self {
            rpc: RpcClient::new(provider.clone(), reader, writer),
            provider,
            child: None,
        }
    }
}

#[async_trait]
impl ToolTransport for RpcTransport {
    async fn initialize(&mut self) -> Result<()> {
        let result = self
            .rpc
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "mcpilot",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;

        debug!(
            provider = %self.provider,
            server = ?result.get("serverInfo"),
            version = ?result.get("protocolVersion"),
            "handshake complete"
        );

        self.rpc.notify("notifications/initialized", json!({})).await
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let raw = self.rpc.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(raw)?;

            tools.extend(page.tools.into_iter().map(|t| {
                ToolDescriptor::from_schema(&self.provider, t.name, t.description, &t.input_schema)
            }));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<String> {
        let raw = self
            .rpc
            .request(
                "tools/call",
                json!({ "name": name, "arguments": Value::Object(arguments) }),
            )
            .await
            .map_err(|e| match e {
                Error::ToolExecution { provider, message, .. } => Error::ToolExecution {
                    provider,
                    tool: name.to_string(),
                    message,
                },
                other => other,
            })?;

        let result: CallToolResult = serde_json::from_value(raw)?;
        let rendered = render_content(&result.content);

        if result.is_error {
            return Err(Error::ToolExecution {
                provider: self.provider.clone(),
                tool: name.to_string(),
                message: rendered,
            });
        }
        Ok(rendered)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(provider = %self.provider, error = %e, "failed to stop provider process");
            } else {
                info!(provider = %self.provider, "provider process stopped");
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
