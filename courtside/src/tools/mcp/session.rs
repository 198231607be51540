//! MCP session: stdio transport with the initialize handshake
//!
//! Spawns the server process and speaks line-delimited JSON-RPC 2.0 over its
//! stdin/stdout. Only the tools surface is used.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// Protocol version sent in `initialize`
pub const PROTOCOL_VERSION: &str = "2025-11-25";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server closed the connection")]
    Closed,

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Initialize failed: {0}")]
    Initialize(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One live MCP server process
pub struct McpSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    timeout: Duration,
}

impl McpSession {
    /// Spawn the server and complete the handshake
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        debug!(%command, ?args, "McpSession::spawn: called");
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(McpError::Closed)?;
        let stdout = child.stdout.take().ok_or(McpError::Closed)?;

        let mut session = Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_id: 1,
            timeout,
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        debug!("McpSession::initialize: called");
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "roots": { "listChanged": false } },
            "clientInfo": {
                "name": "courtside",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        match self.request("initialize", params).await {
            Ok(_) => {}
            Err(McpError::Rpc { message, .. }) => return Err(McpError::Initialize(message)),
            Err(McpError::Timeout(..)) => return Err(McpError::Initialize("timeout waiting for initialize".into())),
            Err(e) => return Err(e),
        }
        self.notify("notifications/initialized", json!({})).await
    }

    /// Send a request and wait for its result
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id;
        self.next_id += 1;
        debug!(%method, id, "McpSession::request: called");

        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.wait_for(id))
            .await
            .map_err(|_| McpError::Timeout(timeout, method.to_string()))?
    }

    /// Send a notification (no response expected)
    pub async fn notify(&mut self, method: &str, params: Value) -> Result<(), McpError> {
        debug!(%method, "McpSession::notify: called");
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await
    }

    async fn send(&mut self, message: &Value) -> Result<(), McpError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read messages until the response to `id` arrives
    ///
    /// Answers server-initiated `roots/list` with empty roots. Stale responses
    /// and notifications are skipped.
    async fn wait_for(&mut self, id: u64) -> Result<Value, McpError> {
        let expected = json!(id);
        loop {
            let line = self.lines.next_line().await?.ok_or(McpError::Closed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "McpSession::wait_for: skipping non-JSON line");
                    continue;
                }
            };

            if let Some(method) = message.get("method").and_then(Value::as_str) {
                if let Some(request_id) = message.get("id") {
                    self.answer_server_request(method, request_id.clone()).await?;
                }
                continue;
            }

            if message.get("id") != Some(&expected) {
                debug!(?message, "McpSession::wait_for: skipping unrelated message");
                continue;
            }

            if let Some(error) = message.get("error") {
                return Err(McpError::Rpc {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    async fn answer_server_request(&mut self, method: &str, id: Value) -> Result<(), McpError> {
        debug!(%method, "McpSession::answer_server_request: called");
        let reply = if method == "roots/list" {
            json!({ "jsonrpc": "2.0", "id": id, "result": { "roots": [] } })
        } else {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {}", method) }
            })
        };
        self.send(&reply).await
    }

    /// Stop the server process
    pub async fn shutdown(mut self) {
        debug!("McpSession::shutdown: called");
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "McpSession::shutdown: kill failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Write a fake stdio server script; the TempDir must outlive the session
    pub(crate) fn write_python_server(script: &str) -> (TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake_mcp_server.py");
        std::fs::write(&path, script).unwrap();
        let path = path.to_string_lossy().to_string();
        (dir, path)
    }

    const ECHO_SERVER: &str = r#"
import json, sys

for raw in sys.stdin:
    raw = raw.strip()
    if not raw:
        continue
    msg = json.loads(raw)
    method = msg.get("method")
    if "id" not in msg:
        continue
    if method == "initialize":
        print(json.dumps({"jsonrpc":"2.0","id":"roots-1","method":"roots/list","params":{}}), flush=True)
        print(json.dumps({"jsonrpc":"2.0","id":msg["id"],"result":{"protocolVersion":"2025-11-25","capabilities":{"tools":{}}}}), flush=True)
    elif method == "echo":
        print(json.dumps({"jsonrpc":"2.0","method":"notifications/message","params":{}}), flush=True)
        print(json.dumps({"jsonrpc":"2.0","id":9999,"result":{"stale":True}}), flush=True)
        print(json.dumps({"jsonrpc":"2.0","id":msg["id"],"result":msg["params"]}), flush=True)
    elif method == "fail":
        print(json.dumps({"jsonrpc":"2.0","id":msg["id"],"error":{"code":-32000,"message":"nope"}}), flush=True)
"#;

    async fn spawn(script: &str, timeout: Duration) -> Result<(TempDir, McpSession), McpError> {
        let (dir, path) = write_python_server(script);
        let session = McpSession::spawn("python3", &[path], &BTreeMap::new(), timeout).await?;
        Ok((dir, session))
    }

    #[tokio::test]
    async fn test_request_skips_noise_and_matches_id() {
        let (_dir, mut session) = spawn(ECHO_SERVER, Duration::from_secs(5)).await.unwrap();
        let result = session.request("echo", json!({"hello": "world"})).await.unwrap();
        assert_eq!(result, json!({"hello": "world"}));

        let result = session.request("echo", json!({"n": 2})).await.unwrap();
        assert_eq!(result["n"], 2);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let (_dir, mut session) = spawn(ECHO_SERVER, Duration::from_secs(5)).await.unwrap();
        let err = session.request("fail", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32000, ref message } if message == "nope"));
    }

    #[tokio::test]
    async fn test_request_times_out_without_reply() {
        let (_dir, mut session) = spawn(ECHO_SERVER, Duration::from_millis(200)).await.unwrap();
        let err = session.request("no_reply", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout(_, ref method) if method == "no_reply"));
    }

    #[tokio::test]
    async fn test_initialize_error() {
        let script = r#"
import json, sys

for raw in sys.stdin:
    msg = json.loads(raw)
    if msg.get("method") == "initialize":
        print(json.dumps({"jsonrpc":"2.0","id":msg["id"],"error":{"code":-32000,"message":"init failed"}}), flush=True)
"#;
        let err = spawn(script, Duration::from_secs(5)).await.err().unwrap();
        assert!(matches!(err, McpError::Initialize(ref msg) if msg == "init failed"));
    }

    #[tokio::test]
    async fn test_spawn_missing_command() {
        let err = McpSession::spawn(
            "_nonexistent_command_that_does_not_exist_xyz_",
            &[],
            &BTreeMap::new(),
            Duration::from_secs(1),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, McpError::Spawn { .. }));
    }
}
