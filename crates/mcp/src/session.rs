//! Per-server session lifecycle.
//!
//! A `ServerSession` owns the transport to one tool server process and walks
//! it through the MCP handshake: `initialize` → `notifications/initialized`
//! → `tools/list`. Once ready, `tools/call` requests are dispatched through
//! the same transport, one at a time.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use mcpchat_core::error::{InvocationError, SessionError, TransportError};
use mcpchat_core::session::{InvocationOutcome, SessionState, ToolDescriptor, ToolSession};
use mcpchat_config::ServerConfig;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::transport::StdioTransport;
use crate::wire::{CallToolResult, InitializeResult, ToolsListResult, PROTOCOL_VERSION};

/// A session with one configured tool server.
pub struct ServerSession {
    name: String,
    config: ServerConfig,
    init_timeout: Duration,
    call_timeout: Duration,
    /// The transport exists only between a successful initialize and close.
    /// The async mutex also serializes invocations: one request in flight.
    transport: Mutex<Option<StdioTransport>>,
    state: StdMutex<SessionState>,
}

impl ServerSession {
    pub fn new(
        name: impl Into<String>,
        config: ServerConfig,
        init_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            init_timeout,
            call_timeout,
            transport: Mutex::new(None),
            state: StdMutex::new(SessionState::Uninitialized),
        }
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Handshake + tool discovery against a freshly spawned transport.
    async fn handshake(
        &self,
        transport: &mut StdioTransport,
    ) -> Result<Vec<ToolDescriptor>, SessionError> {
        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcpchat",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let response = transport.request("initialize", Some(init_params)).await?;
        if let Some(err) = response.error {
            return Err(SessionError::Handshake {
                server: self.name.clone(),
                reason: format!("[{}] {}", err.code, err.message),
            });
        }
        let init: InitializeResult = serde_json::from_value(
            response.result.unwrap_or(serde_json::Value::Null),
        )
        .map_err(|e| SessionError::Handshake {
            server: self.name.clone(),
            reason: format!("failed to parse initialize result: {e}"),
        })?;

        if let Some(info) = &init.server_info {
            debug!(
                server = %self.name,
                reported_name = info.name.as_deref().unwrap_or("?"),
                version = info.version.as_deref().unwrap_or("?"),
                "Server identified itself"
            );
        }

        transport.notify("notifications/initialized", None).await?;

        let response = transport.request("tools/list", None).await?;
        if let Some(err) = response.error {
            return Err(SessionError::Handshake {
                server: self.name.clone(),
                reason: format!("tools/list failed: [{}] {}", err.code, err.message),
            });
        }
        let listed: ToolsListResult = serde_json::from_value(
            response.result.unwrap_or(serde_json::Value::Null),
        )
        .map_err(|e| SessionError::Handshake {
            server: self.name.clone(),
            reason: format!("failed to parse tools/list result: {e}"),
        })?;

        Ok(listed
            .tools
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
            })
            .collect())
    }
}

#[async_trait]
impl ToolSession for ServerSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Failed)
    }

    async fn initialize(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        let current = self.state();
        if current != SessionState::Uninitialized {
            return Err(SessionError::InvalidState {
                operation: "initialize".into(),
                state: current.to_string(),
            });
        }
        self.set_state(SessionState::Initializing);

        let mut transport = match StdioTransport::spawn(
            &self.name,
            &self.config.command,
            &self.config.args,
            self.config.env.clone(),
            self.config.cwd.as_deref(),
        ) {
            Ok(t) => t,
            Err(e) => {
                self.set_state(SessionState::Failed);
                return Err(SessionError::InitFailed {
                    server: self.name.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let tools = match tokio::time::timeout(self.init_timeout, self.handshake(&mut transport))
            .await
        {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => {
                self.set_state(SessionState::Failed);
                transport.close().await;
                return Err(e);
            }
            Err(_) => {
                self.set_state(SessionState::Failed);
                let stderr = transport.stderr_tail();
                transport.close().await;
                let mut reason = format!(
                    "handshake timed out after {}s",
                    self.init_timeout.as_secs()
                );
                if let Some(tail) = stderr {
                    reason.push_str(&format!(" | stderr: {tail}"));
                }
                return Err(SessionError::InitFailed {
                    server: self.name.clone(),
                    reason,
                });
            }
        };

        *self.transport.lock().await = Some(transport);
        self.set_state(SessionState::Ready);
        info!(server = %self.name, tools = tools.len(), "Session ready");
        Ok(tools)
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<InvocationOutcome, InvocationError> {
        let current = self.state();
        if current != SessionState::Ready {
            return Err(InvocationError::InvalidState {
                tool: tool.to_string(),
                state: current.to_string(),
            });
        }

        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or_else(|| InvocationError::InvalidState {
            tool: tool.to_string(),
            state: "closed".into(),
        })?;

        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });

        let response =
            match tokio::time::timeout(self.call_timeout, transport.request("tools/call", Some(params)))
                .await
            {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    // The wire is gone; nothing further can be invoked here.
                    if matches!(e, TransportError::ProcessExited { .. } | TransportError::Io(_)) {
                        warn!(server = %self.name, error = %e, "Transport lost, failing session");
                        self.set_state(SessionState::Failed);
                    }
                    return Err(e.into());
                }
                Err(_) => {
                    return Err(InvocationError::Timeout {
                        tool: tool.to_string(),
                        timeout_secs: self.call_timeout.as_secs(),
                    });
                }
            };

        if let Some(err) = response.error {
            return Err(InvocationError::ToolFailed {
                tool: tool.to_string(),
                reason: format!("[{}] {}", err.code, err.message),
            });
        }

        let result: CallToolResult = serde_json::from_value(
            response.result.unwrap_or(serde_json::Value::Null),
        )
        .map_err(|e| InvocationError::MalformedResult {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;

        let text = result.flatten_text();
        if result.is_error {
            Ok(InvocationOutcome::failure(text))
        } else {
            Ok(InvocationOutcome::success(text))
        }
    }

    async fn close(&self) {
        if let Some(mut transport) = self.transport.lock().await.take() {
            transport.close().await;
        }
        self.set_state(SessionState::Closed);
        debug!(server = %self.name, "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(command: &str) -> ServerConfig {
        ServerConfig {
            command: command.into(),
            args: vec![],
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    fn session(command: &str) -> ServerSession {
        ServerSession::new(
            "test",
            config(command),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn new_session_starts_uninitialized() {
        let s = session("true");
        assert_eq!(s.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn bad_command_fails_session() {
        let s = session("/nonexistent/definitely-not-a-binary");
        let err = s.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::InitFailed { .. }));
        assert_eq!(s.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn invoke_before_initialize_is_invalid_state() {
        let s = session("true");
        let err = s
            .invoke("anything", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn initialize_twice_is_invalid_state() {
        let s = session("/nonexistent/definitely-not-a-binary");
        let _ = s.initialize().await;
        // State is now Failed; a second initialize must not respawn.
        let err = s.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let s = session("true");
        s.close().await;
        s.close().await;
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        /// An MCP server stub speaking just enough of the protocol:
        /// initialize, then tools/list with one `echo` tool, then one
        /// tools/call reply.
        fn stub_server() -> (tempfile::TempDir, String) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("server.sh");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(
                file,
                r#"#!/bin/sh
read line
echo '{{"jsonrpc":"2.0","id":1,"result":{{"protocolVersion":"2024-11-05","capabilities":{{}},"serverInfo":{{"name":"stub","version":"0.1"}}}}}}'
read notification
read line
echo '{{"jsonrpc":"2.0","id":2,"result":{{"tools":[{{"name":"echo","description":"Echo text","inputSchema":{{"type":"object","required":["text"]}}}}]}}}}'
read line
echo '{{"jsonrpc":"2.0","id":3,"result":{{"content":[{{"type":"text","text":"echoed"}}],"isError":false}}}}'
read rest"#
            )
            .unwrap();
            let mut perms = file.metadata().unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            (dir, path.to_string_lossy().into_owned())
        }

        #[tokio::test]
        async fn full_lifecycle_against_stub() {
            let (_dir, script) = stub_server();
            let s = session(&script);

            let tools = s.initialize().await.unwrap();
            assert_eq!(s.state(), SessionState::Ready);
            assert_eq!(tools.len(), 1);
            assert_eq!(tools[0].name, "echo");

            let outcome = s
                .invoke("echo", serde_json::json!({"text": "hi"}))
                .await
                .unwrap();
            assert!(!outcome.is_error);
            assert_eq!(outcome.text, "echoed");

            s.close().await;
            assert_eq!(s.state(), SessionState::Closed);

            // Closed sessions reject further invocations.
            let err = s.invoke("echo", serde_json::json!({})).await.unwrap_err();
            assert!(matches!(err, InvocationError::InvalidState { .. }));
        }
    }
}
