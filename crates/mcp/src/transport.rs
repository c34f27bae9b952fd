//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with a tool server child process:
//! - Writing JSON-RPC requests and notifications to stdin
//! - Reading JSON-RPC responses from stdout
//! - Line-delimited JSON protocol (one JSON object per line)
//!
//! Stderr is drained by a background task into a small ring buffer so that
//! process-exit errors can carry the server's last complaints.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use mcpchat_core::error::TransportError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

use crate::wire::{JsonRpcRequest, JsonRpcResponse};

/// How many stderr lines to retain for diagnostics.
const STDERR_RING_CAPACITY: usize = 20;

/// Bi-directional JSON-RPC transport over a child process's stdio.
///
/// Requests take `&mut self`: a transport carries exactly one in-flight
/// request at a time, which is what the line-matched protocol assumes.
#[derive(Debug)]
pub struct StdioTransport {
    server_name: String,
    child: Child,
    writer: ChildStdin,
    reader: BufReader<ChildStdout>,
    stderr_ring: Arc<Mutex<VecDeque<String>>>,
    next_id: u64,
}

impl StdioTransport {
    /// Spawn the server process and wire up its stdio.
    pub fn spawn(
        server_name: &str,
        command: &str,
        args: &[String],
        env: impl IntoIterator<Item = (String, String)>,
        cwd: Option<&str>,
    ) -> Result<Self, TransportError> {
        let mut cmd = Command::new(command);
        cmd.args(args);

        for (key, value) in env {
            cmd.env(key, value);
        }

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| TransportError::Spawn {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let writer = child.stdin.take().ok_or_else(|| TransportError::Spawn {
            command: command.to_string(),
            reason: "failed to capture stdin".into(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| TransportError::Spawn {
            command: command.to_string(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr_ring = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_RING_CAPACITY)));
        if let Some(stderr) = child.stderr.take() {
            let ring = Arc::clone(&stderr_ring);
            let name = server_name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(server = %name, "stderr: {line}");
                    if let Ok(mut ring) = ring.lock() {
                        if ring.len() == STDERR_RING_CAPACITY {
                            ring.pop_front();
                        }
                        ring.push_back(line);
                    }
                }
            });
        }

        debug!(server = %server_name, command = %command, "Spawned tool server process");

        Ok(Self {
            server_name: server_name.to_string(),
            child,
            writer,
            reader: BufReader::new(stdout),
            stderr_ring,
            next_id: 1,
        })
    }

    /// The last few stderr lines the server wrote, joined for diagnostics.
    pub fn stderr_tail(&self) -> Option<String> {
        let ring = self.stderr_ring.lock().ok()?;
        if ring.is_empty() {
            None
        } else {
            Some(ring.iter().cloned().collect::<Vec<_>>().join(" | "))
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Writes one line of JSON, then reads lines until a response with the
    /// matching `id` arrives. Non-JSON lines (server log noise) and stale
    /// responses are skipped.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id;
        self.next_id += 1;

        let req = JsonRpcRequest::new(id, method, params);
        let mut frame = serde_json::to_string(&req)?;
        frame.push('\n');

        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;

        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                return Err(TransportError::ProcessExited {
                    stderr_tail: self.stderr_tail(),
                });
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => {
                    trace!(
                        server = %self.server_name,
                        expected = id,
                        got = resp.id,
                        "Skipping response with stale id"
                    );
                }
                Err(_) => {
                    // Not a JSON-RPC response; some servers log to stdout.
                    trace!(server = %self.server_name, line = %trimmed, "Skipping non-response line");
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no id, no response expected).
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });

        let mut frame = serde_json::to_string(&notification)?;
        frame.push('\n');

        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Kill the child process. Idempotent; kill_on_drop covers the rest.
    pub async fn close(&mut self) {
        let _ = self.child.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[tokio::test]
    async fn spawn_nonexistent_binary_fails() {
        let err = StdioTransport::spawn(
            "ghost",
            "/nonexistent/definitely-not-a-binary",
            &[],
            no_env(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        /// Write a responder shell script and return its path (kept alive by
        /// returning the tempdir alongside).
        fn responder(script_body: &str) -> (tempfile::TempDir, String) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("responder.sh");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh\n{script_body}").unwrap();
            let mut perms = file.metadata().unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            (dir, path.to_string_lossy().into_owned())
        }

        #[tokio::test]
        async fn request_matches_response_by_id() {
            // Replies to the first request with id 1, ignoring input content.
            let (_dir, script) = responder(
                r#"read line
echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'
read rest"#,
            );

            let mut transport =
                StdioTransport::spawn("scripted", &script, &[], Vec::new(), None).unwrap();
            let resp = transport.request("ping", None).await.unwrap();
            assert_eq!(resp.id, 1);
            assert_eq!(resp.result.unwrap()["ok"], true);
        }

        #[tokio::test]
        async fn log_noise_on_stdout_is_skipped() {
            let (_dir, script) = responder(
                r#"read line
echo 'INFO starting up'
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
read rest"#,
            );

            let mut transport =
                StdioTransport::spawn("noisy", &script, &[], Vec::new(), None).unwrap();
            let resp = transport.request("ping", None).await.unwrap();
            assert_eq!(resp.id, 1);
        }

        #[tokio::test]
        async fn eof_reports_process_exit_with_stderr() {
            let (_dir, script) = responder(
                r#"read line
echo 'fatal: missing dependency' >&2
exit 1"#,
            );

            let mut transport =
                StdioTransport::spawn("crasher", &script, &[], Vec::new(), None).unwrap();
            let err = transport.request("ping", None).await.unwrap_err();
            match err {
                TransportError::ProcessExited { stderr_tail } => {
                    // The stderr drain races process exit; when it wins, the
                    // message is included.
                    if let Some(tail) = stderr_tail {
                        assert!(tail.contains("missing dependency"));
                    }
                }
                other => panic!("expected ProcessExited, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn request_ids_are_sequential_per_transport() {
            // Answers two requests with ids 1 and 2.
            let (_dir, script) = responder(
                r#"read line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
read line
echo '{"jsonrpc":"2.0","id":2,"result":{}}'
read rest"#,
            );

            let mut transport =
                StdioTransport::spawn("seq", &script, &[], Vec::new(), None).unwrap();
            assert_eq!(transport.request("a", None).await.unwrap().id, 1);
            assert_eq!(transport.request("b", None).await.unwrap().id, 2);
        }
    }
}
