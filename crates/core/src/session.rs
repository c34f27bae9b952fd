//! The abstraction over a connected tool server.
//!
//! A session wraps one external server process that exposes tools over a
//! JSON-RPC handshake. The catalog and the chat loop talk to sessions only
//! through this trait, so tests can substitute scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::{InvocationError, SessionError};
use crate::provider::ToolDefinition;

/// Lifecycle state of a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, process not yet started
    Uninitialized,
    /// Handshake in flight
    Initializing,
    /// Handshake done, tools may be invoked
    Ready,
    /// Startup or handshake failed; terminal
    Failed,
    /// Shut down; terminal
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// A tool as advertised by a server during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The name the server declared
    pub name: String,

    /// Human-readable description (sent to the LLM verbatim)
    #[serde(default)]
    pub description: String,

    /// JSON Schema for the tool's arguments
    pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
    /// Convert into a ToolDefinition for the provider, under the given
    /// exposed name (which may be server-qualified).
    pub fn to_definition(&self, exposed_name: &str) -> ToolDefinition {
        ToolDefinition {
            name: exposed_name.to_string(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// The result of invoking a tool on a server.
///
/// A failed outcome is still an outcome: the server answered, but flagged
/// the result as an error. The text is fed back to the model either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationOutcome {
    /// Concatenated text content blocks from the server's reply
    pub text: String,

    /// Whether the server flagged this result as an error
    pub is_error: bool,
}

impl InvocationOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: true }
    }
}

/// A live (or attempted) connection to one tool server.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// The configured name of this server (the config key).
    fn server_name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Start the server process, perform the handshake, and fetch the
    /// advertised tools. Valid only from `Uninitialized`.
    async fn initialize(&self) -> std::result::Result<Vec<ToolDescriptor>, SessionError>;

    /// Invoke a tool by its server-declared name. Valid only in `Ready`.
    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<InvocationOutcome, InvocationError>;

    /// Shut the session down. Idempotent.
    async fn close(&self);
}
