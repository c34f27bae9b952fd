//! Error types for the mcpchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all mcpchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Tool invocation errors ---
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    // --- Catalog errors ---
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from the stdio wire to a tool server process.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to spawn server process `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("I/O error on server stdio: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode/decode frame: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Server process exited unexpectedly{}", stderr_tail.as_deref().map(|s| format!(": {s}")).unwrap_or_default())]
    ProcessExited { stderr_tail: Option<String> },
}

/// Errors from the session lifecycle with a single tool server.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Initialization of server `{server}` failed: {reason}")]
    InitFailed { server: String, reason: String },

    #[error("Handshake with server `{server}` returned an error: {reason}")]
    Handshake { server: String, reason: String },

    #[error("Operation `{operation}` invalid in state {state}")]
    InvalidState { operation: String, state: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from invoking a tool on a server.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Tool `{tool}` failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("Invalid arguments for tool `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool `{tool}` timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("Malformed result from tool `{tool}`: {reason}")]
    MalformedResult { tool: String, reason: String },

    #[error("Invocation of `{tool}` invalid in session state {state}")]
    InvalidState { tool: String, state: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from the capability catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}
