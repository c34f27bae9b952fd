//! MCP client implementation for mcpchat.
//!
//! Each configured tool server runs as a child process speaking JSON-RPC 2.0
//! over stdio. This crate provides:
//! - `wire`: JSON-RPC and MCP protocol message types
//! - `transport`: line-delimited stdio framing against a child process
//! - `session`: per-server lifecycle (spawn → handshake → ready → closed)
//! - `catalog`: the aggregated, collision-free tool catalog across servers

pub mod wire;
pub mod transport;
pub mod session;
pub mod catalog;

pub use catalog::{BuildReport, CapabilityCatalog};
pub use session::ServerSession;
pub use transport::StdioTransport;
