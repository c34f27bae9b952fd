//! # mcpchat Core
//!
//! Domain types, traits, and error definitions shared by every mcpchat crate.
//!
//! The seams of the system live here as traits: [`Provider`] for model
//! backends and [`ToolSession`] for tool servers. Concrete implementations
//! live in their own crates and depend inward on this one, which keeps the
//! chat loop testable against stub providers and fake sessions.

pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role, Conversation, ConversationId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use session::{InvocationOutcome, SessionState, ToolDescriptor, ToolSession};
pub use event::{DomainEvent, EventBus};
