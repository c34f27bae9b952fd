//! LLM Provider implementations for mcpchat.
//!
//! All providers implement the `mcpchat_core::Provider` trait.
//! The chat loop only ever sees the trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
