//! The mcpchat chat loop.
//!
//! Orchestrates the conversation: send the history plus the tool catalog to
//! the model, execute any requested tool calls in order, feed the results
//! back, and repeat until the model answers in plain text or the round
//! budget runs out.

pub mod chat_loop;

pub use chat_loop::ChatLoop;
