//! Claude CLI backend.
//!
//! - [`cli`]: Subprocess wrapper (discovery, invocation, stream parsing)
//! - [`prompt`]: Conversation flattening into CLI prompt text

pub mod cli;
pub mod prompt;
