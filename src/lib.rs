//! claude-relay: OpenAI-compatible chat completions in front of the Claude CLI.
//!
//! Accepts OpenAI-style requests over HTTP, resolves model aliases
//! (`sonnet`, `opus`, `claude-3-haiku`, ...) to models the CLI can serve,
//! and relays generation through a per-request `claude` subprocess: whole
//! responses as JSON, incremental ones as SSE chunk streams terminated by
//! the `[DONE]` sentinel.

pub mod backend;
pub mod config;
pub mod server;
