//! HTTP server providing an OpenAI-compatible API.
//!
//! - [`openai_api`]: Request/response types and route handlers
//! - [`streaming`]: SSE delivery of streaming completions
//! - [`error`]: Client-visible error taxonomy and envelope
//! - [`metrics`]: Prometheus counters and exposition

pub mod error;
pub mod metrics;
pub mod openai_api;
pub mod streaming;
