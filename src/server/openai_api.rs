//! OpenAI-compatible HTTP API.
//!
//! Implements the surface relay clients expect:
//! - POST /v1/chat/completions (streaming and non-streaming)
//! - GET /v1/models
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::cli::ClaudeCli;
use crate::backend::prompt::render_prompt;
use crate::config::Config;
use crate::server::error::{ErrorBody, RelayError};
use crate::server::metrics;
use crate::server::streaming::completion_chunk_stream;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,

    /// `None` when the CLI binary was not found at startup; the relay keeps
    /// serving and reports itself degraded.
    pub backend: Option<ClaudeCli>,

    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat completion request (OpenAI-compatible).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    // Accepted for OpenAI-client compatibility; the CLI backend has no
    // sampling controls, so these are ignored.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stop: Option<StopSequence>,

    #[serde(default)]
    pub stream: bool,
}

/// A single conversation turn. Only the three roles below exist on the wire;
/// anything else fails deserialization and surfaces as an invalid request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

/// OpenAI allows `stop` as a bare string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    One(String),
    Many(Vec<String>),
}

/// Chat completion response (non-streaming).
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: String,
}

/// Token accounting. The CLI reports none, so every field is zero.
#[derive(Debug, Default, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Model listing response.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub cli_available: bool,
    pub uptime_secs: u64,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let result = handle_chat_completion(&state, payload).await;
    metrics::record_request("chat_completions", result.as_ref().err());
    if let Err(error) = &result {
        warn!(error = %error, "Chat completion rejected");
    }
    result
}

async fn handle_chat_completion(
    state: &AppState,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, RelayError> {
    let Json(request) =
        payload.map_err(|rejection| RelayError::InvalidRequest(rejection.body_text()))?;
    validate(&request)?;

    let resolved = state
        .config
        .models
        .resolve(&request.model)
        .ok_or_else(|| RelayError::UnknownModel(request.model.clone()))?
        .to_string();
    let backend = state.backend.as_ref().ok_or(RelayError::BackendUnavailable)?;

    let id = format!("chatcmpl-{}", Uuid::new_v4());
    let created = unix_now();

    info!(
        id = %id,
        model = %request.model,
        resolved = %resolved,
        messages = request.messages.len(),
        stream = request.stream,
        "Chat completion request"
    );

    let prompt = render_prompt(&request.messages);

    if request.stream {
        let rx = backend.stream(prompt, &resolved)?;
        let stream = completion_chunk_stream(rx, id, request.model, created);
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    let content = backend.complete(&prompt, &resolved).await?;
    info!(id = %id, bytes = content.len(), "Completion finished");

    let response = ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model: request.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::Assistant { content },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::default(),
    };
    Ok(Json(response).into_response())
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    metrics::record_request("models", None);
    let created = unix_now();
    let data = state
        .config
        .models
        .canonical_models()
        .into_iter()
        .map(|id| ModelInfo {
            id,
            object: "model".to_string(),
            created,
            owned_by: "anthropic".to_string(),
        })
        .collect();

    Json(ModelList {
        object: "list".to_string(),
        data,
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    metrics::record_request("health", None);
    let cli_available = state.backend.is_some();

    Json(HealthResponse {
        status: if cli_available { "ok" } else { "degraded" }.to_string(),
        cli_available,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Envelope-shaped 404 so unknown routes fail the same way bad requests do.
async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("not found", "not_found")),
    )
        .into_response()
}

fn validate(request: &ChatCompletionRequest) -> Result<(), RelayError> {
    if request.messages.is_empty() {
        return Err(RelayError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roles_round_trip() {
        let message: ChatMessage =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert!(matches!(message, ChatMessage::User { ref content } if content == "hi"));

        let out = serde_json::to_value(&ChatMessage::Assistant {
            content: "hello".to_string(),
        })
        .unwrap();
        assert_eq!(
            out,
            serde_json::json!({"role": "assistant", "content": "hello"})
        );
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_content_rejected() {
        let result =
            serde_json::from_str::<ChatMessage>(r#"{"role":"user","content":[{"type":"text"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_minimal_request_parses() {
        let request: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"sonnet","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(request.model, "sonnet");
        assert!(!request.stream);
        assert!(request.temperature.is_none());
    }

    #[test]
    fn test_tuning_fields_and_extras_accepted() {
        let request: ChatCompletionRequest = serde_json::from_str(
            r#"{
                "model": "opus",
                "messages": [{"role":"user","content":"hi","name":"bob"}],
                "temperature": 0.2,
                "max_tokens": 100,
                "top_p": 0.9,
                "stop": "END",
                "stream": true,
                "user": "abc-123"
            }"#,
        )
        .unwrap();
        assert!(request.stream);
        assert_eq!(request.max_tokens, Some(100));
        assert!(matches!(request.stop, Some(StopSequence::One(ref s)) if s == "END"));
    }

    #[test]
    fn test_stop_accepts_a_list() {
        let request: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"sonnet","messages":[{"role":"user","content":"hi"}],"stop":["a","b"]}"#,
        )
        .unwrap();
        assert!(matches!(request.stop, Some(StopSequence::Many(ref v)) if v.len() == 2));
    }

    #[test]
    fn test_empty_messages_fail_validation() {
        let request: ChatCompletionRequest =
            serde_json::from_str(r#"{"model":"sonnet","messages":[]}"#).unwrap();
        assert!(matches!(
            validate(&request),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_response_wire_shape() {
        let response = ChatCompletionResponse {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion".to_string(),
            created: 1700000000,
            model: "sonnet".to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::Assistant {
                    content: "Paris".to_string(),
                },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(value["choices"][0]["message"]["content"], "Paris");
        assert_eq!(value["usage"]["total_tokens"], 0);
    }
}
