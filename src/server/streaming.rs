//! SSE (Server-Sent Events) delivery of streaming completions.
//!
//! Converts a channel of backend StreamEvents into an SSE stream compatible
//! with the OpenAI streaming format. Emission is an explicit state machine so
//! that chunk ordering, the final `finish_reason` chunk, the `[DONE]`
//! sentinel, and truncation on backend failure are each a distinct
//! transition.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::backend::cli::StreamEvent;
use crate::server::metrics::StreamGuard;

/// Out-of-band marker ending a well-formed SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Streaming chat completion chunk (OpenAI-compatible).
#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: usize,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Identity fields stamped on every chunk of one stream.
struct ChunkHead {
    id: String,
    model: String,
    created: u64,
}

impl ChunkHead {
    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }
}

/// One frame on the wire: a JSON chunk or the `[DONE]` sentinel.
#[derive(Debug)]
enum SseFrame {
    Chunk(ChatCompletionChunk),
    Sentinel,
}

/// Emission phases of one stream.
///
/// `Role` opens with the assistant-role chunk, `Relay` forwards backend
/// fragments, `Done` has seen a clean finish and owes the sentinel, and
/// `Closed` is terminal. A backend failure jumps straight from `Relay` to
/// `Closed`, truncating the stream: no sentinel, no finish chunk.
enum Phase {
    Role,
    Relay,
    Done,
    Closed,
}

struct SseState {
    events: ReceiverStream<StreamEvent>,
    head: ChunkHead,
    phase: Phase,
    guard: StreamGuard,
}

/// Convert a backend event receiver into an SSE stream.
///
/// `created` is stamped once per request; chunks of one stream never
/// disagree on identity fields.
pub fn completion_chunk_stream(
    rx: mpsc::Receiver<StreamEvent>,
    id: String,
    model: String,
    created: u64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    frame_stream(rx, ChunkHead { id, model, created }).map(|frame| {
        let data = match frame {
            SseFrame::Chunk(chunk) => serde_json::to_string(&chunk).unwrap_or_default(),
            SseFrame::Sentinel => DONE_SENTINEL.to_string(),
        };
        Ok(Event::default().data(data))
    })
}

fn frame_stream(
    rx: mpsc::Receiver<StreamEvent>,
    head: ChunkHead,
) -> impl Stream<Item = SseFrame> {
    let state = SseState {
        events: ReceiverStream::new(rx),
        head,
        phase: Phase::Role,
        guard: StreamGuard::begin(),
    };

    stream::unfold(state, |mut state| async move {
        match state.phase {
            Phase::Role => {
                state.phase = Phase::Relay;
                let delta = ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: Some(String::new()),
                };
                Some((SseFrame::Chunk(state.head.chunk(delta, None)), state))
            }
            Phase::Relay => match state.events.next().await {
                Some(StreamEvent::Fragment(text)) => {
                    let delta = ChunkDelta {
                        role: None,
                        content: Some(text),
                    };
                    Some((SseFrame::Chunk(state.head.chunk(delta, None)), state))
                }
                Some(StreamEvent::Done) => {
                    state.phase = Phase::Done;
                    Some((
                        SseFrame::Chunk(state.head.chunk(ChunkDelta::default(), Some("stop"))),
                        state,
                    ))
                }
                Some(StreamEvent::Error(message)) => {
                    // Truncate: end the response without a sentinel so the
                    // client sees an interrupted stream, not a complete one.
                    warn!(id = %state.head.id, error = %message, "Backend failed mid-stream, truncating");
                    None
                }
                None => {
                    warn!(id = %state.head.id, "Backend channel closed without completion, truncating");
                    None
                }
            },
            Phase::Done => {
                state.phase = Phase::Closed;
                state.guard.finish();
                Some((SseFrame::Sentinel, state))
            }
            Phase::Closed => None,
        }
    })
}
