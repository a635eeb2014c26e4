//! Chat API Handlers
//!
//! The orchestrator entry point: a non-streaming endpoint returning the
//! final answer plus the tool calls made, and a streaming endpoint
//! delivering the conversation's event stream over SSE.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use agent_core::{EventSink, Message, Role};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ToolCallSummary {
    pub name: String,
    pub args: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(rename = "toolCalls")]
    pub tool_calls: Vec<ToolCallSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider_connected: bool,
}

fn to_history(messages: Vec<ChatMessage>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|m| {
            let role = match m.role.as_str() {
                "system" => Role::System,
                "assistant" => Role::Assistant,
                _ => Role::User,
            };
            Message::new(role, m.content)
        })
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider_connected,
    })
}

/// Non-streaming chat endpoint
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let history = to_history(payload.messages);

    // events are collected into the summary; the sink just buffers them
    let (sink, _rx) = EventSink::channel(512);

    let summary = state.orchestrator.run(history, sink).await.map_err(|e| {
        tracing::error!("Agent error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.user_message(),
                code: "AGENT_ERROR".into(),
            }),
        )
    })?;

    let tool_calls = summary
        .records
        .iter()
        .map(|r| ToolCallSummary {
            name: r.tool.clone(),
            args: r.arguments.clone(),
        })
        .collect();

    Ok(Json(ChatResponse {
        content: summary.content,
        tool_calls,
    }))
}

/// Streaming chat endpoint (SSE)
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let history = to_history(payload.messages);
    let (sink, rx) = EventSink::channel(32);

    tokio::spawn(async move {
        if let Err(e) = state.orchestrator.run(history, sink).await {
            // the stream already carries an error event; log for operators
            tracing::error!("Streaming agent error: {}", e);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"error","error":"serialization"}"#.into());
        Ok(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
