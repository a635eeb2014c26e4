//! Streaming Channel
//!
//! Ordered event delivery for one conversation. Single producer (the
//! orchestrator); events arrive strictly in generation order, nothing follows
//! `done`, and the channel closes immediately after `done`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Tool-call announcement payload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallAnnouncement {
    pub id: String,
    pub name: String,
    pub args: serde_json::Map<String, Value>,
}

/// Events emitted over one conversation's stream
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Partial generated text
    Content { content: String },

    /// A tool call was requested (emitted before execution completes)
    ToolCall {
        #[serde(rename = "toolCall")]
        tool_call: ToolCallAnnouncement,
    },

    /// Fatal error; the stream closes after this and `done` never follows
    Error { error: String },

    /// Completion marker; always the last event of a successful run
    Done,
}

/// Single-producer event sink for one conversation.
///
/// Enforces the channel contract: after [`EventSink::done`] (or an error
/// event) every further send is dropped, and dropping the sink closes the
/// stream.
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
    closed: bool,
}

impl EventSink {
    /// Create a sink/receiver pair
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx, closed: false }, rx)
    }

    /// Whether the consumer has gone away
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a non-terminal event. Dropped silently once the stream is closed.
    pub async fn send(&mut self, event: AgentEvent) {
        if self.closed {
            return;
        }
        if matches!(event, AgentEvent::Done | AgentEvent::Error { .. }) {
            self.closed = true;
        }
        if self.tx.send(event).await.is_err() {
            // consumer dropped; treat as closed
            self.closed = true;
        }
    }

    /// Emit the `done` event and close the stream
    pub async fn done(mut self) {
        self.send(AgentEvent::Done).await;
        // dropping self closes the channel
    }

    /// Emit a terminal error event and close the stream
    pub async fn error(mut self, message: impl Into<String>) {
        self.send(AgentEvent::Error {
            error: message.into(),
        })
        .await;
    }
}
