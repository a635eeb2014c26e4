//! # agent-core
//!
//! Core logic for the authenticated tool-orchestration agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Orchestrator (FSM)                      │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ RateLimiter │──│  LlmProvider │──│    ToolInvoker     │  │
//! │  │ (shared)    │  │  (reasoning) │  │ (auth'd tool call) │  │
//! │  └─────────────┘  └──────────────┘  └────────────────────┘  │
//! │                 events → Streaming Channel                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` and `ToolInvoker` traits are the seams toward the
//! reasoning collaborator and the tool servers; the orchestrator drives one
//! conversation per call and never shares state across conversations beyond
//! the rate limiter.

pub mod error;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod ratelimit;
pub mod state;
pub mod stream;
pub mod tool;

pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use orchestrator::{AgentConfig, AgentState, CancelHandle, Orchestrator, RunSummary};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use ratelimit::RateLimiter;
pub use state::{ConversationState, InvocationOutcome, ToolInvocationRecord};
pub use stream::{AgentEvent, EventSink, ToolCallAnnouncement};
pub use tool::{ParameterSchema, ToolCall, ToolDescriptor, ToolInvoker, ToolResult};
