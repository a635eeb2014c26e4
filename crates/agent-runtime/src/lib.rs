//! # agent-runtime
//!
//! HTTP collaborator clients for desk-agent:
//!
//! - **IssuerClient / JwksKeySource**: the token issuer's issuance and
//!   key endpoints, feeding the token cache and the verifiers.
//! - **HttpToolInvoker**: tool discovery and authenticated invocation
//!   across the configured tool servers, with retry/outcome
//!   classification.
//! - **OpenAiProvider**: `LlmProvider` against the OpenAI-compatible
//!   chat-completions API.

pub mod invoker;
pub mod issuer_client;
pub mod openai;

pub use invoker::{HttpToolInvoker, ToolServerConfig};
pub use issuer_client::{IssuerClient, IssuerClientConfig, JwksKeySource, TokenRequest};
pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use agent_core::{
    AgentConfig, AgentError, LlmProvider, Message, Orchestrator, RateLimiter, Result, Role,
    ToolInvoker,
};
