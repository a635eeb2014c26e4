//! Reasoning Provider Strategy
//!
//! Defines a common interface for the reasoning collaborator (the LLM backend).
//! The orchestrator works exclusively through this trait, so any provider that
//! maps messages to a completion can drive the loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Configuration for a reasoning step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Response from a reasoning step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,
}

/// Strategy trait for reasoning providers
///
/// The provider is a black box: conversation in, next assistant message out.
/// Tool-call requests travel inside the completion text as fenced blocks
/// (see [`crate::tool::parse_tool_calls`]).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate the next assistant message from the conversation so far
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.max_tokens, 2048);
        assert_eq!(opts.model, "gpt-4o-mini");
    }
}
