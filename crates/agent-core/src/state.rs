//! Conversation State
//!
//! Per-request bookkeeping for the orchestrator: the message sequence, the
//! tool-call counter, and the immutable invocation records. Created per
//! request and discarded afterward; nothing here persists across requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Conversation;
use crate::tool::{ToolCall, ToolResult};

/// Outcome of one tool invocation, as recorded
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Success { output: String },
    Failure { message: String },
}

/// Record of one tool invocation; immutable once appended
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    /// Tool name
    pub tool: String,

    /// Arguments as sent
    pub arguments: serde_json::Map<String, Value>,

    /// Result or failure
    #[serde(flatten)]
    pub outcome: InvocationOutcome,

    /// When the invocation completed
    pub timestamp: DateTime<Utc>,
}

impl ToolInvocationRecord {
    pub fn from_result(call: &ToolCall, result: &ToolResult) -> Self {
        let outcome = if result.success {
            InvocationOutcome::Success {
                output: result.output.clone(),
            }
        } else {
            InvocationOutcome::Failure {
                message: result.output.clone(),
            }
        };

        Self {
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
            outcome,
            timestamp: Utc::now(),
        }
    }
}

/// State of one conversation run
#[derive(Clone, Debug)]
pub struct ConversationState {
    /// Ordered message sequence
    pub conversation: Conversation,

    /// Tool calls executed so far
    tool_calls_used: u32,

    /// When the run started
    started_at: DateTime<Utc>,

    /// Invocation records, in execution order
    records: Vec<ToolInvocationRecord>,
}

impl ConversationState {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            tool_calls_used: 0,
            started_at: Utc::now(),
            records: Vec::new(),
        }
    }

    /// Tool calls executed so far
    pub fn tool_calls_used(&self) -> u32 {
        self.tool_calls_used
    }

    /// Whether executing one more call would exceed the budget
    pub fn would_exceed_budget(&self, budget: u32) -> bool {
        self.tool_calls_used + 1 > budget
    }

    /// Count a call against the budget. Call before execution.
    pub fn count_tool_call(&mut self) {
        self.tool_calls_used += 1;
    }

    /// Append an invocation record
    pub fn append_record(&mut self, record: ToolInvocationRecord) {
        self.records.push(record);
    }

    /// Invocation records so far
    pub fn records(&self) -> &[ToolInvocationRecord] {
        &self.records
    }

    /// Cumulative elapsed time for this run
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_budget_boundary() {
        let mut state = ConversationState::new(Conversation::new());
        let budget = 2;

        assert!(!state.would_exceed_budget(budget));
        state.count_tool_call();
        assert!(!state.would_exceed_budget(budget));
        state.count_tool_call();
        assert!(state.would_exceed_budget(budget));
        assert_eq!(state.tool_calls_used(), 2);
    }

    #[test]
    fn test_record_append_order() {
        let mut state = ConversationState::new(Conversation::with_system_prompt("s"));
        state.conversation.push(Message::user("hi"));

        let call = ToolCall {
            name: "whoami".into(),
            arguments: serde_json::Map::new(),
            id: None,
        };
        state.append_record(ToolInvocationRecord::from_result(
            &call,
            &ToolResult::success("whoami", "admin"),
        ));
        state.append_record(ToolInvocationRecord::from_result(
            &call,
            &ToolResult::failure("whoami", "boom"),
        ));

        assert_eq!(state.records().len(), 2);
        assert!(matches!(
            state.records()[0].outcome,
            InvocationOutcome::Success { .. }
        ));
        assert!(matches!(
            state.records()[1].outcome,
            InvocationOutcome::Failure { .. }
        ));
    }
}
