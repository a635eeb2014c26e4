//! Orchestrator
//!
//! The state machine driving one conversation:
//! `Start → Reasoning → {ToolRequested → ToolExecuting → Reasoning}* → Final → Done`,
//! with `Aborted` reachable from any state on an unrecoverable internal error.
//!
//! Each reasoning step is gated by the shared [`RateLimiter`] (the sole
//! suspension point in the loop). Tool-call batches execute sequentially;
//! once the budget trips, the remaining calls of the batch are not executed
//! and the loop forces a final best-effort answer — a controlled outcome,
//! distinct from an abort.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::ratelimit::RateLimiter;
use crate::state::{ConversationState, ToolInvocationRecord};
use crate::stream::{AgentEvent, EventSink, ToolCallAnnouncement};
use crate::tool::{ToolInvoker, parse_tool_calls, strip_tool_blocks, toolset_prompt_section};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a support-desk assistant. \
You can search product documentation, manage support tickets, and look up \
organization directory information through the available tools. \
Use a tool whenever it can provide information you do not have. \
After receiving tool results, synthesize them into a helpful response. \
If a tool reports that you lack permission, explain the limitation instead of retrying.";

const FALLBACK_FINAL: &str = "I processed your request.";

/// Observable orchestrator state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    Start,
    Reasoning,
    ToolRequested,
    ToolExecuting,
    Final,
    Done,
    Aborted,
}

impl AgentState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition(self, next: AgentState) -> bool {
        if next == AgentState::Aborted {
            return self != AgentState::Done;
        }
        matches!(
            (self, next),
            (AgentState::Start, AgentState::Reasoning)
                | (AgentState::Reasoning, AgentState::ToolRequested)
                | (AgentState::Reasoning, AgentState::Final)
                | (AgentState::ToolRequested, AgentState::ToolExecuting)
                | (AgentState::ToolRequested, AgentState::Reasoning)
                | (AgentState::ToolExecuting, AgentState::ToolRequested)
                | (AgentState::ToolExecuting, AgentState::Reasoning)
                | (AgentState::Final, AgentState::Done)
        )
    }
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Maximum tool calls per conversation
    pub tool_call_budget: u32,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to the system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            tool_call_budget: 15,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
        }
    }
}

/// Cooperative cancellation handle.
///
/// Cancelling stops scheduling further reasoning cycles; a tool call already
/// dispatched runs to completion.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of one completed run
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Final answer text
    pub content: String,

    /// Tool calls executed
    pub tool_calls_used: u32,

    /// Invocation records, in execution order
    pub records: Vec<ToolInvocationRecord>,

    /// Whether the budget forced the final answer
    pub forced_final: bool,

    /// Whether the run was canceled before completing
    pub canceled: bool,

    /// Wall-clock duration of the run
    pub elapsed: chrono::Duration,
}

/// The orchestrator for one process: shared provider, invoker and limiter,
/// driving independent conversations concurrently.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    invoker: Arc<dyn ToolInvoker>,
    limiter: Arc<RateLimiter>,
    config: AgentConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        invoker: Arc<dyn ToolInvoker>,
        limiter: Arc<RateLimiter>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            invoker,
            limiter,
            config,
        }
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one conversation, emitting events into `events`.
    pub async fn run(&self, history: Vec<Message>, events: EventSink) -> Result<RunSummary> {
        self.run_with_cancel(history, events, CancelHandle::new())
            .await
    }

    /// Run one conversation with a cancellation handle.
    pub async fn run_with_cancel(
        &self,
        history: Vec<Message>,
        mut events: EventSink,
        cancel: CancelHandle,
    ) -> Result<RunSummary> {
        let mut fsm = AgentState::Start;

        let toolset = match self.invoker.discover().await {
            Ok(toolset) => toolset,
            Err(e) => {
                let message = format!("tool discovery failed: {}", e);
                tracing::error!(error = %e, "Aborting conversation before start");
                events.send(AgentEvent::Error { error: message.clone() }).await;
                return Err(AgentError::Discovery(message));
            }
        };

        let mut system_prompt = self.config.system_prompt.clone();
        if self.config.inject_tool_descriptions && !toolset.is_empty() {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&toolset_prompt_section(&toolset));
        }

        let mut state =
            ConversationState::new(Conversation::from_history(system_prompt, history));
        let mut forced_final = false;

        loop {
            self.transition(&mut fsm, AgentState::Reasoning)?;

            if cancel.is_canceled() || events.is_abandoned() {
                tracing::info!("Conversation canceled; closing stream");
                self.transition(&mut fsm, AgentState::Final)?;
                events.done().await;
                self.transition(&mut fsm, AgentState::Done)?;
                return Ok(self.summary(&state, String::new(), forced_final, true));
            }

            // The sole suspension point of the loop.
            self.limiter.acquire().await;

            let completion = match self
                .provider
                .complete(state.conversation.messages(), &self.config.generation)
                .await
            {
                Ok(completion) => completion,
                Err(e) => {
                    tracing::error!(error = %e, "Reasoning step failed; aborting");
                    fsm = AgentState::Aborted;
                    events.error(e.user_message()).await;
                    return Err(e);
                }
            };

            let content = completion.content;
            state.conversation.push(Message::assistant(&content));

            let calls = parse_tool_calls(&content);

            if forced_final || calls.is_empty() {
                let text = if calls.is_empty() {
                    content
                } else {
                    // the provider ignored the forced-final instruction;
                    // keep its prose and drop the tool requests
                    strip_tool_blocks(&content)
                };
                let text = if text.trim().is_empty() {
                    FALLBACK_FINAL.to_string()
                } else {
                    text
                };

                self.transition(&mut fsm, AgentState::Final)?;
                events.send(AgentEvent::Content { content: text.clone() }).await;
                events.done().await;
                self.transition(&mut fsm, AgentState::Done)?;
                return Ok(self.summary(&state, text, forced_final, false));
            }

            // prose accompanying the tool requests streams out right away
            let prose = strip_tool_blocks(&content);
            if !prose.is_empty() {
                events.send(AgentEvent::Content { content: prose }).await;
            }

            self.transition(&mut fsm, AgentState::ToolRequested)?;

            let batch_len = calls.len();
            for (index, call) in calls.iter().enumerate() {
                if state.would_exceed_budget(self.config.tool_call_budget) {
                    tracing::info!(
                        budget = self.config.tool_call_budget,
                        dropped = batch_len - index,
                        "Tool call budget exhausted; forcing final answer"
                    );
                    state.conversation.push(Message::system(format!(
                        "Tool call budget exhausted ({} calls used). Do not request \
                         any further tools. Produce your best final answer from the \
                         information gathered so far.",
                        state.tool_calls_used()
                    )));
                    forced_final = true;
                    break;
                }

                events
                    .send(AgentEvent::ToolCall {
                        tool_call: ToolCallAnnouncement {
                            id: call.id.clone().unwrap_or_default(),
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        },
                    })
                    .await;

                state.count_tool_call();
                self.transition(&mut fsm, AgentState::ToolExecuting)?;

                tracing::debug!(tool = %call.name, "Executing tool");
                let result = match self.invoker.invoke(call).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(tool = %call.name, error = %e, "Invoker fault; aborting");
                        fsm = AgentState::Aborted;
                        events.error(e.user_message()).await;
                        return Err(e);
                    }
                };

                state.append_record(ToolInvocationRecord::from_result(call, &result));
                state
                    .conversation
                    .push(Message::tool(result.as_message_text(), call.id.clone()));

                if index + 1 < batch_len {
                    self.transition(&mut fsm, AgentState::ToolRequested)?;
                }
            }
        }
    }

    fn transition(&self, fsm: &mut AgentState, next: AgentState) -> Result<()> {
        if !fsm.can_transition(next) {
            let message = format!("illegal transition {:?} -> {:?}", fsm, next);
            *fsm = AgentState::Aborted;
            return Err(AgentError::Fatal(message));
        }
        tracing::trace!(from = ?*fsm, to = ?next, "State transition");
        *fsm = next;
        Ok(())
    }

    fn summary(
        &self,
        state: &ConversationState,
        content: String,
        forced_final: bool,
        canceled: bool,
    ) -> RunSummary {
        RunSummary {
            content,
            tool_calls_used: state.tool_calls_used(),
            records: state.records().to_vec(),
            forced_final,
            canceled,
            elapsed: state.elapsed(),
        }
    }
}

/// Builder for the orchestrator
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    invoker: Option<Arc<dyn ToolInvoker>>,
    limiter: Option<Arc<RateLimiter>>,
    config: AgentConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            invoker: None,
            limiter: None,
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn tool_call_budget(mut self, budget: u32) -> Self {
        self.config.tool_call_budget = budget;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        let invoker = self
            .invoker
            .ok_or_else(|| AgentError::Config("Invoker is required".into()))?;
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(10, 2.0)));

        Ok(Orchestrator::new(provider, invoker, limiter, self.config))
    }
}
