//! Agent Runtime - LLM tool-calling orchestration for scopecraft
//!
//! This crate is the "brain" of the scopecraft system - the bounded agentic
//! loop that:
//! - Drives a multi-turn exchange with a chat-completion provider (`llm`)
//! - Exposes a fixed, guarded catalog of domain tools (`registry`, `tools`)
//! - Enforces workflow, stage and rate-limit guardrails (`guardrails`)
//! - Executes tool calls with contained side effects (`executor`,
//!   `side_effects`)
//! - Returns a transcript plus a should-refresh signal (`runtime`)
//!
//! # Architecture
//!
//! The loop is deliberately constrained:
//! 1. **Windowing** (`history`) - Trim history without orphaning tool replies
//! 2. **Completion** (`llm`) - One provider call with the workflow's tools
//! 3. **Guardrails** (`guardrails`) - Allowlist, stage gate, mutation throttle
//! 4. **Execution** (`executor`) - Sequential tool calls, isolated side effects
//! 5. **Termination** - Turn budget, all-blocked turns, or a final answer
//!
//! # Safety Principle
//!
//! The LLM never bypasses the guardrails: every tool call it emits passes
//! the same checks, and a refused call becomes a visible transcript entry
//! rather than an exception.

pub mod conversation;
pub mod executor;
pub mod guardrails;
pub mod history;
pub mod llm;
pub mod prompts;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod side_effects;
pub mod tools;

pub use conversation::{Message, MessageRole, ToolCallRequest, ToolStatus, ToolStatusMeta};
pub use executor::{ExecutionSummary, ToolExecution, ToolExecutor};
pub use guardrails::{
    allowed_tools, workflow_tools, GuardrailDecision, GuardrailEngine, MutationThrottle,
    ThrottleSettings, ThrottleVerdict,
};
pub use llm::{
    ChatClient, Completion, CompletionRequest, HttpChatClient, LlmError, ProviderTool,
    ResponseFormat, RetryPolicy, ToolChoice,
};
pub use registry::{
    ContextDefault, RegistryError, ToolDefinition, ToolHandler, ToolHandlerError, ToolName,
    ToolOptions, ToolOutput, ToolRegistry,
};
pub use runtime::{AgentRequest, AgentResponse, AgentRuntime, RuntimeConfig};
pub use side_effects::{SideEffect, SideEffectError, SideEffectOutcome, SideEffectRegistry};
