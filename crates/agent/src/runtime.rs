use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use scopecraft_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use scopecraft_core::domain::agreement::AgreementId;
use scopecraft_core::domain::project::ProjectId;
use scopecraft_core::domain::service::DomainService;
use scopecraft_core::workflow::{EntityType, ExecutionContext, Workflow};

use crate::conversation::Message;
use crate::executor::{ExecutionSummary, ToolExecutor};
use crate::guardrails::allowed_tools;
use crate::history;
use crate::llm::{ChatClient, CompletionRequest, LlmError, ResponseFormat, ToolChoice};
use crate::prompts;
use crate::registry::ToolName;

/// Inbound request of one orchestrator invocation; conceptually a single
/// RPC from the presentation layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Workflow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResponse {
    pub messages: Vec<Message>,
    pub should_refresh: bool,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub max_turns: usize,
    pub history_window: usize,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_turns: 5, history_window: 30, max_output_tokens: 1_024, temperature: Some(0.2) }
    }
}

/// Top-level driver of the bounded agentic loop. Every failure path still
/// ends with an assistant-role message; nothing escapes as an error.
pub struct AgentRuntime {
    client: Arc<dyn ChatClient>,
    executor: ToolExecutor,
    domain: Arc<dyn DomainService>,
    audit: Arc<dyn AuditSink>,
    config: RuntimeConfig,
}

impl AgentRuntime {
    pub fn new(
        client: Arc<dyn ChatClient>,
        executor: ToolExecutor,
        domain: Arc<dyn DomainService>,
        audit: Arc<dyn AuditSink>,
        config: RuntimeConfig,
    ) -> Self {
        Self { client, executor, domain, audit, config }
    }

    pub async fn handle_request(&self, request: AgentRequest) -> AgentResponse {
        let correlation_id = Uuid::new_v4().to_string();
        let context = self.resolve_context(&request).await;
        let allowed = allowed_tools(&context);
        let provider_tools = self.executor.registry().provider_tools(&allowed);
        let system_prompt = prompts::system_prompt(&context, request.view.as_deref());

        info!(
            %correlation_id,
            workflow = ?context.workflow,
            entity_id = context.entity_id.as_deref().unwrap_or("none"),
            read_only = context.read_only,
            tools_visible = provider_tools.len(),
            history_messages = request.messages.len(),
            "agent request started"
        );

        let mut transcript = request.messages;
        let mut should_refresh = false;
        let mut executed: Vec<ExecutionSummary> = Vec::new();
        let mut blocking_summary: Option<ExecutionSummary> = None;

        for turn in 0..self.config.max_turns {
            let windowed = history::window(&transcript, self.config.history_window);
            let completion = self
                .client
                .complete(CompletionRequest {
                    system_prompt: Some(system_prompt.clone()),
                    messages: windowed,
                    tools: provider_tools.clone(),
                    tool_choice: ToolChoice::Auto,
                    max_tokens: self.config.max_output_tokens,
                    temperature: self.config.temperature,
                    response_format: ResponseFormat::Text,
                    cancel: None,
                })
                .await;

            let completion = match completion {
                Ok(completion) => completion,
                Err(error) => {
                    self.record_provider_failure(&context, &correlation_id, &error);
                    transcript.push(Message::assistant_text(provider_failure_reply(&error)));
                    return AgentResponse { messages: transcript, should_refresh };
                }
            };

            if !completion.has_tool_calls() {
                if let Some(text) = completion.text() {
                    transcript.push(Message::assistant_text(text));
                    info!(%correlation_id, turn, "model produced final answer");
                    return AgentResponse { messages: transcript, should_refresh };
                }
                // Silent exhaustion: no tool calls, no text. Fall through to
                // finalization for a deterministic reply.
                warn!(%correlation_id, turn, "model returned neither text nor tool calls");
                break;
            }

            transcript.push(Message::assistant_tool_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));

            let mut turn_summaries = Vec::with_capacity(completion.tool_calls.len());
            for call in &completion.tool_calls {
                let execution = self.executor.execute(&context, call, &correlation_id).await;
                transcript.push(execution.message);
                transcript.extend(execution.notes);
                should_refresh = should_refresh || execution.refresh;
                turn_summaries.push(execution.summary);
            }

            let all_failed = turn_summaries.iter().all(|summary| !summary.is_success());
            executed.extend(turn_summaries.iter().cloned());

            if all_failed {
                // Do not keep asking the model to retry what guardrails just
                // refused; a mixed turn with at least one success continues.
                blocking_summary =
                    turn_summaries.into_iter().find(|summary| !summary.is_success());
                break;
            }
        }

        let final_message = match blocking_summary {
            Some(summary) => Message::assistant_text(summary.summary),
            None => self.summarize(&transcript, &system_prompt, &executed, &correlation_id).await,
        };
        transcript.push(final_message);
        AgentResponse { messages: transcript, should_refresh }
    }

    /// One extra completion with tools withheld so the model can close in
    /// natural language; falls back to a deterministic summary, then to a
    /// generic notice.
    async fn summarize(
        &self,
        transcript: &[Message],
        system_prompt: &str,
        executed: &[ExecutionSummary],
        correlation_id: &str,
    ) -> Message {
        let windowed = history::window(transcript, self.config.history_window);
        let completion = self
            .client
            .complete(CompletionRequest {
                system_prompt: Some(system_prompt.to_string()),
                messages: windowed,
                tools: Vec::new(),
                tool_choice: ToolChoice::None,
                max_tokens: self.config.max_output_tokens,
                temperature: self.config.temperature,
                response_format: ResponseFormat::Text,
                cancel: None,
            })
            .await;

        match completion {
            Ok(completion) => {
                if let Some(text) = completion.text() {
                    return Message::assistant_text(text);
                }
            }
            Err(error) => {
                self.record_provider_failure_context_free(correlation_id, &error);
            }
        }

        let deterministic = executed
            .iter()
            .map(|summary| summary.summary.clone())
            .collect::<Vec<_>>()
            .join("\n");
        if deterministic.trim().is_empty() {
            Message::assistant_text("The request completed, but no further detail is available.")
        } else {
            Message::assistant_text(deterministic)
        }
    }

    /// Resolve the immutable per-request context: workflow, entity, stage
    /// and read-only mode. Entity lookups that fail leave the context bare;
    /// the tools report precise errors later.
    async fn resolve_context(&self, request: &AgentRequest) -> ExecutionContext {
        let workflow = request.workflow.unwrap_or(Workflow::Estimates);
        let mut context = ExecutionContext::new(workflow);

        let entity_type = request.entity_type.unwrap_or(match workflow {
            Workflow::Estimates => EntityType::Project,
            Workflow::Contracts => EntityType::Agreement,
        });

        if let Some(entity_id) = &request.entity_id {
            context = context.with_entity(entity_id.clone(), entity_type);
            match entity_type {
                EntityType::Project => {
                    if let Ok(detail) =
                        self.domain.project_detail(&ProjectId(entity_id.clone())).await
                    {
                        context = context.with_stage(detail.stage);
                    }
                }
                EntityType::Agreement => {
                    if let Ok(detail) =
                        self.domain.agreement_detail(&AgreementId(entity_id.clone())).await
                    {
                        if detail.status.is_read_only() {
                            context = context.read_only();
                        }
                    }
                }
            }
        }

        if matches!(request.view.as_deref(), Some("readOnly") | Some("read_only")) {
            context = context.read_only();
        }

        context
    }

    fn record_provider_failure(
        &self,
        context: &ExecutionContext,
        correlation_id: &str,
        error: &LlmError,
    ) {
        warn!(correlation_id, kind = error.kind(), error = %error, "provider call failed");
        self.audit.emit(
            AuditEvent::new(
                context.entity_id.clone(),
                correlation_id,
                "provider.call_failed",
                AuditCategory::Provider,
                AuditOutcome::Failed,
            )
            .with_metadata("kind", error.kind()),
        );
    }

    fn record_provider_failure_context_free(&self, correlation_id: &str, error: &LlmError) {
        warn!(correlation_id, kind = error.kind(), error = %error, "summary call failed");
        self.audit.emit(
            AuditEvent::new(
                None,
                correlation_id,
                "provider.summary_call_failed",
                AuditCategory::Provider,
                AuditOutcome::Failed,
            )
            .with_metadata("kind", error.kind()),
        );
    }

    /// Tool names visible to the current context; exposed for embeddings
    /// that render the catalog.
    pub fn visible_tools(&self, context: &ExecutionContext) -> BTreeSet<ToolName> {
        allowed_tools(context)
    }
}

fn provider_failure_reply(error: &LlmError) -> String {
    match error {
        LlmError::Auth(_) | LlmError::Config(_) => {
            "The assistant is not configured correctly for the language-model provider; \
             please contact an administrator."
                .to_string()
        }
        LlmError::RateLimit(_) => {
            "The language-model provider is rate limiting requests; please try again in a \
             moment."
                .to_string()
        }
        _ => "The assistant could not reach the language-model provider; please try again."
            .to_string(),
    }
}
