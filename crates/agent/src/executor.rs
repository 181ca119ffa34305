use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use scopecraft_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use scopecraft_core::workflow::{EntityType, ExecutionContext, Workflow};

use crate::conversation::{Message, ToolCallRequest, ToolStatus, ToolStatusMeta};
use crate::guardrails::{GuardrailDecision, GuardrailEngine};
use crate::registry::{ContextDefault, ToolDefinition, ToolRegistry};
use crate::schema;
use crate::side_effects::{SideEffectOutcome, SideEffectRegistry};

/// Record of one tool invocation, kept for log lines and for the
/// deterministic fallback reply when the model emits no closing text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub name: String,
    pub raw_content: Option<String>,
    pub parsed_content: Option<String>,
    pub status: ToolStatus,
    pub summary: String,
    pub detail: Option<String>,
}

impl ExecutionSummary {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Everything one tool call contributed to the turn: the tool-result
/// message, any side-effect notes, the summary record, and this call's
/// contribution to the refresh flag.
#[derive(Clone, Debug)]
pub struct ToolExecution {
    pub message: Message,
    pub notes: Vec<Message>,
    pub summary: ExecutionSummary,
    pub refresh: bool,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    guardrails: GuardrailEngine,
    side_effects: Arc<SideEffectRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        guardrails: GuardrailEngine,
        side_effects: Arc<SideEffectRegistry>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { registry, guardrails, side_effects, audit }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one tool call end to end. Every failure path still yields a
    /// well-formed tool-result message so the conversation stays valid.
    pub async fn execute(
        &self,
        context: &ExecutionContext,
        call: &ToolCallRequest,
        correlation_id: &str,
    ) -> ToolExecution {
        let Some(tool_name) = self.registry.resolve(&call.name) else {
            return self.failure(
                context,
                call,
                correlation_id,
                &call.name,
                ToolStatus::Error,
                format!("Unregistered tool `{}`.", call.name),
                None,
            );
        };
        let label = tool_name.internal().to_string();

        // The registry owns the definition for every resolvable name.
        let Some(definition) = self.registry.get(tool_name) else {
            return self.failure(
                context,
                call,
                correlation_id,
                &label,
                ToolStatus::Error,
                format!("Unregistered tool `{label}`."),
                None,
            );
        };

        let mut arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(parse_error) => {
                return self.failure(
                    context,
                    call,
                    correlation_id,
                    &label,
                    ToolStatus::Error,
                    format!("Arguments for `{label}` are not valid JSON."),
                    Some(parse_error),
                );
            }
        };

        apply_context_defaults(&mut arguments, definition, context);

        match self.guardrails.evaluate(definition, context, Utc::now()) {
            GuardrailDecision::Allow => {}
            GuardrailDecision::Block { reason } => {
                return self.failure(
                    context,
                    call,
                    correlation_id,
                    &label,
                    ToolStatus::Blocked,
                    reason,
                    None,
                );
            }
            GuardrailDecision::Deny { reason } => {
                return self.failure(
                    context,
                    call,
                    correlation_id,
                    &label,
                    ToolStatus::Error,
                    reason,
                    None,
                );
            }
        }

        let issues = schema::validate(&arguments, &definition.parameters);
        if !issues.is_empty() {
            return self.failure(
                context,
                call,
                correlation_id,
                &label,
                ToolStatus::Error,
                format!("Arguments for `{label}` failed validation."),
                Some(schema::render_issues(&issues)),
            );
        }

        let output = match definition.handler.execute(arguments.clone()).await {
            Ok(output) => output,
            Err(handler_error) => {
                return self.failure(
                    context,
                    call,
                    correlation_id,
                    &label,
                    ToolStatus::Error,
                    format!("Tool `{label}` failed: {handler_error}"),
                    None,
                );
            }
        };

        let display_content = normalize_content(&output.content);
        let summary_line = format!("Executed `{label}` successfully.");

        let mut notes = Vec::new();
        let mut note_requested_refresh = false;
        let outcomes = self
            .side_effects
            .run_all(definition.name, &arguments, &output, context)
            .await;
        for outcome in outcomes {
            match outcome {
                SideEffectOutcome::Note { handler, note } => {
                    note_requested_refresh = true;
                    notes.push(Message::system_note(format!("[Side Effect] {handler}: {note}")));
                }
                SideEffectOutcome::Silent { .. } => {}
                SideEffectOutcome::Failed { handler, error } => {
                    self.audit.emit(
                        AuditEvent::new(
                            context.entity_id.clone(),
                            correlation_id,
                            "side_effect.handler_failed",
                            AuditCategory::SideEffect,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("tool", &label)
                        .with_metadata("handler", handler),
                    );
                    notes.push(Message::system_note(format!(
                        "[Side Effect Error] {handler} for `{label}`: {error}"
                    )));
                }
            }
        }

        let stage_reached = context.stage_allows(definition.options.min_stage);
        let refresh =
            (definition.options.refresh_on_success && stage_reached) || note_requested_refresh;

        self.audit.emit(
            AuditEvent::new(
                context.entity_id.clone(),
                correlation_id,
                "tool.invocation_completed",
                AuditCategory::Tool,
                AuditOutcome::Success,
            )
            .with_metadata("tool", &label),
        );
        info!(
            tool = %label,
            correlation_id,
            refresh,
            notes = notes.len(),
            "tool invocation completed"
        );

        let meta = ToolStatusMeta {
            label: label.clone(),
            status: ToolStatus::Success,
            summary: summary_line.clone(),
            detail: None,
        };
        ToolExecution {
            message: Message::tool_result(&call.id, &label, display_content.clone(), meta),
            notes,
            summary: ExecutionSummary {
                name: label,
                raw_content: Some(output.content),
                parsed_content: Some(display_content),
                status: ToolStatus::Success,
                summary: summary_line,
                detail: None,
            },
            refresh,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn failure(
        &self,
        context: &ExecutionContext,
        call: &ToolCallRequest,
        correlation_id: &str,
        label: &str,
        status: ToolStatus,
        summary: String,
        detail: Option<String>,
    ) -> ToolExecution {
        let (event_type, category, outcome) = match status {
            ToolStatus::Blocked => {
                ("guardrail.call_blocked", AuditCategory::Guardrail, AuditOutcome::Blocked)
            }
            _ => ("tool.invocation_failed", AuditCategory::Tool, AuditOutcome::Failed),
        };
        self.audit.emit(
            AuditEvent::new(context.entity_id.clone(), correlation_id, event_type, category, outcome)
                .with_metadata("tool", label)
                .with_metadata("reason", &summary),
        );
        debug!(tool = %label, correlation_id, status = ?status, %summary, "tool call refused");

        let meta = ToolStatusMeta {
            label: label.to_string(),
            status,
            summary: summary.clone(),
            detail: detail.clone(),
        };
        ToolExecution {
            message: Message::tool_result(&call.id, label, summary.clone(), meta),
            notes: Vec::new(),
            summary: ExecutionSummary {
                name: label.to_string(),
                raw_content: None,
                parsed_content: None,
                status,
                summary,
                detail,
            },
            refresh: false,
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(trimmed).map_err(|error| error.to_string())
}

/// Inject the active entity id under the conventional key for tools that
/// declare a context default, only when the model did not supply it and the
/// workflow/entity-type combination matches.
fn apply_context_defaults(
    arguments: &mut Value,
    definition: &ToolDefinition,
    context: &ExecutionContext,
) {
    let Some(context_default) = definition.options.context_default else {
        return;
    };
    let Some(entity_id) = context.entity_id.as_deref() else {
        return;
    };
    let matches_context = match context_default {
        ContextDefault::ProjectId => {
            context.workflow == Workflow::Estimates
                && context.entity_type == Some(EntityType::Project)
        }
        ContextDefault::AgreementId => {
            context.workflow == Workflow::Contracts
                && context.entity_type == Some(EntityType::Agreement)
        }
    };
    if !matches_context {
        return;
    }

    if let Value::Object(object) = arguments {
        let key = context_default.argument_key();
        if !object.contains_key(key) {
            object.insert(key.to_string(), Value::String(entity_id.to_string()));
        }
    }
}

/// Display form of a tool result: pretty JSON when the content parses as
/// JSON, the raw text otherwise, and a generic placeholder when empty.
fn normalize_content(content: &str) -> String {
    if content.trim().is_empty() {
        return "Tool executed successfully.".to_string();
    }
    match serde_json::from_str::<Value>(content) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| content.to_string()),
        Err(_) => content.to_string(),
    }
}
