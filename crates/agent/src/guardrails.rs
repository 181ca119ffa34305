use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use scopecraft_core::workflow::{ExecutionContext, Workflow};

use crate::registry::{ToolDefinition, ToolName};

/// Outcome of the guardrail pipeline for one tool call. `Block` marks calls
/// refused by scoping rules and surfaces with `blocked` status; `Deny`
/// marks user-correctable refusals (the mutation throttle) and surfaces
/// with `error` status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Block { reason: String },
    Deny { reason: String },
}

/// Fixed tool set a workflow owns. The read-only subset applies when the
/// context is flagged read-only (including when the active entity is itself
/// read-only, e.g. a signed agreement).
pub fn workflow_tools(workflow: Workflow) -> BTreeSet<ToolName> {
    match workflow {
        Workflow::Estimates => BTreeSet::from([
            ToolName::EstimatesGetProjectDetail,
            ToolName::EstimatesListWbsItems,
            ToolName::EstimatesGenerateWbsItems,
            ToolName::EstimatesUpdateStage,
            ToolName::RolesList,
            ToolName::QuoteGetSummary,
            ToolName::QuoteDraft,
        ]),
        Workflow::Contracts => BTreeSet::from([
            ToolName::ContractsGetAgreement,
            ToolName::ContractsListAgreements,
            ToolName::ContractsCreateVersion,
            ToolName::RolesList,
        ]),
    }
}

fn is_mutation(name: ToolName) -> bool {
    matches!(
        name,
        ToolName::EstimatesGenerateWbsItems
            | ToolName::EstimatesUpdateStage
            | ToolName::QuoteDraft
            | ToolName::ContractsCreateVersion
    )
}

pub fn read_only_tools(workflow: Workflow) -> BTreeSet<ToolName> {
    workflow_tools(workflow).into_iter().filter(|name| !is_mutation(*name)).collect()
}

/// The allowed set for a context: the workflow's full catalog, or its
/// read-only subset.
pub fn allowed_tools(context: &ExecutionContext) -> BTreeSet<ToolName> {
    if context.read_only {
        read_only_tools(context.workflow)
    } else {
        workflow_tools(context.workflow)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub window: Duration,
    pub ceiling: u32,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self { window: Duration::seconds(60), ceiling: 3 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleEntry {
    pub count: u32,
    pub window_started_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThrottleVerdict {
    Admitted { remaining: u32 },
    Exceeded { window_resets_at: DateTime<Utc> },
}

/// Sliding-window mutation counter keyed by `tool:entity`. The only shared
/// mutable state in the core; injectable so tests reset it deterministically.
/// A multi-instance deployment must swap this for an external atomic counter
/// with a TTL to keep the per-window ceiling global.
#[derive(Default)]
pub struct MutationThrottle {
    settings: ThrottleSettings,
    entries: Mutex<HashMap<String, ThrottleEntry>>,
}

impl MutationThrottle {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self { settings, entries: Mutex::new(HashMap::new()) }
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    /// Count one call. The window resets lazily the first time it is
    /// observed to have expired.
    pub fn register_call(
        &self,
        tool: ToolName,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> ThrottleVerdict {
        let key = format!("{}:{entity_id}", tool.internal());
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry = entries
            .entry(key)
            .or_insert(ThrottleEntry { count: 0, window_started_at: now });

        if now - entry.window_started_at >= self.settings.window {
            entry.count = 0;
            entry.window_started_at = now;
        }

        if entry.count >= self.settings.ceiling {
            return ThrottleVerdict::Exceeded {
                window_resets_at: entry.window_started_at + self.settings.window,
            };
        }

        entry.count += 1;
        ThrottleVerdict::Admitted { remaining: self.settings.ceiling - entry.count }
    }

    pub fn reset(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

/// Orders the checks of the guardrail pipeline. Tool existence is resolved
/// before this point; everything here receives a registered definition.
pub struct GuardrailEngine {
    throttle: Arc<MutationThrottle>,
}

impl Default for GuardrailEngine {
    fn default() -> Self {
        Self::new(Arc::new(MutationThrottle::default()))
    }
}

impl GuardrailEngine {
    pub fn new(throttle: Arc<MutationThrottle>) -> Self {
        Self { throttle }
    }

    pub fn throttle(&self) -> &Arc<MutationThrottle> {
        &self.throttle
    }

    pub fn evaluate(
        &self,
        definition: &ToolDefinition,
        context: &ExecutionContext,
        now: DateTime<Utc>,
    ) -> GuardrailDecision {
        let name = definition.name;

        if !allowed_tools(context).contains(&name) {
            let reason = if context.read_only && workflow_tools(context.workflow).contains(&name) {
                format!(
                    "Tool `{}` is unavailable because the current view is read-only.",
                    name.internal()
                )
            } else {
                format!(
                    "Tool `{}` is not available in the {:?} workflow.",
                    name.internal(),
                    context.workflow
                )
            };
            return GuardrailDecision::Block { reason };
        }

        if let Some(required_stage) = definition.options.min_stage {
            if !context.stage_allows(Some(required_stage)) {
                let current = context
                    .stage
                    .map(|stage| stage.label().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                return GuardrailDecision::Block {
                    reason: format!(
                        "Tool `{}` requires the {} stage; the active entity is still at {}.",
                        name.internal(),
                        required_stage.label(),
                        current
                    ),
                };
            }
        }

        if definition.options.throttled {
            if let Some(entity_id) = context.entity_id.as_deref() {
                if let ThrottleVerdict::Exceeded { window_resets_at } =
                    self.throttle.register_call(name, entity_id, now)
                {
                    return GuardrailDecision::Deny {
                        reason: format!(
                            "Rate limit: `{}` exceeded {} calls per {}s for {entity_id}; allowed again at {}.",
                            name.internal(),
                            self.throttle.settings.ceiling,
                            self.throttle.settings.window.num_seconds(),
                            window_resets_at.format("%H:%M:%S"),
                        ),
                    };
                }
            }
        }

        GuardrailDecision::Allow
    }
}
