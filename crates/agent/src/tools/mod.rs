//! The fixed tool catalog: definitions, input schemas, behavior flags and
//! post-success side effects, assembled once at startup.

pub mod contracts;
pub mod estimates;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use scopecraft_core::domain::project::ProjectId;
use scopecraft_core::domain::service::DomainService;
use scopecraft_core::workflow::{ExecutionContext, Stage};

use crate::registry::{
    ContextDefault, RegistryError, ToolDefinition, ToolName, ToolOptions, ToolOutput,
    ToolRegistry,
};
use crate::side_effects::{SideEffect, SideEffectError, SideEffectRegistry};
use crate::tools::contracts::{CreateVersionHandler, GetAgreementHandler, ListAgreementsHandler};
use crate::tools::estimates::{
    DraftQuoteHandler, GenerateWbsItemsHandler, GetProjectDetailHandler, ListRolesHandler,
    ListWbsItemsHandler, QuoteSummaryHandler, UpdateStageHandler,
};

fn project_id_property() -> Value {
    json!({ "type": "string", "description": "Identifier of the estimate project." })
}

/// Build the full registry against a domain-service implementation.
pub fn catalog(domain: Arc<dyn DomainService>) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::builder()
        .register(ToolDefinition::new(
            ToolName::EstimatesGetProjectDetail,
            "Fetch the active estimate project: client, stage and WBS row count.",
            json!({
                "type": "object",
                "required": ["projectId"],
                "properties": { "projectId": project_id_property() },
            }),
            ToolOptions {
                context_default: Some(ContextDefault::ProjectId),
                ..ToolOptions::default()
            },
            Arc::new(GetProjectDetailHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::EstimatesListWbsItems,
            "List the work-breakdown rows of a project.",
            json!({
                "type": "object",
                "required": ["projectId"],
                "properties": { "projectId": project_id_property() },
            }),
            ToolOptions {
                context_default: Some(ContextDefault::ProjectId),
                ..ToolOptions::default()
            },
            Arc::new(ListWbsItemsHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::EstimatesGenerateWbsItems,
            "Insert or update work-breakdown rows for a project. Rows with an id replace the existing row.",
            json!({
                "type": "object",
                "required": ["projectId", "items"],
                "properties": {
                    "projectId": project_id_property(),
                    "items": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["title", "estimatedHours"],
                            "properties": {
                                "id": { "type": "string" },
                                "title": { "type": "string" },
                                "description": { "type": "string" },
                                "roleId": { "type": "string" },
                                "estimatedHours": { "type": "number", "minimum": 0 },
                            },
                        },
                    },
                },
            }),
            ToolOptions {
                throttled: true,
                refresh_on_success: true,
                min_stage: Some(Stage::Requirements),
                context_default: Some(ContextDefault::ProjectId),
            },
            Arc::new(GenerateWbsItemsHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::EstimatesUpdateStage,
            "Move a project to another lifecycle stage (Artifacts, Business Case, Requirements, Solution, Effort, Quote).",
            json!({
                "type": "object",
                "required": ["projectId", "stage"],
                "properties": {
                    "projectId": project_id_property(),
                    "stage": { "type": "string" },
                },
            }),
            ToolOptions {
                refresh_on_success: true,
                context_default: Some(ContextDefault::ProjectId),
                ..ToolOptions::default()
            },
            Arc::new(UpdateStageHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::RolesList,
            "List the delivery roles available for estimation, with hourly rates.",
            json!({ "type": "object", "properties": {} }),
            ToolOptions::default(),
            Arc::new(ListRolesHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::QuoteGetSummary,
            "Roll up a project's WBS into total hours and amount.",
            json!({
                "type": "object",
                "required": ["projectId"],
                "properties": { "projectId": project_id_property() },
            }),
            ToolOptions {
                context_default: Some(ContextDefault::ProjectId),
                ..ToolOptions::default()
            },
            Arc::new(QuoteSummaryHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::QuoteDraft,
            "Draft a client quote from the project's current WBS totals.",
            json!({
                "type": "object",
                "required": ["projectId"],
                "properties": {
                    "projectId": project_id_property(),
                    "notes": { "type": "string" },
                },
            }),
            ToolOptions {
                throttled: true,
                refresh_on_success: true,
                min_stage: Some(Stage::Effort),
                context_default: Some(ContextDefault::ProjectId),
            },
            Arc::new(DraftQuoteHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::ContractsGetAgreement,
            "Fetch an agreement: counterparty, status, current version and linked project.",
            json!({
                "type": "object",
                "required": ["agreementId"],
                "properties": { "agreementId": { "type": "string" } },
            }),
            ToolOptions {
                context_default: Some(ContextDefault::AgreementId),
                ..ToolOptions::default()
            },
            Arc::new(GetAgreementHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::ContractsListAgreements,
            "List every agreement in the workspace.",
            json!({ "type": "object", "properties": {} }),
            ToolOptions::default(),
            Arc::new(ListAgreementsHandler { domain: domain.clone() }),
        ))
        .register(ToolDefinition::new(
            ToolName::ContractsCreateVersion,
            "Create a new draft version of an agreement with a change summary.",
            json!({
                "type": "object",
                "required": ["agreementId", "changeSummary"],
                "properties": {
                    "agreementId": { "type": "string" },
                    "changeSummary": { "type": "string" },
                },
            }),
            ToolOptions {
                throttled: true,
                refresh_on_success: true,
                context_default: Some(ContextDefault::AgreementId),
                ..ToolOptions::default()
            },
            Arc::new(CreateVersionHandler { domain }),
        ))
        .build()
}

/// Recomputes quote totals after WBS rows change so the estimate view shows
/// fresh numbers without a manual refresh.
pub struct WbsTotalsSideEffect {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl SideEffect for WbsTotalsSideEffect {
    fn name(&self) -> &'static str {
        "wbs-totals-recalculation"
    }

    async fn run(
        &self,
        input: &Value,
        _output: &ToolOutput,
        _context: &ExecutionContext,
    ) -> Result<Option<String>, SideEffectError> {
        let project_id = input
            .get("projectId")
            .and_then(Value::as_str)
            .ok_or_else(|| SideEffectError("input carried no projectId".to_string()))?;
        let summary = self
            .domain
            .quote_summary(&ProjectId(project_id.to_string()))
            .await
            .map_err(|error| SideEffectError(error.to_string()))?;
        Ok(Some(format!(
            "Recalculated totals for {project_id}: {} rows, {:.1} hours.",
            summary.line_count, summary.total_hours
        )))
    }
}

/// Notes the new version number after an agreement mutation.
pub struct AgreementVersionNoticeSideEffect;

#[async_trait]
impl SideEffect for AgreementVersionNoticeSideEffect {
    fn name(&self) -> &'static str {
        "agreement-version-notice"
    }

    async fn run(
        &self,
        _input: &Value,
        output: &ToolOutput,
        _context: &ExecutionContext,
    ) -> Result<Option<String>, SideEffectError> {
        let version = output
            .raw
            .as_ref()
            .and_then(|raw| raw.get("version"))
            .and_then(Value::as_u64)
            .ok_or_else(|| SideEffectError("tool output carried no version".to_string()))?;
        Ok(Some(format!("Agreement advanced to version {version}.")))
    }
}

/// Declarative side-effect wiring for the catalog above.
pub fn side_effects(domain: Arc<dyn DomainService>) -> SideEffectRegistry {
    SideEffectRegistry::default()
        .register(
            ToolName::EstimatesGenerateWbsItems,
            Arc::new(WbsTotalsSideEffect { domain }),
        )
        .register(ToolName::ContractsCreateVersion, Arc::new(AgreementVersionNoticeSideEffect))
}
