use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use scopecraft_core::domain::project::{ProjectId, RoleId, WbsItemDraft, WbsItemId};
use scopecraft_core::domain::service::DomainService;
use scopecraft_core::workflow::Stage;

use crate::registry::{ToolHandler, ToolHandlerError, ToolOutput};

fn typed<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, ToolHandlerError> {
    serde_json::from_value(arguments)
        .map_err(|error| ToolHandlerError::InvalidArguments(error.to_string()))
}

fn to_output(value: impl serde::Serialize) -> Result<ToolOutput, ToolHandlerError> {
    let rendered = serde_json::to_value(value)
        .map_err(|error| ToolHandlerError::Failed(error.to_string()))?;
    Ok(ToolOutput::json(rendered))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectArgs {
    project_id: String,
}

pub struct GetProjectDetailHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for GetProjectDetailHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: ProjectArgs = typed(arguments)?;
        let detail = self.domain.project_detail(&ProjectId(args.project_id)).await?;
        to_output(detail)
    }
}

pub struct ListWbsItemsHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for ListWbsItemsHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: ProjectArgs = typed(arguments)?;
        let items = self.domain.list_wbs_items(&ProjectId(args.project_id)).await?;
        to_output(items)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WbsItemArgs {
    id: Option<String>,
    title: String,
    description: Option<String>,
    role_id: Option<String>,
    estimated_hours: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateWbsItemsArgs {
    project_id: String,
    items: Vec<WbsItemArgs>,
}

pub struct GenerateWbsItemsHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for GenerateWbsItemsHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: GenerateWbsItemsArgs = typed(arguments)?;
        let drafts = args
            .items
            .into_iter()
            .map(|item| WbsItemDraft {
                id: item.id.map(WbsItemId),
                title: item.title,
                description: item.description,
                role_id: item.role_id.map(RoleId),
                estimated_hours: item.estimated_hours,
            })
            .collect();
        let written =
            self.domain.upsert_wbs_items(&ProjectId(args.project_id.clone()), drafts).await?;
        to_output(json!({
            "projectId": args.project_id,
            "written": written.len(),
            "items": written,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStageArgs {
    project_id: String,
    stage: String,
}

pub struct UpdateStageHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for UpdateStageHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: UpdateStageArgs = typed(arguments)?;
        let stage: Stage = args
            .stage
            .parse()
            .map_err(|error: scopecraft_core::workflow::WorkflowParseError| {
                ToolHandlerError::InvalidArguments(error.to_string())
            })?;
        let detail =
            self.domain.update_project_stage(&ProjectId(args.project_id), stage).await?;
        to_output(detail)
    }
}

pub struct ListRolesHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for ListRolesHandler {
    async fn execute(&self, _arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let roles = self.domain.list_roles().await?;
        to_output(roles)
    }
}

pub struct QuoteSummaryHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for QuoteSummaryHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: ProjectArgs = typed(arguments)?;
        let summary = self.domain.quote_summary(&ProjectId(args.project_id)).await?;
        to_output(summary)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftQuoteArgs {
    project_id: String,
    notes: Option<String>,
}

pub struct DraftQuoteHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for DraftQuoteHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: DraftQuoteArgs = typed(arguments)?;
        let project_id = ProjectId(args.project_id);
        let summary = self.domain.quote_summary(&project_id).await?;
        if summary.line_count == 0 {
            return Err(ToolHandlerError::Failed(format!(
                "project {} has no WBS rows to quote",
                project_id.0
            )));
        }
        to_output(json!({
            "projectId": project_id.0,
            "status": "draft",
            "currency": summary.currency,
            "totalAmountCents": summary.total_amount_cents,
            "totalHours": summary.total_hours,
            "lineCount": summary.line_count,
            "notes": args.notes,
        }))
    }
}
