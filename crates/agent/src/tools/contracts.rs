use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use scopecraft_core::domain::agreement::AgreementId;
use scopecraft_core::domain::service::DomainService;

use crate::registry::{ToolHandler, ToolHandlerError, ToolOutput};

fn typed<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, ToolHandlerError> {
    serde_json::from_value(arguments)
        .map_err(|error| ToolHandlerError::InvalidArguments(error.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgreementArgs {
    agreement_id: String,
}

pub struct GetAgreementHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for GetAgreementHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: AgreementArgs = typed(arguments)?;
        let detail = self.domain.agreement_detail(&AgreementId(args.agreement_id)).await?;
        let rendered = serde_json::to_value(detail)
            .map_err(|error| ToolHandlerError::Failed(error.to_string()))?;
        Ok(ToolOutput::json(rendered))
    }
}

pub struct ListAgreementsHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for ListAgreementsHandler {
    async fn execute(&self, _arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let agreements = self.domain.list_agreements().await?;
        let rendered = serde_json::to_value(agreements)
            .map_err(|error| ToolHandlerError::Failed(error.to_string()))?;
        Ok(ToolOutput::json(rendered))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVersionArgs {
    agreement_id: String,
    change_summary: String,
}

pub struct CreateVersionHandler {
    pub domain: Arc<dyn DomainService>,
}

#[async_trait]
impl ToolHandler for CreateVersionHandler {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
        let args: CreateVersionArgs = typed(arguments)?;
        let version = self
            .domain
            .create_agreement_version(&AgreementId(args.agreement_id), args.change_summary)
            .await?;
        Ok(ToolOutput::json(json!({
            "agreementId": version.agreement_id.0,
            "version": version.version,
            "changeSummary": version.change_summary,
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use scopecraft_core::domain::service::{DomainServiceError, InMemoryDomainService};

    use crate::registry::{ToolHandler, ToolHandlerError};
    use crate::tools::contracts::{CreateVersionHandler, GetAgreementHandler};

    #[tokio::test]
    async fn get_agreement_serializes_status_and_link() {
        let handler = GetAgreementHandler { domain: Arc::new(InMemoryDomainService::seeded()) };
        let output = handler
            .execute(json!({"agreementId": "AGR-2002"}))
            .await
            .expect("seeded agreement resolves");
        let raw = output.raw.expect("raw payload");
        assert_eq!(raw["status"], "Signed");
        assert_eq!(raw["linked_project_id"], "PRJ-1002");
    }

    #[tokio::test]
    async fn create_version_surfaces_domain_validation() {
        let handler = CreateVersionHandler { domain: Arc::new(InMemoryDomainService::seeded()) };
        let error = handler
            .execute(json!({"agreementId": "AGR-2001", "changeSummary": "  "}))
            .await
            .expect_err("blank summary is rejected by the domain");
        assert!(matches!(
            error,
            ToolHandlerError::Domain(DomainServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_version_returns_new_version_number() {
        let handler = CreateVersionHandler { domain: Arc::new(InMemoryDomainService::seeded()) };
        let output = handler
            .execute(json!({"agreementId": "AGR-2001", "changeSummary": "Added SLA rider"}))
            .await
            .expect("draft agreement accepts versions");
        assert_eq!(output.raw.expect("raw")["version"], 2);
    }
}
