use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agreement::{
    AgreementDetail, AgreementId, AgreementStatus, AgreementVersion, AgreementVersionId,
};
use crate::domain::project::{
    ProjectDetail, ProjectId, QuoteSummary, RoleId, RoleSummary, WbsItem, WbsItemDraft, WbsItemId,
};
use crate::workflow::Stage;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainServiceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("domain validation failed: {0}")]
    Validation(String),
}

impl DomainServiceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }
}

/// Opaque boundary to the persistence layer. Tool handlers call these
/// operations and treat the implementation as a black box; the in-memory
/// implementation below backs tests and local development.
#[async_trait]
pub trait DomainService: Send + Sync {
    async fn project_detail(&self, id: &ProjectId) -> Result<ProjectDetail, DomainServiceError>;
    async fn list_roles(&self) -> Result<Vec<RoleSummary>, DomainServiceError>;
    async fn list_wbs_items(&self, project: &ProjectId)
        -> Result<Vec<WbsItem>, DomainServiceError>;
    async fn upsert_wbs_items(
        &self,
        project: &ProjectId,
        drafts: Vec<WbsItemDraft>,
    ) -> Result<Vec<WbsItem>, DomainServiceError>;
    async fn update_project_stage(
        &self,
        project: &ProjectId,
        stage: Stage,
    ) -> Result<ProjectDetail, DomainServiceError>;
    async fn quote_summary(&self, project: &ProjectId)
        -> Result<QuoteSummary, DomainServiceError>;
    async fn agreement_detail(
        &self,
        id: &AgreementId,
    ) -> Result<AgreementDetail, DomainServiceError>;
    async fn list_agreements(&self) -> Result<Vec<AgreementDetail>, DomainServiceError>;
    async fn create_agreement_version(
        &self,
        id: &AgreementId,
        change_summary: String,
    ) -> Result<AgreementVersion, DomainServiceError>;
}

#[derive(Default)]
struct InMemoryState {
    projects: BTreeMap<String, ProjectDetail>,
    roles: Vec<RoleSummary>,
    wbs_items: BTreeMap<String, Vec<WbsItem>>,
    agreements: BTreeMap<String, AgreementDetail>,
    agreement_versions: Vec<AgreementVersion>,
}

/// Deterministic in-memory implementation of the domain boundary.
#[derive(Clone, Default)]
pub struct InMemoryDomainService {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryDomainService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service seeded with a small consulting book of record: one estimate
    /// project per interesting stage and a pair of agreements.
    pub fn seeded() -> Self {
        let service = Self::new();
        service.seed_project("PRJ-1001", "Atlas Replatform", "Northwind", Stage::Artifacts);
        service.seed_project("PRJ-1002", "Ledger Migration", "Contoso", Stage::Requirements);
        service.seed_project("PRJ-1003", "Field Ops Rollout", "Fabrikam", Stage::Effort);
        service.seed_role("role-architect", "Solution Architect", 21_000);
        service.seed_role("role-engineer", "Senior Engineer", 17_500);
        service.seed_role("role-pm", "Delivery Manager", 15_000);
        service.seed_agreement("AGR-2001", "Master Services Agreement", "Northwind", false, None);
        service.seed_agreement(
            "AGR-2002",
            "SOW — Ledger Migration",
            "Contoso",
            true,
            Some("PRJ-1002"),
        );
        service
    }

    pub fn seed_project(&self, id: &str, name: &str, client_name: &str, stage: Stage) {
        let detail = ProjectDetail {
            id: ProjectId(id.to_string()),
            name: name.to_string(),
            client_name: client_name.to_string(),
            stage,
            currency: "USD".to_string(),
            wbs_item_count: 0,
            updated_at: Utc::now(),
        };
        self.with_state(|state| {
            state.projects.insert(id.to_string(), detail);
        });
    }

    pub fn seed_role(&self, id: &str, name: &str, hourly_rate_cents: i64) {
        let role = RoleSummary {
            id: RoleId(id.to_string()),
            name: name.to_string(),
            hourly_rate_cents,
        };
        self.with_state(|state| state.roles.push(role));
    }

    pub fn seed_agreement(
        &self,
        id: &str,
        name: &str,
        counterparty: &str,
        signed: bool,
        linked_project_id: Option<&str>,
    ) {
        let detail = AgreementDetail {
            id: AgreementId(id.to_string()),
            name: name.to_string(),
            counterparty: counterparty.to_string(),
            status: if signed { AgreementStatus::Signed } else { AgreementStatus::Draft },
            current_version: 1,
            linked_project_id: linked_project_id.map(|value| ProjectId(value.to_string())),
            updated_at: Utc::now(),
        };
        self.with_state(|state| {
            state.agreements.insert(id.to_string(), detail);
        });
    }

    /// Every version created so far, in creation order. Test observability.
    pub fn agreement_versions(&self) -> Vec<AgreementVersion> {
        self.with_state(|state| state.agreement_versions.clone())
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut InMemoryState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => apply(&mut state),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl DomainService for InMemoryDomainService {
    async fn project_detail(&self, id: &ProjectId) -> Result<ProjectDetail, DomainServiceError> {
        self.with_state(|state| {
            let mut detail = state
                .projects
                .get(&id.0)
                .cloned()
                .ok_or_else(|| DomainServiceError::not_found("project", &id.0))?;
            detail.wbs_item_count =
                state.wbs_items.get(&id.0).map(|items| items.len()).unwrap_or(0);
            Ok(detail)
        })
    }

    async fn list_roles(&self) -> Result<Vec<RoleSummary>, DomainServiceError> {
        Ok(self.with_state(|state| state.roles.clone()))
    }

    async fn list_wbs_items(
        &self,
        project: &ProjectId,
    ) -> Result<Vec<WbsItem>, DomainServiceError> {
        self.with_state(|state| {
            if !state.projects.contains_key(&project.0) {
                return Err(DomainServiceError::not_found("project", &project.0));
            }
            Ok(state.wbs_items.get(&project.0).cloned().unwrap_or_default())
        })
    }

    async fn upsert_wbs_items(
        &self,
        project: &ProjectId,
        drafts: Vec<WbsItemDraft>,
    ) -> Result<Vec<WbsItem>, DomainServiceError> {
        if drafts.is_empty() {
            return Err(DomainServiceError::Validation(
                "at least one WBS row is required".to_string(),
            ));
        }
        for draft in &drafts {
            if draft.title.trim().is_empty() {
                return Err(DomainServiceError::Validation(
                    "WBS row title must not be empty".to_string(),
                ));
            }
            if draft.estimated_hours < 0.0 {
                return Err(DomainServiceError::Validation(format!(
                    "WBS row `{}` has negative estimated hours",
                    draft.title
                )));
            }
        }

        self.with_state(|state| {
            if !state.projects.contains_key(&project.0) {
                return Err(DomainServiceError::not_found("project", &project.0));
            }
            let now = Utc::now();
            let items = state.wbs_items.entry(project.0.clone()).or_default();
            let mut written = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let id = draft
                    .id
                    .clone()
                    .unwrap_or_else(|| WbsItemId(Uuid::new_v4().to_string()));
                let item = WbsItem {
                    id: id.clone(),
                    project_id: project.clone(),
                    title: draft.title,
                    description: draft.description,
                    role_id: draft.role_id,
                    estimated_hours: draft.estimated_hours,
                    updated_at: now,
                };
                match items.iter_mut().find(|existing| existing.id == id) {
                    Some(existing) => *existing = item.clone(),
                    None => items.push(item.clone()),
                }
                written.push(item);
            }
            Ok(written)
        })
    }

    async fn update_project_stage(
        &self,
        project: &ProjectId,
        stage: Stage,
    ) -> Result<ProjectDetail, DomainServiceError> {
        self.with_state(|state| {
            let detail = state
                .projects
                .get_mut(&project.0)
                .ok_or_else(|| DomainServiceError::not_found("project", &project.0))?;
            detail.stage = stage;
            detail.updated_at = Utc::now();
            Ok(detail.clone())
        })
    }

    async fn quote_summary(
        &self,
        project: &ProjectId,
    ) -> Result<QuoteSummary, DomainServiceError> {
        self.with_state(|state| {
            if !state.projects.contains_key(&project.0) {
                return Err(DomainServiceError::not_found("project", &project.0));
            }
            let items = state.wbs_items.get(&project.0).cloned().unwrap_or_default();
            let rate_by_role: BTreeMap<&str, i64> = state
                .roles
                .iter()
                .map(|role| (role.id.0.as_str(), role.hourly_rate_cents))
                .collect();

            let mut total_hours = 0.0;
            let mut total_amount_cents = 0i64;
            for item in &items {
                total_hours += item.estimated_hours;
                let rate = item
                    .role_id
                    .as_ref()
                    .and_then(|role| rate_by_role.get(role.0.as_str()).copied())
                    .unwrap_or(0);
                total_amount_cents += (item.estimated_hours * rate as f64).round() as i64;
            }

            Ok(QuoteSummary {
                project_id: project.clone(),
                total_hours,
                total_amount_cents,
                currency: "USD".to_string(),
                line_count: items.len(),
            })
        })
    }

    async fn agreement_detail(
        &self,
        id: &AgreementId,
    ) -> Result<AgreementDetail, DomainServiceError> {
        self.with_state(|state| {
            state
                .agreements
                .get(&id.0)
                .cloned()
                .ok_or_else(|| DomainServiceError::not_found("agreement", &id.0))
        })
    }

    async fn list_agreements(&self) -> Result<Vec<AgreementDetail>, DomainServiceError> {
        Ok(self.with_state(|state| state.agreements.values().cloned().collect()))
    }

    async fn create_agreement_version(
        &self,
        id: &AgreementId,
        change_summary: String,
    ) -> Result<AgreementVersion, DomainServiceError> {
        if change_summary.trim().is_empty() {
            return Err(DomainServiceError::Validation(
                "a change summary is required for a new agreement version".to_string(),
            ));
        }
        self.with_state(|state| {
            let detail = state
                .agreements
                .get_mut(&id.0)
                .ok_or_else(|| DomainServiceError::not_found("agreement", &id.0))?;
            if detail.status.is_read_only() {
                return Err(DomainServiceError::Validation(format!(
                    "agreement {} is {:?} and cannot take new versions",
                    detail.id.0, detail.status
                )));
            }
            detail.current_version += 1;
            detail.updated_at = Utc::now();
            let version = AgreementVersion {
                id: AgreementVersionId(Uuid::new_v4().to_string()),
                agreement_id: detail.id.clone(),
                version: detail.current_version,
                change_summary,
                created_at: detail.updated_at,
            };
            state.agreement_versions.push(version.clone());
            Ok(version)
        })
    }
}
