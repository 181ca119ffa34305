pub mod audit;
pub mod config;
pub mod domain;
pub mod logging;
pub mod workflow;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NullAuditSink,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmConfig, LoadOptions, LogFormat};
pub use domain::agreement::{
    AgreementDetail, AgreementId, AgreementStatus, AgreementVersion, AgreementVersionId,
};
pub use domain::project::{
    ProjectDetail, ProjectId, QuoteSummary, RoleId, RoleSummary, WbsItem, WbsItemDraft, WbsItemId,
};
pub use domain::service::{DomainService, DomainServiceError, InMemoryDomainService};
pub use workflow::{EntityType, ExecutionContext, Stage, Workflow, WorkflowParseError};
