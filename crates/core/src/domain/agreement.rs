use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::project::ProjectId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgreementId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgreementVersionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgreementStatus {
    Draft,
    InReview,
    Signed,
    Terminated,
}

impl AgreementStatus {
    /// Signed and terminated agreements only accept reads; every mutation
    /// goes through a new draft.
    pub fn is_read_only(&self) -> bool {
        matches!(self, AgreementStatus::Signed | AgreementStatus::Terminated)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgreementDetail {
    pub id: AgreementId,
    pub name: String,
    pub counterparty: String,
    pub status: AgreementStatus,
    pub current_version: u32,
    pub linked_project_id: Option<ProjectId>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgreementVersion {
    pub id: AgreementVersionId,
    pub agreement_id: AgreementId,
    pub version: u32,
    pub change_summary: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use crate::domain::agreement::AgreementStatus;

    #[test]
    fn signed_and_terminated_agreements_are_read_only() {
        assert!(!AgreementStatus::Draft.is_read_only());
        assert!(!AgreementStatus::InReview.is_read_only());
        assert!(AgreementStatus::Signed.is_read_only());
        assert!(AgreementStatus::Terminated.is_read_only());
    }
}
