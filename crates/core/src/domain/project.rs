use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::Stage;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WbsItemId(pub String);

/// Summary view of an estimate project as the tool catalog exposes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub id: ProjectId,
    pub name: String,
    pub client_name: String,
    pub stage: Stage,
    pub currency: String,
    pub wbs_item_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Delivery role available for effort estimation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub id: RoleId,
    pub name: String,
    pub hourly_rate_cents: i64,
}

/// One work-breakdown-structure row of an estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WbsItem {
    pub id: WbsItemId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub role_id: Option<RoleId>,
    pub estimated_hours: f64,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied WBS row content; ids and timestamps are assigned by the
/// domain service on upsert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WbsItemDraft {
    pub id: Option<WbsItemId>,
    pub title: String,
    pub description: Option<String>,
    pub role_id: Option<RoleId>,
    pub estimated_hours: f64,
}

/// Rolled-up quote numbers for a project, derived from its WBS and roles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub project_id: ProjectId,
    pub total_hours: f64,
    pub total_amount_cents: i64,
    pub currency: String,
    pub line_count: usize,
}
