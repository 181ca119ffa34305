use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Business context that scopes which tools the model may see and call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Estimates,
    Contracts,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Agreement,
}

/// Lifecycle phase of an estimate project. Declaration order is the gating
/// order: a tool gated at `Effort` is blocked while the project is still in
/// any earlier stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Artifacts,
    BusinessCase,
    Requirements,
    Solution,
    Effort,
    Quote,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Artifacts,
        Stage::BusinessCase,
        Stage::Requirements,
        Stage::Solution,
        Stage::Effort,
        Stage::Quote,
    ];

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|stage| stage == self).unwrap_or(0)
    }

    pub fn has_reached(&self, required: Stage) -> bool {
        self.index() >= required.index()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Artifacts => "Artifacts",
            Stage::BusinessCase => "Business Case",
            Stage::Requirements => "Requirements",
            Stage::Solution => "Solution",
            Stage::Effort => "Effort",
            Stage::Quote => "Quote",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowParseError {
    #[error("unsupported workflow `{0}` (expected estimates|contracts)")]
    UnknownWorkflow(String),
    #[error("unsupported entity type `{0}` (expected project|agreement)")]
    UnknownEntityType(String),
    #[error("unsupported stage `{0}`")]
    UnknownStage(String),
}

impl std::str::FromStr for Workflow {
    type Err = WorkflowParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "estimates" => Ok(Self::Estimates),
            "contracts" => Ok(Self::Contracts),
            other => Err(WorkflowParseError::UnknownWorkflow(other.to_string())),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = WorkflowParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "agreement" => Ok(Self::Agreement),
            other => Err(WorkflowParseError::UnknownEntityType(other.to_string())),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = WorkflowParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace([' ', '_'], "").as_str() {
            "artifacts" => Ok(Self::Artifacts),
            "businesscase" => Ok(Self::BusinessCase),
            "requirements" => Ok(Self::Requirements),
            "solution" => Ok(Self::Solution),
            "effort" => Ok(Self::Effort),
            "quote" => Ok(Self::Quote),
            other => Err(WorkflowParseError::UnknownStage(other.to_string())),
        }
    }
}

/// Per-request context. Immutable for the duration of one runtime invocation;
/// the runtime resolves it once from the inbound request plus domain lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    pub workflow: Workflow,
    pub entity_id: Option<String>,
    pub entity_type: Option<EntityType>,
    pub stage: Option<Stage>,
    pub read_only: bool,
}

impl ExecutionContext {
    pub fn new(workflow: Workflow) -> Self {
        Self { workflow, entity_id: None, entity_type: None, stage: None, read_only: false }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>, entity_type: EntityType) -> Self {
        self.entity_id = Some(entity_id.into());
        self.entity_type = Some(entity_type);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Non-strict boundary: a context at exactly the required stage passes.
    pub fn stage_allows(&self, required: Option<Stage>) -> bool {
        match (required, self.stage) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(required_stage), Some(current)) => current.has_reached(required_stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::workflow::{EntityType, ExecutionContext, Stage, Workflow};

    #[test]
    fn stages_are_strictly_ordered() {
        let mut previous: Option<Stage> = None;
        for stage in Stage::ALL {
            if let Some(earlier) = previous {
                assert!(earlier < stage, "{earlier:?} must precede {stage:?}");
            }
            previous = Some(stage);
        }
    }

    #[test]
    fn equal_stage_satisfies_gate() {
        assert!(Stage::Effort.has_reached(Stage::Effort));
        assert!(Stage::Quote.has_reached(Stage::Effort));
        assert!(!Stage::Solution.has_reached(Stage::Effort));
    }

    #[test]
    fn stage_gate_passes_when_tool_is_ungated_or_context_is_stageless() {
        let stageless = ExecutionContext::new(Workflow::Contracts).with_entity(
            "AGR-100",
            EntityType::Agreement,
        );
        assert!(stageless.stage_allows(Some(Stage::Effort)));

        let early = ExecutionContext::new(Workflow::Estimates)
            .with_entity("PRJ-100", EntityType::Project)
            .with_stage(Stage::Artifacts);
        assert!(early.stage_allows(None));
        assert!(!early.stage_allows(Some(Stage::Effort)));
    }

    #[test]
    fn workflow_and_entity_type_parse_case_insensitively() {
        assert_eq!("Estimates".parse::<Workflow>(), Ok(Workflow::Estimates));
        assert_eq!("contracts".parse::<Workflow>(), Ok(Workflow::Contracts));
        assert_eq!("Project".parse::<EntityType>(), Ok(EntityType::Project));
        assert!("billing".parse::<Workflow>().is_err());
    }
}
