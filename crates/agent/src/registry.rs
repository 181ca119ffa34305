use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use scopecraft_core::domain::service::DomainServiceError;
use scopecraft_core::workflow::Stage;

use crate::llm::ProviderTool;

/// Closed catalog of internal tool identifiers. The dotted string form is
/// what guardrails and logs speak; the provider never sees it directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolName {
    EstimatesGetProjectDetail,
    EstimatesListWbsItems,
    EstimatesGenerateWbsItems,
    EstimatesUpdateStage,
    RolesList,
    QuoteGetSummary,
    QuoteDraft,
    ContractsGetAgreement,
    ContractsListAgreements,
    ContractsCreateVersion,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        ToolName::EstimatesGetProjectDetail,
        ToolName::EstimatesListWbsItems,
        ToolName::EstimatesGenerateWbsItems,
        ToolName::EstimatesUpdateStage,
        ToolName::RolesList,
        ToolName::QuoteGetSummary,
        ToolName::QuoteDraft,
        ToolName::ContractsGetAgreement,
        ToolName::ContractsListAgreements,
        ToolName::ContractsCreateVersion,
    ];

    pub fn internal(&self) -> &'static str {
        match self {
            ToolName::EstimatesGetProjectDetail => "estimates.getProjectDetail",
            ToolName::EstimatesListWbsItems => "estimates.listWbsItems",
            ToolName::EstimatesGenerateWbsItems => "estimates.generateWbsItems",
            ToolName::EstimatesUpdateStage => "estimates.updateStage",
            ToolName::RolesList => "roles.list",
            ToolName::QuoteGetSummary => "quote.getSummary",
            ToolName::QuoteDraft => "quote.draftQuote",
            ToolName::ContractsGetAgreement => "contracts.getAgreement",
            ToolName::ContractsListAgreements => "contracts.listAgreements",
            ToolName::ContractsCreateVersion => "contracts.createVersion",
        }
    }

    /// Provider-facing name: every character outside `[A-Za-z0-9_-]`
    /// replaced with `_`.
    pub fn provider_safe(&self) -> String {
        sanitize_provider_name(self.internal())
    }
}

pub fn sanitize_provider_name(internal: &str) -> String {
    internal
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '_' | '-') {
                character
            } else {
                '_'
            }
        })
        .collect()
}

/// Which context value a tool implicitly receives when the model omits it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextDefault {
    ProjectId,
    AgreementId,
}

impl ContextDefault {
    pub fn argument_key(&self) -> &'static str {
        match self {
            ContextDefault::ProjectId => "projectId",
            ContextDefault::AgreementId => "agreementId",
        }
    }
}

/// Static behavior flags consulted by guardrails and the executor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToolOptions {
    pub throttled: bool,
    pub refresh_on_success: bool,
    pub min_stage: Option<Stage>,
    pub context_default: Option<ContextDefault>,
}

/// Primary output of a tool handler before normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub raw: Option<Value>,
    pub finish_reason: Option<String>,
}

impl ToolOutput {
    pub fn json(value: Value) -> Self {
        Self { content: value.to_string(), raw: Some(value), finish_reason: None }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), raw: None, finish_reason: None }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolHandlerError {
    #[error(transparent)]
    Domain(#[from] DomainServiceError),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("tool execution failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError>;
}

pub struct ToolDefinition {
    pub name: ToolName,
    pub description: String,
    pub parameters: Value,
    pub options: ToolOptions,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(
        name: ToolName,
        description: impl Into<String>,
        parameters: Value,
        options: ToolOptions,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self { name, description: description.into(), parameters, options, handler }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` registered twice")]
    DuplicateTool(&'static str),
    #[error("provider-safe name `{provider_safe}` collides: `{first}` vs `{second}`")]
    ProviderNameCollision { provider_safe: String, first: &'static str, second: &'static str },
}

/// Immutable tool catalog built once at startup. Holds the forward map from
/// identifier to definition and the precomputed reverse map from
/// provider-safe name back to identifier.
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, ToolDefinition>,
    reverse: HashMap<String, ToolName>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("reverse", &self.reverse)
            .finish()
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, definition: ToolDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut tools = BTreeMap::new();
        let mut reverse: HashMap<String, ToolName> = HashMap::new();

        for definition in self.definitions {
            let name = definition.name;
            let provider_safe = name.provider_safe();
            if tools.contains_key(&name) {
                return Err(RegistryError::DuplicateTool(name.internal()));
            }
            if let Some(existing) = reverse.get(&provider_safe) {
                return Err(RegistryError::ProviderNameCollision {
                    provider_safe,
                    first: existing.internal(),
                    second: name.internal(),
                });
            }
            reverse.insert(provider_safe, name);
            tools.insert(name, definition);
        }

        Ok(ToolRegistry { tools, reverse })
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: ToolName) -> Option<&ToolDefinition> {
        self.tools.get(&name)
    }

    pub fn resolve(&self, provider_safe: &str) -> Option<ToolName> {
        self.reverse.get(provider_safe).copied()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = ToolName> + '_ {
        self.tools.keys().copied()
    }

    /// Provider-facing list restricted to the allowed set for the active
    /// workflow and read-only mode.
    pub fn provider_tools(&self, allowed: &BTreeSet<ToolName>) -> Vec<ProviderTool> {
        self.tools
            .values()
            .filter(|definition| allowed.contains(&definition.name))
            .map(|definition| ProviderTool {
                name: definition.name.provider_safe(),
                description: definition.description.clone(),
                parameters: definition.parameters.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::registry::{
        sanitize_provider_name, ToolDefinition, ToolHandler, ToolHandlerError, ToolName,
        ToolOptions, ToolOutput, ToolRegistry,
    };

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolHandlerError> {
            Ok(ToolOutput::json(arguments))
        }
    }

    fn definition(name: ToolName) -> ToolDefinition {
        ToolDefinition::new(
            name,
            format!("test entry for {}", name.internal()),
            json!({"type": "object", "properties": {}}),
            ToolOptions::default(),
            Arc::new(EchoHandler),
        )
    }

    #[test]
    fn provider_safe_names_round_trip_for_full_catalog() {
        let mut builder = ToolRegistry::builder();
        for name in ToolName::ALL {
            builder = builder.register(definition(name));
        }
        let registry = builder.build().expect("full catalog must build");

        for name in ToolName::ALL {
            let provider_safe = name.provider_safe();
            assert_eq!(
                registry.resolve(&provider_safe),
                Some(name),
                "{provider_safe} must resolve back to {}",
                name.internal()
            );
        }
    }

    #[test]
    fn sanitization_replaces_only_disallowed_characters() {
        assert_eq!(sanitize_provider_name("estimates.getProjectDetail"), "estimates_getProjectDetail");
        assert_eq!(sanitize_provider_name("a.b:c/d-e_f"), "a_b_c_d-e_f");
        assert_eq!(sanitize_provider_name("plain_name-1"), "plain_name-1");
    }

    #[test]
    fn duplicate_registration_fails_fast() {
        let error = ToolRegistry::builder()
            .register(definition(ToolName::RolesList))
            .register(definition(ToolName::RolesList))
            .build()
            .expect_err("duplicate registration must fail");
        assert!(error.to_string().contains("roles.list"));
    }

    #[test]
    fn provider_tools_are_filtered_by_allowed_set() {
        let registry = ToolRegistry::builder()
            .register(definition(ToolName::RolesList))
            .register(definition(ToolName::QuoteDraft))
            .build()
            .expect("registry must build");

        let allowed = BTreeSet::from([ToolName::RolesList]);
        let provider_tools = registry.provider_tools(&allowed);
        assert_eq!(provider_tools.len(), 1);
        assert_eq!(provider_tools[0].name, "roles_list");
    }

    #[test]
    fn unknown_provider_name_does_not_resolve() {
        let registry = ToolRegistry::builder()
            .register(definition(ToolName::RolesList))
            .build()
            .expect("registry must build");
        assert_eq!(registry.resolve("made_up_tool"), None);
    }
}
