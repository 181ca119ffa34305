use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use scopecraft_core::workflow::ExecutionContext;

use crate::registry::{ToolName, ToolOutput};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SideEffectError(pub String);

/// Secondary action that runs after a tool succeeds. Implementations return
/// an optional user-visible note; failures are contained by the runner and
/// never reach the primary tool result.
#[async_trait]
pub trait SideEffect: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        input: &Value,
        output: &ToolOutput,
        context: &ExecutionContext,
    ) -> Result<Option<String>, SideEffectError>;
}

/// What the executor appends to the transcript for one side-effect run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SideEffectOutcome {
    Note { handler: &'static str, note: String },
    Silent { handler: &'static str },
    Failed { handler: &'static str, error: String },
}

/// Declarative per-tool side-effect registration, assembled at startup.
#[derive(Default)]
pub struct SideEffectRegistry {
    handlers: HashMap<ToolName, Vec<Arc<dyn SideEffect>>>,
}

impl SideEffectRegistry {
    pub fn register(mut self, tool: ToolName, handler: Arc<dyn SideEffect>) -> Self {
        self.handlers.entry(tool).or_default().push(handler);
        self
    }

    pub fn handlers_for(&self, tool: ToolName) -> &[Arc<dyn SideEffect>] {
        self.handlers.get(&tool).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run every handler registered for `tool` in registration order. Each
    /// handler is isolated: a failure is reported as an outcome and the
    /// remaining handlers still run.
    pub async fn run_all(
        &self,
        tool: ToolName,
        input: &Value,
        output: &ToolOutput,
        context: &ExecutionContext,
    ) -> Vec<SideEffectOutcome> {
        let mut outcomes = Vec::new();
        for handler in self.handlers_for(tool) {
            match handler.run(input, output, context).await {
                Ok(Some(note)) => {
                    outcomes.push(SideEffectOutcome::Note { handler: handler.name(), note });
                }
                Ok(None) => outcomes.push(SideEffectOutcome::Silent { handler: handler.name() }),
                Err(error) => {
                    warn!(
                        tool = tool.internal(),
                        handler = handler.name(),
                        error = %error,
                        "side effect failed; primary tool result is unaffected"
                    );
                    outcomes.push(SideEffectOutcome::Failed {
                        handler: handler.name(),
                        error: error.to_string(),
                    });
                }
            }
        }
        outcomes
    }
}
