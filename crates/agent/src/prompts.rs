use scopecraft_core::workflow::{ExecutionContext, Workflow};

/// Build the system prompt for one request. The wording here is presentation
/// detail; the runtime only requires that a prompt exists per workflow.
pub fn system_prompt(context: &ExecutionContext, view: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are the Scopecraft assistant for a consulting delivery team. \
         Use the provided tools to read and update the team's data; never invent \
         project or agreement facts you have not fetched. Keep answers short and \
         concrete.",
    );

    match context.workflow {
        Workflow::Estimates => {
            prompt.push_str(
                "\n\nYou are working inside the estimates workflow: projects move through \
                 the stages Artifacts, Business Case, Requirements, Solution, Effort and \
                 Quote. Tools that mutate a project are only available once its stage is \
                 far enough along.",
            );
        }
        Workflow::Contracts => {
            prompt.push_str(
                "\n\nYou are working inside the contracts workflow: agreements are \
                 versioned documents. Signed agreements are read-only; propose a new \
                 version instead of editing in place.",
            );
        }
    }

    if let Some(entity_id) = &context.entity_id {
        prompt.push_str(&format!(
            "\n\nThe active entity is `{entity_id}`. Tool calls that omit an id refer to it."
        ));
    }
    if let Some(stage) = context.stage {
        prompt.push_str(&format!("\nIts current stage is {}.", stage.label()));
    }
    if context.read_only {
        prompt.push_str(
            "\n\nThis view is read-only: do not attempt mutations; explain what you would \
             change instead.",
        );
    }
    if let Some(view) = view {
        prompt.push_str(&format!("\nThe user is looking at the `{view}` view."));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use scopecraft_core::workflow::{EntityType, ExecutionContext, Stage, Workflow};

    use crate::prompts::system_prompt;

    #[test]
    fn prompt_mentions_workflow_entity_and_stage() {
        let context = ExecutionContext::new(Workflow::Estimates)
            .with_entity("PRJ-1002", EntityType::Project)
            .with_stage(Stage::Requirements);
        let prompt = system_prompt(&context, Some("wbs"));
        assert!(prompt.contains("estimates workflow"));
        assert!(prompt.contains("PRJ-1002"));
        assert!(prompt.contains("Requirements"));
        assert!(prompt.contains("`wbs` view"));
    }

    #[test]
    fn read_only_contexts_warn_against_mutation() {
        let context = ExecutionContext::new(Workflow::Contracts).read_only();
        assert!(system_prompt(&context, None).contains("read-only"));
    }
}
