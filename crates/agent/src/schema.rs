use serde_json::Value;

/// One structured validation finding, addressed by JSON-pointer-ish path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

/// Validate a parsed argument value against the subset of JSON Schema the
/// tool catalog uses: `type`, `properties`, `required`, `items`, `enum`,
/// `minimum`. Returns every finding rather than stopping at the first, so
/// the model sees the full issue list at once.
pub fn validate(value: &Value, schema: &Value) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();
    validate_at(value, schema, "$", &mut issues);
    issues
}

fn validate_at(value: &Value, schema: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(value, expected) {
            issues.push(SchemaIssue::new(
                path,
                format!("expected {expected}, got {}", type_name(value)),
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let rendering = allowed
                .iter()
                .map(|candidate| candidate.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            issues.push(SchemaIssue::new(path, format!("must be one of: {rendering}")));
        }
    }

    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
        if let Some(number) = value.as_f64() {
            if number < minimum {
                issues.push(SchemaIssue::new(path, format!("must be at least {minimum}")));
            }
        }
    }

    if let Value::Object(object) = value {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    issues.push(SchemaIssue::new(
                        format!("{path}.{key}"),
                        "required property is missing",
                    ));
                }
            }
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, property_schema) in properties {
                if let Some(property_value) = object.get(key) {
                    validate_at(property_value, property_schema, &format!("{path}.{key}"), issues);
                }
            }
        }
    }

    if let (Value::Array(elements), Some(item_schema)) = (value, schema.get("items")) {
        for (index, element) in elements.iter().enumerate() {
            validate_at(element, item_schema, &format!("{path}[{index}]"), issues);
        }
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render an issue list the way tool-result details expect it.
pub fn render_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.path, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::schema::{render_issues, validate};

    fn wbs_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["projectId", "items"],
            "properties": {
                "projectId": { "type": "string" },
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["title", "estimatedHours"],
                        "properties": {
                            "title": { "type": "string" },
                            "estimatedHours": { "type": "number", "minimum": 0 },
                        },
                    },
                },
            },
        })
    }

    #[test]
    fn valid_document_produces_no_issues() {
        let value = json!({
            "projectId": "PRJ-1001",
            "items": [{ "title": "Discovery", "estimatedHours": 12.5 }],
        });
        assert!(validate(&value, &wbs_schema()).is_empty());
    }

    #[test]
    fn missing_required_properties_are_all_reported() {
        let issues = validate(&json!({}), &wbs_schema());
        let paths: Vec<&str> = issues.iter().map(|issue| issue.path.as_str()).collect();
        assert!(paths.contains(&"$.projectId"));
        assert!(paths.contains(&"$.items"));
    }

    #[test]
    fn nested_array_issues_carry_element_paths() {
        let value = json!({
            "projectId": "PRJ-1001",
            "items": [
                { "title": "ok", "estimatedHours": 1 },
                { "title": 42, "estimatedHours": -3 },
            ],
        });
        let issues = validate(&value, &wbs_schema());
        let rendered = render_issues(&issues);
        assert!(rendered.contains("$.items[1].title"));
        assert!(rendered.contains("$.items[1].estimatedHours"));
        assert!(!rendered.contains("$.items[0]"));
    }

    #[test]
    fn type_mismatch_stops_descent_into_that_branch() {
        let issues = validate(&json!({"projectId": 9, "items": "nope"}), &wbs_schema());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|issue| issue.message.starts_with("expected")));
    }

    #[test]
    fn enum_and_minimum_are_enforced() {
        let schema = json!({
            "type": "object",
            "properties": {
                "stage": { "type": "string", "enum": ["Artifacts", "Effort"] },
                "count": { "type": "integer", "minimum": 1 },
            },
        });
        let issues = validate(&json!({"stage": "Unknown", "count": 0}), &schema);
        assert_eq!(issues.len(), 2);
    }
}
