//! Structural validation: presence, cardinality, datatype and pattern checks
//! against an effective schema.
//!
//! This stage is a pure synchronous computation over the immutable document
//! and schema; it performs no lookups and no I/O.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

use crate::resolver::{EffectiveField, EffectiveSchema};
use crate::types::{IssueStage, Severity, ValidationIssue};

/// Infrastructure members every resource may carry without being declared
/// field-by-field.
const BASE_MEMBERS: &[&str] = &[
    "resourceType",
    "id",
    "meta",
    "extension",
    "text",
    "implicitRules",
    "language",
];

fn issue(
    severity: Severity,
    code: &str,
    details: String,
    location: Option<String>,
) -> ValidationIssue {
    ValidationIssue::new(severity, code, details, location, IssueStage::Structure)
}

/// Root well-formedness: the document must be a JSON object with a string
/// `resourceType` matching the expected type. Fatal issues here stop the
/// descent.
fn check_root<'a>(
    document: &'a JsonValue,
    expected_type: &str,
) -> std::result::Result<&'a Map<String, JsonValue>, Vec<ValidationIssue>> {
    let obj = match document.as_object() {
        Some(obj) => obj,
        None => {
            return Err(vec![issue(
                Severity::Fatal,
                "invalid-format",
                "Resource must be a JSON object".to_string(),
                None,
            )]);
        }
    };

    let resource_type = match obj.get("resourceType") {
        Some(value) => value,
        None => {
            return Err(vec![issue(
                Severity::Fatal,
                "missing-resource-type",
                "Resource must have a resourceType field".to_string(),
                Some("resourceType".to_string()),
            )]);
        }
    };

    let resource_type = match resource_type.as_str() {
        Some(s) => s,
        None => {
            return Err(vec![issue(
                Severity::Error,
                "invalid-resource-type",
                "resourceType must be a string".to_string(),
                Some("resourceType".to_string()),
            )]);
        }
    };

    if resource_type != expected_type {
        return Err(vec![issue(
            Severity::Fatal,
            "resource-type-mismatch",
            format!("Expected resourceType '{expected_type}', got '{resource_type}'"),
            Some("resourceType".to_string()),
        )]);
    }

    Ok(obj)
}

/// Check a document against its effective schema.
pub fn check(
    document: &JsonValue,
    schema: &EffectiveSchema,
    expected_type: &str,
) -> Vec<ValidationIssue> {
    let obj = match check_root(document, expected_type) {
        Ok(obj) => obj,
        Err(issues) => return issues,
    };

    let mut issues = Vec::new();
    check_object(obj, &schema.fields, "", schema.strict, &mut issues);
    issues
}

/// Minimal fallback check for documents whose resource type has no loaded
/// schema definition. One informational issue records that fallback
/// validation was used.
pub fn check_fallback(document: &JsonValue, expected_type: &str) -> Vec<ValidationIssue> {
    if let Err(issues) = check_root(document, expected_type) {
        return issues;
    }
    vec![issue(
        Severity::Information,
        "unknown-resource-type",
        format!(
            "Resource type '{expected_type}' not found in loaded definitions (using fallback validation)"
        ),
        Some("resourceType".to_string()),
    )]
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_object(
    obj: &Map<String, JsonValue>,
    fields: &HashMap<String, EffectiveField>,
    prefix: &str,
    strict: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    for (name, field) in fields {
        let location = join(prefix, name);
        // Presence/cardinality constraints promoted by the overlay follow
        // the strictness cap; base-schema constraints always fail hard.
        let constraint_severity = if field.from_overlay && !strict {
            Severity::Error.capped_at(Severity::Warning)
        } else {
            Severity::Error
        };
        match obj.get(name) {
            None => {
                if field.required || field.cardinality.min >= 1 {
                    issues.push(issue(
                        constraint_severity,
                        "missing-required-field",
                        format!("Missing required field '{name}'"),
                        Some(location),
                    ));
                }
            }
            Some(JsonValue::Array(items)) => {
                if !field.cardinality.allows_repetition() {
                    issues.push(issue(
                        constraint_severity,
                        "unexpected-array",
                        format!("Field '{name}' does not repeat but was given as an array"),
                        Some(location),
                    ));
                    continue;
                }
                let count = items.len() as u32;
                if !field.cardinality.contains(count) {
                    issues.push(issue(
                        constraint_severity,
                        "cardinality-violation",
                        format!(
                            "Field '{name}' has {count} occurrence(s), allowed {}",
                            field.cardinality
                        ),
                        Some(location.clone()),
                    ));
                }
                for (index, item) in items.iter().enumerate() {
                    check_value(item, field, &format!("{location}[{index}]"), strict, issues);
                }
            }
            Some(value) => {
                if field.cardinality.allows_repetition() {
                    issues.push(issue(
                        constraint_severity,
                        "expected-array",
                        format!("Field '{name}' repeats and must be given as an array"),
                        Some(location),
                    ));
                    continue;
                }
                check_value(value, field, &location, strict, issues);
            }
        }
    }

    for name in obj.keys() {
        if !fields.contains_key(name.as_str()) && !BASE_MEMBERS.contains(&name.as_str()) {
            issues.push(issue(
                Severity::Warning,
                "unknown-field",
                format!("Field '{name}' is not declared by the schema"),
                Some(join(prefix, name)),
            ));
        }
    }
}

fn check_value(
    value: &JsonValue,
    field: &EffectiveField,
    location: &str,
    strict: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    if !field.kind.matches(value) {
        issues.push(issue(
            Severity::Error,
            "invalid-field-type",
            format!("Expected {} value", field.kind.name()),
            Some(location.to_string()),
        ));
        return;
    }

    if let (Some(pattern), Some(s)) = (&field.pattern, value.as_str())
        && !pattern.is_match(s)
    {
        issues.push(issue(
            Severity::Error,
            "pattern-mismatch",
            format!("Value '{s}' does not match pattern '{pattern}'"),
            Some(location.to_string()),
        ));
    }

    if let Some(obj) = value.as_object()
        && !field.fields.is_empty()
    {
        check_object(obj, &field.fields, location, strict, issues);
    }
}
