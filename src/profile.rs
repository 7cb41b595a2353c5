//! Profile constraint overlay engine.
//!
//! Runs only the invariant rules declared by the active overlay: required
//! extension presence, regex-based format validators, and cross-field coding
//! rules. Each rule carries a declared severity; in non-strict mode every
//! overlay-sourced issue is capped at warning, in strict mode the declared
//! severity (including error and fatal) is honored.

use serde_json::Value as JsonValue;

use crate::resolver::{CompiledInvariant, EffectiveSchema};
use crate::schema::InvariantRule;
use crate::types::{IssueStage, Severity, ValidationIssue};

/// Evaluate the overlay invariants of the effective schema.
pub fn check(document: &JsonValue, schema: &EffectiveSchema) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for invariant in &schema.invariants {
        check_invariant(document, invariant, schema.strict, &mut issues);
    }
    issues
}

fn push(
    issues: &mut Vec<ValidationIssue>,
    strict: bool,
    severity: Severity,
    code: &str,
    details: String,
    location: String,
) {
    let severity = if strict {
        severity
    } else {
        severity.capped_at(Severity::Warning)
    };
    issues.push(ValidationIssue::new(
        severity,
        code,
        details,
        Some(location),
        IssueStage::Profile,
    ));
}

fn check_invariant(
    document: &JsonValue,
    invariant: &CompiledInvariant,
    strict: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    match &invariant.rule {
        InvariantRule::RequiredExtension {
            url,
            severity,
            code,
            details,
        } => {
            if !has_extension(document, url) {
                push(
                    issues,
                    strict,
                    *severity,
                    code,
                    format!("{details} ({url})"),
                    "extension".to_string(),
                );
            }
        }
        InvariantRule::FieldFormat {
            field,
            severity,
            code,
            details,
            ..
        } => {
            // Compiled at resolve time; a rule without a pattern never got
            // through load validation.
            let Some(pattern) = &invariant.pattern else {
                return;
            };
            for (location, value) in string_occurrences(document, field) {
                if !pattern.is_match(&value) {
                    push(
                        issues,
                        strict,
                        *severity,
                        code,
                        format!("{details}: '{value}'"),
                        location,
                    );
                }
            }
        }
        InvariantRule::CodeSystemRequired {
            field,
            system,
            severity,
            code,
            details,
        } => {
            for (location, coding_system) in coding_systems(document, field) {
                if coding_system.as_deref() != Some(system.as_str()) {
                    push(
                        issues,
                        strict,
                        *severity,
                        code,
                        format!("{details} (expected system {system})"),
                        location,
                    );
                }
            }
        }
    }
}

fn has_extension(document: &JsonValue, url: &str) -> bool {
    document
        .get("extension")
        .and_then(JsonValue::as_array)
        .is_some_and(|extensions| {
            extensions
                .iter()
                .any(|ext| ext.get("url").and_then(JsonValue::as_str) == Some(url))
        })
}

/// String occurrences of a dotted field path, traversing arrays at each
/// segment. `identifier.value` yields every `identifier[i].value`.
fn string_occurrences(document: &JsonValue, path: &str) -> Vec<(String, String)> {
    let mut current: Vec<(String, &JsonValue)> = vec![(String::new(), document)];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for (location, value) in current {
            let Some(child) = value.get(segment) else {
                continue;
            };
            let child_location = if location.is_empty() {
                segment.to_string()
            } else {
                format!("{location}.{segment}")
            };
            match child {
                JsonValue::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        next.push((format!("{child_location}[{i}]"), item));
                    }
                }
                other => next.push((child_location, other)),
            }
        }
        current = next;
    }
    current
        .into_iter()
        .filter_map(|(location, value)| {
            value.as_str().map(|s| (location, s.to_string()))
        })
        .collect()
}

/// Coding systems found under a field: direct Coding objects and
/// CodeableConcept `coding` arrays, traversing repeating fields.
fn coding_systems(document: &JsonValue, field: &str) -> Vec<(String, Option<String>)> {
    let occurrences: Vec<(String, &JsonValue)> = match document.get(field) {
        None => return Vec::new(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (format!("{field}[{i}]"), item))
            .collect(),
        Some(other) => vec![(field.to_string(), other)],
    };

    let mut systems = Vec::new();
    for (location, value) in occurrences {
        if let Some(codings) = value.get("coding").and_then(JsonValue::as_array) {
            for (i, coding) in codings.iter().enumerate() {
                systems.push((
                    format!("{location}.coding[{i}].system"),
                    coding
                        .get("system")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string),
                ));
            }
        } else if value.get("code").is_some() {
            systems.push((
                format!("{location}.system"),
                value
                    .get("system")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
            ));
        }
    }
    systems
}
