//! Terminology binding validation.
//!
//! Coded fields carrying a binding reference are checked against the
//! flattened code set of the referenced value set. Binding strength decides
//! the severity of a miss: required bindings fail, extensible ones warn,
//! preferred and example ones inform. A binding whose value set cannot be
//! resolved from the snapshot is a configuration fault: logged, never a
//! per-document issue.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::warn;

use crate::registry::DefinitionSnapshot;
use crate::resolver::{EffectiveField, EffectiveSchema};
use crate::schema::Binding;
use crate::types::{IssueStage, Severity, ValidationIssue};

/// A code occurrence extracted from a document value.
struct ExtractedCode {
    system: Option<String>,
    code: String,
    location: String,
}

/// Check every bound field of the document. `check_value_sets` gates value
/// set membership, `check_code_systems` gates the coding well-formedness
/// sweep.
pub fn check(
    document: &JsonValue,
    schema: &EffectiveSchema,
    snapshot: &DefinitionSnapshot,
    check_code_systems: bool,
    check_value_sets: bool,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if check_value_sets
        && let Some(obj) = document.as_object()
    {
        check_fields(obj, &schema.fields, snapshot, "", &mut issues);
    }
    if check_code_systems {
        check_coding_shapes(document, "", &mut issues);
    }
    issues
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_fields(
    obj: &serde_json::Map<String, JsonValue>,
    fields: &HashMap<String, EffectiveField>,
    snapshot: &DefinitionSnapshot,
    prefix: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    for (name, field) in fields {
        let Some(value) = obj.get(name) else {
            continue;
        };
        let location = join(prefix, name);

        let occurrences: Vec<(String, &JsonValue)> = match value {
            JsonValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{location}[{i}]"), item))
                .collect(),
            other => vec![(location.clone(), other)],
        };

        for (occurrence_location, occurrence) in &occurrences {
            if let Some(binding) = &field.binding {
                check_binding(binding, occurrence, occurrence_location, snapshot, issues);
            }
            if !field.fields.is_empty()
                && let Some(nested) = occurrence.as_object()
            {
                check_fields(nested, &field.fields, snapshot, occurrence_location, issues);
            }
        }
    }
}

fn check_binding(
    binding: &Binding,
    value: &JsonValue,
    location: &str,
    snapshot: &DefinitionSnapshot,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(value_set) = snapshot.value_set(&binding.value_set) else {
        warn!(
            value_set = %binding.value_set,
            location,
            "bound value set is not loaded; skipping terminology check"
        );
        return;
    };

    for extracted in extract_codes(value, location) {
        if !value_set.contains(extracted.system.as_deref(), &extracted.code) {
            let severity = binding.strength.violation_severity();
            issues.push(ValidationIssue::new(
                severity,
                "code-not-in-value-set",
                format!(
                    "Code '{}' is not in value set '{}'",
                    extracted.code, binding.value_set
                ),
                Some(extracted.location),
                IssueStage::Terminology,
            ));
        }
    }
}

/// Pull code occurrences out of a bound value: a bare code string, a
/// Coding-shaped object, or a CodeableConcept-shaped object with a `coding`
/// array.
fn extract_codes(value: &JsonValue, location: &str) -> Vec<ExtractedCode> {
    match value {
        JsonValue::String(code) => vec![ExtractedCode {
            system: None,
            code: code.clone(),
            location: location.to_string(),
        }],
        JsonValue::Object(obj) => {
            if let Some(codings) = obj.get("coding").and_then(JsonValue::as_array) {
                codings
                    .iter()
                    .enumerate()
                    .filter_map(|(i, coding)| {
                        coding_code(coding, &format!("{location}.coding[{i}]"))
                    })
                    .collect()
            } else {
                coding_code(value, location).into_iter().collect()
            }
        }
        _ => Vec::new(),
    }
}

fn coding_code(value: &JsonValue, location: &str) -> Option<ExtractedCode> {
    let obj = value.as_object()?;
    let code = obj.get("code")?.as_str()?;
    Some(ExtractedCode {
        system: obj
            .get("system")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        code: code.to_string(),
        location: location.to_string(),
    })
}

/// Well-formedness sweep: every Coding-shaped object anywhere in the tree
/// must carry a non-empty string system and code.
fn check_coding_shapes(value: &JsonValue, path: &str, issues: &mut Vec<ValidationIssue>) {
    match value {
        JsonValue::Object(obj) => {
            if obj.contains_key("system") && obj.contains_key("code") {
                if !obj.get("system").is_some_and(is_nonempty_string) {
                    issues.push(ValidationIssue::new(
                        Severity::Warning,
                        "invalid-coding-system",
                        "Coding system must be a valid URI".to_string(),
                        Some(join(path, "system")),
                        IssueStage::Terminology,
                    ));
                }
                if !obj.get("code").is_some_and(is_nonempty_string) {
                    issues.push(ValidationIssue::new(
                        Severity::Warning,
                        "invalid-coding-code",
                        "Coding code must be a non-empty string".to_string(),
                        Some(join(path, "code")),
                        IssueStage::Terminology,
                    ));
                }
            }
            for (key, child) in obj {
                check_coding_shapes(child, &join(path, key), issues);
            }
        }
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let indexed = if path.is_empty() {
                    format!("[{i}]")
                } else {
                    format!("{path}[{i}]")
                };
                check_coding_shapes(item, &indexed, issues);
            }
        }
        _ => {}
    }
}

fn is_nonempty_string(value: &JsonValue) -> bool {
    value.as_str().is_some_and(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DefinitionRegistry, MemoryDefinitionSource, RawDefinition};
    use crate::resolver::SchemaResolver;
    use crate::schema::{
        BindingStrength, Cardinality, CodeGroup, FieldDefinition, FieldKind, SchemaDefinition,
        ValueSet,
    };
    use serde_json::json;
    use std::sync::Arc;

    const GENDER_VS: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";
    const MARITAL_VS: &str = "http://hl7.org/fhir/ValueSet/marital-status";

    async fn fixtures(strength: BindingStrength) -> (Arc<DefinitionRegistry>, Arc<EffectiveSchema>) {
        let mut fields = HashMap::new();
        fields.insert(
            "gender".to_string(),
            FieldDefinition::new(FieldKind::Code, Cardinality::optional())
                .with_binding(GENDER_VS, strength),
        );
        fields.insert(
            "maritalStatus".to_string(),
            FieldDefinition::new(FieldKind::Object, Cardinality::optional())
                .with_binding(MARITAL_VS, BindingStrength::Extensible),
        );

        let source = Arc::new(MemoryDefinitionSource::new());
        source
            .insert(
                "Patient",
                RawDefinition::Schema(SchemaDefinition::new("Patient", fields)),
            )
            .await;
        source
            .insert(
                GENDER_VS,
                RawDefinition::ValueSet(ValueSet {
                    url: GENDER_VS.to_string(),
                    include: vec![CodeGroup {
                        system: None,
                        codes: vec![
                            "male".to_string(),
                            "female".to_string(),
                            "other".to_string(),
                            "unknown".to_string(),
                        ],
                    }],
                    exclude: vec![],
                }),
            )
            .await;
        source
            .insert(
                MARITAL_VS,
                RawDefinition::ValueSet(ValueSet {
                    url: MARITAL_VS.to_string(),
                    include: vec![CodeGroup {
                        system: Some(
                            "http://terminology.hl7.org/CodeSystem/v3-MaritalStatus".to_string(),
                        ),
                        codes: vec!["M".to_string(), "S".to_string()],
                    }],
                    exclude: vec![],
                }),
            )
            .await;

        let registry = Arc::new(DefinitionRegistry::load(source).await.unwrap());
        let snapshot = registry.snapshot().await;
        let schema = SchemaResolver::new()
            .resolve(&snapshot, "Patient", None, false)
            .await
            .unwrap()
            .unwrap();
        (registry, schema)
    }

    #[tokio::test]
    async fn member_codes_pass_and_missing_codes_map_strength_to_severity() {
        let (registry, schema) = fixtures(BindingStrength::Required).await;
        let snapshot = registry.snapshot().await;

        let ok = json!({"resourceType": "Patient", "gender": "female"});
        assert!(check(&ok, &schema, &snapshot, false, true).is_empty());

        let bad = json!({"resourceType": "Patient", "gender": "f"});
        let issues = check(&bad, &schema, &snapshot, false, true);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].code, "code-not-in-value-set");
        assert_eq!(issues[0].location.as_deref(), Some("gender"));
        assert_eq!(issues[0].stage, IssueStage::Terminology);
    }

    #[tokio::test]
    async fn preferred_binding_misses_are_informational() {
        let (registry, schema) = fixtures(BindingStrength::Preferred).await;
        let snapshot = registry.snapshot().await;
        let bad = json!({"resourceType": "Patient", "gender": "f"});
        let issues = check(&bad, &schema, &snapshot, false, true);
        assert_eq!(issues[0].severity, Severity::Information);
    }

    #[tokio::test]
    async fn codeable_concept_codings_are_checked() {
        let (registry, schema) = fixtures(BindingStrength::Required).await;
        let snapshot = registry.snapshot().await;
        let document = json!({
            "resourceType": "Patient",
            "maritalStatus": {
                "coding": [{
                    "system": "http://terminology.hl7.org/CodeSystem/v3-MaritalStatus",
                    "code": "Z"
                }]
            }
        });
        let issues = check(&document, &schema, &snapshot, false, true);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning); // extensible
        assert_eq!(
            issues[0].location.as_deref(),
            Some("maritalStatus.coding[0]")
        );
    }

    #[tokio::test]
    async fn unresolvable_value_set_is_logged_not_reported() {
        let (registry, _) = fixtures(BindingStrength::Required).await;
        let snapshot = registry.snapshot().await;

        // Build a schema bound to a value set that is not loaded.
        let mut fields = HashMap::new();
        fields.insert(
            "status".to_string(),
            FieldDefinition::new(FieldKind::Code, Cardinality::optional())
                .with_binding("http://example.org/ValueSet/missing", BindingStrength::Required),
        );
        let source = Arc::new(MemoryDefinitionSource::new());
        source
            .insert(
                "Encounter",
                RawDefinition::Schema(SchemaDefinition::new("Encounter", fields)),
            )
            .await;
        let other = DefinitionRegistry::load(source).await.unwrap();
        let other_snapshot = other.snapshot().await;
        let schema = SchemaResolver::new()
            .resolve(&other_snapshot, "Encounter", None, false)
            .await
            .unwrap()
            .unwrap();

        let document = json!({"resourceType": "Encounter", "status": "anything"});
        assert!(check(&document, &schema, &snapshot, false, true).is_empty());
    }

    #[tokio::test]
    async fn coding_shape_sweep_flags_malformed_codings() {
        let (registry, schema) = fixtures(BindingStrength::Required).await;
        let snapshot = registry.snapshot().await;
        let document = json!({
            "resourceType": "Patient",
            "maritalStatus": {
                "coding": [{"system": "", "code": "M"}, {"system": "http://x", "code": 7}]
            }
        });
        let issues = check(&document, &schema, &snapshot, true, false);
        let codes: Vec<&str> = issues.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"invalid-coding-system"));
        assert!(codes.contains(&"invalid-coding-code"));
        assert!(issues.iter().all(|i| i.severity == Severity::Warning));
    }

    #[tokio::test]
    async fn gating_disables_each_sweep() {
        let (registry, schema) = fixtures(BindingStrength::Required).await;
        let snapshot = registry.snapshot().await;
        let document = json!({"resourceType": "Patient", "gender": "f"});
        assert!(check(&document, &schema, &snapshot, false, false).is_empty());
    }
}
