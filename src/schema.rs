//! Schema, profile overlay and value set definitions.
//!
//! These are the loaded, cached-forever inputs to validation. A
//! [`SchemaDefinition`] describes the base structure of one resource type; a
//! [`ProfileOverlay`] is a named delta of jurisdiction-specific constraints
//! layered on top of it; a [`ValueSet`] enumerates the codes a bound field
//! may carry. None of these are mutated after load; a reload replaces the
//! whole snapshot.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

use crate::types::Severity;

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}(-\d{2}(-\d{2})?)?$").unwrap());
static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}(-\d{2}(-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:\d{2})?)?)?)?$")
        .unwrap()
});

/// Allowed occurrence count of a field: `[min, max]`, `max = None` meaning
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    pub min: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl Cardinality {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// `0..1`, the default for optional scalar fields.
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// `1..1`.
    pub fn required() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// `0..*`.
    pub fn unbounded() -> Self {
        Self { min: 0, max: None }
    }

    pub fn contains(&self, count: u32) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    /// Whether more than one occurrence is allowed, i.e. the field is
    /// represented as a JSON array.
    pub fn allows_repetition(&self) -> bool {
        self.max.is_none_or(|max| max > 1)
    }

    /// True when `self` is at least as tight as `base` on both ends. An
    /// overlay constraint that does not narrow its base is a configuration
    /// error.
    pub fn narrows(&self, base: &Cardinality) -> bool {
        if self.min < base.min {
            return false;
        }
        match (self.max, base.max) {
            (None, Some(_)) => false,
            (Some(s), Some(b)) => s <= b,
            (_, None) => true,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}..*", self.min),
        }
    }
}

/// Datatype of a single field occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Boolean,
    Integer,
    Decimal,
    String,
    Code,
    Uri,
    Date,
    DateTime,
    Object,
}

impl FieldKind {
    /// Check one occurrence (never an array; repetition is handled by
    /// cardinality) against this kind.
    pub fn matches(&self, value: &JsonValue) -> bool {
        match self {
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Decimal => value.is_number(),
            FieldKind::String | FieldKind::Code | FieldKind::Uri => value.is_string(),
            FieldKind::Date => value.as_str().is_some_and(|s| DATE_RE.is_match(s)),
            FieldKind::DateTime => value.as_str().is_some_and(|s| DATETIME_RE.is_match(s)),
            FieldKind::Object => value.is_object(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Boolean => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::String => "string",
            FieldKind::Code => "code",
            FieldKind::Uri => "uri",
            FieldKind::Date => "date",
            FieldKind::DateTime => "dateTime",
            FieldKind::Object => "object",
        }
    }
}

/// How strictly a coded field must match its value set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    Required,
    Extensible,
    Preferred,
    Example,
}

impl BindingStrength {
    /// Severity of a code missing from the bound value set.
    pub fn violation_severity(self) -> Severity {
        match self {
            BindingStrength::Required => Severity::Error,
            BindingStrength::Extensible => Severity::Warning,
            BindingStrength::Preferred | BindingStrength::Example => Severity::Information,
        }
    }
}

/// A terminology binding recorded at the point of use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(rename = "valueSet")]
    pub value_set: String,
    pub strength: BindingStrength,
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub kind: FieldKind,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub required: bool,
    /// Regex constraint applied to string occurrences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,
    /// Nested sub-schema for `Object` fields.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, FieldDefinition>,
}

impl FieldDefinition {
    pub fn new(kind: FieldKind, cardinality: Cardinality) -> Self {
        Self {
            kind,
            cardinality,
            required: false,
            pattern: None,
            binding: None,
            fields: HashMap::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_binding<S: Into<String>>(mut self, value_set: S, strength: BindingStrength) -> Self {
        self.binding = Some(Binding {
            value_set: value_set.into(),
            strength,
        });
        self
    }

    pub fn with_fields(mut self, fields: HashMap<String, FieldDefinition>) -> Self {
        self.fields = fields;
        self
    }
}

/// Base structural definition of one resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub fields: HashMap<String, FieldDefinition>,
}

impl SchemaDefinition {
    pub fn new<S: Into<String>>(resource_type: S, fields: HashMap<String, FieldDefinition>) -> Self {
        Self {
            resource_type: resource_type.into(),
            url: None,
            fields,
        }
    }
}

/// A jurisdiction-specific invariant declared by a profile overlay.
///
/// Each rule carries its declared severity; whether that severity is honored
/// or capped at warning is decided per-call by the strictness flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InvariantRule {
    /// The document's `extension` array must contain an entry with this URL.
    RequiredExtension {
        url: String,
        severity: Severity,
        code: String,
        details: String,
    },
    /// Every string occurrence of `field` (one level of `outer.inner`
    /// traversal supported) must match `pattern`.
    FieldFormat {
        field: String,
        pattern: String,
        severity: Severity,
        code: String,
        details: String,
    },
    /// Every coding under `field` must use the given code system.
    CodeSystemRequired {
        field: String,
        system: String,
        severity: Severity,
        code: String,
        details: String,
    },
}

impl InvariantRule {
    pub fn declared_severity(&self) -> Severity {
        match self {
            InvariantRule::RequiredExtension { severity, .. }
            | InvariantRule::FieldFormat { severity, .. }
            | InvariantRule::CodeSystemRequired { severity, .. } => *severity,
        }
    }
}

/// A named constraint delta layered on a base schema, keyed by
/// `(resource_type, url)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverlay {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub url: String,
    /// Base fields promoted to required by this profile.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Narrowed cardinalities, keyed by field name. Widenings are rejected
    /// at load time.
    #[serde(default)]
    pub cardinality: HashMap<String, Cardinality>,
    #[serde(default)]
    pub invariants: Vec<InvariantRule>,
}

/// One group of codes included in or excluded from a value set, optionally
/// scoped to a code system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub codes: Vec<String>,
}

/// An enumerable set of allowed codes with compose semantics: the flattened
/// set is the union of included codes minus the excluded ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSet {
    pub url: String,
    #[serde(default)]
    pub include: Vec<CodeGroup>,
    #[serde(default)]
    pub exclude: Vec<CodeGroup>,
}

impl ValueSet {
    /// Flatten compose rules into the effective code set.
    pub fn flatten(&self) -> HashSet<(Option<String>, String)> {
        let mut codes: HashSet<(Option<String>, String)> = self
            .include
            .iter()
            .flat_map(|group| {
                group
                    .codes
                    .iter()
                    .map(|code| (group.system.clone(), code.clone()))
            })
            .collect();
        for group in &self.exclude {
            for code in &group.codes {
                codes.remove(&(group.system.clone(), code.clone()));
            }
        }
        codes
    }

    /// Membership check. A system-less document code matches any system; a
    /// system-less include group matches any document system.
    pub fn contains(&self, system: Option<&str>, code: &str) -> bool {
        let flat = self.flatten();
        flat.iter().any(|(vs_system, vs_code)| {
            vs_code == code
                && match (vs_system.as_deref(), system) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cardinality_contains_and_repetition() {
        let card = Cardinality::new(1, Some(3));
        assert!(!card.contains(0));
        assert!(card.contains(1));
        assert!(card.contains(3));
        assert!(!card.contains(4));
        assert!(card.allows_repetition());
        assert!(!Cardinality::optional().allows_repetition());
        assert!(Cardinality::unbounded().contains(500));
    }

    #[test]
    fn narrowing_rules() {
        let base = Cardinality::new(0, None);
        assert!(Cardinality::new(1, Some(1)).narrows(&base));
        assert!(Cardinality::new(0, None).narrows(&base));

        let bounded = Cardinality::new(1, Some(2));
        assert!(!Cardinality::new(0, Some(2)).narrows(&bounded)); // widens min
        assert!(!Cardinality::new(1, Some(3)).narrows(&bounded)); // widens max
        assert!(!Cardinality::new(1, None).narrows(&bounded)); // unbounds max
    }

    #[test]
    fn field_kind_matching() {
        assert!(FieldKind::Boolean.matches(&json!(true)));
        assert!(FieldKind::Integer.matches(&json!(42)));
        assert!(!FieldKind::Integer.matches(&json!(4.2)));
        assert!(FieldKind::Decimal.matches(&json!(4.2)));
        assert!(FieldKind::Code.matches(&json!("male")));
        assert!(!FieldKind::Code.matches(&json!(1)));
        assert!(FieldKind::Date.matches(&json!("1990-04-12")));
        assert!(FieldKind::Date.matches(&json!("1990")));
        assert!(!FieldKind::Date.matches(&json!("12/04/1990")));
        assert!(FieldKind::DateTime.matches(&json!("2015-02-07T13:28:17+07:00")));
        assert!(FieldKind::Object.matches(&json!({"city": "Makati"})));
        assert!(!FieldKind::Object.matches(&json!("Makati")));
    }

    #[test]
    fn binding_strength_severities() {
        assert_eq!(
            BindingStrength::Required.violation_severity(),
            Severity::Error
        );
        assert_eq!(
            BindingStrength::Extensible.violation_severity(),
            Severity::Warning
        );
        assert_eq!(
            BindingStrength::Preferred.violation_severity(),
            Severity::Information
        );
        assert_eq!(
            BindingStrength::Example.violation_severity(),
            Severity::Information
        );
    }

    #[test]
    fn value_set_compose_semantics() {
        let vs = ValueSet {
            url: "http://example.org/fhir/ValueSet/marital-status".to_string(),
            include: vec![CodeGroup {
                system: Some("http://terminology.hl7.org/CodeSystem/v3-MaritalStatus".to_string()),
                codes: vec!["M".to_string(), "S".to_string(), "D".to_string()],
            }],
            exclude: vec![CodeGroup {
                system: Some("http://terminology.hl7.org/CodeSystem/v3-MaritalStatus".to_string()),
                codes: vec!["D".to_string()],
            }],
        };
        assert!(vs.contains(
            Some("http://terminology.hl7.org/CodeSystem/v3-MaritalStatus"),
            "M"
        ));
        assert!(!vs.contains(
            Some("http://terminology.hl7.org/CodeSystem/v3-MaritalStatus"),
            "D"
        ));
        // A system-less document code still matches on code value.
        assert!(vs.contains(None, "S"));
        assert!(!vs.contains(Some("http://other.system"), "M"));
    }
}
