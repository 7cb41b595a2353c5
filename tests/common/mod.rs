//! Shared fixtures: a small but realistic definition set with a Patient and
//! Observation base schema, a jurisdiction patient profile and two value
//! sets.

// Not every test binary exercises every fixture.
#![allow(dead_code)]

use fhir_validation_engine::{
    BindingStrength, Cardinality, CodeGroup, DefinitionRegistry, FieldDefinition, FieldKind,
    InvariantRule, MemoryDefinitionSource, ProfileOverlay, RawDefinition, SchemaDefinition,
    Severity, ValueSet,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const PATIENT_PROFILE: &str =
    "http://example.org/fhir/StructureDefinition/core-patient";
pub const INDIGENOUS_EXTENSION: &str =
    "http://example.org/fhir/StructureDefinition/indigenous-people";
pub const GENDER_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";
pub const MARITAL_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/marital-status";
pub const MARITAL_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-MaritalStatus";

pub fn patient_schema() -> SchemaDefinition {
    let mut name_fields = HashMap::new();
    name_fields.insert(
        "family".to_string(),
        FieldDefinition::new(FieldKind::String, Cardinality::optional()),
    );
    name_fields.insert(
        "given".to_string(),
        FieldDefinition::new(FieldKind::String, Cardinality::unbounded()),
    );

    let mut identifier_fields = HashMap::new();
    identifier_fields.insert(
        "system".to_string(),
        FieldDefinition::new(FieldKind::Uri, Cardinality::optional()),
    );
    identifier_fields.insert(
        "value".to_string(),
        FieldDefinition::new(FieldKind::String, Cardinality::optional()),
    );

    let mut fields = HashMap::new();
    fields.insert(
        "name".to_string(),
        FieldDefinition::new(FieldKind::Object, Cardinality::new(1, None))
            .required()
            .with_fields(name_fields),
    );
    fields.insert(
        "gender".to_string(),
        FieldDefinition::new(FieldKind::Code, Cardinality::optional())
            .with_binding(GENDER_VALUE_SET, BindingStrength::Required),
    );
    fields.insert(
        "birthDate".to_string(),
        FieldDefinition::new(FieldKind::Date, Cardinality::optional()),
    );
    fields.insert(
        "identifier".to_string(),
        FieldDefinition::new(FieldKind::Object, Cardinality::unbounded())
            .with_fields(identifier_fields),
    );
    fields.insert(
        "maritalStatus".to_string(),
        FieldDefinition::new(FieldKind::Object, Cardinality::optional())
            .with_binding(MARITAL_VALUE_SET, BindingStrength::Extensible),
    );
    SchemaDefinition::new("Patient", fields)
}

pub fn observation_schema() -> SchemaDefinition {
    let mut fields = HashMap::new();
    fields.insert(
        "status".to_string(),
        FieldDefinition::new(FieldKind::Code, Cardinality::required()).required(),
    );
    fields.insert(
        "code".to_string(),
        FieldDefinition::new(FieldKind::Object, Cardinality::required()).required(),
    );
    SchemaDefinition::new("Observation", fields)
}

pub fn patient_profile() -> ProfileOverlay {
    ProfileOverlay {
        resource_type: "Patient".to_string(),
        url: PATIENT_PROFILE.to_string(),
        required_fields: vec!["identifier".to_string()],
        cardinality: HashMap::new(),
        invariants: vec![
            InvariantRule::RequiredExtension {
                url: INDIGENOUS_EXTENSION.to_string(),
                severity: Severity::Error,
                code: "missing-required-extension".to_string(),
                details: "Profile requires the indigenous-people extension".to_string(),
            },
            InvariantRule::FieldFormat {
                field: "identifier.value".to_string(),
                pattern: r"^[0-9-]+$".to_string(),
                severity: Severity::Warning,
                code: "invalid-identifier-format".to_string(),
                details: "Identifier value should be numeric".to_string(),
            },
            InvariantRule::CodeSystemRequired {
                field: "maritalStatus".to_string(),
                system: MARITAL_SYSTEM.to_string(),
                severity: Severity::Warning,
                code: "invalid-terminology-binding".to_string(),
                details: "Marital status should use the marital-status code system".to_string(),
            },
        ],
    }
}

pub async fn definition_source() -> Arc<MemoryDefinitionSource> {
    let source = Arc::new(MemoryDefinitionSource::new());
    source
        .insert("Patient", RawDefinition::Schema(patient_schema()))
        .await;
    source
        .insert("Observation", RawDefinition::Schema(observation_schema()))
        .await;
    source
        .insert(
            "profile:core-patient",
            RawDefinition::Profile(patient_profile()),
        )
        .await;
    source
        .insert(
            GENDER_VALUE_SET,
            RawDefinition::ValueSet(ValueSet {
                url: GENDER_VALUE_SET.to_string(),
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
            MARITAL_VALUE_SET,
            RawDefinition::ValueSet(ValueSet {
                url: MARITAL_VALUE_SET.to_string(),
                include: vec![CodeGroup {
                    system: Some(MARITAL_SYSTEM.to_string()),
                    codes: vec!["M".to_string(), "S".to_string(), "W".to_string()],
                }],
                exclude: vec![],
            }),
        )
        .await;
    source
}

pub async fn registry() -> Arc<DefinitionRegistry> {
    Arc::new(
        DefinitionRegistry::load(definition_source().await)
            .await
            .expect("fixture definitions load"),
    )
}
