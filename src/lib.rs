//! fhir-validation-engine - layered FHIR resource validation.
//!
//! This crate validates structured healthcare records against a base
//! structural schema plus an optional, stricter jurisdiction profile overlay.
//! It provides:
//! - A definition registry publishing immutable snapshots of schemas,
//!   profile overlays and value sets, reloadable by atomic swap
//! - Schema resolution merging a base schema with an overlay into one cached
//!   effective schema
//! - Structural, terminology-binding and profile-invariant validation stages
//!   aggregated into a single severity-classified result
//! - An order-preserving batch orchestrator with per-item isolation
//!
//! # Quick Start
//!
//! ```ignore
//! use fhir_validation_engine::{
//!     DefinitionRegistry, ValidateOptions, ValidationEngine,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(DefinitionRegistry::load(source).await?);
//! let engine = ValidationEngine::new(registry);
//!
//! let result = engine
//!     .validate(&document, "Patient", &ValidateOptions::default())
//!     .await?;
//! assert!(result.valid);
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - Severity, issue and result types
//! - [`schema`] - Schema, profile overlay and value set definitions
//! - [`registry`] - Definition loading and snapshot publication
//! - [`resolver`] - Base + overlay merging into effective schemas
//! - [`structural`] / [`terminology`] / [`profile`] - The validation stages
//! - [`aggregate`] - Status classification
//! - [`engine`] - The validation engine and batch orchestrator

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod profile;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod structural;
pub mod terminology;
pub mod types;

// Error exports
pub use error::{Result, ValidationEngineError};

// Type exports
pub use types::{
    BatchResult, BatchStatus, IssueStage, Severity, ValidationIssue, ValidationResult,
    ValidationStatus,
};

// Schema model exports
pub use schema::{
    Binding, BindingStrength, Cardinality, CodeGroup, FieldDefinition, FieldKind, InvariantRule,
    ProfileOverlay, SchemaDefinition, ValueSet,
};

// Registry exports
pub use registry::{
    DefinitionRegistry, DefinitionSnapshot, DefinitionSource, MemoryDefinitionSource,
    RawDefinition,
};

// Resolver exports
pub use resolver::{CompiledInvariant, EffectiveField, EffectiveSchema, SchemaResolver};

// Engine exports
pub use engine::{BatchItem, EngineConfig, ValidateOptions, ValidationEngine};
