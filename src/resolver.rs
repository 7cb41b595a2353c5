//! Schema resolution: merging a base schema with an optional profile overlay
//! into one immutable, compiled [`EffectiveSchema`].
//!
//! Resolution is cached per `(snapshot generation, resource type, profile,
//! strictness)`, so two identical resolutions against the same snapshot
//! return the same `Arc`. Pattern constraints are compiled here once instead
//! of per document.

use moka::future::Cache;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, ValidationEngineError};
use crate::registry::DefinitionSnapshot;
use crate::schema::{Binding, Cardinality, FieldDefinition, FieldKind, InvariantRule};

/// A declared field with its pattern constraint compiled.
#[derive(Debug, Clone)]
pub struct EffectiveField {
    pub kind: FieldKind,
    pub cardinality: Cardinality,
    pub required: bool,
    pub pattern: Option<Regex>,
    pub binding: Option<Binding>,
    pub fields: HashMap<String, EffectiveField>,
    /// Whether the presence/cardinality constraint came from the overlay.
    /// Overlay-sourced violations are subject to the strictness cap.
    pub from_overlay: bool,
}

impl EffectiveField {
    fn compile(name: &str, field: &FieldDefinition) -> Result<Self> {
        let pattern = field
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| {
                ValidationEngineError::configuration(format!(
                    "invalid pattern for field {name}: {err}"
                ))
            })?;
        let mut fields = HashMap::with_capacity(field.fields.len());
        for (child_name, child) in &field.fields {
            fields.insert(child_name.clone(), Self::compile(child_name, child)?);
        }
        Ok(Self {
            kind: field.kind,
            cardinality: field.cardinality,
            required: field.required,
            pattern,
            binding: field.binding.clone(),
            fields,
            from_overlay: false,
        })
    }
}

/// An overlay invariant with any format pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledInvariant {
    pub rule: InvariantRule,
    pub pattern: Option<Regex>,
}

/// The immutable result of merging a base schema with zero or one profile
/// overlay, used for exactly one validation call shape.
#[derive(Debug)]
pub struct EffectiveSchema {
    pub resource_type: String,
    pub profile_url: Option<String>,
    pub strict: bool,
    pub fields: HashMap<String, EffectiveField>,
    pub invariants: Vec<CompiledInvariant>,
}

#[derive(Clone, Hash, PartialEq, Eq)]
struct ResolveKey {
    generation: u64,
    resource_type: String,
    profile_url: Option<String>,
    strict: bool,
}

/// Resolves and caches effective schemas against registry snapshots.
pub struct SchemaResolver {
    cache: Cache<ResolveKey, Arc<EffectiveSchema>>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self {
            cache: Cache::new(1024),
        }
    }

    /// Resolve the effective schema for one validation call.
    ///
    /// Returns `Ok(None)` when the resource type has no base definition and
    /// no profile was requested; the caller then applies fallback
    /// validation. A profile explicitly requested but unknown is a
    /// [`NotFound`](ValidationEngineError::NotFound) error, never a
    /// per-document issue.
    pub async fn resolve(
        &self,
        snapshot: &DefinitionSnapshot,
        resource_type: &str,
        profile_url: Option<&str>,
        strict: bool,
    ) -> Result<Option<Arc<EffectiveSchema>>> {
        let key = ResolveKey {
            generation: snapshot.generation(),
            resource_type: resource_type.to_string(),
            profile_url: profile_url.map(str::to_string),
            strict,
        };
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(Some(cached));
        }

        let base = match snapshot.schema(resource_type) {
            Some(base) => base,
            None => {
                return match profile_url {
                    // A profile cannot be applied without its base schema.
                    Some(url) => Err(ValidationEngineError::not_found(format!(
                        "{resource_type} (base schema for profile {url})"
                    ))),
                    None => Ok(None),
                };
            }
        };

        let overlay = match profile_url {
            Some(url) => Some(
                snapshot
                    .profile(resource_type, url)
                    .ok_or_else(|| ValidationEngineError::not_found(url))?
                    .clone(),
            ),
            None => None,
        };

        let mut fields = HashMap::with_capacity(base.fields.len());
        for (name, field) in &base.fields {
            fields.insert(name.clone(), EffectiveField::compile(name, field)?);
        }
        let mut invariants = Vec::new();

        if let Some(overlay) = overlay {
            for name in &overlay.required_fields {
                let field = fields.get_mut(name).ok_or_else(|| {
                    ValidationEngineError::configuration(format!(
                        "profile {} requires unknown field {name}",
                        overlay.url
                    ))
                })?;
                field.required = true;
                field.from_overlay = true;
            }

            for (name, narrowed) in &overlay.cardinality {
                let field = fields.get_mut(name).ok_or_else(|| {
                    ValidationEngineError::configuration(format!(
                        "profile {} constrains unknown field {name}",
                        overlay.url
                    ))
                })?;
                // Guaranteed at load time; a widening reaching this point is
                // a configuration fault, not a document issue.
                if !narrowed.narrows(&field.cardinality) {
                    return Err(ValidationEngineError::configuration(format!(
                        "profile {} widens cardinality of {name}",
                        overlay.url
                    )));
                }
                field.cardinality = *narrowed;
                field.from_overlay = true;
            }

            for rule in &overlay.invariants {
                let pattern = match rule {
                    InvariantRule::FieldFormat { pattern, field, .. } => {
                        Some(Regex::new(pattern).map_err(|err| {
                            ValidationEngineError::configuration(format!(
                                "profile {} has invalid format pattern for {field}: {err}",
                                overlay.url
                            ))
                        })?)
                    }
                    _ => None,
                };
                invariants.push(CompiledInvariant {
                    rule: rule.clone(),
                    pattern,
                });
            }
        }

        let resolved = Arc::new(EffectiveSchema {
            resource_type: resource_type.to_string(),
            profile_url: profile_url.map(str::to_string),
            strict,
            fields,
            invariants,
        });
        self.cache.insert(key, resolved.clone()).await;
        Ok(Some(resolved))
    }
}

impl Default for SchemaResolver {
    fn default() -> Self {
        Self::new()
    }
}
