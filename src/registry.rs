//! Definition registry: loads schema, profile and value set definitions
//! through a narrow source capability and publishes them as immutable
//! snapshots.
//!
//! The registry is the only writer. `reload` rebuilds the complete snapshot
//! from the backing source and swaps it in atomically; validations that
//! already took a snapshot keep observing it in full. Load-time problems
//! (an overlay widening its base cardinality, an unparsable pattern) refuse
//! the reload and leave the prior snapshot active.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{Result, ValidationEngineError};
use crate::schema::{FieldDefinition, InvariantRule, ProfileOverlay, SchemaDefinition, ValueSet};

/// A definition as produced by the loading collaborator. The engine never
/// parses or fetches source files itself.
#[derive(Debug, Clone)]
pub enum RawDefinition {
    Schema(SchemaDefinition),
    Profile(ProfileOverlay),
    ValueSet(ValueSet),
}

/// The loading capability the registry consumes.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn load(&self, key: &str) -> Result<RawDefinition>;
    async fn list_available_keys(&self) -> Result<Vec<String>>;
}

/// In-memory definition source for embedders and tests.
#[derive(Default)]
pub struct MemoryDefinitionSource {
    definitions: RwLock<HashMap<String, RawDefinition>>,
}

impl MemoryDefinitionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert<K: Into<String>>(&self, key: K, definition: RawDefinition) {
        self.definitions
            .write()
            .await
            .insert(key.into(), definition);
    }

    pub async fn remove(&self, key: &str) {
        self.definitions.write().await.remove(key);
    }
}

#[async_trait]
impl DefinitionSource for MemoryDefinitionSource {
    async fn load(&self, key: &str) -> Result<RawDefinition> {
        self.definitions
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ValidationEngineError::not_found(key))
    }

    async fn list_available_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.definitions.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Immutable view of every loaded definition. Read-only after publication.
#[derive(Debug)]
pub struct DefinitionSnapshot {
    generation: u64,
    schemas: HashMap<String, Arc<SchemaDefinition>>,
    profiles: HashMap<(String, String), Arc<ProfileOverlay>>,
    value_sets: HashMap<String, Arc<ValueSet>>,
}

impl DefinitionSnapshot {
    /// Monotonically increasing snapshot identity, used to scope the
    /// effective-schema cache across reloads.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn schema(&self, resource_type: &str) -> Option<&Arc<SchemaDefinition>> {
        self.schemas.get(resource_type)
    }

    pub fn profile(&self, resource_type: &str, url: &str) -> Option<&Arc<ProfileOverlay>> {
        self.profiles
            .get(&(resource_type.to_string(), url.to_string()))
    }

    pub fn value_set(&self, url: &str) -> Option<&Arc<ValueSet>> {
        self.value_sets.get(url)
    }

    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Caches definitions for the process lifetime and publishes immutable
/// snapshots. All lookups after construction are in-memory.
pub struct DefinitionRegistry {
    source: Arc<dyn DefinitionSource>,
    snapshot: RwLock<Arc<DefinitionSnapshot>>,
    generation: AtomicU64,
    /// Serializes reloads; readers keep going through `snapshot` meanwhile.
    reload_lock: Mutex<()>,
}

impl DefinitionRegistry {
    /// Build the initial snapshot from the source.
    pub async fn load(source: Arc<dyn DefinitionSource>) -> Result<Self> {
        let snapshot = build_snapshot(source.as_ref(), 0).await?;
        Ok(Self {
            source,
            snapshot: RwLock::new(Arc::new(snapshot)),
            generation: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
        })
    }

    /// The currently published snapshot. Cheap; clones one `Arc`.
    pub async fn snapshot(&self) -> Arc<DefinitionSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Rebuild the full snapshot from the source and swap it in. On any
    /// configuration error the swap is refused and the prior snapshot stays
    /// active.
    pub async fn reload(&self) -> Result<()> {
        // One reload at a time: a concurrent pair must not publish two
        // different snapshots under the same generation, or the resolver
        // cache (keyed by generation) could mix them up.
        let _reloading = self.reload_lock.lock().await;
        let generation = self.generation.load(Ordering::SeqCst) + 1;
        match build_snapshot(self.source.as_ref(), generation).await {
            Ok(snapshot) => {
                *self.snapshot.write().await = Arc::new(snapshot);
                self.generation.store(generation, Ordering::SeqCst);
                debug!(generation, "definition snapshot reloaded");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "reload refused; prior snapshot remains active");
                Err(err)
            }
        }
    }
}

async fn build_snapshot(
    source: &dyn DefinitionSource,
    generation: u64,
) -> Result<DefinitionSnapshot> {
    let mut schemas = HashMap::new();
    let mut profiles = HashMap::new();
    let mut value_sets = HashMap::new();

    for key in source.list_available_keys().await? {
        match source.load(&key).await? {
            RawDefinition::Schema(schema) => {
                validate_schema(&schema)?;
                schemas.insert(schema.resource_type.clone(), Arc::new(schema));
            }
            RawDefinition::Profile(profile) => {
                profiles.insert(
                    (profile.resource_type.clone(), profile.url.clone()),
                    Arc::new(profile),
                );
            }
            RawDefinition::ValueSet(value_set) => {
                value_sets.insert(value_set.url.clone(), Arc::new(value_set));
            }
        }
    }

    // Overlays are validated against their base after every schema is in,
    // so key ordering in the source does not matter.
    for profile in profiles.values() {
        validate_profile(profile, &schemas)?;
    }

    debug!(
        generation,
        schemas = schemas.len(),
        profiles = profiles.len(),
        value_sets = value_sets.len(),
        "definition snapshot built"
    );

    Ok(DefinitionSnapshot {
        generation,
        schemas,
        profiles,
        value_sets,
    })
}

fn validate_schema(schema: &SchemaDefinition) -> Result<()> {
    fn check_fields(resource_type: &str, fields: &HashMap<String, FieldDefinition>) -> Result<()> {
        for (name, field) in fields {
            if let Some(pattern) = &field.pattern {
                regex::Regex::new(pattern).map_err(|err| {
                    ValidationEngineError::configuration(format!(
                        "invalid pattern for {resource_type}.{name}: {err}"
                    ))
                })?;
            }
            check_fields(resource_type, &field.fields)?;
        }
        Ok(())
    }
    check_fields(&schema.resource_type, &schema.fields)
}

fn validate_profile(
    profile: &ProfileOverlay,
    schemas: &HashMap<String, Arc<SchemaDefinition>>,
) -> Result<()> {
    let base = schemas.get(&profile.resource_type).ok_or_else(|| {
        ValidationEngineError::configuration(format!(
            "profile {} targets unknown resource type {}",
            profile.url, profile.resource_type
        ))
    })?;

    for field in &profile.required_fields {
        if !base.fields.contains_key(field) {
            return Err(ValidationEngineError::configuration(format!(
                "profile {} requires unknown field {}.{field}; extensions are declared as invariants",
                profile.url, profile.resource_type
            )));
        }
    }

    for (field, cardinality) in &profile.cardinality {
        let base_field = base.fields.get(field).ok_or_else(|| {
            ValidationEngineError::configuration(format!(
                "profile {} constrains unknown field {}.{field}",
                profile.url, profile.resource_type
            ))
        })?;
        if !cardinality.narrows(&base_field.cardinality) {
            return Err(ValidationEngineError::configuration(format!(
                "profile {} widens cardinality of {}.{field}: {} does not narrow {}",
                profile.url, profile.resource_type, cardinality, base_field.cardinality
            )));
        }
    }

    for rule in &profile.invariants {
        if let InvariantRule::FieldFormat { field, pattern, .. } = rule {
            regex::Regex::new(pattern).map_err(|err| {
                ValidationEngineError::configuration(format!(
                    "profile {} has invalid format pattern for {field}: {err}",
                    profile.url
                ))
            })?;
        }
    }

    Ok(())
}
