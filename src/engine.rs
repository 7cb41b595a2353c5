//! The validation engine: per-document orchestration of the structural,
//! terminology and profile stages, and the batch orchestrator on top.
//!
//! Single-document validation is a deterministic, side-effect-free function
//! of the document, the resolved effective schema and the options; the
//! engine therefore performs no internal retries. Batches run items
//! concurrently on a bounded pool against one shared read-only snapshot and
//! return results re-indexed to input order.

use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::aggregate;
use crate::error::{Result, ValidationEngineError};
use crate::profile;
use crate::registry::{DefinitionRegistry, DefinitionSnapshot};
use crate::resolver::SchemaResolver;
use crate::structural;
use crate::terminology;
use crate::types::{
    BatchResult, IssueStage, Severity, ValidationIssue, ValidationResult, ValidationStatus,
};

/// Per-call validation options.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Canonical URL of the profile overlay to apply, if any.
    pub profile: Option<String>,
    /// Run the coding well-formedness sweep.
    pub check_code_systems: bool,
    /// Check bound codes against their value sets.
    pub check_value_sets: bool,
    /// Honor declared overlay severities; otherwise overlay issues are
    /// capped at warning.
    pub strict: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            profile: None,
            check_code_systems: true,
            check_value_sets: true,
            strict: false,
        }
    }
}

impl ValidateOptions {
    pub fn with_profile<S: Into<String>>(mut self, url: S) -> Self {
        self.profile = Some(url.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn check_code_systems(mut self, enabled: bool) -> Self {
        self.check_code_systems = enabled;
        self
    }

    pub fn check_value_sets(mut self, enabled: bool) -> Self {
        self.check_value_sets = enabled;
        self
    }
}

/// Engine limits and tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Batches above this size are rejected without per-item processing.
    pub max_batch_size: usize,
    /// Upper bound for one validation call; on expiry the result carries a
    /// single fatal `validation-timeout` issue.
    pub validation_timeout: Duration,
    /// Bounded concurrency for batch items.
    pub batch_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            validation_timeout: Duration::from_secs(30),
            batch_concurrency: 8,
        }
    }
}

/// One batch entry: a document with its expected type and options.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub document: JsonValue,
    pub resource_type: String,
    pub options: ValidateOptions,
}

impl BatchItem {
    pub fn new<S: Into<String>>(document: JsonValue, resource_type: S) -> Self {
        Self {
            document,
            resource_type: resource_type.into(),
            options: ValidateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValidateOptions) -> Self {
        self.options = options;
        self
    }
}

/// Validates documents against the definitions published by a registry.
pub struct ValidationEngine {
    registry: Arc<DefinitionRegistry>,
    resolver: SchemaResolver,
    config: EngineConfig,
}

impl ValidationEngine {
    pub fn new(registry: Arc<DefinitionRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<DefinitionRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            resolver: SchemaResolver::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    /// Validate one document against its resource type's effective schema.
    ///
    /// Returns `Err(NotFound)` when `options.profile` names an unknown
    /// overlay; every domain-content problem is an issue inside the returned
    /// result instead.
    pub async fn validate(
        &self,
        document: &JsonValue,
        resource_type: &str,
        options: &ValidateOptions,
    ) -> Result<ValidationResult> {
        let snapshot = self.registry.snapshot().await;
        self.validate_with_snapshot(&snapshot, document, resource_type, options)
            .await
    }

    /// Validate a batch of documents. Items are independent: they share only
    /// the read-only snapshot taken at the start of the call, run on a
    /// bounded pool, and come back in input order. A batch above the
    /// configured maximum is rejected whole, with zero per-item processing.
    pub async fn validate_batch(&self, items: &[BatchItem]) -> Result<BatchResult> {
        if items.len() > self.config.max_batch_size {
            return Err(ValidationEngineError::batch_limit_exceeded(
                items.len(),
                self.config.max_batch_size,
            ));
        }

        let snapshot = self.registry.snapshot().await;
        let results: Vec<ValidationResult> = stream::iter(items)
            .map(|item| {
                let snapshot = snapshot.clone();
                async move {
                    match self
                        .validate_with_snapshot(
                            &snapshot,
                            &item.document,
                            &item.resource_type,
                            &item.options,
                        )
                        .await
                    {
                        Ok(result) => result,
                        // An item's fault stays its own: siblings are
                        // unaffected and the batch completes.
                        Err(err) => item_fault_result(&item.resource_type, &err),
                    }
                }
            })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        debug!(items = results.len(), "batch validation complete");
        Ok(BatchResult {
            status: aggregate::batch_status(&results),
            results,
        })
    }

    async fn validate_with_snapshot(
        &self,
        snapshot: &Arc<DefinitionSnapshot>,
        document: &JsonValue,
        resource_type: &str,
        options: &ValidateOptions,
    ) -> Result<ValidationResult> {
        guarded(
            self.config.validation_timeout,
            resource_type,
            self.run_stages(snapshot, document, resource_type, options),
        )
        .await
    }

    async fn run_stages(
        &self,
        snapshot: &Arc<DefinitionSnapshot>,
        document: &JsonValue,
        resource_type: &str,
        options: &ValidateOptions,
    ) -> Result<ValidationResult> {
        let effective = self
            .resolver
            .resolve(
                snapshot,
                resource_type,
                options.profile.as_deref(),
                options.strict,
            )
            .await?;

        let issues = match &effective {
            None => structural::check_fallback(document, resource_type),
            Some(schema) => {
                let mut issues = structural::check(document, schema, resource_type);
                // A fatal structural issue means the document shape cannot
                // be trusted; later stages are skipped.
                if !issues.iter().any(|i| i.severity == Severity::Fatal) {
                    issues.extend(terminology::check(
                        document,
                        schema,
                        snapshot,
                        options.check_code_systems,
                        options.check_value_sets,
                    ));
                    issues.extend(profile::check(document, schema));
                }
                issues
            }
        };

        let (valid, status) = aggregate::classify(&issues);
        debug_assert!(valid || status == ValidationStatus::Failed);
        Ok(ValidationResult {
            resource_type: Some(resource_type.to_string()),
            valid,
            status,
            message: aggregate::summary_message(status, &issues),
            issues,
        })
    }
}

/// Bound one validation run by the configured timeout and isolate panics.
/// Either surface collapses into a result with a single fatal engine-stage
/// issue, never a partial issue list.
async fn guarded<F>(
    limit: Duration,
    resource_type: &str,
    stages: F,
) -> Result<ValidationResult>
where
    F: Future<Output = Result<ValidationResult>>,
{
    let stages = AssertUnwindSafe(stages).catch_unwind();
    match tokio::time::timeout(limit, stages).await {
        Err(_elapsed) => Ok(fatal_result(
            resource_type,
            "validation-timeout",
            format!("Validation did not complete within {limit:?}"),
        )),
        Ok(Err(panic)) => {
            error!(resource_type, "validation panicked: {panic:?}");
            Ok(fatal_result(
                resource_type,
                "engine-fault",
                "Unexpected internal failure while validating the resource".to_string(),
            ))
        }
        Ok(Ok(result)) => result,
    }
}

fn fatal_result(resource_type: &str, code: &str, details: String) -> ValidationResult {
    let issues = vec![ValidationIssue::new(
        Severity::Fatal,
        code,
        details,
        None,
        IssueStage::Engine,
    )];
    let (valid, status) = aggregate::classify(&issues);
    ValidationResult {
        resource_type: Some(resource_type.to_string()),
        valid,
        status,
        message: aggregate::summary_message(status, &issues),
        issues,
    }
}

fn item_fault_result(resource_type: &str, err: &ValidationEngineError) -> ValidationResult {
    let code = if err.is_not_found() {
        "unknown-profile"
    } else {
        "engine-fault"
    };
    fatal_result(resource_type, code, err.to_string())
}
