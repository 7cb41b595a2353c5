//! Issue aggregation and status classification.
//!
//! Deterministic and order-independent: the outcome is a function of the
//! multiset of severities in the combined issue list, computed through the
//! single [`Severity`] ordering.

use crate::types::{
    BatchStatus, Severity, ValidationIssue, ValidationResult, ValidationStatus,
};

/// Compute `(valid, status)` from the full combined issue list.
///
/// Informational issues never demote the status: a valid document with only
/// information-level issues (e.g. the fallback-validation note) is still a
/// success.
pub fn classify(issues: &[ValidationIssue]) -> (bool, ValidationStatus) {
    let valid = !issues.iter().any(|issue| issue.severity.is_failure());
    let status = if !valid {
        ValidationStatus::Failed
    } else if issues
        .iter()
        .any(|issue| issue.severity == Severity::Warning)
    {
        ValidationStatus::Warning
    } else {
        ValidationStatus::Success
    };
    (valid, status)
}

/// Human one-line summary of an outcome.
pub fn summary_message(status: ValidationStatus, issues: &[ValidationIssue]) -> String {
    match status {
        ValidationStatus::Success => "Validation successful".to_string(),
        ValidationStatus::Warning => {
            let count = issues
                .iter()
                .filter(|issue| issue.severity == Severity::Warning)
                .count();
            format!("Validation passed with {count} warning(s)")
        }
        ValidationStatus::Failed => {
            let count = issues
                .iter()
                .filter(|issue| issue.severity.is_failure())
                .count();
            format!("Validation failed with {count} error(s)")
        }
    }
}

/// Aggregate status over an ordered batch of results. An empty batch is
/// vacuously all-success.
pub fn batch_status(results: &[ValidationResult]) -> BatchStatus {
    if results
        .iter()
        .all(|r| r.status == ValidationStatus::Success)
    {
        BatchStatus::AllSuccess
    } else if !results.is_empty()
        && results.iter().all(|r| r.status == ValidationStatus::Failed)
    {
        BatchStatus::AllFailed
    } else {
        BatchStatus::Mixed
    }
}
