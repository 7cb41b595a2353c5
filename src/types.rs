//! Result types shared by every validation stage.

use serde::{Deserialize, Serialize};

/// Severity of a single validation issue.
///
/// The variant order is the severity order: `Information < Warning < Error <
/// Fatal`. Every aggregation decision in the crate goes through this `Ord`
/// (or [`Severity::is_failure`]) rather than ad hoc comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Information,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// True for severities that make a result invalid.
    pub fn is_failure(self) -> bool {
        self >= Severity::Error
    }

    /// Cap this severity at `limit`, used when overlay rules run in
    /// non-strict mode.
    pub fn capped_at(self, limit: Severity) -> Severity {
        self.min(limit)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Information => "information",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// Overall outcome of validating one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Success,
    Warning,
    Failed,
}

/// The stage that produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStage {
    Structure,
    Terminology,
    Profile,
    Engine,
}

/// One problem found while validating a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub stage: IssueStage,
}

impl ValidationIssue {
    pub fn new<C, D>(
        severity: Severity,
        code: C,
        details: D,
        location: Option<String>,
        stage: IssueStage,
    ) -> Self
    where
        C: Into<String>,
        D: Into<String>,
    {
        Self {
            severity,
            code: code.into(),
            details: details.into(),
            location,
            stage,
        }
    }
}

/// Validation outcome for one document.
///
/// `valid` is true iff no issue reaches error or fatal severity. `status`
/// refines that: `Warning` when valid with at least one warning-level issue,
/// `Failed` when invalid, `Success` otherwise (informational issues alone do
/// not demote it). `message` is a human summary of the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub valid: bool,
    pub status: ValidationStatus,
    pub message: String,
    pub issues: Vec<ValidationIssue>,
}

/// Aggregate status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    AllSuccess,
    AllFailed,
    Mixed,
}

/// Results of a batch run, index-aligned with the submitted items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub results: Vec<ValidationResult>,
}
