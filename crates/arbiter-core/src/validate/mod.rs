//! Validation gate primitives.
//!
//! Gates never fail fast: they accumulate every issue across all files
//! before returning, so one run surfaces every problem at once. A gate
//! passes iff zero ERROR-severity issues exist; WARNINGs never block.

pub mod pre_aggregate;
pub mod pre_eval;
pub mod pre_workbook;

pub use pre_aggregate::validate_pre_aggregation;
pub use pre_eval::validate_pre_evaluation;
pub use pre_workbook::validate_pre_workbook;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Validation issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Must abort processing.
    Error,
    /// Can proceed with caution.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("ERROR"),
            Severity::Warning => f.write_str("WARNING"),
        }
    }
}

/// A single validation issue (error or warning).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// e.g. "run1/consulting/pathfinder.json"
    pub location: String,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location: location.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn warning(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location: location.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Structured validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Build a result from issues; valid iff no ERROR-severity issues.
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues.iter().any(|i| i.severity == Severity::Error);
        Self { valid, issues }
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .collect()
    }

    /// Fail with [`GateFailed`] if any ERROR-severity issues exist.
    ///
    /// The error carries the full itemised list, not just the first.
    pub fn abort_if_errors(&self, stage: &str) -> Result<(), GateFailed> {
        let errors: Vec<ValidationIssue> = self
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .cloned()
            .collect();
        if errors.is_empty() {
            return Ok(());
        }
        Err(GateFailed {
            stage: stage.to_string(),
            issues: errors,
        })
    }
}

/// A validation gate blocked processing.
#[derive(Debug, Clone, PartialEq)]
pub struct GateFailed {
    pub stage: String,
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for GateFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation failed at {} stage:", self.stage)?;
        for issue in &self.issues {
            writeln!(f, "  - {} (at {})", issue.message, issue.location)?;
        }
        write!(f, "Fix errors before proceeding.")
    }
}

impl std::error::Error for GateFailed {}

/// Recursively collect JSON files under a directory, skipping names that
/// start with `_` or `.`. Returns a sorted list.
pub(crate) fn json_files_recursive(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_json_files(dir, &mut files);
    files.sort();
    files
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_json_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
}

/// Non-hidden subdirectories of a directory, sorted by name.
pub(crate) fn visible_subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| {
                    let name = e.file_name();
                    let name = name.to_string_lossy();
                    e.path().is_dir() && !name.starts_with('_') && !name.starts_with('.')
                })
                .map(|e| e.path())
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}
