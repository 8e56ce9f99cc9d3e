//! Mode configuration loading and schema validation.
//!
//! Each evaluation mode ships a JSON configuration describing its
//! ground-truth structure, field names, weight tables, pass criteria and
//! gate switches. Configs are validated against an embedded Draft-7
//! schema; failures report the field path and, for enum mismatches, the
//! allowed values. Once loaded, a [`ModeConfig`] is immutable and passed
//! explicitly into every call that needs it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::scoring::points::TierWeightTable;

/// Embedded configuration schema.
const MODE_CONFIG_SCHEMA: &str = include_str!("../schemas/mode_config.schema.json");

/// A single schema violation with its field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub field_path: String,
    pub message: String,
    pub allowed: Option<Vec<String>>,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field_path.is_empty() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}: {}", self.field_path, self.message)?;
        }
        if let Some(allowed) = &self.allowed {
            write!(f, " (allowed values: {})", allowed.join(", "))?;
        }
        Ok(())
    }
}

/// Errors from configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid JSON in {path} at line {line}, column {column}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{}", format_violations(.path, .violations))]
    Invalid {
        path: PathBuf,
        violations: Vec<SchemaViolation>,
    },

    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_violations(path: &Path, violations: &[SchemaViolation]) -> String {
    let mut out = format!("configuration validation failed for {}:", path.display());
    for v in violations {
        out.push_str("\n  - ");
        out.push_str(&v.to_string());
    }
    out
}

/// How the mode's ground truth is organised on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GtKind {
    #[default]
    Flat,
    DualPart,
    PerContractType,
}

/// Part discriminator for dual-part modes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    PartA,
    PartB,
}

/// Field names for one part of a dual-part mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PartFields {
    pub id_field: Option<String>,
    pub tier_field: Option<String>,
    pub clause_field: Option<String>,
    pub issue_field: Option<String>,
}

/// Ground-truth structure section of a mode config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GtStructure {
    #[serde(rename = "type", default)]
    pub kind: GtKind,
    pub id_field: Option<String>,
    pub tier_field: Option<String>,
    pub clause_field: Option<String>,
    pub issue_field: Option<String>,
    /// Known GT files for per_contract_type modes.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub parts: BTreeMap<Part, PartFields>,
}

/// Ground-truth file name pattern: one pattern for flat modes, or one per
/// part for dual-part modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GtPattern {
    Single(String),
    PerPart {
        part_a: Option<String>,
        part_b: Option<String>,
    },
}

/// Paths section of a mode config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub base_dir: Option<String>,
    #[serde(default = "default_ground_truth")]
    pub ground_truth: String,
    #[serde(default)]
    pub gt_pattern: Option<GtPattern>,
}

fn default_ground_truth() -> String {
    "ground_truth".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            ground_truth: default_ground_truth(),
            gt_pattern: None,
        }
    }
}

/// Part A point configuration for stacking modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartAPoints {
    #[serde(default = "default_per_redline")]
    pub per_redline: f64,
    #[serde(default = "default_max_per_dimension")]
    pub max_per_dimension: f64,
}

fn default_per_redline() -> f64 {
    6.0
}

fn default_max_per_dimension() -> f64 {
    2.0
}

impl Default for PartAPoints {
    fn default() -> Self {
        Self {
            per_redline: default_per_redline(),
            max_per_dimension: default_max_per_dimension(),
        }
    }
}

/// Detection point configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionPoints {
    /// Tier weight table for detection-scored modes.
    #[serde(default)]
    pub tiers: TierWeightTable,
    #[serde(default)]
    pub part_a: Option<PartAPoints>,
    /// Part B tier weights for stacking modes.
    #[serde(default)]
    pub part_b: Option<TierWeightTable>,
    /// Per-rule maximum for dimension-scored rules modes.
    #[serde(default)]
    pub per_rule_max: Option<f64>,
}

impl DetectionPoints {
    /// Tier weight table for a part, falling back to the mode-level table.
    pub fn table_for(&self, part: Option<Part>) -> &TierWeightTable {
        match part {
            Some(Part::PartB) => self.part_b.as_ref().unwrap_or(&self.tiers),
            _ => &self.tiers,
        }
    }
}

/// Maximum points for one scoring dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionMax {
    pub max: f64,
}

/// Dimension scoring configuration for rules modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoringConfig {
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimensionMax>,
    #[serde(default)]
    pub per_rule_max: Option<f64>,
    #[serde(default)]
    pub per_redline_max: Option<f64>,
}

impl ScoringConfig {
    /// Configured maximum for a dimension, or the given default.
    pub fn dimension_max(&self, dimension: &str, default: f64) -> f64 {
        self.dimensions
            .get(dimension)
            .map(|d| d.max)
            .unwrap_or(default)
    }
}

/// A pass/marginal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Threshold {
    #[serde(default)]
    pub min_percentage: Option<f64>,
    #[serde(default)]
    pub max_scope_violations: Option<usize>,
}

/// Pass criteria section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PassCriteria {
    #[serde(default)]
    pub pass: Threshold,
    #[serde(default)]
    pub marginal: Threshold,
}

/// Gate switches for stacking modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GatesConfig {
    #[serde(default = "default_true")]
    pub critical_failure_gate: bool,
    #[serde(default = "default_true")]
    pub t1_gate: bool,
    #[serde(default = "default_t1_applies_to")]
    pub t1_gate_applies_to: Part,
}

fn default_true() -> bool {
    true
}

fn default_t1_applies_to() -> Part {
    Part::PartB
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            critical_failure_gate: true,
            t1_gate: true,
            t1_gate_applies_to: Part::PartB,
        }
    }
}

/// Full mode configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub mode: String,
    #[serde(default)]
    pub gt_structure: GtStructure,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub detection_points: DetectionPoints,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub pass_criteria: PassCriteria,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub contract_types: Vec<String>,
}

impl ModeConfig {
    /// Minimal config for a mode, used as a starting point in tests and
    /// by callers that configure programmatically.
    pub fn bare(mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            gt_structure: GtStructure::default(),
            paths: PathsConfig::default(),
            detection_points: DetectionPoints {
                tiers: TierWeightTable::standard(),
                ..Default::default()
            },
            scoring: ScoringConfig::default(),
            pass_criteria: PassCriteria::default(),
            gates: GatesConfig::default(),
            contract_types: Vec::new(),
        }
    }
}

/// Load a mode configuration file, validating against the embedded schema.
pub fn load_mode_config(config_path: &Path) -> Result<ModeConfig, ConfigError> {
    load_mode_config_with_validation(config_path, true)
}

/// Load a mode configuration file, optionally skipping schema validation.
pub fn load_mode_config_with_validation(
    config_path: &Path,
    validate: bool,
) -> Result<ModeConfig, ConfigError> {
    if !config_path.exists() {
        return Err(ConfigError::NotFound {
            path: config_path.to_path_buf(),
        });
    }

    let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;

    let raw: Value = serde_json::from_str(&contents).map_err(|e| ConfigError::Malformed {
        path: config_path.to_path_buf(),
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })?;

    if validate {
        let violations = validate_against_schema(&raw);
        if !violations.is_empty() {
            return Err(ConfigError::Invalid {
                path: config_path.to_path_buf(),
                violations,
            });
        }
    }

    serde_json::from_value(raw).map_err(|e| ConfigError::Invalid {
        path: config_path.to_path_buf(),
        violations: vec![SchemaViolation {
            field_path: String::new(),
            message: e.to_string(),
            allowed: None,
        }],
    })
}

/// Validate a raw config value against the embedded schema.
pub fn validate_against_schema(raw: &Value) -> Vec<SchemaViolation> {
    let schema: Value =
        serde_json::from_str(MODE_CONFIG_SCHEMA).expect("embedded schema is valid JSON");
    let validator = jsonschema::validator_for(&schema).expect("embedded schema compiles");

    validator
        .iter_errors(raw)
        .map(|err| {
            let allowed = match &err.kind {
                jsonschema::error::ValidationErrorKind::Enum { options } => options
                    .as_array()
                    .map(|opts| opts.iter().map(|v| v.to_string()).collect()),
                _ => None,
            };
            SchemaViolation {
                field_path: err.instance_path.to_string(),
                message: err.to_string(),
                allowed,
            }
        })
        .collect()
}
