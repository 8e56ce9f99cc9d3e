//! Evaluation pipeline orchestration.
//!
//! Sequences the gates and stages for one environment:
//! pre_eval -> pre_aggregate -> aggregate -> pre_workbook -> render,
//! aborting at the first ERROR-bearing gate with the full itemised list.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::aggregate::{aggregate_runs, AggregateError, AggregateSummary};
use crate::config::{load_mode_config, ConfigError, ModeConfig};
use crate::engines::{
    guidelines::{guidelines_pass_fail, score_guideline_issue},
    match_review_item,
    rules::{rules_pass_fail, score_rule},
    stacking::{
        build_redline_clause_set, detect_scope_violations, rules_stacking_pass_fail,
        score_rules_stacking_redline,
    },
};
use crate::fields::FieldResolver;
use crate::gt::{GtData, GtError, GtLoader, GroundTruthFile};
use crate::review::CanonicalReview;
use crate::scoring::detection::DetectionError;
use crate::validate::{
    json_files_recursive, validate_pre_aggregation, validate_pre_evaluation,
    validate_pre_workbook, GateFailed, ValidationResult,
};

/// Evaluation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Freeform,
    FreeformStacking,
    Rules,
    RulesStacking,
    Guidelines,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Freeform,
        Mode::FreeformStacking,
        Mode::Rules,
        Mode::RulesStacking,
        Mode::Guidelines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Freeform => "freeform",
            Mode::FreeformStacking => "freeform_stacking",
            Mode::Rules => "rules",
            Mode::RulesStacking => "rules_stacking",
            Mode::Guidelines => "guidelines",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognised mode names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode {value:?} (expected one of: freeform, freeform_stacking, rules, rules_stacking, guidelines)")]
pub struct UnknownMode {
    pub value: String,
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMode {
                value: s.to_string(),
            })
    }
}

/// Errors from pipeline orchestration.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("mode directory not found: {path}")]
    ModeDirNotFound { path: PathBuf },

    #[error("no evaluation runs found for environment: {env}")]
    NoRunsFound { env: String },

    #[error("{mode} scoring requires the judge runtime; only deterministic modes can be scored here")]
    JudgeRequired { mode: Mode },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gate(#[from] GateFailed),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Gt(#[from] GtError),

    #[error(transparent)]
    Field(#[from] DetectionError),

    #[error("cannot read canonical output {path}: {reason}")]
    CanonicalOutput { path: PathBuf, reason: String },

    #[error("renderer failed: {0}")]
    Render(String),
}

/// Renderer collaborator: consumes the aggregated directory tree and
/// produces a report.
pub trait Renderer {
    fn render(
        &self,
        aggregated_dir: &Path,
        output_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Minimal renderer writing a JSON summary of the aggregated tree.
#[derive(Debug, Default)]
pub struct JsonSummaryRenderer;

impl Renderer for JsonSummaryRenderer {
    fn render(
        &self,
        aggregated_dir: &Path,
        output_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let files = json_files_recursive(aggregated_dir);
        let mut contracts = std::collections::BTreeSet::new();
        let mut models = std::collections::BTreeSet::new();

        for file in &files {
            if let Some(model) = file.file_stem() {
                models.insert(model.to_string_lossy().to_string());
            }
            if let Some(contract) = file.parent().and_then(Path::file_name) {
                contracts.insert(contract.to_string_lossy().to_string());
            }
        }

        let report = json!({
            "aggregated_dir": aggregated_dir.display().to_string(),
            "files": files.len(),
            "contracts": contracts,
            "models": models,
        });

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, serde_json::to_string_pretty(&report)?)?;
        Ok(())
    }
}

/// Summary of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub mode: Mode,
    pub env: String,
    pub runs_processed: usize,
    pub aggregate: AggregateSummary,
    pub aggregated_dir: PathBuf,
    pub report_path: PathBuf,
    pub warnings: usize,
}

/// Orchestrates validation, aggregation and rendering for one mode.
pub struct EvaluationPipeline {
    mode: Mode,
    mode_dir: PathBuf,
    config: ModeConfig,
}

impl EvaluationPipeline {
    /// Create a pipeline, loading the mode config from `config_path` (or
    /// the default `config/{mode}.json`) and resolving the mode directory
    /// from the argument, the config's `paths.base_dir`, or the mode name.
    pub fn new(
        mode: Mode,
        mode_dir: Option<PathBuf>,
        config_path: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let config_path = config_path
            .unwrap_or_else(|| Path::new("config").join(format!("{}.json", mode.as_str())));
        let config = load_mode_config(&config_path)?;

        let mode_dir = mode_dir.unwrap_or_else(|| {
            config
                .paths
                .base_dir
                .clone()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(mode.as_str()))
        });

        Self::with_config(mode, mode_dir, config)
    }

    /// Create a pipeline with an already-loaded configuration.
    pub fn with_config(
        mode: Mode,
        mode_dir: PathBuf,
        config: ModeConfig,
    ) -> Result<Self, PipelineError> {
        if !mode_dir.exists() {
            return Err(PipelineError::ModeDirNotFound { path: mode_dir });
        }
        Ok(Self {
            mode,
            mode_dir,
            config,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn mode_dir(&self) -> &Path {
        &self.mode_dir
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    pub fn gt_loader(&self) -> GtLoader<'_> {
        GtLoader::new(&self.mode_dir, &self.config)
    }

    /// Auto-discover run directories for an environment: subdirectories
    /// of `environments/{env}` with an `evaluations` subtree, falling
    /// back to legacy `run*` directories under the mode directory.
    pub fn discover_runs(&self, env: &str) -> Vec<PathBuf> {
        let env_dir = self.mode_dir.join("environments").join(env);
        let mut runs: Vec<PathBuf> = if env_dir.exists() {
            crate::validate::visible_subdirs(&env_dir)
                .into_iter()
                .filter(|d| d.join("evaluations").exists())
                .collect()
        } else {
            crate::validate::visible_subdirs(&self.mode_dir)
                .into_iter()
                .filter(|d| {
                    d.file_name()
                        .map(|n| n.to_string_lossy().starts_with("run"))
                        .unwrap_or(false)
                        && d.join("evaluations").exists()
                })
                .collect()
        };
        runs.sort();
        runs
    }

    /// Run the pre-evaluation gate.
    pub fn validate_pre_eval(&self, env: &str) -> ValidationResult {
        validate_pre_evaluation(&self.mode_dir, env)
    }

    /// Run the pre-aggregation gate over run directories.
    pub fn validate_runs(&self, run_dirs: &[PathBuf]) -> ValidationResult {
        validate_pre_aggregation(run_dirs)
    }

    /// Run the pre-workbook gate.
    pub fn validate_pre_workbook(&self, env: &str) -> ValidationResult {
        validate_pre_workbook(&self.mode_dir, env)
    }

    /// Score one canonical output file with the mode's deterministic
    /// engine, returning the evaluation record as JSON.
    ///
    /// Freeform and freeform-stacking need the external judge and are
    /// scored by the judge runtime instead.
    pub fn score_contract(
        &self,
        contract: &str,
        model: &str,
        canonical_path: &Path,
    ) -> Result<Value, PipelineError> {
        let gt = self.gt_loader().load(contract, None)?;
        let gt_file = primary_gt_file(&gt.data);

        let raw = fs::read_to_string(canonical_path).map_err(|e| {
            PipelineError::CanonicalOutput {
                path: canonical_path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        let raw: Value =
            serde_json::from_str(&raw).map_err(|e| PipelineError::CanonicalOutput {
                path: canonical_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let review = CanonicalReview::from_value(&raw);

        let resolver = FieldResolver::new(&self.config);
        let issues = resolver.resolve_all(&gt_file.ground_truth)?;

        let meta = json!({
            "contract": contract,
            "model": model,
            "mode": self.mode,
        });

        match self.mode {
            Mode::Rules => {
                let evaluations: Vec<_> = issues
                    .iter()
                    .map(|issue| score_rule(match_review_item(issue, &review), issue, &self.config))
                    .collect();
                let summary = rules_pass_fail(&evaluations, &self.config);
                Ok(json!({
                    "meta": meta,
                    "gt_evaluations": evaluations,
                    "summary": summary,
                }))
            }
            Mode::Guidelines => {
                let evaluations: Vec<_> = issues
                    .iter()
                    .map(|issue| {
                        score_guideline_issue(match_review_item(issue, &review), issue, &self.config)
                    })
                    .collect();
                let summary = guidelines_pass_fail(&evaluations, &issues, &self.config);
                Ok(json!({
                    "meta": meta,
                    "gt_evaluations": evaluations,
                    "summary": summary,
                }))
            }
            Mode::RulesStacking => {
                let redline_clauses = build_redline_clause_set(&issues);
                let evaluations: Vec<_> = issues
                    .iter()
                    .map(|issue| {
                        score_rules_stacking_redline(
                            match_review_item(issue, &review),
                            issue,
                            &self.config,
                        )
                    })
                    .collect();
                let violations = detect_scope_violations(&review, &redline_clauses);
                let summary = rules_stacking_pass_fail(&evaluations, violations, &self.config);
                Ok(json!({
                    "meta": meta,
                    "gt_evaluations": evaluations,
                    "summary": summary,
                }))
            }
            Mode::Freeform | Mode::FreeformStacking => {
                Err(PipelineError::JudgeRequired { mode: self.mode })
            }
        }
    }

    /// Run the complete pipeline: validate -> aggregate -> render.
    pub fn run_full_pipeline(
        &self,
        env: &str,
        run_dirs: Option<Vec<PathBuf>>,
        output_dir: Option<PathBuf>,
        renderer: &dyn Renderer,
    ) -> Result<PipelineSummary, PipelineError> {
        let mut warnings = 0;

        let pre_eval = self.validate_pre_eval(env);
        warnings += log_warnings(&pre_eval);
        pre_eval.abort_if_errors("pre-evaluation")?;

        let runs = match run_dirs {
            Some(runs) if !runs.is_empty() => runs,
            _ => {
                let discovered = self.discover_runs(env);
                if discovered.is_empty() {
                    return Err(PipelineError::NoRunsFound {
                        env: env.to_string(),
                    });
                }
                discovered
            }
        };

        tracing::info!(runs = runs.len(), env, "validating evaluation runs");
        let pre_aggregate = self.validate_runs(&runs);
        warnings += log_warnings(&pre_aggregate);
        pre_aggregate.abort_if_errors("pre-aggregation")?;

        let aggregated_dir = self.mode_dir.join("environments").join(env).join("aggregated");
        let aggregate = aggregate_runs(&runs, &aggregated_dir)?;

        let pre_workbook = self.validate_pre_workbook(env);
        warnings += log_warnings(&pre_workbook);
        pre_workbook.abort_if_errors("pre-workbook")?;

        let output_dir = output_dir.unwrap_or_else(|| self.mode_dir.join("results"));
        let report_path =
            output_dir.join(format!("{}_{env}_summary.json", self.mode.as_str()));
        renderer
            .render(&aggregated_dir, &report_path)
            .map_err(|e| PipelineError::Render(e.to_string()))?;

        Ok(PipelineSummary {
            mode: self.mode,
            env: env.to_string(),
            runs_processed: runs.len(),
            aggregate,
            aggregated_dir,
            report_path,
            warnings,
        })
    }
}

/// Write an evaluation record to its canonical path.
///
/// Writes are idempotent by path: the same (contract, model) always maps
/// to the same file. Unless `overwrite` is set, an existing file is left
/// untouched and `false` is returned. This skip check is the only guard
/// against concurrent writers; at most one writer per (contract, model,
/// environment) is a precondition of the pipeline.
pub fn write_evaluation_record(
    path: &Path,
    record: &Value,
    overwrite: bool,
) -> std::io::Result<bool> {
    if path.exists() && !overwrite {
        tracing::debug!(path = %path.display(), "evaluation exists, skipping write");
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(record)?)?;
    Ok(true)
}

/// The GT file scoring engines consume for single-file modes; dual-part
/// modes score Part A deterministically.
fn primary_gt_file(data: &GtData) -> GroundTruthFile {
    match data {
        GtData::Flat(loaded) => loaded.file.clone(),
        GtData::PerContractType { gt, .. } => gt.file.clone(),
        GtData::DualPart { part_a, .. } => part_a.file(),
    }
}

fn log_warnings(result: &ValidationResult) -> usize {
    let warnings = result.warnings();
    for warning in &warnings {
        tracing::warn!(location = %warning.location, "{}", warning.message);
    }
    warnings.len()
}
