//! Multi-run aggregation.
//!
//! Merges evaluation files from N run directories into one canonical file
//! per (contract, model) pair. When runs conflict, the most recently
//! listed run's content wins; provenance (run count, source run
//! directories, merge timestamp) is recorded on every merged record.
//!
//! Writes are idempotent by path. The pipeline assumes at most one
//! concurrent writer per (contract, model, environment); that is a
//! precondition, not something this module enforces with locking.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::validate::visible_subdirs;

/// Errors from aggregation.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {reason}")]
    Json { path: PathBuf, reason: String },
}

/// Provenance recorded on every aggregated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub num_runs: usize,
    pub run_dirs: Vec<String>,
    pub aggregated_at: String,
}

/// Summary of an aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregateSummary {
    pub files_written: usize,
    pub contracts: BTreeSet<String>,
    pub models: BTreeSet<String>,
}

/// Merge evaluations from multiple runs into `output_dir`.
///
/// Run directories are processed in the order given; for each (contract,
/// model) pair the content of the last run containing it is kept as
/// primary. An empty result (no evaluations in any run) is not an error.
pub fn aggregate_runs(
    run_dirs: &[PathBuf],
    output_dir: &Path,
) -> Result<AggregateSummary, AggregateError> {
    // (contract, model) -> source files in run order
    let mut sources: BTreeMap<(String, String), Vec<(String, PathBuf)>> = BTreeMap::new();

    for run in run_dirs {
        let eval_dir = run.join("evaluations");
        if !eval_dir.exists() {
            continue;
        }
        let run_label = run
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| run.display().to_string());

        for contract_dir in visible_subdirs(&eval_dir) {
            let contract = contract_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let Ok(entries) = fs::read_dir(&contract_dir) else {
                continue;
            };
            let mut model_files: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            model_files.sort();

            for path in model_files {
                let Some(model) = path.file_stem().map(|s| s.to_string_lossy().to_string())
                else {
                    continue;
                };
                sources
                    .entry((contract.clone(), model))
                    .or_default()
                    .push((run_label.clone(), path));
            }
        }
    }

    let aggregated_at = Utc::now().to_rfc3339();
    let mut summary = AggregateSummary::default();

    for ((contract, model), runs) in &sources {
        // Most recently listed run wins.
        let (_, primary_path) = runs.last().expect("entry has at least one source");

        let contents = fs::read_to_string(primary_path).map_err(|source| AggregateError::Read {
            path: primary_path.clone(),
            source,
        })?;
        let mut data: Value =
            serde_json::from_str(&contents).map_err(|e| AggregateError::Json {
                path: primary_path.clone(),
                reason: e.to_string(),
            })?;

        let provenance = Provenance {
            num_runs: runs.len(),
            run_dirs: runs.iter().map(|(label, _)| label.clone()).collect(),
            aggregated_at: aggregated_at.clone(),
        };
        if let Value::Object(map) = &mut data {
            map.insert(
                "provenance".to_string(),
                serde_json::to_value(&provenance).expect("provenance serialises"),
            );
        }

        let out_path = output_dir.join(contract).join(format!("{model}.json"));
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|source| AggregateError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(
            &out_path,
            serde_json::to_string_pretty(&data).expect("evaluation serialises"),
        )
        .map_err(|source| AggregateError::Write {
            path: out_path.clone(),
            source,
        })?;

        summary.files_written += 1;
        summary.contracts.insert(contract.clone());
        summary.models.insert(model.clone());
    }

    tracing::info!(
        files = summary.files_written,
        contracts = summary.contracts.len(),
        models = summary.models.len(),
        "aggregation complete"
    );

    Ok(summary)
}
