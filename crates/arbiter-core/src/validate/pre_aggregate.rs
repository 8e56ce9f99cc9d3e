//! Pre-aggregation gate: identical, complete coverage across runs.
//!
//! The expected scope is the union of (contract, model) pairs seen across
//! all runs; every run must carry exactly that many files, and every
//! run's count must match every other's. Files are also parsed for
//! syntactic validity, and zero-score anomalies are flagged as warnings.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{visible_subdirs, ValidationIssue, ValidationResult};

/// Validate all prerequisites for aggregation.
pub fn validate_pre_aggregation(runs: &[PathBuf]) -> ValidationResult {
    let mut issues: Vec<ValidationIssue> = Vec::new();

    // Gate 0: runs exist. No runs means nothing to aggregate, which is a
    // warning rather than an error.
    let existing_runs: Vec<&PathBuf> = runs.iter().filter(|r| r.exists()).collect();
    if existing_runs.is_empty() {
        let requested: Vec<Value> = runs
            .iter()
            .map(|r| Value::String(r.display().to_string()))
            .collect();
        return ValidationResult::from_issues(vec![ValidationIssue::warning(
            "No run directories found",
            "aggregation",
        )
        .with_context("runs_requested", requested)]);
    }

    // Gate 1: discover expected scope from all runs.
    let mut all_contracts: BTreeSet<String> = BTreeSet::new();
    let mut all_models: BTreeSet<String> = BTreeSet::new();

    for run in &existing_runs {
        let eval_dir = run.join("evaluations");
        if !eval_dir.exists() {
            issues.push(
                ValidationIssue::error(
                    "Run missing evaluations directory",
                    run.display().to_string(),
                )
                .with_context("expected_path", eval_dir.display().to_string()),
            );
            continue;
        }

        for contract_dir in visible_subdirs(&eval_dir) {
            let contract = contract_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            all_contracts.insert(contract);

            if let Ok(entries) = fs::read_dir(&contract_dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        if let Some(stem) = path.file_stem() {
                            all_models.insert(stem.to_string_lossy().to_string());
                        }
                    }
                }
            }
        }
    }

    if all_contracts.is_empty() {
        let checked: Vec<Value> = existing_runs
            .iter()
            .map(|r| Value::String(run_name(r)))
            .collect();
        issues.push(
            ValidationIssue::warning("No contracts found across all runs", "aggregation")
                .with_context("runs_checked", checked),
        );
        return ValidationResult::from_issues(issues);
    }

    let expected_total = all_contracts.len() * all_models.len();

    // Gate 2: every run has complete coverage.
    let mut run_coverage: BTreeMap<String, usize> = BTreeMap::new();
    for run in &existing_runs {
        let eval_dir = run.join("evaluations");
        let mut actual = 0;
        let mut missing: Vec<String> = Vec::new();

        for contract in &all_contracts {
            for model in &all_models {
                let path = eval_dir.join(contract).join(format!("{model}.json"));
                if path.exists() {
                    actual += 1;
                } else {
                    missing.push(format!("{contract}/{model}"));
                }
            }
        }

        run_coverage.insert(run_name(run), actual);

        if actual != expected_total {
            let first_missing: Vec<Value> = missing
                .iter()
                .take(5)
                .map(|m| Value::String(m.clone()))
                .collect();
            issues.push(
                ValidationIssue::error(
                    format!("Incomplete coverage: {actual}/{expected_total} evaluations"),
                    run.display().to_string(),
                )
                .with_context("missing", first_missing)
                .with_context("total_missing", missing.len()),
            );
        }
    }

    // Gate 3: all runs have numerically identical coverage.
    let distinct: BTreeSet<usize> = run_coverage.values().copied().collect();
    if distinct.len() > 1 {
        let coverage_json: BTreeMap<String, Value> = run_coverage
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        issues.push(
            ValidationIssue::error(
                format!("Run coverage differs: {run_coverage:?}"),
                "aggregation",
            )
            .with_context(
                "coverage_by_run",
                Value::Object(coverage_json.into_iter().collect()),
            ),
        );
    }

    // Gate 4: JSON integrity and zero-score anomalies.
    for run in &existing_runs {
        let eval_dir = run.join("evaluations");
        for contract in &all_contracts {
            for model in &all_models {
                let path = eval_dir.join(contract).join(format!("{model}.json"));
                if !path.exists() {
                    // Already flagged in Gate 2.
                    continue;
                }
                check_evaluation_file(&path, &run_name(run), contract, model, &mut issues);
            }
        }
    }

    ValidationResult::from_issues(issues)
}

fn check_evaluation_file(
    path: &Path,
    run: &str,
    contract: &str,
    model: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            issues.push(
                ValidationIssue::error(
                    format!("Cannot read evaluation file: {e}"),
                    path.display().to_string(),
                )
                .with_context("error", e.to_string()),
            );
            return;
        }
    };

    let data: Value = match serde_json::from_str(&contents) {
        Ok(data) => data,
        Err(e) => {
            issues.push(
                ValidationIssue::error(
                    format!("Invalid JSON at line {}: {e}", e.line()),
                    path.display().to_string(),
                )
                .with_context("error", e.to_string()),
            );
            return;
        }
    };

    // Zero total points with GT items present may indicate a
    // misconfiguration, though it can also be a legitimately bad model.
    let gt_count = data
        .get("gt_evaluations")
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0);
    let total_points = data
        .get("summary")
        .and_then(|s| {
            s.get("total_points")
                .or_else(|| s.get("total_detection_points"))
        })
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    if total_points == 0.0 && gt_count > 0 {
        issues.push(
            ValidationIssue::warning(
                format!("Zero score with {gt_count} GT items - verify data/config"),
                format!("{run}/{contract}/{model}"),
            )
            .with_context("gt_count", gt_count)
            .with_context("total_points", total_points),
        );
    }
}

fn run_name(run: &Path) -> String {
    run.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| run.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_eval(run: &Path, contract: &str, model: &str, value: &Value) {
        let dir = run.join("evaluations").join(contract);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(format!("{model}.json")),
            serde_json::to_string(value).unwrap(),
        )
        .unwrap();
    }

    fn scored_eval() -> Value {
        json!({
            "gt_evaluations": [{"gt_id": "GT-01", "detection": "Y"}],
            "summary": {"total_points": 8}
        })
    }

    #[test]
    fn test_identical_complete_coverage_passes() {
        let dir = tempfile::tempdir().unwrap();
        for run in ["run1", "run2"] {
            let run_dir = dir.path().join(run);
            for contract in ["contract1", "contract2"] {
                for model in ["model_a", "model_b"] {
                    write_eval(&run_dir, contract, model, &scored_eval());
                }
            }
        }

        let result =
            validate_pre_aggregation(&[dir.path().join("run1"), dir.path().join("run2")]);
        assert!(result.valid, "unexpected issues: {:?}", result.issues);
        assert!(result.errors().is_empty());
    }

    #[test]
    fn test_no_runs_is_warning_not_error() {
        let result = validate_pre_aggregation(&[
            PathBuf::from("/nonexistent/run1"),
            PathBuf::from("/nonexistent/run2"),
        ]);
        assert!(result.valid);
        assert_eq!(result.warnings().len(), 1);
        assert!(result.warnings()[0]
            .message
            .contains("No run directories found"));
    }

    #[test]
    fn test_missing_evaluations_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run1");
        fs::create_dir_all(&run).unwrap();

        let result = validate_pre_aggregation(&[run]);
        assert!(!result.valid);
        assert!(result.errors()[0]
            .message
            .contains("Run missing evaluations directory"));
    }

    #[test]
    fn test_empty_evaluations_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run1");
        fs::create_dir_all(run.join("evaluations")).unwrap();

        let result = validate_pre_aggregation(&[run]);
        assert!(result.valid);
        assert!(result.warnings()[0]
            .message
            .contains("No contracts found across all runs"));
    }

    #[test]
    fn test_incomplete_coverage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let run1 = dir.path().join("run1");
        let run2 = dir.path().join("run2");

        // Run 1 complete: 1 contract x 2 models = 2 files. Run 2 is
        // missing one model file.
        for model in ["model_a", "model_b"] {
            write_eval(&run1, "contract1", model, &scored_eval());
        }
        write_eval(&run2, "contract1", "model_a", &scored_eval());

        let result = validate_pre_aggregation(&[run1, run2]);
        assert!(!result.valid);
        let messages: Vec<&str> = result.errors().iter().map(|e| e.message.as_str()).collect();
        assert!(
            messages
                .iter()
                .any(|m| m.contains("Incomplete coverage: 1/2")),
            "got: {messages:?}"
        );
        // Differing counts also trip the identical-coverage gate.
        assert!(messages.iter().any(|m| m.contains("Run coverage differs")));
    }

    #[test]
    fn test_incomplete_coverage_lists_first_missing() {
        let dir = tempfile::tempdir().unwrap();
        let run1 = dir.path().join("run1");
        write_eval(&run1, "contract1", "model_a", &scored_eval());
        // Eight more pairs implied by a second contract dir with many models.
        for model in ["m1", "m2", "m3", "m4", "m5", "m6"] {
            write_eval(&run1, "contract2", model, &scored_eval());
        }

        let result = validate_pre_aggregation(&[run1]);
        let incomplete = result
            .errors()
            .into_iter()
            .find(|e| e.message.contains("Incomplete coverage"))
            .expect("incomplete coverage error");
        let missing = incomplete.context["missing"].as_array().unwrap();
        assert!(missing.len() <= 5);
        assert!(incomplete.context["total_missing"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run1");
        let contract_dir = run.join("evaluations/contract1");
        fs::create_dir_all(&contract_dir).unwrap();
        fs::write(contract_dir.join("model_a.json"), "{bad json").unwrap();

        let result = validate_pre_aggregation(&[run]);
        assert!(!result.valid);
        assert!(result.errors()[0].message.contains("Invalid JSON"));
    }

    #[test]
    fn test_zero_score_anomaly_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run1");
        write_eval(
            &run,
            "contract1",
            "model_a",
            &json!({
                "gt_evaluations": [{"gt_id": "GT-01", "detection": "NMI"}],
                "summary": {"total_points": 0}
            }),
        );

        let result = validate_pre_aggregation(&[run]);
        assert!(result.valid);
        assert!(result.warnings()[0].message.contains("Zero score"));
    }
}
