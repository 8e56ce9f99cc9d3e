//! Pre-workbook gate: aggregated-results prerequisites.

use serde_json::Value;
use std::fs;
use std::path::Path;

use super::{json_files_recursive, ValidationIssue, ValidationResult};

/// Validate prerequisites before workbook generation.
///
/// Locates the aggregated directory via the two-path fallback chain,
/// requires at least one JSON file, requires at least one non-empty
/// object-shaped file, and flags zero-score anomalies (overall and
/// per-part) as warnings.
pub fn validate_pre_workbook(mode_dir: &Path, env: &str) -> ValidationResult {
    let mut issues = Vec::new();

    let candidates = [
        mode_dir.join("environments").join(env).join("aggregated"),
        mode_dir.join("aggregated"),
    ];
    let checked: Vec<String> = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    let Some(aggregated_dir) = candidates.iter().find(|p| p.exists()) else {
        issues.push(
            ValidationIssue::error(
                format!(
                    "Aggregated directory not found (checked: {})",
                    checked.join(", ")
                ),
                mode_dir.display().to_string(),
            )
            .with_context(
                "checked_paths",
                checked
                    .iter()
                    .map(|p| Value::String(p.clone()))
                    .collect::<Vec<_>>(),
            ),
        );
        return ValidationResult::from_issues(issues);
    };

    // Files may be flat or nested in contract subdirectories.
    let json_files = json_files_recursive(aggregated_dir);
    if json_files.is_empty() {
        issues.push(
            ValidationIssue::error(
                format!("Aggregated directory is empty: {}", aggregated_dir.display()),
                aggregated_dir.display().to_string(),
            )
            .with_context("expected", "JSON files with aggregated evaluation results"),
        );
        return ValidationResult::from_issues(issues);
    }

    // A sample of files is enough to prove the directory holds content.
    let sample: Vec<_> = json_files.iter().take(10).collect();
    let mut all_empty = true;

    for agg_file in &sample {
        let name = agg_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let contents = match fs::read_to_string(agg_file) {
            Ok(contents) => contents,
            Err(e) => {
                issues.push(
                    ValidationIssue::warning(
                        format!("Cannot read aggregated file: {name}"),
                        agg_file.display().to_string(),
                    )
                    .with_context("error", e.to_string()),
                );
                continue;
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(data) => {
                let is_empty = match &data {
                    Value::Object(map) => map.is_empty(),
                    Value::Array(arr) => arr.is_empty(),
                    Value::Null => true,
                    _ => false,
                };
                if is_empty {
                    continue;
                }
                all_empty = false;

                if data.is_object() {
                    check_zero_scores(&data, agg_file, &mut issues);
                }
            }
            Err(e) => {
                issues.push(
                    ValidationIssue::error(
                        format!("Invalid JSON in aggregated file: {name} (line {})", e.line()),
                        agg_file.display().to_string(),
                    )
                    .with_context("error", e.to_string())
                    .with_context("line", e.line()),
                );
            }
        }
    }

    if all_empty {
        issues.push(
            ValidationIssue::error(
                format!("All aggregated files are empty: {}", aggregated_dir.display()),
                aggregated_dir.display().to_string(),
            )
            .with_context("files_checked", sample.len()),
        );
    }

    ValidationResult::from_issues(issues)
}

/// Zero scores with GT items present may indicate data or config issues.
/// Warnings only, since they can also be legitimately poor performance.
fn check_zero_scores(data: &Value, file_path: &Path, issues: &mut Vec<ValidationIssue>) {
    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let summary = data.get("summary").cloned().unwrap_or(Value::Null);
    let gt_count = data
        .get("gt_evaluations")
        .and_then(Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0);
    let has_gt = gt_count > 0;

    let total_points = summary
        .get("total_points")
        .or_else(|| summary.get("total_detection_points"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let weighted_score = summary
        .get("weighted_score")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    if has_gt && total_points == 0.0 && weighted_score == 0.0 {
        issues.push(
            ValidationIssue::warning(
                format!("Zero score with GT items present: {name}"),
                file_path.display().to_string(),
            )
            .with_context("total_points", total_points)
            .with_context("gt_items", gt_count)
            .with_context(
                "note",
                "May indicate data issue or legitimately poor model performance",
            ),
        );
    }

    // Multi-part evaluations carry per-part summaries.
    for part_key in ["part_a", "part_b", "part_c"] {
        let Some(part_data) = summary.get(part_key).filter(|v| !v.is_null()) else {
            continue;
        };
        if part_data.as_object().is_some_and(|m| m.is_empty()) {
            continue;
        }

        let part_score = part_data
            .get("total_score")
            .or_else(|| part_data.get("weighted_score"))
            .and_then(Value::as_f64);

        if part_score == Some(0.0) && has_gt {
            issues.push(
                ValidationIssue::warning(
                    format!("Zero {part_key} score: {name}"),
                    file_path.display().to_string(),
                )
                .with_context("part", part_key)
                .with_context("score", 0.0)
                .with_context(
                    "note",
                    "May indicate missing part data or poor performance",
                ),
            );
        }
    }
}
