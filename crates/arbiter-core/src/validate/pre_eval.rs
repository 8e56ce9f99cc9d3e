//! Pre-evaluation gate: ground-truth and canonical-output prerequisites.

use serde_json::Value;
use std::fs;
use std::path::Path;

use super::{visible_subdirs, ValidationIssue, ValidationResult};

/// Validate prerequisites before the evaluation stage.
///
/// Checks that the mode directory exists, the ground-truth directory
/// holds parseable files carrying a `ground_truth` key (missing key is a
/// warning only), and a canonical-output directory can be located via the
/// three-path fallback chain with at least one contract subdirectory
/// containing at least one output file.
pub fn validate_pre_evaluation(mode_dir: &Path, env: &str) -> ValidationResult {
    let mut issues = Vec::new();

    if !mode_dir.exists() {
        issues.push(ValidationIssue::error(
            format!("Mode directory not found: {}", mode_dir.display()),
            mode_dir.display().to_string(),
        ));
        // Nothing else can be checked without the mode directory.
        return ValidationResult::from_issues(issues);
    }

    check_ground_truth_dir(mode_dir, &mut issues);
    check_canonical_dir(mode_dir, env, &mut issues);

    ValidationResult::from_issues(issues)
}

fn check_ground_truth_dir(mode_dir: &Path, issues: &mut Vec<ValidationIssue>) {
    let gt_dir = mode_dir.join("ground_truth");
    if !gt_dir.exists() {
        issues.push(ValidationIssue::error(
            format!("Ground truth directory not found: {}", gt_dir.display()),
            gt_dir.display().to_string(),
        ));
        return;
    }

    // Changelog and internal files start with underscore and are skipped.
    let mut gt_files: Vec<_> = fs::read_dir(&gt_dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().is_some_and(|ext| ext == "json")
                        && !p
                            .file_name()
                            .map(|n| n.to_string_lossy().starts_with('_'))
                            .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    gt_files.sort();

    if gt_files.is_empty() {
        issues.push(
            ValidationIssue::error(
                format!("Ground truth directory empty: {}", gt_dir.display()),
                gt_dir.display().to_string(),
            )
            .with_context("expected", "JSON files for ground truth definitions"),
        );
        return;
    }

    for gt_file in &gt_files {
        let name = gt_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let contents = match fs::read_to_string(gt_file) {
            Ok(contents) => contents,
            Err(e) => {
                issues.push(
                    ValidationIssue::error(
                        format!("Cannot read GT file: {name}"),
                        gt_file.display().to_string(),
                    )
                    .with_context("error", e.to_string()),
                );
                continue;
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => {
                if !map.contains_key("ground_truth") {
                    let keys: Vec<Value> =
                        map.keys().map(|k| Value::String(k.clone())).collect();
                    issues.push(
                        ValidationIssue::warning(
                            format!("GT file missing 'ground_truth' key: {name}"),
                            gt_file.display().to_string(),
                        )
                        .with_context("keys", keys),
                    );
                }
            }
            Ok(other) => {
                issues.push(
                    ValidationIssue::warning(
                        format!("GT file is not an object: {name}"),
                        gt_file.display().to_string(),
                    )
                    .with_context("type", json_type_name(&other)),
                );
            }
            Err(e) => {
                issues.push(
                    ValidationIssue::error(
                        format!("Invalid JSON in GT file: {name} (line {})", e.line()),
                        gt_file.display().to_string(),
                    )
                    .with_context("error", e.to_string())
                    .with_context("line", e.line()),
                );
            }
        }
    }
}

fn check_canonical_dir(mode_dir: &Path, env: &str, issues: &mut Vec<ValidationIssue>) {
    // Fallback chain: current structure, then two legacy layouts.
    let candidates = [
        mode_dir.join("environments").join(env).join("canonical_json"),
        mode_dir.join(format!("canonical_json_{env}")),
        mode_dir.join("canonical_json"),
    ];
    let checked: Vec<String> = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    let Some(canonical_dir) = candidates.iter().find(|p| p.exists()) else {
        issues.push(
            ValidationIssue::error(
                format!(
                    "Canonical JSON directory not found (checked: {})",
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
        return;
    };

    let contract_dirs = visible_subdirs(canonical_dir);
    if contract_dirs.is_empty() {
        issues.push(
            ValidationIssue::error(
                format!(
                    "No contract subdirectories in canonical_json: {}",
                    canonical_dir.display()
                ),
                canonical_dir.display().to_string(),
            )
            .with_context(
                "expected_structure",
                "{canonical_dir}/{contract}/{model}.json",
            ),
        );
        return;
    }

    let has_json = contract_dirs.iter().any(|dir| {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            })
            .unwrap_or(false)
    });

    if !has_json {
        issues.push(
            ValidationIssue::error(
                format!(
                    "No model JSON files in canonical_json: {}",
                    canonical_dir.display()
                ),
                canonical_dir.display().to_string(),
            )
            .with_context("contracts_checked", contract_dirs.len()),
        );
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;

    fn write_json(path: &PathBuf, value: &Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    fn valid_mode_dir(root: &Path) -> PathBuf {
        let mode_dir = root.join("freeform");
        write_json(
            &mode_dir.join("ground_truth/consulting.json"),
            &json!({"ground_truth": []}),
        );
        write_json(
            &mode_dir
                .join("environments/hotfix/canonical_json/consulting/pathfinder.json"),
            &json!({"risk_table": []}),
        );
        mode_dir
    }

    #[test]
    fn test_valid_setup_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = valid_mode_dir(dir.path());

        let result = validate_pre_evaluation(&mode_dir, "hotfix");
        assert!(result.valid, "unexpected issues: {:?}", result.issues);
    }

    #[test]
    fn test_missing_mode_dir_is_fatal() {
        let result = validate_pre_evaluation(Path::new("/nonexistent/mode"), "hotfix");
        assert!(!result.valid);
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].message.contains("Mode directory"));
    }

    #[test]
    fn test_missing_gt_key_is_warning_only() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = valid_mode_dir(dir.path());
        write_json(
            &mode_dir.join("ground_truth/odd.json"),
            &json!({"something_else": []}),
        );

        let result = validate_pre_evaluation(&mode_dir, "hotfix");
        assert!(result.valid);
        assert!(result
            .warnings()
            .iter()
            .any(|w| w.message.contains("missing 'ground_truth' key")));
    }

    #[test]
    fn test_unparsable_gt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = valid_mode_dir(dir.path());
        let bad = mode_dir.join("ground_truth/broken.json");
        fs::write(&bad, "{broken").unwrap();

        let result = validate_pre_evaluation(&mode_dir, "hotfix");
        assert!(!result.valid);
        assert!(result
            .errors()
            .iter()
            .any(|e| e.message.contains("Invalid JSON in GT file")));
    }

    #[test]
    fn test_underscore_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = valid_mode_dir(dir.path());
        fs::write(mode_dir.join("ground_truth/_changelog.json"), "not json").unwrap();

        let result = validate_pre_evaluation(&mode_dir, "hotfix");
        assert!(result.valid);
    }

    #[test]
    fn test_canonical_dir_fallback_chain() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = dir.path().join("freeform");
        write_json(
            &mode_dir.join("ground_truth/consulting.json"),
            &json!({"ground_truth": []}),
        );
        // Only the legacy suffixed layout exists.
        write_json(
            &mode_dir.join("canonical_json_hotfix/consulting/pathfinder.json"),
            &json!({}),
        );

        let result = validate_pre_evaluation(&mode_dir, "hotfix");
        assert!(result.valid, "unexpected issues: {:?}", result.issues);
    }

    #[test]
    fn test_canonical_dir_missing_lists_checked_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = dir.path().join("freeform");
        write_json(
            &mode_dir.join("ground_truth/consulting.json"),
            &json!({"ground_truth": []}),
        );

        let result = validate_pre_evaluation(&mode_dir, "hotfix");
        assert!(!result.valid);
        let error = &result.errors()[0];
        assert!(error.message.contains("checked:"));
        assert!(error.context.contains_key("checked_paths"));
    }

    #[test]
    fn test_empty_contract_dirs_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = dir.path().join("freeform");
        write_json(
            &mode_dir.join("ground_truth/consulting.json"),
            &json!({"ground_truth": []}),
        );
        fs::create_dir_all(mode_dir.join("environments/hotfix/canonical_json")).unwrap();

        let result = validate_pre_evaluation(&mode_dir, "hotfix");
        assert!(!result.valid);
        assert!(result.errors()[0]
            .message
            .contains("No contract subdirectories"));
    }
}
