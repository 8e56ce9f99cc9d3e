//! Reasoning validation for catching false favorable assessments.
//!
//! A favorable classification backed by reasoning that misses required
//! phrases (or contains forbidden ones) is a false favorable: the
//! assistant approved a clause for the wrong reasons.

use serde::{Deserialize, Serialize};

use super::classification::is_issue_detected;
use crate::fields::GroundTruthIssue;

/// Result of validating reasoning against phrase constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningCheck {
    pub valid: bool,
    /// Required phrases not found.
    pub missing_required: Vec<String>,
    /// Forbidden phrases that were found.
    pub forbidden_found: Vec<String>,
    /// 1.0 with no violations, degrading toward 0.0.
    pub confidence: f64,
}

/// Validate reasoning against required/forbidden phrase lists.
pub fn validate_reasoning(
    reasoning: &str,
    must_contain: &[String],
    must_not_contain: &[String],
) -> ReasoningCheck {
    let reasoning_lower = reasoning.to_lowercase();

    let missing_required: Vec<String> = must_contain
        .iter()
        .filter(|phrase| !reasoning_lower.contains(&phrase.to_lowercase()))
        .cloned()
        .collect();

    let forbidden_found: Vec<String> = must_not_contain
        .iter()
        .filter(|phrase| reasoning_lower.contains(&phrase.to_lowercase()))
        .cloned()
        .collect();

    let valid = missing_required.is_empty() && forbidden_found.is_empty();

    let total_checks = must_contain.len() + must_not_contain.len();
    let violations = missing_required.len() + forbidden_found.len();
    let confidence = if total_checks == 0 {
        1.0
    } else {
        (1.0 - violations as f64 / total_checks as f64).max(0.0)
    };

    ReasoningCheck {
        valid,
        missing_required,
        forbidden_found,
        confidence,
    }
}

/// Result of the false-favorable check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalseFavorable {
    pub is_false_favorable: bool,
    pub reason: String,
    pub check: Option<ReasoningCheck>,
}

/// Check whether a favorable classification is actually a false favorable.
///
/// Only fires when the classification reads favorable and the GT item
/// carries reasoning constraints.
pub fn check_false_favorable(
    classification: &str,
    reasoning: &str,
    gt_issue: &GroundTruthIssue,
) -> FalseFavorable {
    let must_contain = &gt_issue.reasoning_must_contain;
    let must_not_contain = &gt_issue.reasoning_must_not_contain;

    if must_contain.is_empty() && must_not_contain.is_empty() {
        return FalseFavorable {
            is_false_favorable: false,
            reason: "No reasoning validation rules defined".to_string(),
            check: None,
        };
    }

    if is_issue_detected(Some(classification)) != Some(false) {
        return FalseFavorable {
            is_false_favorable: false,
            reason: "Classification is not favorable".to_string(),
            check: None,
        };
    }

    let check = validate_reasoning(reasoning, must_contain, must_not_contain);

    if !check.valid {
        let mut reasons = Vec::new();
        if !check.missing_required.is_empty() {
            reasons.push(format!("Missing required: {:?}", check.missing_required));
        }
        if !check.forbidden_found.is_empty() {
            reasons.push(format!("Contains forbidden: {:?}", check.forbidden_found));
        }
        return FalseFavorable {
            is_false_favorable: true,
            reason: reasons.join("; "),
            check: Some(check),
        };
    }

    FalseFavorable {
        is_false_favorable: false,
        reason: "Reasoning validation passed".to_string(),
        check: Some(check),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_reasoning_all_present() {
        let check = validate_reasoning(
            "The cap excludes indemnity claims as required.",
            &phrases(&["indemnity"]),
            &phrases(&["uncapped"]),
        );
        assert!(check.valid);
        assert_eq!(check.confidence, 1.0);
    }

    #[test]
    fn test_validate_reasoning_missing_and_forbidden() {
        let check = validate_reasoning(
            "Liability is uncapped here.",
            &phrases(&["indemnity", "carve-out"]),
            &phrases(&["uncapped"]),
        );
        assert!(!check.valid);
        assert_eq!(check.missing_required.len(), 2);
        assert_eq!(check.forbidden_found, vec!["uncapped".to_string()]);
        assert_eq!(check.confidence, 0.0);
    }

    #[test]
    fn test_confidence_degrades_proportionally() {
        let check = validate_reasoning(
            "Mentions indemnity only.",
            &phrases(&["indemnity", "carve-out"]),
            &[],
        );
        assert_eq!(check.confidence, 0.5);
    }

    #[test]
    fn test_no_rules_cannot_be_false_favorable() {
        let gt = GroundTruthIssue::default();
        let result = check_false_favorable("\u{2705} Favourable", "anything", &gt);
        assert!(!result.is_false_favorable);
        assert!(result.check.is_none());
    }

    #[test]
    fn test_unfavorable_classification_skips_check() {
        let gt = GroundTruthIssue {
            reasoning_must_contain: phrases(&["indemnity"]),
            ..Default::default()
        };
        let result = check_false_favorable("\u{274c} Unfavourable", "no mention", &gt);
        assert!(!result.is_false_favorable);
        assert_eq!(result.reason, "Classification is not favorable");
    }

    #[test]
    fn test_false_favorable_detected() {
        let gt = GroundTruthIssue {
            reasoning_must_contain: phrases(&["aggregate cap"]),
            reasoning_must_not_contain: phrases(&["standard market"]),
            ..Default::default()
        };
        let result = check_false_favorable(
            "\u{2705} Favourable",
            "This is standard market practice.",
            &gt,
        );
        assert!(result.is_false_favorable);
        assert!(result.reason.contains("Missing required"));
        assert!(result.reason.contains("Contains forbidden"));
    }
}
