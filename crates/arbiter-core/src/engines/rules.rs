//! Rules-mode scoring: deterministic 5-dimension scoring per rule.
//!
//! - Detection (2 pts): rule trigger identified
//! - Compliance (1 pt): compliance status determined
//! - Action (2 pts): correct action selected (DELETE/AMEND/ADD/FLAG)
//! - Language (2 pts): prescribed language used
//! - Rationale (2 pts): rule citation present
//!
//! Total: 9 points per rule.

use serde::{Deserialize, Serialize};

use super::Grade;
use crate::config::ModeConfig;
use crate::fields::GroundTruthIssue;
use crate::review::ReviewItem;
use crate::scoring::detection::Detection;

/// Classification markers indicating the assistant raised a concern.
const CONCERN_MARKERS: &[&str] = &["\u{274c}", "\u{26a0}\u{fe0f}", "Unfavourable"];

/// Markers counted for the compliance dimension (concern or clarification).
const COMPLIANCE_MARKERS: &[&str] = &["\u{274c}", "\u{26a0}\u{fe0f}", "Unfavourable", "Requires"];

/// One scored rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub test_id: String,
    pub contract: String,
    pub clause_ref: String,
    pub rule_name: String,
    pub expected_action: String,
    pub detected: Detection,
    pub detection_score: f64,
    pub compliance_score: f64,
    pub action_score: f64,
    pub language_score: f64,
    pub rationale_score: f64,
    pub total_score: f64,
    pub max_score: f64,
}

/// Score a single rule evaluation across the five dimensions.
pub fn score_rule(
    output: Option<&ReviewItem>,
    gt_rule: &GroundTruthIssue,
    config: &ModeConfig,
) -> RuleEvaluation {
    let scoring = &config.scoring;
    let max_score = scoring
        .per_rule_max
        .or(config.detection_points.per_rule_max)
        .unwrap_or(9.0);

    let base = RuleEvaluation {
        test_id: gt_rule.id.clone(),
        contract: gt_rule.contract.clone().unwrap_or_default(),
        clause_ref: gt_rule.clause.clone(),
        rule_name: gt_rule.rule_name.clone().unwrap_or_default(),
        expected_action: gt_rule.expected_action.clone().unwrap_or_default(),
        detected: Detection::Nmi,
        detection_score: 0.0,
        compliance_score: 0.0,
        action_score: 0.0,
        language_score: 0.0,
        rationale_score: 0.0,
        total_score: 0.0,
        max_score,
    };

    let Some(item) = output else {
        return base;
    };

    let trigger_quote = gt_rule.trigger_phrase.as_deref().unwrap_or_default();
    let expected_action = base.expected_action.as_str();

    // Detection (2 pts): trigger phrase in combined rationale + proposed
    // text, or a concern-marked classification.
    let mut detected = Detection::Nmi;
    let mut detection_score = 0.0;
    let combined = item.effective_text();
    let trigger_found = !trigger_quote.is_empty() && combined.contains(&trigger_quote.to_lowercase());
    let concern_marked = CONCERN_MARKERS
        .iter()
        .any(|m| item.classification.contains(m));
    if trigger_found || concern_marked {
        detection_score = scoring.dimension_max("detection", 2.0);
        detected = Detection::Y;
    }

    // Compliance (1 pt): unfavorable/warning classification present.
    let mut compliance_score = 0.0;
    if !item.classification.is_empty()
        && COMPLIANCE_MARKERS
            .iter()
            .any(|m| item.classification.contains(m))
    {
        compliance_score = scoring.dimension_max("compliance", 1.0);
        if detected == Detection::Nmi {
            detected = Detection::P;
        }
    }

    // Action (2 pts): exact match, with partial credit for similar actions.
    let mut action_score = 0.0;
    if !item.action.is_empty() {
        let action_norm = item.action.to_uppercase().trim().to_string();
        let expected_norm = expected_action.to_uppercase().trim().to_string();
        if action_norm == expected_norm {
            action_score = scoring.dimension_max("action", 2.0);
        } else if action_partially_correct(&action_norm, &expected_norm) {
            action_score = 1.0;
        }
    }

    // Language (2 pts): key elements matched by leading significant words.
    let mut language_score = 0.0;
    if !item.proposed_text.is_empty() && !gt_rule.key_elements.is_empty() {
        let language_lower = item.proposed_text.to_lowercase();
        let matched = count_element_matches(&gt_rule.key_elements, &language_lower, 3);
        if matched as f64 >= gt_rule.key_elements.len() as f64 * 0.7 {
            language_score = scoring.dimension_max("language", 2.0);
        } else if matched > 0 {
            language_score = 1.0;
        }
    }

    // Rationale (2 pts): required citations matched.
    let mut rationale_score = 0.0;
    if !item.rationale.is_empty() && !gt_rule.rationale_must_include.is_empty() {
        let rationale_lower = item.rationale.to_lowercase();
        let matched = count_element_matches(&gt_rule.rationale_must_include, &rationale_lower, 3);
        if matched as f64 >= gt_rule.rationale_must_include.len() as f64 * 0.5 {
            rationale_score = scoring.dimension_max("rationale", 2.0);
        } else if matched > 0 {
            rationale_score = 1.0;
        }
    }

    let total_score =
        detection_score + compliance_score + action_score + language_score + rationale_score;

    // A zero total means nothing was found; a detected rule with the wrong
    // action only counts as partial.
    if total_score == 0.0 {
        detected = Detection::Nmi;
    } else if action_score == 0.0 && detection_score > 0.0 {
        detected = Detection::P;
    } else if detected == Detection::Nmi {
        detected = Detection::P;
    }

    RuleEvaluation {
        detected,
        detection_score,
        compliance_score,
        action_score,
        language_score,
        rationale_score,
        total_score,
        ..base
    }
}

/// Count elements whose leading significant words appear in the text.
///
/// An element matches when any of its first `prefix_words` words longer
/// than three characters appears in the text.
pub(crate) fn count_element_matches(
    elements: &[String],
    text_lower: &str,
    prefix_words: usize,
) -> usize {
    elements
        .iter()
        .filter(|elem| {
            elem.split_whitespace()
                .take(prefix_words)
                .any(|word| word.len() > 3 && text_lower.contains(&word.to_lowercase()))
        })
        .count()
}

/// Fixed similarity table for partial action credit.
fn action_partially_correct(action: &str, expected: &str) -> bool {
    matches!(
        (action, expected),
        ("AMEND", "DELETE") | ("DELETE", "AMEND") | ("FLAG", "AMEND")
    )
}

/// Pass/fail outcome for rules mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesOutcome {
    pub grade: Grade,
    pub reason: String,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub rules_triggered: usize,
    pub rules_complied: usize,
    pub compliance_rate: f64,
}

/// Calculate pass/fail for rules mode.
pub fn rules_pass_fail(evaluations: &[RuleEvaluation], config: &ModeConfig) -> RulesOutcome {
    let total_score: f64 = evaluations.iter().map(|e| e.total_score).sum();
    let max_score: f64 = evaluations.iter().map(|e| e.max_score).sum();
    let percentage = if max_score > 0.0 {
        total_score / max_score * 100.0
    } else {
        0.0
    };

    let rules_triggered = evaluations
        .iter()
        .filter(|e| e.detected != Detection::Nmi)
        .count();
    let rules_complied = evaluations
        .iter()
        .filter(|e| e.detected == Detection::Y && e.action_score > 0.0)
        .count();
    let compliance_rate = if rules_triggered > 0 {
        rules_complied as f64 / rules_triggered as f64 * 100.0
    } else {
        0.0
    };

    let pass_threshold = config
        .pass_criteria
        .pass
        .min_percentage
        .unwrap_or(80.0);
    let marginal_threshold = config
        .pass_criteria
        .marginal
        .min_percentage
        .unwrap_or(60.0);

    let (grade, reason) = if percentage >= pass_threshold && compliance_rate >= 80.0 {
        (
            Grade::Pass,
            format!("Score {percentage:.1}% >= {pass_threshold}%"),
        )
    } else if percentage >= marginal_threshold {
        (
            Grade::Marginal,
            format!("Score {percentage:.1}% >= {marginal_threshold}% but < {pass_threshold}%"),
        )
    } else {
        (
            Grade::Fail,
            format!("Score {percentage:.1}% < {marginal_threshold}%"),
        )
    };

    RulesOutcome {
        grade,
        reason,
        total_score,
        max_score,
        percentage: round2(percentage),
        rules_triggered,
        rules_complied,
        compliance_rate: round2(compliance_rate),
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gt_rule() -> GroundTruthIssue {
        GroundTruthIssue {
            id: "R-01".to_string(),
            clause: "4.2".to_string(),
            expected_action: Some("AMEND".to_string()),
            trigger_phrase: Some("unlimited liability".to_string()),
            key_elements: vec![
                "aggregate liability cap".to_string(),
                "twelve months fees".to_string(),
            ],
            rationale_must_include: vec!["Rule 4.2".to_string()],
            ..Default::default()
        }
    }

    fn full_marks_output() -> ReviewItem {
        ReviewItem {
            classification: "\u{274c} Unfavourable".to_string(),
            action: "AMEND".to_string(),
            proposed_text: "Insert an aggregate liability cap equal to twelve months fees."
                .to_string(),
            rationale: "Rule 4.2 prohibits unlimited liability.".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_output_scores_nmi() {
        let config = ModeConfig::bare("rules");
        let result = score_rule(None, &gt_rule(), &config);
        assert_eq!(result.detected, Detection::Nmi);
        assert_eq!(result.total_score, 0.0);
        assert_eq!(result.max_score, 9.0);
    }

    #[test]
    fn test_full_marks() {
        let config = ModeConfig::bare("rules");
        let result = score_rule(Some(&full_marks_output()), &gt_rule(), &config);
        assert_eq!(result.detected, Detection::Y);
        assert_eq!(result.detection_score, 2.0);
        assert_eq!(result.compliance_score, 1.0);
        assert_eq!(result.action_score, 2.0);
        assert_eq!(result.language_score, 2.0);
        assert_eq!(result.rationale_score, 2.0);
        assert_eq!(result.total_score, 9.0);
    }

    #[test]
    fn test_similar_action_earns_partial_credit() {
        let config = ModeConfig::bare("rules");
        let mut output = full_marks_output();
        output.action = "DELETE".to_string();
        let result = score_rule(Some(&output), &gt_rule(), &config);
        assert_eq!(result.action_score, 1.0);

        output.action = "ADD".to_string();
        let result = score_rule(Some(&output), &gt_rule(), &config);
        assert_eq!(result.action_score, 0.0);
    }

    #[test]
    fn test_detected_without_action_downgrades_to_p() {
        let config = ModeConfig::bare("rules");
        let output = ReviewItem {
            classification: "\u{274c} Unfavourable".to_string(),
            rationale: "Rule 4.2 concern".to_string(),
            ..Default::default()
        };
        let result = score_rule(Some(&output), &gt_rule(), &config);
        assert!(result.detection_score > 0.0);
        assert_eq!(result.action_score, 0.0);
        assert_eq!(result.detected, Detection::P);
    }

    #[test]
    fn test_rules_pass_fail_thresholds() {
        let config = ModeConfig::bare("rules");
        let make_eval = |total: f64, detected: Detection, action: f64| RuleEvaluation {
            test_id: String::new(),
            contract: String::new(),
            clause_ref: String::new(),
            rule_name: String::new(),
            expected_action: String::new(),
            detected,
            detection_score: 2.0,
            compliance_score: 0.0,
            action_score: action,
            language_score: 0.0,
            rationale_score: 0.0,
            total_score: total,
            max_score: 9.0,
        };

        let evals = vec![
            make_eval(9.0, Detection::Y, 2.0),
            make_eval(8.0, Detection::Y, 2.0),
        ];
        let outcome = rules_pass_fail(&evals, &config);
        assert_eq!(outcome.grade, Grade::Pass);
        assert_eq!(outcome.compliance_rate, 100.0);

        let evals = vec![make_eval(6.0, Detection::P, 0.0)];
        let outcome = rules_pass_fail(&evals, &config);
        assert_eq!(outcome.grade, Grade::Marginal);

        let evals = vec![make_eval(1.0, Detection::P, 0.0)];
        let outcome = rules_pass_fail(&evals, &config);
        assert_eq!(outcome.grade, Grade::Fail);
    }
}
