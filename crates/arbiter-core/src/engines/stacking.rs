//! Stacking-mode scoring: adversarial redline acceptance layered on a
//! base review.
//!
//! Part A scores the assistant's accept/modify/reject decisions on
//! counter-party redlines (6 points each: action 2, revision 2,
//! reasoning 2). A redline is adversarial when ACCEPT is not among its
//! acceptable actions; accepting one is a critical failure that forces
//! overall FAIL regardless of score. Rules-stacking additionally treats
//! any comment or redline outside the ground-truth redline clause set as
//! a critical scope violation.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::rules::round2;
use super::Grade;
use crate::config::ModeConfig;
use crate::fields::GroundTruthIssue;
use crate::review::{CanonicalReview, ReviewItem};
use crate::scoring::detection::{Detection, Tier};
use crate::summary::EvaluationSummary;

/// Critical failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    AcceptOnAdversarial,
    NotMentioned,
}

/// Failure severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailureSeverity {
    Critical,
    High,
}

/// A critical failure on a counter-party redline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalFailure {
    pub redline_id: String,
    pub failure_type: FailureType,
    pub expected: Vec<String>,
    pub actual: String,
    pub severity: FailureSeverity,
    pub message: String,
}

/// Result of validating a redline action against its acceptable set.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCheck {
    pub action_correct: bool,
    pub is_adversarial: bool,
    pub critical_failure: Option<CriticalFailure>,
}

/// Validate the assistant's action against the acceptable actions for a
/// counter-party redline.
pub fn validate_cp_redline_action(
    review_action: &str,
    acceptable_actions: &[String],
    redline_id: &str,
) -> ActionCheck {
    let action_norm = if review_action.trim().is_empty() {
        "NMI".to_string()
    } else {
        review_action.trim().to_uppercase()
    };
    let acceptable_norm: Vec<String> = acceptable_actions
        .iter()
        .map(|a| a.trim().to_uppercase())
        .collect();

    let is_adversarial = !acceptable_norm.iter().any(|a| a == "ACCEPT");
    let action_correct = acceptable_norm.iter().any(|a| *a == action_norm);

    let critical_failure = if is_adversarial && action_norm == "ACCEPT" {
        Some(CriticalFailure {
            redline_id: redline_id.to_string(),
            failure_type: FailureType::AcceptOnAdversarial,
            expected: acceptable_actions.to_vec(),
            actual: review_action.to_string(),
            severity: FailureSeverity::Critical,
            message: format!(
                "Accepted adversarial redline {redline_id} that should be REJECT/MODIFY"
            ),
        })
    } else {
        None
    };

    ActionCheck {
        action_correct,
        is_adversarial,
        critical_failure,
    }
}

/// One scored Part A counter-party redline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedlineEvaluation {
    pub redline_id: String,
    pub clause_ref: String,
    pub section: Option<String>,
    pub expected_actions: Vec<String>,
    pub review_action: String,
    pub action_correct: bool,
    pub is_adversarial: bool,
    pub action_score: f64,
    pub revision_score: f64,
    pub reasoning_score: f64,
    pub total_score: f64,
    pub max_score: f64,
    pub critical_failure: Option<CriticalFailure>,
}

/// Score a single Part A counter-party redline (action 2, revision 2,
/// reasoning 2).
pub fn score_part_a_redline(
    response: Option<&ReviewItem>,
    gt_redline: &GroundTruthIssue,
    config: &ModeConfig,
) -> RedlineEvaluation {
    let points = config.detection_points.part_a.unwrap_or_default();
    let max_per_dimension = points.max_per_dimension;
    let max_total = points.per_redline;

    let redline_id = gt_redline.id.clone();
    let acceptable = &gt_redline.acceptable_actions;

    let Some(item) = response else {
        let is_adversarial = !acceptable.iter().any(|a| a.to_uppercase() == "ACCEPT");
        return RedlineEvaluation {
            redline_id: redline_id.clone(),
            clause_ref: gt_redline.clause.clone(),
            section: gt_redline.section.clone(),
            expected_actions: acceptable.clone(),
            review_action: "NMI".to_string(),
            action_correct: false,
            is_adversarial,
            action_score: 0.0,
            revision_score: 0.0,
            reasoning_score: 0.0,
            total_score: 0.0,
            max_score: max_total,
            critical_failure: is_adversarial.then(|| CriticalFailure {
                redline_id,
                failure_type: FailureType::NotMentioned,
                expected: acceptable.clone(),
                actual: "NMI".to_string(),
                severity: FailureSeverity::High,
                message: "Adversarial redline was not addressed at all".to_string(),
            }),
        };
    };

    let check = validate_cp_redline_action(&item.action, acceptable, &redline_id);
    let action_score = if check.action_correct {
        max_per_dimension
    } else {
        0.0
    };

    // Revision quality: substantive text that carries the key elements.
    let mut revision_score = 0.0;
    if item.proposed_text.len() > 20 {
        if gt_redline.key_elements.is_empty() {
            revision_score = 1.0;
        } else {
            let revision_lower = item.proposed_text.to_lowercase();
            let matched = gt_redline
                .key_elements
                .iter()
                .filter(|elem| {
                    elem.to_lowercase()
                        .split_whitespace()
                        .take(3)
                        .any(|word| revision_lower.contains(word))
                })
                .count();
            revision_score = (matched as f64).min(max_per_dimension);
        }
    }

    // Reasoning quality: substantive explanation that addresses the
    // required point.
    let mut reasoning_score = 0.0;
    if item.rationale.len() > 30 {
        match gt_redline.reasoning_must_address.as_deref() {
            Some(must) if !must.is_empty() => {
                let reasoning_lower = item.rationale.to_lowercase();
                let addressed = must
                    .to_lowercase()
                    .split_whitespace()
                    .take(5)
                    .any(|word| word.len() > 4 && reasoning_lower.contains(word));
                reasoning_score = if addressed { max_per_dimension } else { 1.0 };
            }
            _ => reasoning_score = 1.0,
        }
    }

    RedlineEvaluation {
        redline_id,
        clause_ref: gt_redline.clause.clone(),
        section: gt_redline.section.clone(),
        expected_actions: acceptable.clone(),
        review_action: item.action.clone(),
        action_correct: check.action_correct,
        is_adversarial: check.is_adversarial,
        action_score,
        revision_score,
        reasoning_score,
        total_score: action_score + revision_score + reasoning_score,
        max_score: max_total,
        critical_failure: check.critical_failure,
    }
}

/// Extract all critical failures from Part A evaluations.
pub fn detect_critical_failures(evaluations: &[RedlineEvaluation]) -> Vec<CriticalFailure> {
    evaluations
        .iter()
        .filter_map(|e| e.critical_failure.clone())
        .collect()
}

/// One scored rules-stacking redline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesRedlineEvaluation {
    pub test_id: String,
    pub clause_ref: String,
    pub section: Option<String>,
    pub expected_action: String,
    pub review_action: String,
    pub detected: Detection,
    pub action_score: f64,
    pub revision_score: f64,
    pub reasoning_score: f64,
    pub total_score: f64,
    pub max_score: f64,
}

/// Score a single rules-stacking redline (action 2, revision 2,
/// reasoning 2, prescribed by the rules).
pub fn score_rules_stacking_redline(
    response: Option<&ReviewItem>,
    gt_redline: &GroundTruthIssue,
    config: &ModeConfig,
) -> RulesRedlineEvaluation {
    let max_per_dimension = 2.0;
    let max_total = config.scoring.per_redline_max.unwrap_or(6.0);

    let expected_action = gt_redline.expected_action.clone().unwrap_or_default();

    let base = RulesRedlineEvaluation {
        test_id: gt_redline.id.clone(),
        clause_ref: gt_redline.clause.clone(),
        section: gt_redline.section.clone(),
        expected_action: expected_action.clone(),
        review_action: "NMI".to_string(),
        detected: Detection::Nmi,
        action_score: 0.0,
        revision_score: 0.0,
        reasoning_score: 0.0,
        total_score: 0.0,
        max_score: max_total,
    };

    let Some(item) = response else {
        return base;
    };

    let action_norm = item.action.trim().to_uppercase();
    let expected_norm = expected_action.trim().to_uppercase();

    let detected = if action_norm.is_empty() {
        Detection::Nmi
    } else if action_norm == expected_norm {
        Detection::Y
    } else {
        Detection::P
    };

    let action_score = if !action_norm.is_empty() && action_norm == expected_norm {
        max_per_dimension
    } else if !action_norm.is_empty() {
        1.0
    } else {
        0.0
    };

    let mut revision_score = 0.0;
    if !item.proposed_text.is_empty() && !gt_redline.key_elements.is_empty() {
        let revision_lower = item.proposed_text.to_lowercase();
        let matched = gt_redline
            .key_elements
            .iter()
            .filter(|elem| {
                elem.split_whitespace()
                    .take(3)
                    .any(|word| word.len() > 3 && revision_lower.contains(&word.to_lowercase()))
            })
            .count();
        revision_score = if matched as f64 >= gt_redline.key_elements.len() as f64 * 0.5 {
            max_per_dimension
        } else if matched > 0 {
            1.0
        } else {
            0.0
        };
    } else if item.proposed_text.len() > 20 {
        revision_score = 1.0;
    }

    let mut reasoning_score = 0.0;
    if !item.rationale.is_empty() && !gt_redline.rationale_must_include.is_empty() {
        let reasoning_lower = item.rationale.to_lowercase();
        let matched = gt_redline
            .rationale_must_include
            .iter()
            .filter(|r| {
                r.split_whitespace()
                    .take(3)
                    .any(|word| word.len() > 3 && reasoning_lower.contains(&word.to_lowercase()))
            })
            .count();
        reasoning_score =
            if matched as f64 >= gt_redline.rationale_must_include.len() as f64 * 0.5 {
                max_per_dimension
            } else if matched > 0 {
                1.0
            } else {
                0.0
            };
    } else if item.rationale.len() > 30 {
        reasoning_score = 1.0;
    }

    RulesRedlineEvaluation {
        review_action: item.action.clone(),
        detected,
        action_score,
        revision_score,
        reasoning_score,
        total_score: action_score + revision_score + reasoning_score,
        ..base
    }
}

/// Scope violation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    OutOfScopeComment,
    OutOfScopeRedline,
}

/// Where a scope violation was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSource {
    RiskTable,
    ProposedRedlines,
}

/// A comment or redline outside the ground-truth redline scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeViolation {
    pub clause_ref: String,
    pub clause_normalised: String,
    pub issue: String,
    pub source: ViolationSource,
    pub severity: FailureSeverity,
    pub violation_type: ViolationType,
    pub message: String,
}

lazy_static! {
    static ref LEADING_CLAUSE_NUMBER: Regex = Regex::new(r"^(\d+(?:\.\d+)*)").unwrap();
}

/// Normalise a clause reference for scope matching: strip
/// Section/Clause/Article prefixes and keep the leading numeric run.
pub fn normalise_clause_ref(clause: &str) -> String {
    let mut text = clause.trim().to_string();
    for prefix in ["section ", "clause ", "article ", "\u{a7} ", "\u{a7}"] {
        if text.to_lowercase().starts_with(prefix) {
            text = text[prefix.len()..].trim().to_string();
            break;
        }
    }
    if let Some(caps) = LEADING_CLAUSE_NUMBER.captures(&text) {
        return caps[1].to_lowercase();
    }
    text.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Build the set of normalised clause references covered by GT redlines.
pub fn build_redline_clause_set(gt_redlines: &[GroundTruthIssue]) -> BTreeSet<String> {
    let mut clauses = BTreeSet::new();
    for redline in gt_redlines {
        if !redline.clause.is_empty() {
            clauses.insert(normalise_clause_ref(&redline.clause));
        }
        if let Some(section) = &redline.section {
            if !section.is_empty() {
                clauses.insert(normalise_clause_ref(section));
            }
        }
    }
    clauses
}

/// Whether a classification marks a meaningful (non-favorable) comment.
fn is_meaningful_comment(classification: &str) -> bool {
    if classification.is_empty() {
        return false;
    }
    let lower = classification.to_lowercase();
    let favourable_markers = ["\u{2705}", "standard", "compliant", "acceptable"];
    if favourable_markers.iter().any(|m| lower.contains(m)) {
        return false;
    }
    if lower.contains("favourable") && !lower.contains("unfavourable") {
        return false;
    }
    if lower.contains("favorable") && !lower.contains("unfavorable") {
        return false;
    }
    true
}

/// Detect comments and redlines that reference clauses outside the
/// ground-truth redline scope.
///
/// Risk-table entries only count when their classification is a
/// meaningful comment; proposed redlines on out-of-scope clauses always
/// count.
pub fn detect_scope_violations(
    review: &CanonicalReview,
    redline_clauses: &BTreeSet<String>,
) -> Vec<ScopeViolation> {
    let mut violations = Vec::new();

    for entry in &review.risk_table {
        let clause_norm = normalise_clause_ref(&entry.clause_ref);
        if !clause_norm.is_empty() && !redline_clauses.contains(&clause_norm) {
            if is_meaningful_comment(&entry.classification) {
                violations.push(ScopeViolation {
                    clause_ref: entry.clause_ref.clone(),
                    clause_normalised: clause_norm,
                    issue: if !entry.clause_summary.is_empty() {
                        entry.clause_summary.clone()
                    } else {
                        entry.issue_summary.clone()
                    },
                    source: ViolationSource::RiskTable,
                    severity: FailureSeverity::Critical,
                    violation_type: ViolationType::OutOfScopeComment,
                    message: format!(
                        "Comment on non-redlined clause {}",
                        entry.clause_ref
                    ),
                });
            }
        }
    }

    for redline in &review.proposed_redlines {
        let clause_norm = normalise_clause_ref(&redline.clause_ref);
        if !clause_norm.is_empty() && !redline_clauses.contains(&clause_norm) {
            let issue = if !redline.change_summary.is_empty() {
                redline.change_summary.clone()
            } else {
                redline.proposed_text.chars().take(100).collect()
            };
            violations.push(ScopeViolation {
                clause_ref: redline.clause_ref.clone(),
                clause_normalised: clause_norm,
                issue,
                source: ViolationSource::ProposedRedlines,
                severity: FailureSeverity::Critical,
                violation_type: ViolationType::OutOfScopeRedline,
                message: format!(
                    "Proposed redline on non-redlined clause {}",
                    redline.clause_ref
                ),
            });
        }
    }

    violations
}

/// Part A aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PartAStats {
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
}

impl PartAStats {
    pub fn from_evaluations(evaluations: &[RedlineEvaluation]) -> Self {
        let total_score: f64 = evaluations.iter().map(|e| e.total_score).sum();
        let max_score: f64 = evaluations.iter().map(|e| e.max_score).sum();
        let percentage = if max_score > 0.0 {
            total_score / max_score * 100.0
        } else {
            0.0
        };
        PartAStats {
            total_score,
            max_score,
            percentage,
        }
    }
}

/// Detection counts for one tier of the Part B base review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TierDetectionStats {
    pub total: usize,
    pub detected: usize,
}

/// Part B aggregate stats from the base-review summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PartBStats {
    pub by_tier: BTreeMap<Tier, TierDetectionStats>,
    pub weighted_recall: f64,
}

impl PartBStats {
    pub fn from_summary(summary: &EvaluationSummary) -> Self {
        let by_tier = summary
            .detection_by_tier
            .iter()
            .map(|(tier, counts)| {
                (
                    *tier,
                    TierDetectionStats {
                        total: counts.total(),
                        detected: counts.detected(),
                    },
                )
            })
            .collect();
        PartBStats {
            by_tier,
            weighted_recall: summary.weighted_recall,
        }
    }
}

/// Overall stacking outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingOutcome {
    pub grade: Grade,
    pub reason: String,
    pub gate_triggered: Option<String>,
    pub combined_percentage: f64,
    pub critical_failures: Vec<CriticalFailure>,
}

/// Determine overall pass/fail for freeform stacking.
///
/// Gate order: critical-failure gate, then the Part B T1 gate, then the
/// combined 40/60 score threshold.
pub fn determine_stacking_pass_fail(
    part_a: &PartAStats,
    part_b: &PartBStats,
    critical_failures: &[CriticalFailure],
    config: &ModeConfig,
) -> StackingOutcome {
    let gates = &config.gates;
    let part_a_pct = part_a.percentage;
    let part_b_pct = part_b.weighted_recall * 100.0;
    let combined_pct = part_a_pct * 0.4 + part_b_pct * 0.6;

    if gates.critical_failure_gate && !critical_failures.is_empty() {
        return StackingOutcome {
            grade: Grade::Fail,
            reason: format!(
                "Critical failure: {} adversarial redline(s) accepted",
                critical_failures.len()
            ),
            gate_triggered: Some("critical_failure_gate".to_string()),
            combined_percentage: round2(combined_pct),
            critical_failures: critical_failures.to_vec(),
        };
    }

    if gates.t1_gate {
        let t1 = part_b.by_tier.get(&Tier::T1).copied().unwrap_or_default();
        if t1.total > 0 && t1.detected < t1.total {
            return StackingOutcome {
                grade: Grade::Fail,
                reason: format!(
                    "T1 gate failed: {}/{} T1 issues detected",
                    t1.detected, t1.total
                ),
                gate_triggered: Some("t1_gate".to_string()),
                combined_percentage: round2(combined_pct),
                critical_failures: Vec::new(),
            };
        }
    }

    let pass_threshold = config.pass_criteria.pass.min_percentage.unwrap_or(70.0);
    let marginal_threshold = config.pass_criteria.marginal.min_percentage.unwrap_or(50.0);

    let (grade, reason, gate_triggered) = if combined_pct >= pass_threshold {
        (
            Grade::Pass,
            format!("Combined score {combined_pct:.1}% >= {pass_threshold}%"),
            None,
        )
    } else if combined_pct >= marginal_threshold {
        (
            Grade::Marginal,
            format!("Combined score {combined_pct:.1}% >= {marginal_threshold}% but < {pass_threshold}%"),
            None,
        )
    } else {
        (
            Grade::Fail,
            format!("Combined score {combined_pct:.1}% < {marginal_threshold}%"),
            Some("score_threshold".to_string()),
        )
    };

    StackingOutcome {
        grade,
        reason,
        gate_triggered,
        combined_percentage: round2(combined_pct),
        critical_failures: Vec::new(),
    }
}

/// Overall rules-stacking outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesStackingOutcome {
    pub grade: Grade,
    pub reason: String,
    pub gate_triggered: Option<String>,
    pub scope_violations: Vec<ScopeViolation>,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
}

/// Calculate pass/fail for rules stacking.
///
/// The scope-violation gate is evaluated before the score thresholds:
/// more violations than the configured allowance (default 0) forces FAIL.
pub fn rules_stacking_pass_fail(
    evaluations: &[RulesRedlineEvaluation],
    scope_violations: Vec<ScopeViolation>,
    config: &ModeConfig,
) -> RulesStackingOutcome {
    let total_score: f64 = evaluations.iter().map(|e| e.total_score).sum();
    let max_score: f64 = evaluations.iter().map(|e| e.max_score).sum();
    let percentage = if max_score > 0.0 {
        total_score / max_score * 100.0
    } else {
        0.0
    };

    let max_allowed = config.pass_criteria.pass.max_scope_violations.unwrap_or(0);
    if scope_violations.len() > max_allowed {
        return RulesStackingOutcome {
            grade: Grade::Fail,
            reason: format!(
                "{} scope violation(s) (max allowed: {max_allowed})",
                scope_violations.len()
            ),
            gate_triggered: Some("scope_violation_gate".to_string()),
            scope_violations,
            total_score,
            max_score,
            percentage: 0.0,
        };
    }

    let pass_threshold = config.pass_criteria.pass.min_percentage.unwrap_or(70.0);
    let marginal_threshold = config.pass_criteria.marginal.min_percentage.unwrap_or(50.0);

    let (grade, reason, gate_triggered) = if percentage >= pass_threshold {
        (
            Grade::Pass,
            format!("Score {percentage:.1}% >= {pass_threshold}% with 0 scope violations"),
            None,
        )
    } else if percentage >= marginal_threshold {
        (
            Grade::Marginal,
            format!("Score {percentage:.1}% >= {marginal_threshold}% but < {pass_threshold}%"),
            None,
        )
    } else {
        (
            Grade::Fail,
            format!("Score {percentage:.1}% < {marginal_threshold}%"),
            Some("score_threshold".to_string()),
        )
    };

    RulesStackingOutcome {
        grade,
        reason,
        gate_triggered,
        scope_violations: Vec::new(),
        total_score,
        max_score,
        percentage: round2(percentage),
    }
}
