//! Guidelines-mode scoring: playbook-driven, tier-based evaluation.
//!
//! Per-dimension maxima vary by tier (T1 totals 7, T2 totals 5, T3 only
//! scores detection for 0.5). The Red Flag gate runs before any
//! percentage threshold: every Red Flag playbook item must be detected or
//! the contract fails outright.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::rules::{count_element_matches, round2};
use super::{clause_refs_match, clause_refs_same_article, GateStatus, Grade};
use crate::config::ModeConfig;
use crate::fields::GroundTruthIssue;
use crate::review::ReviewItem;
use crate::scoring::detection::{Detection, Tier};

const CONCERN_MARKERS: &[&str] = &["\u{274c}", "\u{26a0}\u{fe0f}", "Unfavourable"];

/// Per-dimension maxima for a tier.
struct TierMaxima {
    detection: f64,
    location: f64,
    action: f64,
    amendment: f64,
    rationale: f64,
}

impl TierMaxima {
    fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::T1 => TierMaxima {
                detection: 1.0,
                location: 1.0,
                action: 1.0,
                amendment: 2.0,
                rationale: 2.0,
            },
            Tier::T2 => TierMaxima {
                detection: 1.0,
                location: 1.0,
                action: 1.0,
                amendment: 1.0,
                rationale: 1.0,
            },
            Tier::T3 => TierMaxima {
                detection: 0.5,
                location: 0.0,
                action: 0.0,
                amendment: 0.0,
                rationale: 0.0,
            },
        }
    }

    fn total(&self) -> f64 {
        self.detection + self.location + self.action + self.amendment + self.rationale
    }
}

/// One scored guideline issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineEvaluation {
    pub test_id: String,
    pub clause_ref: String,
    pub clause_name: String,
    pub tier: Tier,
    pub playbook_standard: String,
    pub detected: Detection,
    pub detection_score: f64,
    pub location_score: f64,
    pub action_score: f64,
    pub amendment_score: f64,
    pub rationale_score: f64,
    pub total_score: f64,
    pub max_score: f64,
}

/// Score a single guideline issue with tier-based dimension maxima.
pub fn score_guideline_issue(
    output: Option<&ReviewItem>,
    gt_issue: &GroundTruthIssue,
    _config: &ModeConfig,
) -> GuidelineEvaluation {
    let tier = gt_issue.tier.unwrap_or(Tier::T3);
    let maxima = TierMaxima::for_tier(tier);

    let base = GuidelineEvaluation {
        test_id: gt_issue.id.clone(),
        clause_ref: gt_issue.clause.clone(),
        clause_name: gt_issue.clause_name.clone().unwrap_or_default(),
        tier,
        playbook_standard: gt_issue.playbook_standard.clone().unwrap_or_default(),
        detected: Detection::Nmi,
        detection_score: 0.0,
        location_score: 0.0,
        action_score: 0.0,
        amendment_score: 0.0,
        rationale_score: 0.0,
        total_score: 0.0,
        max_score: maxima.total(),
    };

    let Some(item) = output else {
        return base;
    };

    // Detection: concern classification earns full credit, downgraded to
    // half ("P") when the trigger phrase is absent from the combined
    // rationale + amendment text.
    let mut detected = Detection::Nmi;
    let mut detection_score = 0.0;
    if CONCERN_MARKERS
        .iter()
        .any(|m| item.classification.contains(m))
    {
        detected = Detection::Y;
        detection_score = maxima.detection;
        if let Some(trigger) = gt_issue.trigger_phrase.as_deref() {
            if !trigger.is_empty() && !item.effective_text().contains(&trigger.to_lowercase()) {
                detected = Detection::P;
                detection_score = maxima.detection * 0.5;
            }
        }
    }

    // Location: exact clause match full credit, same article half.
    let mut location_score = 0.0;
    if maxima.location > 0.0 && detected != Detection::Nmi {
        let gt_clause = gt_issue.clause.as_str();
        if !item.clause_ref.is_empty() && !gt_clause.is_empty() {
            if clause_refs_match(&item.clause_ref, gt_clause) {
                location_score = maxima.location;
            } else if clause_refs_same_article(&item.clause_ref, gt_clause) {
                location_score = maxima.location * 0.5;
            }
        }
    }

    // Action: exact case-insensitive match only.
    let mut action_score = 0.0;
    if maxima.action > 0.0 && detected != Detection::Nmi {
        if let Some(expected) = gt_issue.expected_action.as_deref() {
            if !item.action.is_empty() && item.action.eq_ignore_ascii_case(expected) {
                action_score = maxima.action;
            }
        }
    }

    // Amendment: significant-word overlap with the expected amendment.
    let mut amendment_score = 0.0;
    if maxima.amendment > 0.0 && detected != Detection::Nmi && !item.proposed_text.is_empty() {
        if let Some(expected) = gt_issue.expected_amendment.as_deref() {
            let overlap = word_overlap(expected, &item.proposed_text);
            if overlap >= 0.5 {
                amendment_score = maxima.amendment;
            } else if overlap > 0.0 {
                amendment_score = maxima.amendment * 0.5;
            }
        }
    }

    // Rationale: required citations matched, half credit when no
    // citations are prescribed but reasoning is present.
    let mut rationale_score = 0.0;
    if maxima.rationale > 0.0 && detected != Detection::Nmi && !item.rationale.is_empty() {
        if gt_issue.rationale_must_include.is_empty() {
            rationale_score = maxima.rationale * 0.5;
        } else {
            let rationale_lower = item.rationale.to_lowercase();
            let matched =
                count_element_matches(&gt_issue.rationale_must_include, &rationale_lower, 3);
            if matched as f64 >= gt_issue.rationale_must_include.len() as f64 * 0.5 {
                rationale_score = maxima.rationale;
            } else if matched > 0 {
                rationale_score = maxima.rationale * 0.5;
            }
        }
    }

    let total_score =
        detection_score + location_score + action_score + amendment_score + rationale_score;

    GuidelineEvaluation {
        detected,
        detection_score,
        location_score,
        action_score,
        amendment_score,
        rationale_score,
        total_score,
        ..base
    }
}

/// Fraction of significant expected words present in the actual text.
fn word_overlap(expected: &str, actual: &str) -> f64 {
    let expected_words: std::collections::BTreeSet<String> = expected
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_lowercase)
        .collect();
    if expected_words.is_empty() {
        return 0.0;
    }
    let actual_words: std::collections::BTreeSet<String> = actual
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_lowercase)
        .collect();
    let shared = expected_words.intersection(&actual_words).count();
    shared as f64 / expected_words.len() as f64
}

/// A missed Red Flag item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissedRedFlag {
    pub test_id: String,
    pub clause_ref: String,
    pub clause_name: String,
    pub trigger_phrase: Option<String>,
    pub detection: Detection,
}

/// Red Flag gate result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlagGate {
    pub gate: GateStatus,
    pub reason: String,
    pub red_flags_total: usize,
    pub red_flags_detected: usize,
    pub missed_red_flags: Vec<MissedRedFlag>,
}

/// Check that every Red Flag playbook item was detected (Y or P).
///
/// Any miss forces overall FAIL regardless of score.
pub fn check_red_flag_gate(
    evaluations: &[GuidelineEvaluation],
    gt_issues: &[GroundTruthIssue],
) -> RedFlagGate {
    let red_flags: Vec<&GroundTruthIssue> =
        gt_issues.iter().filter(|gt| gt.is_red_flag()).collect();

    if red_flags.is_empty() {
        return RedFlagGate {
            gate: GateStatus::Pass,
            reason: "No Red Flag issues in GT".to_string(),
            red_flags_total: 0,
            red_flags_detected: 0,
            missed_red_flags: Vec::new(),
        };
    }

    let eval_by_id: HashMap<&str, &GuidelineEvaluation> = evaluations
        .iter()
        .map(|e| (e.test_id.as_str(), e))
        .collect();

    let mut detected = 0;
    let mut missed = Vec::new();

    for rf in &red_flags {
        let detection = eval_by_id
            .get(rf.id.as_str())
            .map(|e| e.detected)
            .unwrap_or(Detection::Nmi);

        if detection.is_detected() {
            detected += 1;
        } else {
            missed.push(MissedRedFlag {
                test_id: rf.id.clone(),
                clause_ref: rf.clause.clone(),
                clause_name: rf.clause_name.clone().unwrap_or_default(),
                trigger_phrase: rf.trigger_phrase.clone(),
                detection,
            });
        }
    }

    let gate = if missed.is_empty() {
        GateStatus::Pass
    } else {
        GateStatus::Fail
    };
    let reason = if missed.is_empty() {
        "All Red Flags detected".to_string()
    } else {
        format!("Missed {} Red Flag(s)", missed.len())
    };

    RedFlagGate {
        gate,
        reason,
        red_flags_total: red_flags.len(),
        red_flags_detected: detected,
        missed_red_flags: missed,
    }
}

/// Pass/fail outcome for guidelines mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelinesOutcome {
    pub grade: Grade,
    pub reason: String,
    pub gate_triggered: Option<String>,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub red_flag_gate: RedFlagGate,
}

/// Calculate pass/fail for guidelines mode.
///
/// The Red Flag gate is evaluated before the percentage thresholds and
/// overrides them.
pub fn guidelines_pass_fail(
    evaluations: &[GuidelineEvaluation],
    gt_issues: &[GroundTruthIssue],
    config: &ModeConfig,
) -> GuidelinesOutcome {
    let red_flag_gate = check_red_flag_gate(evaluations, gt_issues);

    let total_score: f64 = evaluations.iter().map(|e| e.total_score).sum();
    let max_score: f64 = evaluations.iter().map(|e| e.max_score).sum();
    let percentage = if max_score > 0.0 {
        total_score / max_score * 100.0
    } else {
        0.0
    };

    if red_flag_gate.gate == GateStatus::Fail {
        return GuidelinesOutcome {
            grade: Grade::Fail,
            reason: red_flag_gate.reason.clone(),
            gate_triggered: Some("red_flag_gate".to_string()),
            total_score,
            max_score,
            percentage: round2(percentage),
            red_flag_gate,
        };
    }

    let pass_threshold = config.pass_criteria.pass.min_percentage.unwrap_or(70.0);
    let marginal_threshold = config.pass_criteria.marginal.min_percentage.unwrap_or(50.0);

    let (grade, reason) = if percentage >= pass_threshold {
        (
            Grade::Pass,
            format!("Score {percentage:.1}% >= {pass_threshold}% and all Red Flags detected"),
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

    GuidelinesOutcome {
        grade,
        reason,
        gate_triggered: None,
        total_score,
        max_score,
        percentage: round2(percentage),
        red_flag_gate,
    }
}
