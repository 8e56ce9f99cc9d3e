//! Scored evaluation records and derived summaries.
//!
//! An [`Evaluation`] is one scored ground-truth issue; an
//! [`EvaluationSummary`] is recomputed from the full evaluation list and
//! never hand-edited. Summary counts always sum to the number of scored
//! issues by construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::fields::GroundTruthIssue;
use crate::scoring::detection::{Detection, Tier};
use crate::scoring::points::{PointsError, TierWeightTable};

/// Errors from evaluation/summary construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummaryError {
    #[error("ground truth issue {gt_id} has no tier; cannot score detection points")]
    MissingTier { gt_id: String },

    #[error(transparent)]
    Points(#[from] PointsError),
}

/// Evidence backing a detection verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Evidence {
    pub excerpt: String,
    pub judge_reasoning: String,
}

/// One scored ground-truth issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub gt_id: String,
    pub clause: String,
    pub tier: Tier,
    pub issue: String,
    pub detection: Detection,
    pub detection_points: f64,
    pub evidence: Evidence,
}

/// Build a detection-only evaluation for a GT issue.
pub fn build_evaluation(
    gt_issue: &GroundTruthIssue,
    detection: Detection,
    excerpt: impl Into<String>,
    judge_reasoning: impl Into<String>,
    table: &TierWeightTable,
) -> Result<Evaluation, SummaryError> {
    let tier = gt_issue.tier.ok_or_else(|| SummaryError::MissingTier {
        gt_id: gt_issue.id.clone(),
    })?;
    let detection_points = table.points(detection, tier)?;

    Ok(Evaluation {
        gt_id: gt_issue.id.clone(),
        clause: gt_issue.clause.clone(),
        tier,
        issue: gt_issue.issue.clone(),
        detection,
        detection_points,
        evidence: Evidence {
            excerpt: excerpt.into(),
            judge_reasoning: judge_reasoning.into(),
        },
    })
}

/// Detection verdict counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DetectionCounts {
    #[serde(rename = "Y")]
    pub y: usize,
    #[serde(rename = "P")]
    pub p: usize,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "NMI")]
    pub nmi: usize,
}

impl DetectionCounts {
    pub fn increment(&mut self, detection: Detection) {
        match detection {
            Detection::Y => self.y += 1,
            Detection::P => self.p += 1,
            Detection::N => self.n += 1,
            Detection::Nmi => self.nmi += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.y + self.p + self.n + self.nmi
    }

    /// Issues counted as detected (Y or P).
    pub fn detected(&self) -> usize {
        self.y + self.p
    }
}

/// Aggregate over all evaluations for one (contract, model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub detection_counts: DetectionCounts,
    pub detection_by_tier: BTreeMap<Tier, DetectionCounts>,
    pub t1_all_detected: bool,
    pub t1_gate_pass: bool,
    pub t1_count: usize,
    pub t1_detected: usize,
    pub total_detection_points: f64,
    pub weighted_max: f64,
    pub weighted_recall: f64,
    pub detection_rate: f64,
}

/// Build the summary block from scored evaluations.
///
/// The T1 gate passes iff every T1 issue has detection Y or P; contracts
/// with zero T1 issues vacuously pass.
pub fn build_summary(
    evaluations: &[Evaluation],
    table: &TierWeightTable,
) -> Result<EvaluationSummary, SummaryError> {
    let mut detection_counts = DetectionCounts::default();
    let mut detection_by_tier: BTreeMap<Tier, DetectionCounts> = BTreeMap::new();
    let mut total_detection_points = 0.0;
    let mut weighted_max = 0.0;
    let mut t1_count = 0;
    let mut t1_detected = 0;

    for eval in evaluations {
        detection_counts.increment(eval.detection);
        detection_by_tier
            .entry(eval.tier)
            .or_default()
            .increment(eval.detection);

        total_detection_points += eval.detection_points;
        weighted_max += table.points(Detection::Y, eval.tier)?;

        if eval.tier == Tier::T1 {
            t1_count += 1;
            if eval.detection.is_detected() {
                t1_detected += 1;
            }
        }
    }

    let t1_gate_pass = t1_count == 0 || t1_detected == t1_count;
    let total_issues = detection_counts.total();
    debug_assert_eq!(total_issues, evaluations.len());

    let detection_rate = if total_issues > 0 {
        detection_counts.detected() as f64 / total_issues as f64
    } else {
        0.0
    };
    let weighted_recall = if weighted_max > 0.0 {
        total_detection_points / weighted_max
    } else {
        0.0
    };

    Ok(EvaluationSummary {
        detection_counts,
        detection_by_tier,
        t1_all_detected: t1_gate_pass,
        t1_gate_pass,
        t1_count,
        t1_detected,
        total_detection_points,
        weighted_max,
        weighted_recall,
        detection_rate,
    })
}

/// Audit counts over additional (non-GT) issues the assistant raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdditionalIssueStats {
    pub valid: usize,
    pub not_material: usize,
    pub hallucination: usize,
    pub other: usize,
}

impl AdditionalIssueStats {
    pub fn total(&self) -> usize {
        self.valid + self.not_material + self.hallucination + self.other
    }

    /// False positive rate over audited additional issues, as a
    /// percentage.
    pub fn false_positive_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.hallucination + self.not_material) as f64 / total as f64 * 100.0
    }

    /// Precision over additional issues (valid / (valid + not material)).
    pub fn precision(&self) -> f64 {
        crate::scoring::points::calculate_precision(self.valid, self.not_material)
    }
}

/// Tally audit assessments from the `additional_issues` block of an
/// evaluation file.
pub fn assess_additional_issues(additional_issues: &[Value]) -> AdditionalIssueStats {
    let mut stats = AdditionalIssueStats::default();
    for issue in additional_issues {
        match issue.get("assessment").and_then(Value::as_str) {
            Some("Valid") => stats.valid += 1,
            Some("Not Material") => stats.not_material += 1,
            Some("Hallucination") => stats.hallucination += 1,
            _ => stats.other += 1,
        }
    }
    stats
}

/// One evaluation output file for a (contract, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFile {
    #[serde(default)]
    pub meta: Value,
    pub gt_evaluations: Vec<Evaluation>,
    #[serde(default)]
    pub additional_issues: Vec<Value>,
    pub summary: EvaluationSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(gt_id: &str, tier: Tier, detection: Detection, points: f64) -> Evaluation {
        Evaluation {
            gt_id: gt_id.to_string(),
            clause: String::new(),
            tier,
            issue: String::new(),
            detection,
            detection_points: points,
            evidence: Evidence::default(),
        }
    }

    #[test]
    fn test_build_evaluation_scores_points() {
        let gt = GroundTruthIssue {
            id: "GT-01".to_string(),
            tier: Some(Tier::T1),
            ..Default::default()
        };
        let table = TierWeightTable::standard();
        let result = build_evaluation(&gt, Detection::P, "quote", "reasoning", &table).unwrap();
        assert_eq!(result.detection_points, 4.0);
        assert_eq!(result.evidence.excerpt, "quote");
    }

    #[test]
    fn test_build_evaluation_missing_tier_fails() {
        let gt = GroundTruthIssue {
            id: "GT-02".to_string(),
            tier: None,
            ..Default::default()
        };
        let table = TierWeightTable::standard();
        assert!(matches!(
            build_evaluation(&gt, Detection::Y, "", "", &table),
            Err(SummaryError::MissingTier { .. })
        ));
    }

    #[test]
    fn test_summary_counts_sum_to_issue_count() {
        let table = TierWeightTable::standard();
        let evals = vec![
            eval("a", Tier::T1, Detection::Y, 8.0),
            eval("b", Tier::T2, Detection::P, 2.5),
            eval("c", Tier::T2, Detection::N, 0.0),
            eval("d", Tier::T3, Detection::Nmi, 0.0),
        ];
        let summary = build_summary(&evals, &table).unwrap();
        assert_eq!(summary.detection_counts.total(), 4);
        assert_eq!(summary.detection_by_tier[&Tier::T2].total(), 2);
        assert_eq!(summary.total_detection_points, 10.5);
        // 8 + 5 + 5 + 1
        assert_eq!(summary.weighted_max, 19.0);
        assert_eq!(summary.detection_rate, 0.5);
    }

    #[test]
    fn test_t1_gate_all_detected_passes() {
        let table = TierWeightTable::standard();
        let evals = vec![
            eval("a", Tier::T1, Detection::Y, 8.0),
            eval("b", Tier::T1, Detection::P, 4.0),
        ];
        let summary = build_summary(&evals, &table).unwrap();
        assert!(summary.t1_gate_pass);
        assert_eq!(summary.t1_detected, 2);
    }

    #[test]
    fn test_t1_gate_any_miss_fails() {
        let table = TierWeightTable::standard();
        for miss in [Detection::N, Detection::Nmi] {
            let evals = vec![
                eval("a", Tier::T1, Detection::Y, 8.0),
                eval("b", Tier::T1, miss, 0.0),
            ];
            let summary = build_summary(&evals, &table).unwrap();
            assert!(!summary.t1_gate_pass);
        }
    }

    #[test]
    fn test_t1_gate_vacuous_pass() {
        let table = TierWeightTable::standard();
        let evals = vec![eval("a", Tier::T2, Detection::Nmi, 0.0)];
        let summary = build_summary(&evals, &table).unwrap();
        assert!(summary.t1_gate_pass);
        assert_eq!(summary.t1_count, 0);
    }

    #[test]
    fn test_additional_issue_stats() {
        let additional = vec![
            serde_json::json!({"assessment": "Valid"}),
            serde_json::json!({"assessment": "Valid"}),
            serde_json::json!({"assessment": "Not Material"}),
            serde_json::json!({"assessment": "Hallucination"}),
            serde_json::json!({"issue": "unaudited"}),
        ];
        let stats = assess_additional_issues(&additional);
        assert_eq!(stats.valid, 2);
        assert_eq!(stats.not_material, 1);
        assert_eq!(stats.hallucination, 1);
        assert_eq!(stats.other, 1);
        assert_eq!(stats.total(), 5);
        assert_eq!(stats.false_positive_rate(), 40.0);
        // valid / (valid + not_material)
        assert!((stats.precision() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_additional_issues_is_clean() {
        let stats = assess_additional_issues(&[]);
        assert_eq!(stats.false_positive_rate(), 0.0);
        assert_eq!(stats.precision(), 1.0);
    }

    #[test]
    fn test_empty_evaluations() {
        let table = TierWeightTable::standard();
        let summary = build_summary(&[], &table).unwrap();
        assert_eq!(summary.detection_counts.total(), 0);
        assert_eq!(summary.detection_rate, 0.0);
        assert!(summary.t1_gate_pass);
    }
}
