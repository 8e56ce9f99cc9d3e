//! Polarity-aware detection assignment.
//!
//! Most ground-truth items have negative polarity: an issue exists and the
//! assistant should flag it. Compliance-confirmation items have positive
//! polarity: the clause is fine, and marking it favorable is the *correct*
//! outcome, while flagging it is a miss.

use serde::{Deserialize, Serialize};

use super::classification::is_issue_detected;
use super::detection::Detection;
use crate::fields::GroundTruthIssue;
use crate::review::ReviewItem;

/// Ground-truth item polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Negative,
    Positive,
}

/// Assign a detection verdict respecting the item's polarity.
///
/// No match at all is NMI. For negative polarity a favorable
/// classification is N, an unfavorable one is assessed for concept
/// coverage (Y or P), and an ambiguous one is P. For positive polarity
/// the mapping inverts: favorable is the correct outcome (assessed Y/P)
/// and unfavorable means a compliant clause was incorrectly flagged (N).
pub fn assign_detection_with_polarity(
    gt_issue: &GroundTruthIssue,
    best_match: Option<&ReviewItem>,
) -> Detection {
    let Some(item) = best_match else {
        return Detection::Nmi;
    };

    let detected = is_issue_detected(Some(item.classification.as_str()));

    match gt_issue.polarity {
        Polarity::Negative => match detected {
            Some(false) => Detection::N,
            Some(true) => assess_detection_level(gt_issue, item),
            None => Detection::P,
        },
        Polarity::Positive => match detected {
            Some(false) => assess_detection_level(gt_issue, item),
            Some(true) => Detection::N,
            None => Detection::P,
        },
    }
}

/// Y vs P based on required-concept coverage in the match's reasoning.
///
/// Full matches only; at least half of the required concepts must appear
/// verbatim (case-insensitive) for full credit. No required concepts
/// means a match is full detection.
pub fn assess_detection_level(gt_issue: &GroundTruthIssue, item: &ReviewItem) -> Detection {
    if gt_issue.required_concepts.is_empty() {
        return Detection::Y;
    }

    let reasoning_lower = item.rationale.to_lowercase();
    let matched = gt_issue
        .required_concepts
        .iter()
        .filter(|concept| reasoning_lower.contains(&concept.to_lowercase()))
        .count();
    let coverage = matched as f64 / gt_issue.required_concepts.len() as f64;

    if coverage >= 0.5 {
        Detection::Y
    } else {
        Detection::P
    }
}
