//! Mode-specific scoring engines.
//!
//! Each engine converts one model output plus one ground-truth item into a
//! scored evaluation record. Shared across engines: pass/fail grades,
//! clause-reference matching, and ground-truth-to-output matching.

pub mod guidelines;
pub mod rules;
pub mod stacking;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fields::GroundTruthIssue;
use crate::review::{CanonicalReview, OutputSection, ReviewItem};
use crate::scoring::concepts::{matches_output_patterns, DetectionLogic};

/// Overall pass/fail grade for a contract evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    Pass,
    Marginal,
    Fail,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::Pass => "PASS",
            Grade::Marginal => "MARGINAL",
            Grade::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// Binary gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Pass,
    Fail,
}

lazy_static! {
    /// Leading numeric clause reference, e.g. "5", "5.1", "12.3.4".
    static ref CLAUSE_NUMBER: Regex = Regex::new(r"^(\d+(?:\.\d+)*)").unwrap();
    /// Leading top-level article number.
    static ref ARTICLE_NUMBER: Regex = Regex::new(r"^(\d+)").unwrap();
}

fn strip_clause_words(clause: &str) -> String {
    clause
        .to_lowercase()
        .replace("section", "")
        .replace("clause", "")
        .trim()
        .to_string()
}

/// Whether two clause references point at the same clause, ignoring
/// "Section"/"Clause" prefixes and trailing text.
pub fn clause_refs_match(a: &str, b: &str) -> bool {
    let normalise = |c: &str| {
        let stripped = strip_clause_words(c);
        CLAUSE_NUMBER
            .captures(&stripped)
            .map(|caps| caps[1].to_string())
            .unwrap_or(stripped)
    };
    normalise(a) == normalise(b)
}

/// Whether two clause references fall under the same top-level article.
pub fn clause_refs_same_article(a: &str, b: &str) -> bool {
    let article = |c: &str| {
        let stripped = strip_clause_words(c);
        ARTICLE_NUMBER
            .captures(&stripped)
            .map(|caps| caps[1].to_string())
    };
    match (article(a), article(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Find the assistant output item that corresponds to a ground-truth
/// issue.
///
/// Clause-reference matches win, restricted to the sections the item's
/// detection logic searches. Pattern-matched and any-mention items fall
/// back to expected-output-pattern and trigger-phrase search.
pub fn match_review_item<'r>(
    gt_issue: &GroundTruthIssue,
    review: &'r CanonicalReview,
) -> Option<&'r ReviewItem> {
    let sections = OutputSection::ALL
        .into_iter()
        .filter(|s| gt_issue.detection_logic.searches_section(*s));

    for section in sections.clone() {
        for item in review.section(section) {
            if !gt_issue.clause.is_empty()
                && !item.clause_ref.is_empty()
                && clause_refs_match(&item.clause_ref, &gt_issue.clause)
            {
                return Some(item);
            }
        }
    }

    if !gt_issue.expected_output_patterns.is_empty() {
        for section in sections.clone() {
            for item in review.section(section) {
                if matches_output_patterns(&gt_issue.expected_output_patterns, item) {
                    return Some(item);
                }
            }
        }
    }

    if gt_issue.detection_logic == DetectionLogic::AnyMention {
        if let Some(trigger) = gt_issue.trigger_phrase.as_deref() {
            let trigger_lower = trigger.to_lowercase();
            for section in sections {
                for item in review.section(section) {
                    if item.searchable_text().contains(&trigger_lower) {
                        return Some(item);
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clause_refs_match() {
        assert!(clause_refs_match("Section 5.1", "5.1"));
        assert!(clause_refs_match("Clause 12.3 (Liability)", "12.3"));
        assert!(!clause_refs_match("5.1", "5.2"));
    }

    #[test]
    fn test_clause_refs_same_article() {
        assert!(clause_refs_same_article("5.1", "Section 5.3"));
        assert!(!clause_refs_same_article("5.1", "6.1"));
        assert!(!clause_refs_same_article("intro", "5.1"));
    }

    #[test]
    fn test_grade_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&Grade::Marginal).unwrap(), "\"MARGINAL\"");
        assert_eq!(serde_json::to_string(&GateStatus::Fail).unwrap(), "\"FAIL\"");
    }

    #[test]
    fn test_match_by_clause_ref() {
        let review = CanonicalReview::from_value(&json!({
            "risk_table": [
                {"clause_ref": "Section 9.2", "classification": "\u{274c}"},
                {"clause_ref": "5.1", "classification": "\u{2705}"}
            ]
        }));
        let gt = GroundTruthIssue {
            clause: "9.2".to_string(),
            ..Default::default()
        };
        let matched = match_review_item(&gt, &review).unwrap();
        assert_eq!(matched.clause_ref, "Section 9.2");
    }

    #[test]
    fn test_standard_logic_skips_new_clauses_section() {
        let review = CanonicalReview::from_value(&json!({
            "new_clauses_proposed": [{"clause_ref": "9.2"}]
        }));
        let gt = GroundTruthIssue {
            clause: "9.2".to_string(),
            ..Default::default()
        };
        assert!(match_review_item(&gt, &review).is_none());

        let ncr = GroundTruthIssue {
            clause: "9.2".to_string(),
            detection_logic: DetectionLogic::NewClauseRecommendation,
            ..Default::default()
        };
        assert!(match_review_item(&ncr, &review).is_some());
    }

    #[test]
    fn test_pattern_fallback() {
        let review = CanonicalReview::from_value(&json!({
            "risk_table": [{"clause_ref": "1.1", "rationale": "recommend adding audit rights"}]
        }));
        let gt = GroundTruthIssue {
            clause: "99".to_string(),
            detection_logic: DetectionLogic::PatternMatch,
            expected_output_patterns: vec!["audit rights".to_string()],
            ..Default::default()
        };
        assert!(match_review_item(&gt, &review).is_some());
    }
}
