//! Concept coverage and output-pattern matching.
//!
//! Ground-truth items can require concepts to appear in the assistant's
//! reasoning, and can carry expected output patterns matched across all
//! output fields. Matching is fuzzy: case-insensitive substring checks,
//! with word-level partial credit in non-strict mode.

use serde::{Deserialize, Serialize};

use super::detection::Detection;
use crate::review::{OutputSection, ReviewItem};

/// Matching strategy for a ground-truth item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionLogic {
    #[default]
    Standard,
    NewClauseRecommendation,
    PatternMatch,
    AnyMention,
}

impl DetectionLogic {
    /// Whether items with this strategy should be matched against a given
    /// output section.
    pub fn searches_section(&self, section: OutputSection) -> bool {
        match self {
            DetectionLogic::Standard => matches!(
                section,
                OutputSection::RiskTable | OutputSection::ProposedRedlines
            ),
            DetectionLogic::NewClauseRecommendation => true,
            DetectionLogic::PatternMatch => true,
            DetectionLogic::AnyMention => true,
        }
    }
}

/// Result of assessing required-concept coverage in reasoning text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCoverage {
    /// Fraction of required concepts covered, capped at 1.0.
    pub coverage: f64,
    pub matched_concepts: Vec<String>,
    pub missing_concepts: Vec<String>,
    /// Y when coverage >= 0.5 (inclusive), else P.
    pub detection_level: Detection,
}

/// Assess coverage of required concepts in reasoning text.
///
/// A full case-insensitive substring match scores 1.0 per concept. In
/// non-strict mode a multi-word concept scores 0.5 when at least one of
/// its words longer than three characters appears. An empty concept list
/// is full coverage.
pub fn assess_concept_coverage(
    required_concepts: &[String],
    reasoning: &str,
    strict: bool,
) -> ConceptCoverage {
    if required_concepts.is_empty() {
        return ConceptCoverage {
            coverage: 1.0,
            matched_concepts: Vec::new(),
            missing_concepts: Vec::new(),
            detection_level: Detection::Y,
        };
    }

    let reasoning_lower = reasoning.to_lowercase();
    let mut matched = Vec::new();
    let mut missing = Vec::new();
    let mut total_score = 0.0;

    for concept in required_concepts {
        let concept_lower = concept.to_lowercase();

        if reasoning_lower.contains(&concept_lower) {
            matched.push(concept.clone());
            total_score += 1.0;
        } else if !strict
            && concept_lower
                .split_whitespace()
                .any(|word| word.len() > 3 && reasoning_lower.contains(word))
        {
            matched.push(format!("{concept} (partial)"));
            total_score += 0.5;
        } else {
            missing.push(concept.clone());
        }
    }

    let coverage = (total_score / required_concepts.len() as f64).min(1.0);

    ConceptCoverage {
        coverage,
        matched_concepts: matched,
        missing_concepts: missing,
        detection_level: if coverage >= 0.5 {
            Detection::Y
        } else {
            Detection::P
        },
    }
}

/// Check whether at least one expected output pattern appears in the
/// combined output text of a review item.
pub fn matches_output_patterns(patterns: &[String], item: &ReviewItem) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let text = item.searchable_text();
    patterns.iter().any(|p| text.contains(&p.to_lowercase()))
}

/// Fraction of expected output patterns found in the combined output text.
pub fn calculate_pattern_match_score(patterns: &[String], item: &ReviewItem) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }
    let text = item.searchable_text();
    let matched = patterns
        .iter()
        .filter(|p| text.contains(&p.to_lowercase()))
        .count();
    matched as f64 / patterns.len() as f64
}
