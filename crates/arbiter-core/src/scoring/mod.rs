//! Pure scoring primitives.
//!
//! Everything here is a pure function over explicit inputs: no global
//! state, no file I/O, no LLM calls. Configuration (weight tables, mode
//! settings) is always passed in.

pub mod classification;
pub mod concepts;
pub mod detection;
pub mod points;
pub mod polarity;
pub mod quality;
pub mod reasoning;

pub use classification::{is_issue_detected, normalise_classification, ClassificationLabel};
pub use concepts::{
    assess_concept_coverage, calculate_pattern_match_score, matches_output_patterns,
    ConceptCoverage, DetectionLogic,
};
pub use detection::{Detection, DetectionError, Tier};
pub use points::{
    calculate_f1, calculate_precision, calculate_recall, calculate_weighted_recall,
    DetectionWeights, PointsError, TierWeightTable, WeightedRecall,
};
pub use polarity::{assess_detection_level, assign_detection_with_polarity, Polarity};
pub use quality::{validate_quality_score, QualityError};
pub use reasoning::{check_false_favorable, validate_reasoning, FalseFavorable, ReasoningCheck};
