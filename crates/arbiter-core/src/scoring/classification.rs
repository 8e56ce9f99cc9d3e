//! Classification label interpretation.
//!
//! The reviewed assistant labels each clause with a free-text or emoji
//! classification. This module maps those labels onto a tri-state "issue
//! detected" signal and a canonical display form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Labels that indicate the assistant flagged an issue.
const DETECTED_SIGNALS: &[&str] = &[
    // Emoji variants
    "\u{274c}",        // Red X
    "\u{26a0}\u{fe0f}", // Warning sign
    // Text variants
    "Unfavorable",
    "Unfavourable",
    "Requires Clarification",
    "Clarification Required",
    "High Risk",
    "Medium Risk",
];

/// Labels that indicate the assistant marked the clause acceptable.
const NOT_DETECTED_SIGNALS: &[&str] = &[
    // Emoji variants
    "\u{2705}", // Check mark
    // Text variants
    "Favorable",
    "Favourable",
    "Standard",
    "Acceptable",
    "Low Risk",
    "Compliant",
];

/// Determine whether a classification label indicates issue detection.
///
/// Returns `Some(true)` when the assistant flagged the clause as
/// problematic, `Some(false)` when it marked the clause acceptable, and
/// `None` for empty or unrecognised labels.
///
/// Exact matches against the curated token sets win; otherwise a
/// case-insensitive substring match is attempted for tokens longer than
/// two characters (so single emoji still only match exactly).
pub fn is_issue_detected(classification: Option<&str>) -> Option<bool> {
    let clean = classification?.trim();
    if clean.is_empty() {
        return None;
    }

    if DETECTED_SIGNALS.contains(&clean) {
        return Some(true);
    }
    if NOT_DETECTED_SIGNALS.contains(&clean) {
        return Some(false);
    }

    let lower = clean.to_lowercase();
    if DETECTED_SIGNALS
        .iter()
        .filter(|sig| sig.chars().count() > 2)
        .any(|sig| lower.contains(&sig.to_lowercase()))
    {
        return Some(true);
    }
    if NOT_DETECTED_SIGNALS
        .iter()
        .filter(|sig| sig.chars().count() > 2)
        .any(|sig| lower.contains(&sig.to_lowercase()))
    {
        return Some(false);
    }

    None
}

/// Canonical display form of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationLabel {
    Unfavorable,
    Clarification,
    Favorable,
    Unknown,
}

impl fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationLabel::Unfavorable => "Unfavorable",
            ClassificationLabel::Clarification => "Clarification",
            ClassificationLabel::Favorable => "Favorable",
            ClassificationLabel::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Normalise a classification to its canonical display form.
pub fn normalise_classification(classification: Option<&str>) -> ClassificationLabel {
    match is_issue_detected(classification) {
        Some(true) => {
            let raw = classification.unwrap_or_default();
            if raw.contains("\u{26a0}\u{fe0f}") || raw.to_lowercase().contains("clarif") {
                ClassificationLabel::Clarification
            } else {
                ClassificationLabel::Unfavorable
            }
        }
        Some(false) => ClassificationLabel::Favorable,
        None => ClassificationLabel::Unknown,
    }
}
