//! Detection point calculation and recall/precision metrics.
//!
//! Weight tables are immutable configuration constructed once (from a mode
//! config or [`TierWeightTable::standard`]) and passed explicitly into every
//! scoring call. No ambient global tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::detection::{Detection, Tier};

/// Errors from point calculation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointsError {
    #[error("no weights configured for tier {tier} (configured: {configured:?})")]
    UnknownTier { tier: Tier, configured: Vec<Tier> },
}

/// Point values for each detection verdict within one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionWeights {
    #[serde(rename = "Y", default)]
    pub y: f64,
    #[serde(rename = "P", default)]
    pub p: f64,
    #[serde(rename = "N", default)]
    pub n: f64,
    #[serde(rename = "NMI", default)]
    pub nmi: f64,
}

impl DetectionWeights {
    /// Points awarded for a detection verdict.
    pub fn get(&self, detection: Detection) -> f64 {
        match detection {
            Detection::Y => self.y,
            Detection::P => self.p,
            Detection::N => self.n,
            Detection::Nmi => self.nmi,
        }
    }
}

/// Per-tier detection weight table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TierWeightTable(pub BTreeMap<Tier, DetectionWeights>);

impl TierWeightTable {
    /// The standard freeform weight table (T1 8/4, T2 5/2.5, T3 1/0.5).
    pub fn standard() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            Tier::T1,
            DetectionWeights {
                y: 8.0,
                p: 4.0,
                n: 0.0,
                nmi: 0.0,
            },
        );
        table.insert(
            Tier::T2,
            DetectionWeights {
                y: 5.0,
                p: 2.5,
                n: 0.0,
                nmi: 0.0,
            },
        );
        table.insert(
            Tier::T3,
            DetectionWeights {
                y: 1.0,
                p: 0.5,
                n: 0.0,
                nmi: 0.0,
            },
        );
        TierWeightTable(table)
    }

    /// Points for a single detection in a given tier.
    ///
    /// Errors when the tier has no configured weights; detection values
    /// outside the canonical set cannot be represented.
    pub fn points(&self, detection: Detection, tier: Tier) -> Result<f64, PointsError> {
        self.0
            .get(&tier)
            .map(|w| w.get(detection))
            .ok_or_else(|| PointsError::UnknownTier {
                tier,
                configured: self.0.keys().copied().collect(),
            })
    }

    /// Maximum achievable points for a tier (the Y weight).
    pub fn max_for(&self, tier: Tier) -> Result<f64, PointsError> {
        self.points(Detection::Y, tier)
    }

    pub fn get(&self, tier: Tier) -> Option<&DetectionWeights> {
        self.0.get(&tier)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Simple recall: detected / total, 0.0 when total is zero.
pub fn calculate_recall(detected_count: usize, total_count: usize) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    detected_count as f64 / total_count as f64
}

/// Result of a tier-weighted recall calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedRecall {
    pub actual_score: f64,
    pub max_score: f64,
    pub weighted_recall: f64,
}

/// Tier-weighted recall over scored issues.
///
/// Issues without a tier fall back to T3. A tier absent from the weight
/// table contributes 1.0 to the maximum (and nothing to the actual score),
/// so partially-configured tables still produce a meaningful denominator.
pub fn calculate_weighted_recall<I>(scored: I, table: &TierWeightTable) -> WeightedRecall
where
    I: IntoIterator<Item = (Option<Tier>, Detection)>,
{
    let mut actual_score = 0.0;
    let mut max_score = 0.0;

    for (tier, detection) in scored {
        let tier = tier.unwrap_or(Tier::T3);
        match table.get(tier) {
            Some(weights) => {
                max_score += weights.y;
                actual_score += weights.get(detection);
            }
            None => max_score += 1.0,
        }
    }

    let weighted_recall = if max_score > 0.0 {
        actual_score / max_score
    } else {
        0.0
    };

    WeightedRecall {
        actual_score,
        max_score,
        weighted_recall,
    }
}

/// Precision over additional (non-GT) issues.
///
/// `valid / (valid + not_material)`; 1.0 when there are no additional
/// issues, since no claims means no false positives.
pub fn calculate_precision(valid_additional: usize, not_material: usize) -> f64 {
    let denominator = valid_additional + not_material;
    if denominator == 0 {
        return 1.0;
    }
    valid_additional as f64 / denominator as f64
}

/// F1 from recall and precision; 0.0 when both are zero.
pub fn calculate_f1(recall: f64, precision: f64) -> f64 {
    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * (precision * recall) / (precision + recall)
}
