//! Detection and tier symbols, with normalisation to the canonical sets.
//!
//! Every detection verdict in the system is one of {Y, P, N, NMI} and every
//! tier is one of {T1, T2, T3}. Upstream data uses case variants, verbose
//! forms and legacy symbols; everything is normalised at the boundary so the
//! scoring code only ever sees the canonical enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from detection/tier normalisation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("cannot normalise detection value: {value:?} (expected one of: Y, P, N, NMI)")]
    UnknownDetectionValue { value: String },

    #[error("unrecognised tier: {value:?} (expected one of: T1, T2, T3)")]
    UnrecognizedTier { value: String },
}

/// Canonical detection verdict for a single ground-truth issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Detection {
    /// Issue clearly identified.
    Y,
    /// Partially identified (related concern, incomplete reasoning).
    P,
    /// Issue present but marked favorable / not flagged.
    N,
    /// Not mentioned in the output at all.
    #[serde(rename = "NMI")]
    Nmi,
}

impl Detection {
    /// All canonical detections, in display order.
    pub const ALL: [Detection; 4] = [Detection::Y, Detection::P, Detection::N, Detection::Nmi];

    /// Normalise a raw detection token to canonical form.
    ///
    /// Accepts case variants (`y`, `nmi`), verbose forms (`YES`, `PARTIAL`,
    /// `NO`, `NOT_MENTIONED`) and the legacy `triangle` symbol for partial.
    /// Unknown tokens are an error, never passed through.
    pub fn parse(value: &str) -> Result<Self, DetectionError> {
        let direct = match value {
            "Y" | "y" => Some(Detection::Y),
            "P" | "p" => Some(Detection::P),
            "N" | "n" => Some(Detection::N),
            "NMI" | "nmi" => Some(Detection::Nmi),
            "triangle" | "TRIANGLE" => Some(Detection::P),
            _ => None,
        };
        if let Some(det) = direct {
            return Ok(det);
        }

        // Uppercase fallback for verbose and mixed-case forms
        match value.to_uppercase().as_str() {
            "Y" | "YES" => Ok(Detection::Y),
            "P" | "PARTIAL" | "TRIANGLE" => Ok(Detection::P),
            "N" | "NO" => Ok(Detection::N),
            "NMI" | "NOT_MENTIONED" => Ok(Detection::Nmi),
            _ => Err(DetectionError::UnknownDetectionValue {
                value: value.to_string(),
            }),
        }
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Detection::Y => "Y",
            Detection::P => "P",
            Detection::N => "N",
            Detection::Nmi => "NMI",
        }
    }

    /// Whether this verdict counts as a detection (Y or P).
    pub fn is_detected(&self) -> bool {
        matches!(self, Detection::Y | Detection::P)
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    T1,
    T2,
    T3,
}

impl Tier {
    /// All canonical tiers, highest severity first.
    pub const ALL: [Tier; 3] = [Tier::T1, Tier::T2, Tier::T3];

    /// Normalise a tier string to canonical form.
    ///
    /// Accepts `T1`/`t2`, bare digits (`"3"`), and `TIER 2` style strings.
    /// Anything else is an explicit error; the legacy behaviour of passing
    /// unrecognised strings through unchanged is not reproduced.
    pub fn parse(value: &str) -> Result<Self, DetectionError> {
        let upper = value.trim().to_uppercase();

        let digits = if let Some(rest) = upper.strip_prefix("TIER") {
            rest.trim()
        } else if let Some(rest) = upper.strip_prefix('T') {
            rest
        } else {
            upper.as_str()
        };

        match digits {
            "1" => Ok(Tier::T1),
            "2" => Ok(Tier::T2),
            "3" => Ok(Tier::T3),
            _ => Err(DetectionError::UnrecognizedTier {
                value: value.to_string(),
            }),
        }
    }

    /// Normalise a numeric tier (e.g. `tier: 2` in ground truth files).
    pub fn from_index(index: u64) -> Result<Self, DetectionError> {
        match index {
            1 => Ok(Tier::T1),
            2 => Ok(Tier::T2),
            3 => Ok(Tier::T3),
            _ => Err(DetectionError::UnrecognizedTier {
                value: index.to_string(),
            }),
        }
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::T1 => "T1",
            Tier::T2 => "T2",
            Tier::T3 => "T3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_canonical_forms() {
        assert_eq!(Detection::parse("Y").unwrap(), Detection::Y);
        assert_eq!(Detection::parse("P").unwrap(), Detection::P);
        assert_eq!(Detection::parse("N").unwrap(), Detection::N);
        assert_eq!(Detection::parse("NMI").unwrap(), Detection::Nmi);
    }

    #[test]
    fn test_parse_verbose_and_legacy_forms() {
        assert_eq!(Detection::parse("YES").unwrap(), Detection::Y);
        assert_eq!(Detection::parse("partial").unwrap(), Detection::P);
        assert_eq!(Detection::parse("no").unwrap(), Detection::N);
        assert_eq!(Detection::parse("NOT_MENTIONED").unwrap(), Detection::Nmi);
        assert_eq!(Detection::parse("triangle").unwrap(), Detection::P);
    }

    #[test]
    fn test_parse_unknown_detection_fails() {
        let result = Detection::parse("MAYBE");
        assert!(matches!(
            result,
            Err(DetectionError::UnknownDetectionValue { .. })
        ));
    }

    #[test]
    fn test_serde_round_trip_uses_canonical_names() {
        let json = serde_json::to_string(&Detection::Nmi).unwrap();
        assert_eq!(json, "\"NMI\"");
        let back: Detection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Detection::Nmi);
    }

    #[test]
    fn test_tier_parse_variants() {
        assert_eq!(Tier::parse("T1").unwrap(), Tier::T1);
        assert_eq!(Tier::parse("t2").unwrap(), Tier::T2);
        assert_eq!(Tier::parse("3").unwrap(), Tier::T3);
        assert_eq!(Tier::parse("TIER 2").unwrap(), Tier::T2);
        assert_eq!(Tier::parse(" tier 1 ").unwrap(), Tier::T1);
    }

    #[test]
    fn test_tier_parse_unrecognised_is_error() {
        // Unrecognised tier strings must not silently pass through.
        assert!(matches!(
            Tier::parse("GOLD"),
            Err(DetectionError::UnrecognizedTier { .. })
        ));
        assert!(matches!(
            Tier::parse("T4"),
            Err(DetectionError::UnrecognizedTier { .. })
        ));
    }

    #[test]
    fn test_tier_from_index() {
        assert_eq!(Tier::from_index(1).unwrap(), Tier::T1);
        assert!(Tier::from_index(0).is_err());
        assert!(Tier::from_index(4).is_err());
    }

    proptest! {
        /// Normalisation is idempotent: re-parsing a canonical form yields
        /// the same detection.
        #[test]
        fn prop_normalise_is_idempotent(raw in prop_oneof![
            Just("Y"), Just("y"), Just("YES"), Just("P"), Just("partial"),
            Just("triangle"), Just("N"), Just("no"), Just("NMI"), Just("nmi"),
            Just("NOT_MENTIONED"),
        ]) {
            let once = Detection::parse(raw).unwrap();
            let twice = Detection::parse(once.as_str()).unwrap();
            prop_assert_eq!(once, twice);
        }

        /// Tokens outside the alias table always fail.
        #[test]
        fn prop_unknown_tokens_fail(raw in "[A-Z]{4,8}") {
            prop_assume!(!["PARTIAL", "NMI"].contains(&raw.as_str()));
            prop_assume!(raw != "YES" && raw != "NO" && raw != "NOT_MENTIONED" && raw != "TRIANGLE");
            prop_assert!(Detection::parse(&raw).is_err());
        }
    }
}
