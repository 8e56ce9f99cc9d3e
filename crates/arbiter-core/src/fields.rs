//! Config-driven field resolution and the canonical ground-truth record.
//!
//! Different modes name the same semantic field differently (`gt_id` vs
//! `test_id`, `clause` vs `clause_ref`, integer vs string tiers). The
//! resolver applies the fixed fallback chain (part-specific config, then
//! mode-level config, then generic legacy names) and produces one
//! canonical [`GroundTruthIssue`] so scoring code never touches raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ModeConfig, Part};
use crate::scoring::concepts::DetectionLogic;
use crate::scoring::detection::{DetectionError, Tier};
use crate::scoring::polarity::Polarity;

/// Canonical ground-truth issue record. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroundTruthIssue {
    pub id: String,
    pub clause: String,
    pub tier: Option<Tier>,
    pub issue: String,
    #[serde(default)]
    pub expected_classification: Option<String>,
    #[serde(default)]
    pub detection_logic: DetectionLogic,
    #[serde(default)]
    pub polarity: Polarity,
    #[serde(default)]
    pub key_elements: Vec<String>,
    #[serde(default)]
    pub required_concepts: Vec<String>,
    #[serde(default)]
    pub reasoning_must_contain: Vec<String>,
    #[serde(default)]
    pub reasoning_must_not_contain: Vec<String>,
    #[serde(default)]
    pub expected_output_patterns: Vec<String>,
    #[serde(default)]
    pub expected_action: Option<String>,
    #[serde(default)]
    pub expected_amendment: Option<String>,
    #[serde(default)]
    pub trigger_phrase: Option<String>,
    #[serde(default)]
    pub rationale_must_include: Vec<String>,
    #[serde(default)]
    pub playbook_standard: Option<String>,
    #[serde(default)]
    pub acceptable_actions: Vec<String>,
    #[serde(default)]
    pub reasoning_must_address: Option<String>,
    #[serde(default)]
    pub clause_name: Option<String>,
    #[serde(default)]
    pub rule_name: Option<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub contract_text: Option<String>,
}

impl GroundTruthIssue {
    /// Whether this item's playbook standard is Red Flag.
    pub fn is_red_flag(&self) -> bool {
        self.playbook_standard
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("red flag"))
    }
}

/// Resolves canonical field names for a mode (and optional part).
pub struct FieldResolver<'a> {
    config: &'a ModeConfig,
    part: Option<Part>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(config: &'a ModeConfig) -> Self {
        Self { config, part: None }
    }

    pub fn for_part(config: &'a ModeConfig, part: Part) -> Self {
        Self {
            config,
            part: Some(part),
        }
    }

    /// The configured field name for a given slot, walking part-specific
    /// then mode-level configuration.
    fn configured_field(&self, select: fn(&crate::config::PartFields) -> Option<&String>, mode_level: Option<&'a String>) -> Option<&'a str> {
        if let Some(part) = self.part {
            if let Some(fields) = self.config.gt_structure.parts.get(&part) {
                if let Some(name) = select(fields) {
                    return Some(name.as_str());
                }
            }
        }
        mode_level.map(String::as_str)
    }

    /// Issue identifier: configured field -> `gt_id` -> `test_id`.
    pub fn issue_id(&self, issue: &Value) -> String {
        let configured = self.configured_field(
            |p| p.id_field.as_ref(),
            self.config.gt_structure.id_field.as_ref(),
        );
        for key in configured.into_iter().chain(["gt_id", "test_id"]) {
            if let Some(id) = issue.get(key).and_then(Value::as_str) {
                if !id.is_empty() {
                    return id.to_string();
                }
            }
        }
        String::new()
    }

    /// Tier: configured field -> `tier` -> `gt_tier`. Integer and string
    /// forms are normalised; an absent tier is `None`, a present but
    /// unrecognisable tier is an error.
    pub fn tier(&self, issue: &Value) -> Result<Option<Tier>, DetectionError> {
        let configured = self.configured_field(
            |p| p.tier_field.as_ref(),
            self.config.gt_structure.tier_field.as_ref(),
        );
        for key in configured.into_iter().chain(["tier", "gt_tier"]) {
            match issue.get(key) {
                None | Some(Value::Null) => continue,
                Some(Value::Number(n)) => {
                    let index = n.as_u64().ok_or_else(|| DetectionError::UnrecognizedTier {
                        value: n.to_string(),
                    })?;
                    return Tier::from_index(index).map(Some);
                }
                Some(Value::String(s)) => return Tier::parse(s).map(Some),
                Some(other) => {
                    return Err(DetectionError::UnrecognizedTier {
                        value: other.to_string(),
                    })
                }
            }
        }
        Ok(None)
    }

    /// Clause reference: configured field -> `clause` -> `clause_ref`.
    pub fn clause(&self, issue: &Value) -> String {
        let configured = self.configured_field(
            |p| p.clause_field.as_ref(),
            self.config.gt_structure.clause_field.as_ref(),
        );
        for key in configured.into_iter().chain(["clause", "clause_ref"]) {
            if let Some(clause) = issue.get(key).and_then(Value::as_str) {
                if !clause.is_empty() {
                    return clause.to_string();
                }
            }
        }
        String::new()
    }

    /// Issue description: configured field -> `issue`.
    pub fn issue_text(&self, issue: &Value) -> String {
        let configured = self.configured_field(
            |p| p.issue_field.as_ref(),
            self.config.gt_structure.issue_field.as_ref(),
        );
        for key in configured.into_iter().chain(["issue"]) {
            if let Some(text) = issue.get(key).and_then(Value::as_str) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        String::new()
    }

    /// Resolve a raw GT item into the canonical record.
    pub fn resolve(&self, raw: &Value) -> Result<GroundTruthIssue, DetectionError> {
        Ok(GroundTruthIssue {
            id: self.issue_id(raw),
            clause: self.clause(raw),
            tier: self.tier(raw)?,
            issue: self.issue_text(raw),
            expected_classification: opt_str(raw, &["expected_classification"]),
            detection_logic: enum_field(raw, "detection_logic"),
            polarity: enum_field(raw, "polarity"),
            key_elements: str_list(raw, "key_elements"),
            required_concepts: str_list(raw, "required_concepts"),
            reasoning_must_contain: str_list(raw, "reasoning_must_contain"),
            reasoning_must_not_contain: str_list(raw, "reasoning_must_not_contain"),
            expected_output_patterns: str_list(raw, "expected_output_patterns"),
            expected_action: opt_str(raw, &["expected_action"]),
            expected_amendment: opt_str(raw, &["expected_amendment"]),
            trigger_phrase: opt_str(raw, &["trigger_phrase", "trigger_quote"]),
            rationale_must_include: str_list(raw, "rationale_must_include"),
            playbook_standard: opt_str(raw, &["playbook_standard"]),
            acceptable_actions: str_list(raw, "acceptable_actions"),
            reasoning_must_address: opt_str(raw, &["reasoning_must_address"]),
            clause_name: opt_str(raw, &["clause_name"]),
            rule_name: opt_str(raw, &["rule_name"]),
            contract: opt_str(raw, &["contract"]),
            section: raw
                .get("section")
                .filter(|v| !v.is_null())
                .map(value_to_display),
            contract_text: opt_str(raw, &["contract_text"]),
        })
    }

    /// Resolve a whole GT item list, preserving order.
    pub fn resolve_all(&self, raw: &[Value]) -> Result<Vec<GroundTruthIssue>, DetectionError> {
        raw.iter().map(|item| self.resolve(item)).collect()
    }
}

fn opt_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn str_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn enum_field<T: Default + serde::de::DeserializeOwned>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extract a contract's type from its identifier: prefix match against the
/// configured types first, then substring match.
pub fn extract_contract_type(contract: &str, contract_types: &[String]) -> Option<String> {
    let contract_lower = contract.to_lowercase();

    for ct in contract_types {
        if contract_lower.starts_with(&ct.to_lowercase()) {
            return Some(ct.to_lowercase());
        }
    }
    for ct in contract_types {
        if contract_lower.contains(&ct.to_lowercase()) {
            return Some(ct.to_lowercase());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GtStructure, PartFields};
    use serde_json::json;

    fn config_with_fields(id_field: Option<&str>, tier_field: Option<&str>) -> ModeConfig {
        let mut config = ModeConfig::bare("rules");
        config.gt_structure = GtStructure {
            id_field: id_field.map(str::to_string),
            tier_field: tier_field.map(str::to_string),
            ..Default::default()
        };
        config
    }

    #[test]
    fn test_configured_field_wins() {
        let config = config_with_fields(Some("rule_id"), None);
        let resolver = FieldResolver::new(&config);
        let raw = json!({"rule_id": "R-01", "gt_id": "GT-99"});
        assert_eq!(resolver.issue_id(&raw), "R-01");
    }

    #[test]
    fn test_legacy_fallback_chain() {
        let config = ModeConfig::bare("freeform");
        let resolver = FieldResolver::new(&config);
        assert_eq!(resolver.issue_id(&json!({"gt_id": "GT-01"})), "GT-01");
        assert_eq!(resolver.issue_id(&json!({"test_id": "T-01"})), "T-01");
        assert_eq!(resolver.issue_id(&json!({})), "");
        assert_eq!(resolver.clause(&json!({"clause_ref": "5.1"})), "5.1");
    }

    #[test]
    fn test_part_specific_field_resolution() {
        let mut config = ModeConfig::bare("freeform_stacking");
        config
            .gt_structure
            .parts
            .insert(
                Part::PartA,
                PartFields {
                    id_field: Some("redline_id".to_string()),
                    ..Default::default()
                },
            );

        let raw = json!({"redline_id": "CP-01", "gt_id": "GT-01"});
        let part_a = FieldResolver::for_part(&config, Part::PartA);
        assert_eq!(part_a.issue_id(&raw), "CP-01");

        // Part B has no part config, so the legacy chain applies.
        let part_b = FieldResolver::for_part(&config, Part::PartB);
        assert_eq!(part_b.issue_id(&raw), "GT-01");
    }

    #[test]
    fn test_tier_normalisation_variants() {
        let config = ModeConfig::bare("guidelines");
        let resolver = FieldResolver::new(&config);

        assert_eq!(resolver.tier(&json!({"tier": 2})).unwrap(), Some(Tier::T2));
        assert_eq!(
            resolver.tier(&json!({"tier": "T1"})).unwrap(),
            Some(Tier::T1)
        );
        assert_eq!(
            resolver.tier(&json!({"tier": "TIER 3"})).unwrap(),
            Some(Tier::T3)
        );
        assert_eq!(resolver.tier(&json!({})).unwrap(), None);
    }

    #[test]
    fn test_unrecognised_tier_is_error() {
        let config = ModeConfig::bare("guidelines");
        let resolver = FieldResolver::new(&config);
        assert!(matches!(
            resolver.tier(&json!({"tier": "CRITICAL"})),
            Err(DetectionError::UnrecognizedTier { .. })
        ));
    }

    #[test]
    fn test_resolve_full_issue() {
        let config = ModeConfig::bare("freeform");
        let resolver = FieldResolver::new(&config);
        let raw = json!({
            "gt_id": "GT-03",
            "clause": "Section 9.2",
            "tier": "T1",
            "issue": "Uncapped liability",
            "polarity": "positive",
            "detection_logic": "pattern_match",
            "key_elements": ["cap", "aggregate"],
            "required_concepts": ["liability cap"],
            "trigger_quote": "shall not exceed",
            "acceptable_actions": ["MODIFY", "REJECT"]
        });

        let issue = resolver.resolve(&raw).unwrap();
        assert_eq!(issue.id, "GT-03");
        assert_eq!(issue.tier, Some(Tier::T1));
        assert_eq!(issue.polarity, Polarity::Positive);
        assert_eq!(issue.detection_logic, DetectionLogic::PatternMatch);
        assert_eq!(issue.trigger_phrase.as_deref(), Some("shall not exceed"));
        assert_eq!(issue.acceptable_actions.len(), 2);
    }

    #[test]
    fn test_extract_contract_type() {
        let types = vec!["consulting".to_string(), "dpa".to_string()];
        assert_eq!(
            extract_contract_type("consulting_v2", &types),
            Some("consulting".to_string())
        );
        assert_eq!(
            extract_contract_type("acme_dpa_2024", &types),
            Some("dpa".to_string())
        );
        assert_eq!(extract_contract_type("lease", &types), None);
    }
}
