//! Canonical model-output records.
//!
//! Upstream canonical JSON arrives in several historical shapes: `action`
//! vs `recommendation`, `proposed_text` vs `redline_text`, `rationale` vs
//! `detailed_reasoning`, `clause_ref` vs `clause`. All of that fallback
//! logic lives here, once; scoring code only ever sees [`ReviewItem`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output sections a review can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSection {
    RiskTable,
    ProposedRedlines,
    NewClausesProposed,
}

impl OutputSection {
    pub const ALL: [OutputSection; 3] = [
        OutputSection::RiskTable,
        OutputSection::ProposedRedlines,
        OutputSection::NewClausesProposed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSection::RiskTable => "risk_table",
            OutputSection::ProposedRedlines => "proposed_redlines",
            OutputSection::NewClausesProposed => "new_clauses_proposed",
        }
    }
}

/// One canonicalised assistant output item (risk-table row, proposed
/// redline, or new-clause recommendation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReviewItem {
    #[serde(default)]
    pub clause_ref: String,
    #[serde(default)]
    pub clause_name: String,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub proposed_text: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub issue_summary: String,
    #[serde(default)]
    pub clause_summary: String,
    #[serde(default)]
    pub change_summary: String,
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn first_str_field(value: &Value, keys: &[&str]) -> String {
    for key in keys {
        let s = str_field(value, key);
        if !s.is_empty() {
            return s;
        }
    }
    String::new()
}

impl ReviewItem {
    /// Build a canonical item from a raw upstream JSON object, collapsing
    /// all legacy field aliases.
    pub fn from_value(value: &Value) -> Self {
        let mut rationale = str_field(value, "rationale");
        let detailed = str_field(value, "detailed_reasoning");
        if !detailed.is_empty() {
            if rationale.is_empty() {
                rationale = detailed;
            } else {
                rationale.push(' ');
                rationale.push_str(&detailed);
            }
        }

        ReviewItem {
            clause_ref: first_str_field(value, &["clause_ref", "clause"]),
            clause_name: str_field(value, "clause_name"),
            classification: str_field(value, "classification"),
            action: first_str_field(value, &["action", "recommendation"]),
            proposed_text: first_str_field(value, &["proposed_text", "redline_text"]),
            rationale,
            issue_summary: str_field(value, "issue_summary"),
            clause_summary: str_field(value, "clause_summary"),
            change_summary: str_field(value, "change_summary"),
        }
    }

    /// All output text joined and lowercased, for pattern/concept search.
    pub fn searchable_text(&self) -> String {
        [
            self.clause_name.as_str(),
            self.rationale.as_str(),
            self.proposed_text.as_str(),
            self.issue_summary.as_str(),
            self.clause_summary.as_str(),
        ]
        .join(" ")
        .to_lowercase()
    }

    /// Rationale and proposed text combined, lowercased. Trigger phrases
    /// may appear in either.
    pub fn effective_text(&self) -> String {
        format!("{} {}", self.rationale, self.proposed_text).to_lowercase()
    }
}

/// A full canonicalised review for one (contract, model).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CanonicalReview {
    #[serde(default)]
    pub risk_table: Vec<ReviewItem>,
    #[serde(default)]
    pub proposed_redlines: Vec<ReviewItem>,
    #[serde(default)]
    pub new_clauses_proposed: Vec<ReviewItem>,
}

impl CanonicalReview {
    /// Build a canonical review from raw upstream JSON.
    pub fn from_value(value: &Value) -> Self {
        let items = |key: &str| -> Vec<ReviewItem> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|arr| arr.iter().map(ReviewItem::from_value).collect())
                .unwrap_or_default()
        };

        CanonicalReview {
            risk_table: items("risk_table"),
            proposed_redlines: items("proposed_redlines"),
            new_clauses_proposed: items("new_clauses_proposed"),
        }
    }

    pub fn section(&self, section: OutputSection) -> &[ReviewItem] {
        match section {
            OutputSection::RiskTable => &self.risk_table,
            OutputSection::ProposedRedlines => &self.proposed_redlines,
            OutputSection::NewClausesProposed => &self.new_clauses_proposed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.risk_table.is_empty()
            && self.proposed_redlines.is_empty()
            && self.new_clauses_proposed.is_empty()
    }
}
