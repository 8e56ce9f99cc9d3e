//! Freeform detection judge.
//!
//! One judge call per ground-truth issue: the judge reads the raw review
//! text and returns a Y/P/N/NMI verdict with an evidence excerpt. The
//! verdict maps directly onto the evaluation record; no further
//! dimension scoring happens in this mode, since the reviewed assistant
//! was not asked to produce structured redlines.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use arbiter_core::engines::match_review_item;
use arbiter_core::engines::stacking::{
    detect_critical_failures, determine_stacking_pass_fail, score_part_a_redline, PartAStats,
    PartBStats, RedlineEvaluation, StackingOutcome,
};
use arbiter_core::{
    build_evaluation, build_summary, CanonicalReview, Detection, Evaluation, EvaluationFile,
    EvaluationSummary, GroundTruthIssue, ModeConfig, Part, SummaryError, TierWeightTable,
};

use crate::cache::{VerdictCache, VerdictKey};
use crate::providers::{call_with_retry, JudgeError, JudgeProvider};
use crate::usage::{JudgeUsage, UsageTracker};

/// Errors from the judge runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Judge(#[from] JudgeError),

    #[error(transparent)]
    Score(#[from] SummaryError),
}

/// System prompt for the detection judge.
pub const JUDGE_SYSTEM: &str = "\
You are an expert legal contract reviewer acting as an evaluation judge.

Your task: determine whether a raw, unstructured contract review identified a
specific risk issue from our ground truth. The review was produced by a general-
purpose model given only \"Review this contract\" as a prompt - it has no
structured output format, no risk tables, and no tracked changes.

You must assess the review text holistically, looking for any mention,
discussion, or implication of the ground truth issue, even if phrased
differently.";

/// Judge configuration.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Judge model identifier.
    pub model: String,
    /// Maximum response tokens per verdict.
    pub max_tokens: u32,
    /// Skip all calls and emit placeholder verdicts.
    pub dry_run: bool,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250514".to_string(),
            max_tokens: 500,
            dry_run: false,
        }
    }
}

/// A parsed judge verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub detection: Detection,
    pub evidence_excerpt: String,
    pub reasoning: String,
}

/// Build the per-issue judge prompt.
pub fn build_judge_prompt(
    raw_review: &str,
    gt_issue: &GroundTruthIssue,
    contract_id: &str,
) -> String {
    let key_elements = if gt_issue.key_elements.is_empty() {
        "  (none specified)".to_string()
    } else {
        gt_issue
            .key_elements
            .iter()
            .map(|e| format!("  - {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let tier = gt_issue
        .tier
        .map(|t| t.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let contract_text = gt_issue.contract_text.as_deref().unwrap_or("N/A");

    format!(
        "## Ground Truth Issue\n\
         \n\
         - **Contract:** {contract_id}\n\
         - **GT ID:** {gt_id}\n\
         - **Clause:** {clause}\n\
         - **Tier:** {tier}\n\
         - **Issue:** {issue}\n\
         - **Key elements to look for:**\n\
         {key_elements}\n\
         - **Relevant contract text:** {contract_text}\n\
         \n\
         ## Raw Review (to evaluate)\n\
         \n\
         <review>\n\
         {raw_review}\n\
         </review>\n\
         \n\
         ## Your Task\n\
         \n\
         Search the raw review above for ANY mention, discussion, or implication of the\n\
         ground truth issue described. The review is unstructured prose - the model may\n\
         have used different terminology, grouped multiple issues together, or mentioned\n\
         the risk in passing.\n\
         \n\
         Determine detection status:\n\
         \n\
         - **Y (Yes):** The review clearly identifies this risk.\n\
         - **P (Partial):** The review touches on a related concern but misses the core\n\
           risk, or identifies the clause but mischaracterises the issue.\n\
         - **N (No):** The review does not mention this risk at all.\n\
         - **NMI (Not Mentioned in Input):** Only use if the risk relates to something\n\
           genuinely absent from the contract text provided to the model.\n\
         \n\
         ## Response Format\n\
         \n\
         Respond with ONLY a JSON object (no markdown fences, no commentary):\n\
         \n\
         {{\n\
           \"detection\": \"Y|P|N|NMI\",\n\
           \"evidence_excerpt\": \"Brief quote from the review (or empty string if N/NMI)\",\n\
           \"reasoning\": \"1-2 sentence explanation of your detection decision\"\n\
         }}",
        gt_id = gt_issue.id,
        clause = if gt_issue.clause.is_empty() {
            "N/A"
        } else {
            gt_issue.clause.as_str()
        },
        issue = gt_issue.issue,
    )
}

lazy_static! {
    static ref DETECTION_FIELD: Regex =
        Regex::new(r#"(?i)"detection"\s*:\s*"(Y|P|N|NMI)""#).unwrap();
    static ref REASONING_FIELD: Regex =
        Regex::new(r#""reasoning"\s*:\s*"([^"]*(?:\\.[^"]*)*)""#).unwrap();
}

/// Parse the judge's response, with a regex fallback for malformed JSON.
pub fn parse_judge_response(response_text: &str) -> Result<JudgeVerdict, JudgeError> {
    let mut text = response_text.trim().to_string();

    // Strip markdown fences if the judge added them anyway.
    if text.starts_with("```") {
        text = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n");
    }

    let data: Value = match serde_json::from_str(&text) {
        Ok(data) => data,
        Err(_) => extract_fields_fallback(&text).ok_or_else(|| {
            JudgeError::Parse(format!(
                "failed to parse judge response: {}",
                truncate(&text, 500)
            ))
        })?,
    };

    let raw_detection = data
        .get("detection")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_uppercase();
    let detection = Detection::parse(&raw_detection)
        .map_err(|_| JudgeError::Parse(format!("invalid detection value: {raw_detection:?}")))?;

    Ok(JudgeVerdict {
        detection,
        evidence_excerpt: data
            .get("evidence_excerpt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        reasoning: data
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Regex fallback for malformed JSON: the detection value at minimum.
fn extract_fields_fallback(text: &str) -> Option<Value> {
    let detection = DETECTION_FIELD.captures(text)?[1].to_uppercase();
    let mut fields = json!({ "detection": detection });
    if let Some(caps) = REASONING_FIELD.captures(text) {
        fields["reasoning"] = Value::String(caps[1].to_string());
    }
    Some(fields)
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Stacking evaluation output: Part A redline scores plus the judged
/// Part B base review, combined through the stacking gates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackingEvaluationFile {
    pub meta: Value,
    pub part_a: Vec<RedlineEvaluation>,
    pub part_a_summary: PartAStats,
    pub part_b: Vec<Evaluation>,
    pub part_b_summary: EvaluationSummary,
    pub outcome: StackingOutcome,
}

/// Per-issue detection judge over a raw review.
pub struct DetectionJudge {
    provider: Arc<dyn JudgeProvider>,
    config: JudgeConfig,
    cache: VerdictCache,
    usage: UsageTracker,
}

impl DetectionJudge {
    pub fn new(provider: Arc<dyn JudgeProvider>, config: JudgeConfig) -> Self {
        Self {
            provider,
            config,
            cache: VerdictCache::default(),
            usage: UsageTracker::new(),
        }
    }

    /// Accumulated judge usage for this judge instance.
    pub fn usage(&self) -> JudgeUsage {
        self.usage.snapshot()
    }

    /// Obtain a verdict for one issue, consulting the cache first.
    async fn verdict(
        &self,
        raw_review: &str,
        gt_issue: &GroundTruthIssue,
        contract_id: &str,
    ) -> Result<JudgeVerdict, JudgeError> {
        if self.config.dry_run {
            return Ok(JudgeVerdict {
                detection: Detection::N,
                evidence_excerpt: "[DRY RUN]".to_string(),
                reasoning: "[DRY RUN - no judge call made]".to_string(),
            });
        }

        let key = VerdictKey::new(contract_id, &gt_issue.id, &self.config.model, raw_review);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(gt_id = %gt_issue.id, "verdict cache hit");
            return Ok(cached);
        }

        let prompt = build_judge_prompt(raw_review, gt_issue, contract_id);
        let response = call_with_retry(
            self.provider.as_ref(),
            &prompt,
            Some(JUDGE_SYSTEM),
            &self.config.model,
            self.config.max_tokens,
        )
        .await?;
        self.usage.record(&response);

        let verdict = parse_judge_response(&response.text)?;
        self.cache.insert(key, verdict.clone()).await;
        Ok(verdict)
    }

    /// Evaluate a single GT issue against a raw review (detection only).
    pub async fn evaluate_issue(
        &self,
        raw_review: &str,
        gt_issue: &GroundTruthIssue,
        contract_id: &str,
        table: &TierWeightTable,
    ) -> Result<Evaluation, RuntimeError> {
        let verdict = self.verdict(raw_review, gt_issue, contract_id).await?;
        let evaluation = build_evaluation(
            gt_issue,
            verdict.detection,
            verdict.evidence_excerpt,
            verdict.reasoning,
            table,
        )?;
        Ok(evaluation)
    }

    /// Evaluate all GT issues for one contract and build the evaluation
    /// file.
    ///
    /// Precondition: at most one concurrent writer per (contract, model,
    /// environment). Calls run sequentially, one judge call per issue.
    pub async fn evaluate_contract(
        &self,
        raw_review: &str,
        gt_issues: &[GroundTruthIssue],
        contract_id: &str,
        table: &TierWeightTable,
    ) -> Result<EvaluationFile, RuntimeError> {
        let mut evaluations = Vec::with_capacity(gt_issues.len());
        for gt_issue in gt_issues {
            let evaluation = self
                .evaluate_issue(raw_review, gt_issue, contract_id, table)
                .await?;
            evaluations.push(evaluation);
        }

        let summary = build_summary(&evaluations, table)?;

        Ok(EvaluationFile {
            meta: json!({
                "contract": contract_id,
                "judge_model": self.config.model,
                "provider": self.provider.name(),
                "dry_run": self.config.dry_run,
            }),
            gt_evaluations: evaluations,
            additional_issues: Vec::new(),
            summary,
        })
    }

    /// Evaluate a stacking contract: Part A counter-party redlines are
    /// scored deterministically against the structured review, Part B is
    /// the judged base review, and the stacking gates combine the two.
    pub async fn evaluate_stacking_contract(
        &self,
        review: &CanonicalReview,
        base_review_text: &str,
        part_a_gt: &[GroundTruthIssue],
        part_b_gt: &[GroundTruthIssue],
        contract_id: &str,
        config: &ModeConfig,
    ) -> Result<StackingEvaluationFile, RuntimeError> {
        let part_a: Vec<RedlineEvaluation> = part_a_gt
            .iter()
            .map(|redline| {
                score_part_a_redline(match_review_item(redline, review), redline, config)
            })
            .collect();
        let critical_failures = detect_critical_failures(&part_a);
        let part_a_summary = PartAStats::from_evaluations(&part_a);

        let part_b_table = config.detection_points.table_for(Some(Part::PartB));
        let mut part_b = Vec::with_capacity(part_b_gt.len());
        for gt_issue in part_b_gt {
            let evaluation = self
                .evaluate_issue(base_review_text, gt_issue, contract_id, part_b_table)
                .await?;
            part_b.push(evaluation);
        }
        let part_b_summary = build_summary(&part_b, part_b_table)?;

        let outcome = determine_stacking_pass_fail(
            &part_a_summary,
            &PartBStats::from_summary(&part_b_summary),
            &critical_failures,
            config,
        );

        Ok(StackingEvaluationFile {
            meta: json!({
                "contract": contract_id,
                "judge_model": self.config.model,
                "provider": self.provider.name(),
                "dry_run": self.config.dry_run,
            }),
            part_a,
            part_a_summary,
            part_b,
            part_b_summary,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::{Grade, Tier};
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::providers::JudgeResponse;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl JudgeProvider for ScriptedProvider {
        async fn call(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            model: &str,
            _max_tokens: u32,
        ) -> Result<JudgeResponse, JudgeError> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            let text = if responses.is_empty() {
                r#"{"detection": "N", "evidence_excerpt": "", "reasoning": "not found"}"#
                    .to_string()
            } else {
                responses.remove(0)
            };
            Ok(JudgeResponse {
                text,
                resolved_model: model.to_string(),
                input_tokens: 100,
                output_tokens: 50,
                latency_seconds: 0.4,
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn gt_issue(id: &str, tier: Tier) -> GroundTruthIssue {
        GroundTruthIssue {
            id: id.to_string(),
            clause: "5.1".to_string(),
            tier: Some(tier),
            issue: "Uncapped liability".to_string(),
            key_elements: vec!["liability cap".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let verdict = parse_judge_response(
            r#"{"detection": "Y", "evidence_excerpt": "no cap", "reasoning": "found it"}"#,
        )
        .unwrap();
        assert_eq!(verdict.detection, Detection::Y);
        assert_eq!(verdict.evidence_excerpt, "no cap");
    }

    #[test]
    fn test_parse_strips_markdown_fences() {
        let verdict = parse_judge_response(
            "```json\n{\"detection\": \"P\", \"evidence_excerpt\": \"\", \"reasoning\": \"partial\"}\n```",
        )
        .unwrap();
        assert_eq!(verdict.detection, Detection::P);
    }

    #[test]
    fn test_parse_regex_fallback() {
        let verdict = parse_judge_response(
            "Sure! Here's my assessment: \"detection\": \"NMI\", \"reasoning\": \"absent\" - done",
        )
        .unwrap();
        assert_eq!(verdict.detection, Detection::Nmi);
        assert_eq!(verdict.reasoning, "absent");
    }

    #[test]
    fn test_parse_invalid_detection_fails() {
        let result =
            parse_judge_response(r#"{"detection": "MAYBE", "reasoning": "unsure"}"#);
        assert!(matches!(result, Err(JudgeError::Parse(_))));
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(matches!(
            parse_judge_response("I could not evaluate this."),
            Err(JudgeError::Parse(_))
        ));
    }

    #[test]
    fn test_prompt_contains_issue_fields() {
        let prompt = build_judge_prompt("the review", &gt_issue("GT-01", Tier::T1), "consulting");
        assert!(prompt.contains("GT-01"));
        assert!(prompt.contains("consulting"));
        assert!(prompt.contains("- liability cap"));
        assert!(prompt.contains("<review>\nthe review\n</review>"));
    }

    #[tokio::test]
    async fn test_evaluate_issue_scores_verdict() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            r#"{"detection": "Y", "evidence_excerpt": "liability is uncapped", "reasoning": "clearly flagged"}"#,
        ]));
        let judge = DetectionJudge::new(provider.clone(), JudgeConfig::default());
        let table = TierWeightTable::standard();

        let evaluation = judge
            .evaluate_issue("review text", &gt_issue("GT-01", Tier::T1), "consulting", &table)
            .await
            .unwrap();

        assert_eq!(evaluation.detection, Detection::Y);
        assert_eq!(evaluation.detection_points, 8.0);
        assert_eq!(evaluation.evidence.excerpt, "liability is uncapped");
        assert_eq!(judge.usage().calls, 1);
    }

    #[tokio::test]
    async fn test_identical_inputs_hit_cache() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            r#"{"detection": "P", "evidence_excerpt": "", "reasoning": ""}"#,
        ]));
        let judge = DetectionJudge::new(provider.clone(), JudgeConfig::default());
        let table = TierWeightTable::standard();
        let issue = gt_issue("GT-01", Tier::T2);

        let first = judge
            .evaluate_issue("same review", &issue, "consulting", &table)
            .await
            .unwrap();
        let second = judge
            .evaluate_issue("same review", &issue, "consulting", &table)
            .await
            .unwrap();

        assert_eq!(first.detection, second.detection);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let config = JudgeConfig {
            dry_run: true,
            ..Default::default()
        };
        let judge = DetectionJudge::new(provider.clone(), config);
        let table = TierWeightTable::standard();

        let evaluation = judge
            .evaluate_issue("review", &gt_issue("GT-01", Tier::T3), "consulting", &table)
            .await
            .unwrap();

        assert_eq!(evaluation.detection, Detection::N);
        assert_eq!(evaluation.evidence.excerpt, "[DRY RUN]");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_contract_builds_summary() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            r#"{"detection": "Y", "evidence_excerpt": "a", "reasoning": "r"}"#,
            r#"{"detection": "NMI", "evidence_excerpt": "", "reasoning": "missing"}"#,
        ]));
        let judge = DetectionJudge::new(provider, JudgeConfig::default());
        let table = TierWeightTable::standard();
        let issues = vec![gt_issue("GT-01", Tier::T1), gt_issue("GT-02", Tier::T2)];

        let file = judge
            .evaluate_contract("review", &issues, "consulting", &table)
            .await
            .unwrap();

        assert_eq!(file.gt_evaluations.len(), 2);
        assert_eq!(file.summary.detection_counts.y, 1);
        assert_eq!(file.summary.detection_counts.nmi, 1);
        assert!(file.summary.t1_gate_pass);
        assert_eq!(file.summary.total_detection_points, 8.0);
        assert_eq!(file.meta["provider"], "scripted");
    }

    #[tokio::test]
    async fn test_stacking_critical_failure_forces_fail() {
        // Part B judged perfectly, but the structured review accepts an
        // adversarial redline: the critical-failure gate must fire.
        let provider = Arc::new(ScriptedProvider::new(vec![
            r#"{"detection": "Y", "evidence_excerpt": "a", "reasoning": "r"}"#,
        ]));
        let judge = DetectionJudge::new(provider, JudgeConfig::default());
        let config = ModeConfig::bare("freeform_stacking");

        let part_a_gt = vec![GroundTruthIssue {
            id: "CP-01".to_string(),
            clause: "5.1".to_string(),
            acceptable_actions: vec!["MODIFY".to_string(), "REJECT".to_string()],
            ..Default::default()
        }];
        let part_b_gt = vec![gt_issue("GT-01", Tier::T1)];

        let review = CanonicalReview::from_value(&json!({
            "proposed_redlines": [{
                "clause_ref": "5.1",
                "action": "ACCEPT",
                "rationale": "The counter-party's position seems reasonable here.",
                "proposed_text": "Accept the proposed change without modification."
            }]
        }));

        let file = judge
            .evaluate_stacking_contract(
                &review,
                "base review text",
                &part_a_gt,
                &part_b_gt,
                "consulting",
                &config,
            )
            .await
            .unwrap();

        assert_eq!(file.outcome.grade, Grade::Fail);
        assert_eq!(
            file.outcome.gate_triggered.as_deref(),
            Some("critical_failure_gate")
        );
        assert_eq!(file.part_a[0].review_action, "ACCEPT");
        assert!(file.part_b_summary.t1_gate_pass);
    }
}
