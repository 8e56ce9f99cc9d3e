//! # arbiter-runtime
//!
//! The LLM judge runtime for arbiter evaluations.
//!
//! `arbiter-core` is fully deterministic and never makes model calls.
//! This crate owns the one network-bound operation in the system: the
//! external judge call used by the freeform and freeform-stacking modes,
//! with the standard retry contract (3 retries, exponential backoff from
//! 2 seconds, rate-limit/timeout/transient-server errors only).
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use arbiter_runtime::{AnthropicJudge, DetectionJudge, JudgeConfig};
//! use arbiter_core::TierWeightTable;
//!
//! let provider = Arc::new(AnthropicJudge::from_env()?);
//! let judge = DetectionJudge::new(provider, JudgeConfig::default());
//! let table = TierWeightTable::standard();
//! let file = judge.evaluate_contract(&review_text, &gt_issues, "consulting", &table).await?;
//! ```

pub mod cache;
pub mod judge;
pub mod providers;
pub mod usage;

pub use cache::{VerdictCache, VerdictKey};
pub use judge::{
    build_judge_prompt, parse_judge_response, DetectionJudge, JudgeConfig, JudgeVerdict,
    RuntimeError, StackingEvaluationFile, JUDGE_SYSTEM,
};
pub use providers::{
    call_with_retry, ApiCredential, CredentialSource, JudgeError, JudgeProvider, JudgeResponse,
    INITIAL_BACKOFF, MAX_RETRIES,
};
pub use usage::{JudgeUsage, UsageTracker};

#[cfg(feature = "anthropic")]
pub use providers::AnthropicJudge;
