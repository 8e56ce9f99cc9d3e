//! # arbiter-core
//!
//! Deterministic evaluation engine for grading AI contract-review output
//! against hand-authored ground truth.
//!
//! The crate covers the full evaluation pipeline except the external
//! judge call (see `arbiter-runtime`):
//! - scoring primitives: detection normalisation, classification and
//!   polarity resolution, concept/pattern matching, point tables
//! - mode scoring engines: rules, guidelines, and the two stacking
//!   variants
//! - the three validation gates (pre-eval, pre-aggregate, pre-workbook)
//! - the multi-run aggregator and the pipeline orchestrator
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same input always produces the same score
//! 2. **Explicit configuration**: weight tables and mode settings are
//!    immutable values passed into every call, never ambient state
//! 3. **Canonical records**: heterogeneous upstream JSON is adapted into
//!    canonical ground-truth and review records before any scoring runs
//! 4. **Accumulating gates**: validation collects every issue before
//!    returning, and only ERROR severity blocks
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbiter_core::{EvaluationPipeline, JsonSummaryRenderer, Mode};
//!
//! let pipeline = EvaluationPipeline::new(Mode::Rules, None, None)?;
//! let summary = pipeline.run_full_pipeline("hotfix", None, None, &JsonSummaryRenderer)?;
//! println!("aggregated {} files", summary.aggregate.files_written);
//! ```

pub mod aggregate;
pub mod config;
pub mod engines;
pub mod fields;
pub mod gt;
pub mod pipeline;
pub mod review;
pub mod scoring;
pub mod summary;
pub mod validate;

// Re-export main types at crate root
pub use aggregate::{aggregate_runs, AggregateError, AggregateSummary, Provenance};
pub use config::{
    load_mode_config, ConfigError, GtKind, ModeConfig, Part, PassCriteria, SchemaViolation,
};
pub use engines::{clause_refs_match, match_review_item, GateStatus, Grade};
pub use fields::{extract_contract_type, FieldResolver, GroundTruthIssue};
pub use gt::{GtData, GtError, GtLoadResult, GtLoader, GtPart, GroundTruthFile, TierSummary};
pub use pipeline::{
    write_evaluation_record, EvaluationPipeline, JsonSummaryRenderer, Mode, PipelineError,
    PipelineSummary, Renderer, UnknownMode,
};
pub use review::{CanonicalReview, OutputSection, ReviewItem};
pub use scoring::{
    Detection, DetectionError, DetectionLogic, Polarity, Tier, TierWeightTable,
};
pub use summary::{
    assess_additional_issues, build_evaluation, build_summary, AdditionalIssueStats,
    DetectionCounts, Evaluation, EvaluationFile, EvaluationSummary, Evidence, SummaryError,
};
pub use validate::{
    validate_pre_aggregation, validate_pre_evaluation, validate_pre_workbook, GateFailed,
    Severity, ValidationIssue, ValidationResult,
};
