//! Command-line entry point for the evaluation pipeline.
//!
//! ```text
//! arbiter freeform hotfix
//! arbiter rules test_prod2 --mode-dir ./rules
//! arbiter freeform hotfix --validate-only
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use arbiter_core::{EvaluationPipeline, JsonSummaryRenderer, Mode, ValidationResult};

#[derive(Parser, Debug)]
#[command(
    name = "arbiter",
    about = "Contract-review evaluation pipeline",
    after_help = "Examples:\n  \
        arbiter freeform hotfix\n  \
        arbiter rules test_prod2 --mode-dir ./rules\n  \
        arbiter freeform hotfix --validate-only\n  \
        arbiter guidelines prod --output-dir ./custom_output"
)]
struct Cli {
    /// Evaluation mode (freeform, freeform_stacking, rules, rules_stacking, guidelines)
    mode: Mode,

    /// Environment name (e.g. hotfix, test_prod2, prod)
    env: String,

    /// Override mode directory (default: inferred from config)
    #[arg(long)]
    mode_dir: Option<PathBuf>,

    /// Override output directory (default: {mode_dir}/results)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Only run validation gates, skip aggregation and rendering
    #[arg(long)]
    validate_only: bool,

    /// Path to mode config JSON (default: config/{mode}.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nerror: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    println!("Initializing {} evaluation pipeline...", cli.mode);
    let pipeline = EvaluationPipeline::new(cli.mode, cli.mode_dir, cli.config)
        .context("failed to initialise pipeline")?;
    println!("Mode directory: {}", pipeline.mode_dir().display());

    if cli.validate_only {
        return validate_only(&pipeline, &cli.env);
    }

    println!("\nRunning full evaluation pipeline for environment: {}", cli.env);
    let summary = pipeline.run_full_pipeline(
        &cli.env,
        None,
        cli.output_dir,
        &JsonSummaryRenderer,
    )?;

    println!("\n{}", "=".repeat(60));
    println!("Pipeline execution complete");
    println!("{}", "=".repeat(60));
    println!("Mode:             {}", summary.mode);
    println!("Environment:      {}", summary.env);
    println!("Runs processed:   {}", summary.runs_processed);
    println!("Files aggregated: {}", summary.aggregate.files_written);
    println!("Aggregated dir:   {}", summary.aggregated_dir.display());
    println!("Report:           {}", summary.report_path.display());
    if summary.warnings > 0 {
        println!("Warnings:         {}", summary.warnings);
    }
    println!("{}", "=".repeat(60));

    Ok(())
}

fn validate_only(pipeline: &EvaluationPipeline, env: &str) -> anyhow::Result<()> {
    println!("\nValidating prerequisites for environment: {env}");
    let pre_eval = pipeline.validate_pre_eval(env);
    report_warnings(&pre_eval);
    pre_eval.abort_if_errors("pre-evaluation")?;
    println!("pre-evaluation validation passed");

    let runs = pipeline.discover_runs(env);
    if runs.is_empty() {
        println!("\nNo evaluation runs found for environment: {env}");
    } else {
        println!("\nValidating {} evaluation runs...", runs.len());
        let pre_aggregate = pipeline.validate_runs(&runs);
        report_warnings(&pre_aggregate);
        pre_aggregate.abort_if_errors("pre-aggregation")?;
        println!("pre-aggregation validation passed");
    }

    println!("\nValidation complete - no errors found");
    Ok(())
}

fn report_warnings(result: &ValidationResult) {
    for warning in result.warnings() {
        println!("  warning: {} (at {})", warning.message, warning.location);
    }
}
