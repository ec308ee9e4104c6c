#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use ahash::{AHashMap, AHashSet};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use gpa_forecast::{
    ModelArtifact, PipelineConfig, PredictionReport, Predictor, Regressor, ReportSummary,
    read_table,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::error::Error;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Args)]
struct PredictArgs {
    /// Long-format mark tables (CSV or TSV), one row per student and course
    #[arg(value_name = "MARKS", required = true)]
    inputs: Vec<PathBuf>,

    /// Path to the trained model artifact (.toml)
    #[arg(long)]
    model: PathBuf,

    /// Optional pipeline configuration (.toml): column names and normalization mode
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the result tables are written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Format of the result tables
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Also write the subset of students below the eligibility threshold
    #[arg(long)]
    at_risk: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Path to the trained model artifact (.toml)
    #[arg(long)]
    model: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "gpa-forecast",
    version,
    about = "Estimate student GPA from course marks and flag at-risk students"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one or more mark tables against a trained model
    #[command(about = "Predict GPA bands (outputs: <stem>.predictions.csv)")]
    Predict(PredictArgs),

    /// Describe a model artifact
    #[command(about = "Show the model family and feature columns of an artifact")]
    Inspect(InspectArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Predict(args)) => predict(args),
        Some(Commands::Inspect(args)) => inspect(args),
        None => print_help(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_help() -> CliResult<()> {
    Cli::command().print_help()?;
    println!();
    Ok(())
}

fn predict(args: PredictArgs) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let artifact = Arc::new(ModelArtifact::load(&args.model)?);
    let predictor = Predictor::new(artifact, config)?;

    let stems = output_stems(&args.inputs)?;
    fs::create_dir_all(&args.output).map_err(|e| {
        format!(
            "Failed to create output directory '{}': {e}",
            args.output.display()
        )
    })?;

    let pb = create_progress_bar(args.inputs.len() as u64, "Scoring mark tables");
    let outcomes: Vec<CliResult<ReportSummary>> = args
        .inputs
        .par_iter()
        .zip(stems.par_iter())
        .map(|(input, stem)| {
            let outcome = process_input(&predictor, input, stem, &args);
            pb.inc(1);
            outcome
        })
        .collect();
    pb.finish_and_clear();

    let mut failures = 0usize;
    for (input, outcome) in args.inputs.iter().zip(outcomes) {
        match outcome {
            Ok(summary) => println!("{}\n{summary}\n", input.display()),
            Err(e) => {
                failures += 1;
                eprintln!("Failed to process '{}': {e}", input.display());
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} of {} inputs failed", args.inputs.len()).into());
    }
    Ok(())
}

fn process_input(
    predictor: &Predictor,
    input: &Path,
    stem: &str,
    args: &PredictArgs,
) -> CliResult<ReportSummary> {
    let raw = read_table(input)?;
    let report = predictor.run(&raw)?;

    let predictions_path = output_path(&args.output, stem, "predictions", args.format);
    write_report(&report, &predictions_path, args.format)?;
    info!(
        "Wrote {} predictions to '{}'",
        report.len(),
        predictions_path.display()
    );

    if args.at_risk {
        let at_risk = report.at_risk();
        let at_risk_path = output_path(&args.output, stem, "at_risk", args.format);
        write_report(&at_risk, &at_risk_path, args.format)?;
        info!(
            "Wrote {} at-risk students to '{}'",
            at_risk.len(),
            at_risk_path.display()
        );
    }

    Ok(report.summary())
}

/// One output stem per input, in input order. Inputs sharing a file stem (`a/marks.csv`
/// and `b/marks.tsv`) get their 1-based position appended so that no two write to the
/// same result file.
fn output_stems(inputs: &[PathBuf]) -> CliResult<Vec<String>> {
    let stems: Vec<&str> = inputs
        .iter()
        .map(|input| input.file_stem().and_then(|s| s.to_str()).unwrap_or("marks"))
        .collect();
    let mut counts: AHashMap<&str, usize> = AHashMap::with_capacity(stems.len());
    for &stem in &stems {
        *counts.entry(stem).or_default() += 1;
    }

    let mut resolved = Vec::with_capacity(stems.len());
    let mut taken = AHashSet::with_capacity(stems.len());
    for (i, (input, stem)) in inputs.iter().zip(&stems).enumerate() {
        let name = if counts[stem] > 1 {
            let name = format!("{stem}-{}", i + 1);
            warn!(
                "Several inputs are named '{stem}'; results for '{}' use '{name}'",
                input.display()
            );
            name
        } else {
            stem.to_string()
        };
        if !taken.insert(name.clone()) {
            return Err(format!(
                "Input '{}' would overwrite the results of another input named '{name}'",
                input.display()
            )
            .into());
        }
        resolved.push(name);
    }
    Ok(resolved)
}

fn output_path(dir: &Path, stem: &str, kind: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("{stem}.{kind}.{}", format.extension()))
}

fn write_report(report: &PredictionReport, path: &Path, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Csv => report.write_csv(path)?,
        OutputFormat::Json => report.write_json(path)?,
    }
    Ok(())
}

fn inspect(args: InspectArgs) -> CliResult<()> {
    let artifact = ModelArtifact::load(&args.model)?;
    println!("Model family: {}", artifact.model().family());
    match artifact.model() {
        Regressor::Linear(linear) => println!("Intercept: {}", linear.intercept),
        Regressor::GradientBoosting(ensemble) => println!(
            "Baseline: {} across {} trees",
            ensemble.baseline,
            ensemble.trees.len()
        ),
    }

    println!("Feature columns ({}):", artifact.feature_columns().len());
    match artifact.reference_means() {
        Some(means) => {
            for (column, mean) in artifact.feature_columns().iter().zip(means) {
                println!("  {column} (reference mean {mean:.3})");
            }
        }
        None => {
            for column in artifact.feature_columns() {
                println!("  {column}");
            }
            println!("No reference means: only batch normalization is available.");
        }
    }
    Ok(())
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if len > 1 && std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) =
        ProgressStyle::with_template("> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}
