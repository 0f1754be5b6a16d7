//! # urlinspect CLI Application
//!
//! Command-line front end for the URL inspection pipeline.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Subcommands:
//!   - `run`: sign in and inspect every URL in the input file
//!   - `check-input`: show how an input file will be read, without a browser
//!
//! Credentials come from flags or from `URLINSPECT_EMAIL`,
//! `URLINSPECT_PASSWORD` and `URLINSPECT_SITE`, optionally through a `.env`
//! file. A run that stops on an exhausted quota exits with status 2 after
//! saving everything extracted so far.

mod telemetry;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use telemetry::TelemetryOptions;
use tracing::instrument;
use urlinspect::auth::Credentials;
use urlinspect::config::PipelineConfig;
use urlinspect::driver::ChromiumDriver;
use urlinspect::pipeline::{Pipeline, RunOutcome, RunSummary};
use urlinspect::policy::{ExtractionFailure, FailurePolicy};

/// Exit status for a run stopped by the inspection quota
const QUOTA_EXIT: u8 = 2;

#[derive(Parser)]
#[command(author, version, about = "Extract URL inspection results through a scripted browser session", long_about = None)]
struct Cli {
    /// Also write logs to urlinspect.log in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Export traces and metrics over OTLP
    #[arg(long, global = true)]
    otlp: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and inspect every URL in the input file
    Run(RunArgs),

    /// Parse the input file and report what would be inspected
    CheckInput(CheckInputArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Sign-in identity
    #[arg(long, env = "URLINSPECT_EMAIL")]
    email: String,

    /// Sign-in secret
    #[arg(long, env = "URLINSPECT_PASSWORD", hide_env_values = true)]
    password: String,

    /// Site whose URLs are inspected, as registered in the console
    #[arg(long, env = "URLINSPECT_SITE")]
    site: String,

    /// File with one URL per line
    #[arg(short, long, default_value = "urls.txt")]
    input: PathBuf,

    /// JSON output path
    #[arg(long, default_value = "results.json")]
    json: PathBuf,

    /// CSV output path
    #[arg(long, default_value = "results.csv")]
    csv: PathBuf,

    /// Screenshot written when the run stops on a page marker
    #[arg(long, default_value = "quota-exceeded.png")]
    snapshot: PathBuf,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Inspections per minute (0 disables the limit)
    #[arg(short, long, default_value = "10")]
    rate: u32,

    /// Retries for an item the service reported an error for
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Stop the run when a field cannot be read instead of skipping the URL
    #[arg(long)]
    strict: bool,

    /// Summary format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

impl fmt::Debug for RunArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunArgs")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("site", &self.site)
            .field("input", &self.input)
            .field("json", &self.json)
            .field("csv", &self.csv)
            .field("snapshot", &self.snapshot)
            .field("headed", &self.headed)
            .field("rate", &self.rate)
            .field("retries", &self.retries)
            .field("strict", &self.strict)
            .field("format", &self.format)
            .finish()
    }
}

#[derive(Args, Debug)]
struct CheckInputArgs {
    /// File with one URL per line
    #[arg(short, long, default_value = "urls.txt")]
    input: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _otel = telemetry::init_tracing_subscriber(&TelemetryOptions {
        log_dir: cli.log_dir.clone(),
        otlp: cli.otlp,
    })?;

    match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::CheckInput(args) => check_input_command(args).await,
    }
}

#[instrument(skip_all, fields(input = %args.input.display(), site = %args.site))]
async fn run_command(args: RunArgs) -> anyhow::Result<ExitCode> {
    let credentials = Credentials::new(&args.email, &args.password, &args.site);

    let config = PipelineConfig::builder()
        .rate_limit_per_minute(args.rate)
        .json_path(&args.json)
        .csv_path(&args.csv)
        .snapshot_path(&args.snapshot)
        .headless(!args.headed)
        .build();

    let on_extraction_error = if args.strict {
        ExtractionFailure::Abort
    } else {
        ExtractionFailure::Skip
    };
    let policy = FailurePolicy::default()
        .with_max_transient_retries(args.retries)
        .with_extraction_failure(on_extraction_error);

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );
    progress_bar.set_message("Inspecting URLs...");

    println!(
        "Inspecting URLs from {} for {}...",
        args.input.display(),
        credentials.target_site()
    );

    let headless = config.headless;
    let summary = Pipeline::new(config)
        .with_policy(policy)
        .with_progress(progress_bar)
        .run(&args.input, &credentials, || ChromiumDriver::launch(headless))
        .await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_summary(&summary, &args),
    }

    if summary.is_aborted() {
        Ok(ExitCode::from(QUOTA_EXIT))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(summary: &RunSummary, args: &RunArgs) {
    println!(
        "Extracted {} of {} URLs in {}s",
        summary.extracted,
        summary.total,
        summary.duration().num_seconds()
    );
    println!("Skipped: {}", summary.skipped);
    println!("Failed: {}", summary.failed);
    if summary.retried > 0 {
        println!("Retries: {}", summary.retried);
    }
    if summary.persist_failures > 0 {
        println!("Failed writes: {}", summary.persist_failures);
    }

    if let RunOutcome::Aborted { index, url, reason } = &summary.outcome {
        println!();
        println!("Stopped at line {} ({}): {}", index + 1, url, reason);
        println!("{} URLs were not attempted", summary.unattempted());
        println!("Screenshot: {}", args.snapshot.display());
    }

    println!("Results: {} and {}", args.json.display(), args.csv.display());
}

#[instrument]
async fn check_input_command(args: CheckInputArgs) -> anyhow::Result<ExitCode> {
    let items = urlinspect::input::load(&args.input)
        .await
        .with_context(|| format!("cannot read {}", args.input.display()))?;

    println!("{} URLs in {}", items.len(), args.input.display());
    for item in &items {
        let url = item.normalized();
        let note = match url::Url::parse(&url) {
            Ok(_) => String::new(),
            Err(e) => format!("  (not an absolute URL: {})", e),
        };
        println!("{:>5}: {}{}", item.index() + 1, url, note);
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_debug_hides_password() {
        let cli = Cli::try_parse_from([
            "urlinspect",
            "run",
            "--email",
            "ops@example.com",
            "--password",
            "hunter2",
            "--site",
            "https://example.com/",
        ])
        .unwrap();

        let printed = format!("{:?}", cli.command);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("[REDACTED]"));
        assert!(printed.contains("ops@example.com"));
    }
}
