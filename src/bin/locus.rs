//! Locus CLI - Command-line interface for the Locus location engine
//!
//! Commands:
//! - analyze: Run the full analysis over a batch of events
//! - validate: Check event records without analyzing them
//! - locate: Show one user's predicted location and how well it fits
//! - params: Print the effective algorithm parameters
//! - doctor: Diagnose environment and configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use locus::config::AnalysisConfig;
use locus::normalizer::{parse_timestamp, EventNormalizer};
use locus::report::algorithm_parameters;
use locus::types::{AnalysisOutcome, RawEvent};
use locus::{prediction_accuracy, LocationAnalyzer, PredictionAccuracy};
use locus::{LOCUS_VERSION, PRODUCER_NAME};

/// Locus - Location inference for geotagged user events
#[derive(Parser)]
#[command(name = "locus")]
#[command(version = LOCUS_VERSION)]
#[command(about = "Infer user locations from geotagged events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a batch of events and emit the report
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,

        /// Reference time for decay (ISO-8601, defaults to now)
        #[arg(long)]
        now: Option<String>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate event records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one user's predicted location
    Locate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// User to locate
        #[arg(short, long)]
        user: String,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Reference time for decay (ISO-8601, defaults to now)
        #[arg(long)]
        now: Option<String>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective algorithm parameters
    Params {
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Diagnose environment and configuration
    Doctor {
        /// Check configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Whole report on a single line
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// One user result per line
    Ndjson,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LocusCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            input_format,
            output_format,
            now,
            config,
        } => cmd_analyze(
            &input,
            &output,
            input_format,
            output_format,
            now.as_deref(),
            config.as_deref(),
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Locate {
            input,
            user,
            input_format,
            now,
            config,
        } => cmd_locate(&input, &user, input_format, now.as_deref(), config.as_deref()),

        Commands::Params { config } => cmd_params(config.as_deref()),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    now: Option<&str>,
    config: Option<&Path>,
) -> Result<(), LocusCliError> {
    let records = read_records(input, &input_format)?;
    let analyzer = LocationAnalyzer::with_config(load_config(config)?)?;
    let outcome = analyzer.analyze(&records, reference_now(now)?);

    let output_data = format_output(&outcome, &output_format)?;

    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    outcome_status(&outcome)
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), LocusCliError> {
    let records = read_records(input, &input_format)?;

    let errors: Vec<ValidationErrorDetail> = match EventNormalizer::normalize(&records) {
        Ok(_) => Vec::new(),
        Err(err) => err
            .issues
            .iter()
            .map(|issue| ValidationErrorDetail {
                index: issue.index,
                field: issue.field.clone(),
                error: issue.reason.clone(),
            })
            .collect(),
    };

    let mut invalid_indices: Vec<usize> = errors.iter().map(|e| e.index).collect();
    invalid_indices.dedup();

    let report = ValidationReport {
        total_events: records.len(),
        valid_events: records.len() - invalid_indices.len(),
        invalid_events: invalid_indices.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {}: `{}` {}", err.index, err.field, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(LocusCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_locate(
    input: &Path,
    user: &str,
    input_format: InputFormat,
    now: Option<&str>,
    config: Option<&Path>,
) -> Result<(), LocusCliError> {
    let records = read_records(input, &input_format)?;
    let analyzer = LocationAnalyzer::with_config(load_config(config)?)?;
    let outcome = analyzer.analyze(&records, reference_now(now)?);
    outcome_status(&outcome)?;

    let report = outcome.report().ok_or(LocusCliError::NoEvents)?;
    let prediction = report
        .prediction_for(user)
        .ok_or_else(|| LocusCliError::UnknownUser(user.to_string()))?;

    // The outcome is Ok, so every record normalizes
    let events = EventNormalizer::normalize(&records).map_err(locus::ComputeError::from)?;
    let user_events: Vec<&RawEvent> = events.iter().filter(|e| e.user_id == user).collect();
    let latest_event = user_events.iter().max_by_key(|e| e.timestamp).map(|e| (*e).clone());

    let location = UserLocation {
        user_id: user.to_string(),
        prediction: prediction.clone(),
        prediction_accuracy: prediction_accuracy(user_events.iter().copied(), &prediction.prediction),
        latest_event,
    };

    println!("{}", serde_json::to_string_pretty(&location)?);
    Ok(())
}

fn cmd_params(config: Option<&Path>) -> Result<(), LocusCliError> {
    let config = load_config(config)?;
    let params = algorithm_parameters(&config, config.local_offset()?);
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), LocusCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "locus_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Locus version {}", LOCUS_VERSION),
    });

    // Check config file if provided
    if let Some(config_path) = config {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match AnalysisConfig::from_json(&content) {
                    Ok(parsed) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid (eps {}, min_points {})",
                            parsed.eps, parsed.min_points
                        ),
                    }),
                    Err(e) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    }),
                },
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            });
        }
    } else {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using built-in defaults".to_string(),
        });
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input <file>)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: LOCUS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Locus Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(LocusCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, LocusCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_records(input: &Path, input_format: &InputFormat) -> Result<Vec<Value>, LocusCliError> {
    let input_data = read_input(input)?;
    let records = match input_format {
        InputFormat::Ndjson => EventNormalizer::parse_ndjson(&input_data)?,
        InputFormat::Json => EventNormalizer::parse_array(&input_data)?,
    };
    Ok(records)
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, LocusCliError> {
    match path {
        Some(path) => Ok(AnalysisConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(AnalysisConfig::default()),
    }
}

fn reference_now(now: Option<&str>) -> Result<DateTime<Utc>, LocusCliError> {
    match now {
        Some(text) => parse_timestamp(text)
            .ok_or_else(|| locus::ComputeError::DateParseError(text.to_string()).into()),
        None => Ok(Utc::now()),
    }
}

fn format_output(outcome: &AnalysisOutcome, format: &OutputFormat) -> Result<String, LocusCliError> {
    match format {
        OutputFormat::Json => Ok(outcome.to_json()?),
        OutputFormat::JsonPretty => Ok(outcome.to_json_pretty()?),
        OutputFormat::Ndjson => match outcome.report() {
            Some(report) => {
                let mut lines: Vec<String> = Vec::new();
                for user_result in &report.user_results {
                    lines.push(serde_json::to_string(user_result)?);
                }
                Ok(lines.join("\n"))
            }
            None => Ok(outcome.to_json()?),
        },
    }
}

fn outcome_status(outcome: &AnalysisOutcome) -> Result<(), LocusCliError> {
    match outcome {
        AnalysisOutcome::Ok(_) => Ok(()),
        AnalysisOutcome::Empty => Err(LocusCliError::NoEvents),
        AnalysisOutcome::Validation(err) => Err(LocusCliError::Validation(err.to_string())),
        AnalysisOutcome::Internal(msg) => Err(LocusCliError::Processing(msg.clone())),
    }
}

// Error types

#[derive(Debug)]
enum LocusCliError {
    Io(io::Error),
    Compute(locus::ComputeError),
    Json(serde_json::Error),
    Validation(String),
    Processing(String),
    NoEvents,
    UnknownUser(String),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for LocusCliError {
    fn from(e: io::Error) -> Self {
        LocusCliError::Io(e)
    }
}

impl From<locus::ComputeError> for LocusCliError {
    fn from(e: locus::ComputeError) -> Self {
        LocusCliError::Compute(e)
    }
}

impl From<serde_json::Error> for LocusCliError {
    fn from(e: serde_json::Error) -> Self {
        LocusCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LocusCliError> for CliError {
    fn from(e: LocusCliError) -> Self {
        match e {
            LocusCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LocusCliError::Compute(locus::ComputeError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'locus doctor --config <file>' for details".to_string()),
            },
            LocusCliError::Compute(locus::ComputeError::DateParseError(text)) => CliError {
                code: "DATE_ERROR".to_string(),
                message: format!("Invalid --now value: {}", text),
                hint: Some("Use an ISO-8601 instant such as 2024-03-10T14:00:00Z".to_string()),
            },
            LocusCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input is a JSON array (or NDJSON) of event records".to_string()),
            },
            LocusCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LocusCliError::Validation(msg) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'locus validate' for details".to_string()),
            },
            LocusCliError::Processing(msg) => CliError {
                code: "PROCESSING_ERROR".to_string(),
                message: msg,
                hint: None,
            },
            LocusCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            LocusCliError::UnknownUser(user) => CliError {
                code: "UNKNOWN_USER".to_string(),
                message: format!("No events for user {}", user),
                hint: Some("Check the user_id spelling".to_string()),
            },
            LocusCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            LocusCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    field: String,
    error: String,
}

#[derive(serde::Serialize)]
struct UserLocation {
    user_id: String,
    prediction: locus::types::PublishedPrediction,
    prediction_accuracy: PredictionAccuracy,
    latest_event: Option<RawEvent>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
