//! ctxalign CLI - Command-line interface for context-align
//!
//! Commands:
//! - features: Build a labeled feature matrix from long-format samples
//! - align: Resample two streams onto a shared grid
//! - label: Label timestamps with the block schedule of a session
//! - validate: Validate input records against the column map
//! - sessions: Print the known sessions and their schedules

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use context_align::block::BlockLabeler;
use context_align::encoder::{FeatureEncoder, FeaturePayload};
use context_align::pipeline::{FeaturePipeline, PipelineConfig};
use context_align::schema::{ColumnMap, RecordAdapter};
use context_align::session::{SessionFamily, KNOWN_SESSIONS};
use context_align::types::{BlockLabel, GroupKey, Interval, Sample};
use context_align::{ComputeError, PRODUCER_NAME, VERSION};

/// ctxalign - Temporal alignment and block labeling for neural recordings
#[derive(Parser)]
#[command(name = "ctxalign")]
#[command(version = VERSION)]
#[command(about = "Resample, align and context-label recording streams", long_about = None)]
struct Cli {
    /// Log pipeline stages to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a labeled feature matrix from long-format samples
    Features {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Behaviour stream joined onto the input grid (- only if the input is a file)
        #[arg(long)]
        behaviour: Option<PathBuf>,

        /// Session name used for block labeling
        #[arg(short, long)]
        session: Option<String>,

        #[command(flatten)]
        options: PipelineArgs,

        /// Keep rows labeled mixed
        #[arg(long)]
        keep_mixed: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Resample two streams onto a shared grid
    Align {
        /// First stream (use - for stdin)
        #[arg(long)]
        a: PathBuf,

        /// Second stream (only one of the two streams may be -)
        #[arg(long)]
        b: PathBuf,

        #[command(flatten)]
        options: PipelineArgs,

        /// Group rows by these keys (entity, session, subject, group)
        #[arg(long, value_delimiter = ',')]
        group_by: Vec<String>,

        /// Place both streams on the union of their buckets
        #[arg(long)]
        union: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Label timestamps with the block schedule of a session
    Label {
        /// Timestamps in seconds, one per line or a JSON array (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Session name
        #[arg(short, long)]
        session: String,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate input records against the column map
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        options: PipelineArgs,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the known sessions and their block schedules
    Sessions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by commands that read long-format samples
#[derive(clap::Args)]
struct PipelineArgs {
    /// Pipeline configuration file (JSON); flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bucket width, e.g. 500ms, 1s, 2min
    #[arg(long)]
    interval: Option<String>,

    /// Keep rows past the shared extent of the two streams
    #[arg(long)]
    keep_tail: bool,

    /// Input format
    #[arg(long, default_value = "ndjson")]
    input_format: InputFormat,

    /// Name of the time column
    #[arg(long)]
    time_col: Option<String>,

    /// Name of the entity column
    #[arg(long)]
    entity_col: Option<String>,

    /// Name of the value column
    #[arg(long)]
    value_col: Option<String>,
}

impl PipelineArgs {
    fn config(&self) -> Result<PipelineConfig, CliFailure> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(interval) = &self.interval {
            config.interval = interval.parse::<Interval>()?;
        }
        if self.keep_tail {
            config.drop_tail = false;
        }
        if let Some(name) = &self.time_col {
            config.columns.time = name.clone();
        }
        if let Some(name) = &self.entity_col {
            config.columns.entity = name.clone();
        }
        if let Some(name) = &self.value_col {
            config.columns.value = name.clone();
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// Compact JSON document
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

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

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Features {
            input,
            output,
            behaviour,
            session,
            options,
            keep_mixed,
            output_format,
        } => cmd_features(
            &input,
            &output,
            behaviour.as_deref(),
            session.as_deref(),
            &options,
            keep_mixed,
            output_format,
        ),

        Commands::Align {
            a,
            b,
            options,
            group_by,
            union,
            output_format,
        } => cmd_align(&a, &b, &options, &group_by, union, output_format),

        Commands::Label {
            input,
            session,
            output_format,
        } => cmd_label(&input, &session, output_format),

        Commands::Validate {
            input,
            options,
            json,
        } => cmd_validate(&input, &options, json),

        Commands::Sessions { json } => cmd_sessions(json),
    }
}

/// `-` stands for stdin on input and stdout on output
fn is_dash(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

/// Stdin can feed at most one of two input streams
fn check_single_stdin(first: &Path, second: &Path) -> Result<(), CliFailure> {
    if is_dash(first) && is_dash(second) {
        return Err(CliFailure::StdinTwice);
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String, CliFailure> {
    if is_dash(path) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), CliFailure> {
    if is_dash(path) {
        print!("{data}");
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn read_samples(path: &Path, format: InputFormat, columns: &ColumnMap) -> Result<Vec<Sample>, CliFailure> {
    let data = read_input(path)?;
    let records = match format {
        InputFormat::Ndjson => RecordAdapter::parse_ndjson(&data)?,
        InputFormat::Json => RecordAdapter::parse_array(&data)?,
    };
    if records.is_empty() {
        return Err(CliFailure::NoRecords(path.display().to_string()));
    }
    Ok(RecordAdapter::to_samples(&records, columns)?)
}

fn cmd_features(
    input: &Path,
    output: &Path,
    behaviour: Option<&Path>,
    session: Option<&str>,
    options: &PipelineArgs,
    keep_mixed: bool,
    output_format: OutputFormat,
) -> Result<(), CliFailure> {
    if let Some(path) = behaviour {
        check_single_stdin(input, path)?;
    }
    let mut config = options.config()?;
    if keep_mixed {
        config.drop_mixed = false;
    }

    let samples = read_samples(input, options.input_format, &config.columns)?;
    let pipeline = FeaturePipeline::new(config);
    let run = match behaviour {
        Some(path) => {
            let behaviour = read_samples(path, options.input_format, &pipeline.config().columns)?;
            pipeline.build_joint(&samples, &behaviour, session)?
        }
        None => pipeline.build(&samples, session)?,
    };

    let payload = FeatureEncoder::new().encode(&run)?;
    write_output(output, &format_payload(&payload, output_format)?)
}

fn cmd_align(
    a: &Path,
    b: &Path,
    options: &PipelineArgs,
    group_by: &[String],
    union: bool,
    output_format: OutputFormat,
) -> Result<(), CliFailure> {
    check_single_stdin(a, b)?;
    let mut config = options.config()?;
    if !group_by.is_empty() {
        config.group_keys = group_by
            .iter()
            .map(|key| key.parse::<GroupKey>())
            .collect::<Result<_, _>>()?;
    }

    let stream_a = read_samples(a, options.input_format, &config.columns)?;
    let stream_b = read_samples(b, options.input_format, &config.columns)?;
    let mut aligned = FeaturePipeline::new(config).align(&stream_a, &stream_b)?;
    if union {
        let (a, b) = aligned.reindex_union();
        aligned.a = a;
        aligned.b = b;
    }

    let data = match output_format {
        OutputFormat::Ndjson => {
            let mut lines = Vec::new();
            for (stream, series) in [("a", &aligned.a), ("b", &aligned.b)] {
                for row in &series.rows {
                    let mut line = serde_json::to_value(row)?;
                    line["stream"] = serde_json::Value::from(stream);
                    lines.push(serde_json::to_string(&line)?);
                }
            }
            lines.join("\n") + "\n"
        }
        OutputFormat::Json => serde_json::to_string(&aligned)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&aligned)?,
    };
    print!("{data}");
    Ok(())
}

fn cmd_label(input: &Path, session: &str, output_format: OutputFormat) -> Result<(), CliFailure> {
    let labeler = BlockLabeler::for_session(session)?;
    let data = read_input(input)?;

    let timestamps: Vec<f64> = if data.trim_start().starts_with('[') {
        serde_json::from_str(&data)?
    } else {
        data.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                line.trim().parse::<f64>().map_err(|e| {
                    CliFailure::ParseError(format!("Failed to parse line {}: {}", idx + 1, e))
                })
            })
            .collect::<Result<_, _>>()?
    };

    let labeled: Vec<LabeledTime> = timestamps
        .iter()
        .zip(labeler.label(&timestamps))
        .map(|(time, block)| LabeledTime { time: *time, block })
        .collect();

    let output = match output_format {
        OutputFormat::Ndjson => {
            let mut lines = Vec::with_capacity(labeled.len());
            for row in &labeled {
                lines.push(serde_json::to_string(row)?);
            }
            lines.join("\n") + "\n"
        }
        OutputFormat::Json => serde_json::to_string(&labeled)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&labeled)?,
    };
    print!("{output}");
    Ok(())
}

fn cmd_validate(input: &Path, options: &PipelineArgs, json: bool) -> Result<(), CliFailure> {
    let config = options.config()?;
    let data = read_input(input)?;
    let records = match options.input_format {
        InputFormat::Ndjson => RecordAdapter::parse_ndjson(&data)?,
        InputFormat::Json => RecordAdapter::parse_array(&data)?,
    };

    let results = RecordAdapter::validate_records(&records, &config.columns);

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - results.len(),
        invalid_records: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(CliFailure::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_sessions(json: bool) -> Result<(), CliFailure> {
    let mut sessions = Vec::with_capacity(KNOWN_SESSIONS.len());
    for (index, name) in KNOWN_SESSIONS.iter().enumerate() {
        // day1-epm has no fear-conditioning context
        let family = SessionFamily::classify(name).ok();
        let bins = match family {
            Some(family) => family
                .schedule()
                .bins()
                .into_iter()
                .map(|(start, end, block)| ScheduleBin { start, end, block })
                .collect(),
            None => Vec::new(),
        };
        let constant = family.and_then(|f| match f.schedule() {
            context_align::BlockSchedule::Constant { label } => Some(label),
            context_align::BlockSchedule::Alternating(_) => None,
        });
        sessions.push(SessionInfo {
            index,
            name: name.to_string(),
            family,
            constant,
            bins,
        });
    }

    if json {
        let report = SessionsReport {
            producer: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            sessions,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for session in &sessions {
        let family = session.family.map(|f| f.as_str()).unwrap_or("unlabeled");
        match (&session.constant, session.bins.is_empty()) {
            (Some(label), _) => println!("{:>2}  {:<16} {:<10} {}", session.index, session.name, family, label),
            (None, true) => println!("{:>2}  {:<16} {}", session.index, session.name, family),
            (None, false) => {
                let schedule: Vec<String> = session
                    .bins
                    .iter()
                    .map(|bin| format!("{}-{}s:{}", bin.start, bin.end, bin.block))
                    .collect();
                println!(
                    "{:>2}  {:<16} {:<10} {}",
                    session.index,
                    session.name,
                    family,
                    schedule.join(" ")
                );
            }
        }
    }
    Ok(())
}

fn format_payload(payload: &FeaturePayload, format: OutputFormat) -> Result<String, CliFailure> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::with_capacity(payload.rows.len());
            for row in &payload.rows {
                lines.push(serde_json::to_string(row)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(payload)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(payload)?),
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoRecords(String),
    StdinTwice,
    ValidationFailed(usize),
    ParseError(String),
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<ComputeError> for CliFailure {
    fn from(e: ComputeError) -> Self {
        CliFailure::Compute(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::SchemaError(_) => ("SCHEMA_ERROR", "Run 'ctxalign validate' for details"),
                    ComputeError::DuplicateKeyError { .. } => {
                        ("DUPLICATE_KEY", "Each (time, entity) pair may appear only once")
                    }
                    ComputeError::UnknownSessionError(_) => {
                        ("UNKNOWN_SESSION", "Run 'ctxalign sessions' to list known sessions")
                    }
                    ComputeError::EmptyInputError(_) => {
                        ("EMPTY_INPUT", "Check that the streams overlap and the session covers their times")
                    }
                    ComputeError::InvalidInterval(_) => ("INVALID_INTERVAL", "Use a positive width such as 500ms, 1s or 2min"),
                    ComputeError::ParseError(_) | ComputeError::JsonError(_) => ("PARSE_ERROR", "Check input format"),
                    ComputeError::ConfigError(_) => ("CONFIG_ERROR", "Check the configuration file"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::NoRecords(source) => CliError {
                code: "NO_RECORDS".to_string(),
                message: format!("No records found in {source}"),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            CliFailure::StdinTwice => CliError {
                code: "STDIN_TWICE".to_string(),
                message: "Both streams were set to read from stdin".to_string(),
                hint: Some("Pass at most one stream as -, the other as a file path".to_string()),
            },
            CliFailure::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{count} records failed validation"),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            CliFailure::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// ============================================================================
// Report Types
// ============================================================================

#[derive(serde::Serialize)]
struct LabeledTime {
    time: f64,
    block: BlockLabel,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct SessionsReport {
    producer: String,
    version: String,
    sessions: Vec<SessionInfo>,
}

#[derive(serde::Serialize)]
struct SessionInfo {
    index: usize,
    name: String,
    family: Option<SessionFamily>,
    #[serde(skip_serializing_if = "Option::is_none")]
    constant: Option<BlockLabel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bins: Vec<ScheduleBin>,
}

#[derive(serde::Serialize)]
struct ScheduleBin {
    start: f64,
    end: f64,
    block: BlockLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stdin_stream() {
        let stdin = Path::new("-");
        let file = Path::new("speed.ndjson");

        assert!(check_single_stdin(stdin, file).is_ok());
        assert!(check_single_stdin(file, stdin).is_ok());
        assert!(check_single_stdin(file, file).is_ok());
        assert!(matches!(check_single_stdin(stdin, stdin), Err(CliFailure::StdinTwice)));
    }

    #[test]
    fn test_align_args_parse() {
        let cli = Cli::try_parse_from([
            "ctxalign", "align", "--a", "-", "--b", "b.ndjson", "--interval", "500ms", "--group-by",
            "entity,subject",
        ])
        .unwrap();

        match cli.command {
            Commands::Align { a, b, options, group_by, .. } => {
                assert_eq!(a, PathBuf::from("-"));
                assert_eq!(b, PathBuf::from("b.ndjson"));
                assert_eq!(options.config().unwrap().interval.as_nanos(), 500_000_000);
                assert_eq!(group_by, vec!["entity", "subject"]);
            }
            _ => panic!("expected align command"),
        }
    }
}
