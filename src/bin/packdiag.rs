//! packdiag CLI - Command-line interface for packdiag
//!
//! Commands:
//! - analyze: Run the full diagnosis on a pack log
//! - validate: Load and validate a pack log without analysing it
//! - doctor: Check configuration and environment
//! - config: Print the default configuration as TOML

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use packdiag::encoder::ReportEncoder;
use packdiag::types::{AnalysisResult, Ranking};
use packdiag::{AnalysisConfig, DiagnosticError, PackAnalyzer, PACKDIAG_VERSION, PRODUCER_NAME};

/// packdiag - Hybrid battery pack diagnostic analytics
#[derive(Parser)]
#[command(name = "packdiag")]
#[command(version = PACKDIAG_VERSION)]
#[command(about = "Rank battery pack modules by imbalance and dynamic resistance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full diagnosis on a pack log
    Analyze {
        /// Input file path: delimited text, or .xlsx workbook (use - for stdin text)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Analysis configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        format: OutputFormat,

        /// Leave the per-sample series out of JSON output
        #[arg(long)]
        no_series: bool,
    },

    /// Load and validate a pack log without analysing it
    Validate {
        /// Input file path: delimited text, or .xlsx workbook (use - for stdin text)
        #[arg(short, long)]
        input: PathBuf,

        /// Analysis configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration and environment
    Doctor {
        /// Configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as TOML
    Config,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
    /// Human-readable summary
    Text,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PackCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            config,
            format,
            no_series,
        } => cmd_analyze(&input, &output, config.as_deref(), format, no_series),

        Commands::Validate {
            input,
            config,
            json,
        } => cmd_validate(&input, config.as_deref(), json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Config => {
            print!("{}", AnalysisConfig::default().to_toml()?);
            Ok(())
        }
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    format: OutputFormat,
    no_series: bool,
) -> Result<(), PackCliError> {
    let analyzer = build_analyzer(config)?;
    let result = if is_stdin(input) {
        analyzer.analyze_reader(read_stdin()?.as_slice())?
    } else {
        analyzer.analyze_file(input)?
    };

    let mut encoder = ReportEncoder::new();
    if no_series {
        encoder = encoder.without_series();
    }
    let source = source_name(input);

    let output_data = match format {
        OutputFormat::Json => serde_json::to_string(&encoder.encode(&result, &source))? + "\n",
        OutputFormat::JsonPretty => encoder.encode_to_json(&result, &source)? + "\n",
        OutputFormat::Text => render_text(&result, &source),
    };

    if is_stdin(output) {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, config: Option<&Path>, json: bool) -> Result<(), PackCliError> {
    let analyzer = build_analyzer(config)?;
    let loaded = if is_stdin(input) {
        analyzer.load_reader(read_stdin()?.as_slice())
    } else {
        analyzer.load_file(input)
    };

    let report = match loaded {
        Ok(dataset) => ValidationReport {
            source: source_name(input),
            valid: true,
            sample_count: Some(dataset.sample_count()),
            module_count: Some(dataset.module_count()),
            current_channel: Some(dataset.current().name.clone()),
            modules: dataset.modules().iter().map(|m| m.name.clone()).collect(),
            error: None,
        },
        Err(DiagnosticError::Io(e)) => return Err(PackCliError::Io(e)),
        Err(e) => ValidationReport {
            source: source_name(input),
            valid: false,
            sample_count: None,
            module_count: None,
            current_channel: None,
            modules: Vec::new(),
            error: Some(e.to_string()),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Source:          {}", report.source);
        if let Some(error) = &report.error {
            println!("Status:          INVALID");
            println!("Error:           {}", error);
        } else {
            println!("Status:          OK");
            println!("Samples:         {}", report.sample_count.unwrap_or(0));
            println!("Modules:         {}", report.module_count.unwrap_or(0));
            println!(
                "Current channel: {}",
                report.current_channel.as_deref().unwrap_or("-")
            );
        }
    }

    if report.valid {
        Ok(())
    } else {
        Err(PackCliError::ValidationFailed)
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), PackCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "packdiag_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("packdiag version {}", PACKDIAG_VERSION),
    });

    match config {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist, defaults would be used".to_string(),
        }),
        Some(path) => match AnalysisConfig::load_from_file(path) {
            Ok(cfg) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid ({} modules from column {}, current aliases {:?}, critical {:.2}V / alert {:.2}V)",
                    cfg.loader.module_count,
                    cfg.loader.module_offset,
                    cfg.loader.current.aliases,
                    cfg.thresholds.critical_delta_v,
                    cfg.thresholds.alert_delta_v
                ),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config given, using defaults".to_string(),
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass a log with --input <file>)".to_string(),
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
        version: PACKDIAG_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("packdiag Doctor Report");
        println!("======================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PackCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn build_analyzer(config: Option<&Path>) -> Result<PackAnalyzer, PackCliError> {
    let analyzer = match config {
        Some(path) => PackAnalyzer::from_config_file(path)?,
        None => PackAnalyzer::new(),
    };
    Ok(analyzer)
}

fn is_stdin(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_stdin() -> Result<Vec<u8>, PackCliError> {
    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn source_name(input: &Path) -> String {
    if is_stdin(input) {
        return "stdin".to_string();
    }
    input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}

fn render_text(result: &AnalysisResult, source: &str) -> String {
    let mut out = String::new();
    out.push_str("Pack Diagnostic Report\n");
    out.push_str("======================\n");
    out.push_str(&format!("Source:          {}\n", source));
    out.push_str(&format!(
        "Samples:         {} ({} modules, current: {})\n",
        result.sample_count, result.module_count, result.current_channel
    ));
    out.push_str(&format!("Max delta V:     {:.3} V\n", result.max_delta_v));
    out.push_str(&format!("Mean delta V:    {:.3} V\n", result.mean_delta_v));

    out.push_str("\nDiagnosis:\n");
    for finding in result.diagnosis.findings() {
        out.push_str(&format!(
            "  [{}] {}\n",
            finding.severity.as_str().to_uppercase(),
            finding.message
        ));
    }

    out.push_str("\nImbalance ranking (cumulative |V - pack mean|):\n");
    push_ranking(&mut out, &result.imbalance_ranking, "V");

    out.push_str(&format!(
        "\nResistance ranking ({} of {} current transitions used):\n",
        result.valid_current_transitions, result.total_current_transitions
    ));
    push_ranking(&mut out, &result.resistance_ranking, "ohm");

    out
}

fn push_ranking(out: &mut String, ranking: &Ranking, unit: &str) {
    for (i, entry) in ranking.entries().iter().enumerate() {
        out.push_str(&format!(
            "  {:>3}. {:<20} {:>12.4} {}\n",
            i + 1,
            entry.module,
            entry.value,
            unit
        ));
    }
}

// Error types

#[derive(Debug)]
enum PackCliError {
    Io(io::Error),
    Analysis(DiagnosticError),
    Json(serde_json::Error),
    ValidationFailed,
    DoctorFailed,
}

impl From<io::Error> for PackCliError {
    fn from(e: io::Error) -> Self {
        PackCliError::Io(e)
    }
}

impl From<DiagnosticError> for PackCliError {
    fn from(e: DiagnosticError) -> Self {
        PackCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for PackCliError {
    fn from(e: serde_json::Error) -> Self {
        PackCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PackCliError> for CliError {
    fn from(e: PackCliError) -> Self {
        match e {
            PackCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PackCliError::Analysis(e) => {
                let hint = match &e {
                    DiagnosticError::DataFormat(_) => {
                        "Check the log's column layout, current column header and numeric cells"
                    }
                    DiagnosticError::DegenerateInput(_) => {
                        "The log needs at least 2 samples and 1 module column"
                    }
                    DiagnosticError::Config(_) => "Run 'packdiag config' for a valid template",
                    DiagnosticError::Io(_) => "Check file paths and permissions",
                    DiagnosticError::JsonError(_) => "Report encoding failed",
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PackCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PackCliError::ValidationFailed => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: "Pack log failed validation".to_string(),
                hint: Some("Fix the reported error and retry".to_string()),
            },
            PackCliError::DoctorFailed => CliError {
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
    source: String,
    valid: bool,
    sample_count: Option<usize>,
    module_count: Option<usize>,
    current_channel: Option<String>,
    modules: Vec<String>,
    error: Option<String>,
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
