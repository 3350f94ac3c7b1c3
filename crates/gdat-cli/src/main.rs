use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gdat_core::{
    ParameterRegistry, PipelineConfig, Preamble, Report, StreamGenerator, build_report,
    decode_file,
};
use glob::glob;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("GDAT_BUILD_COMMIT"),
    ", built ",
    env!("GDAT_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "gdat")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Offline decoder for .gdat telemetry logger captures.",
    long_about = None,
    after_help = "Examples:\n  gdat decode run.gdat --registry parameters.json -o report.json\n  gdat parse run.gdat --registry parameters.json --stdout --pretty\n  gdat generate --registry parameters.json --bytes 65536 -o synthetic.gdat"
)]
struct Cli {
    /// Log pipeline progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a capture and write a versioned JSON report.
    #[command(alias = "parse")]
    #[command(
        after_help = "Examples:\n  gdat decode run.gdat --registry parameters.json -o report.json\n  gdat decode 'logs/*.gdat' --registry parameters.json --stdout --series"
    )]
    Decode(DecodeArgs),
    /// Write a synthetic capture for the parameters of a registry.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Path to a .gdat file (a glob matching exactly one file is accepted)
    input: PathBuf,

    /// Parameter registry (JSON)
    #[arg(long)]
    registry: PathBuf,

    /// Output report path (JSON)
    #[arg(short = 'o', long, required_unless_present = "stdout")]
    report: Option<PathBuf>,

    /// Write JSON report to stdout
    #[arg(long, conflicts_with = "report")]
    stdout: bool,

    /// Pretty-print JSON output
    #[arg(long, conflicts_with = "compact")]
    pretty: bool,

    /// Compact JSON output (default)
    #[arg(long)]
    compact: bool,

    /// Include raw, resampled and quantized series per channel
    #[arg(long)]
    series: bool,

    /// Pipeline config (JSON); missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Decode shards processed in parallel
    #[arg(long)]
    shards: Option<usize>,

    /// Relative round-trip tolerance of the quantizer
    #[arg(long)]
    tolerance: Option<f64>,

    /// Suppress non-error output
    #[arg(long)]
    quiet: bool,

    /// Exit with a non-zero code on any decode error or quantization failure
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Parameter registry (JSON)
    #[arg(long)]
    registry: PathBuf,

    /// Minimum number of packet bytes to write
    #[arg(long, default_value_t = 4096)]
    bytes: usize,

    /// Output capture path
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// RNG seed for a reproducible packet stream
    #[arg(long)]
    seed: Option<u64>,

    /// Largest simulated clock advance between packets
    #[arg(long, default_value_t = 20)]
    max_step_ms: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = matches!(&cli.command, Commands::Decode(args) if args.quiet);
    init_logging(cli.verbose, quiet);

    let result = match cli.command {
        Commands::Decode(args) => cmd_decode(args),
        Commands::Generate(args) => cmd_generate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{:#}", err), None)
    }
}

fn cmd_decode(args: DecodeArgs) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&args.input)?;
    validate_input_file(&resolved_input)?;
    ensure_distinct_output(&resolved_input, args.report.as_deref())?;

    let registry = load_registry(&args.registry)?;
    let config = pipeline_config(&args)?;
    debug!(?config, "pipeline config");

    let capture = decode_file(&resolved_input, &registry, &config)
        .with_context(|| format!("Failed to decode capture: {}", resolved_input.display()))?;
    let rep = build_report(
        &resolved_input.display().to_string(),
        &capture,
        args.series,
    );
    let json = serialize_report(&rep, args.pretty && !args.compact)?;

    match args.report.as_ref() {
        None => print!("{}", json),
        Some(report) => {
            if let Some(parent) = report.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create output directory: {}", parent.display())
                    })?;
                }
            }
            fs::write(report, json)
                .with_context(|| format!("Failed to write report: {}", report.display()))?;
            if !args.quiet {
                eprintln!("OK: report written -> {}", report.display());
            }
        }
    }

    if !args.quiet {
        print_problems(&rep);
    }
    if args.strict && capture.has_problems() {
        return Err(CliError::new(
            format!(
                "{} decode errors, {} quantization failures",
                rep.decode.decode_errors,
                rep.quantization_failures.len()
            ),
            Some("inspect decode.errors and quantization_failures in the report".to_string()),
        ));
    }
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> Result<(), CliError> {
    let registry = load_registry(&args.registry)?;
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut generator = StreamGenerator::new(&registry, rng).with_max_step_ms(args.max_step_ms);
    let bytes = generator.generate_file(&Preamble::now_utc(), args.bytes);

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(&args.output, &bytes)
        .with_context(|| format!("Failed to write capture: {}", args.output.display()))?;
    eprintln!(
        "OK: {} bytes written -> {}",
        bytes.len(),
        args.output.display()
    );
    Ok(())
}

fn load_registry(path: &Path) -> Result<ParameterRegistry, CliError> {
    ParameterRegistry::load(path).map_err(|err| {
        CliError::new(
            format!("failed to load registry {}: {}", path.display(), err),
            Some(
                "expected JSON like {\"parameters\": [{\"id\": 1, \"name\": \"rpm\", \"unit\": \"1/min\", \"format\": \"u16\"}]}"
                    .to_string(),
            ),
        )
    })
}

fn pipeline_config(args: &DecodeArgs) -> Result<PipelineConfig, CliError> {
    let settings_hint = || Some("check the pipeline config file and the --shards/--tolerance flags".to_string());
    let mut config = match args.config.as_ref() {
        Some(path) => PipelineConfig::load(path).map_err(|err| {
            CliError::new(
                format!("failed to load pipeline config {}: {}", path.display(), err),
                settings_hint(),
            )
        })?,
        None => PipelineConfig::default(),
    };
    if let Some(shards) = args.shards {
        config.shards = shards;
    }
    if let Some(tolerance) = args.tolerance {
        config.quantize.tolerance = tolerance;
    }
    config
        .validate()
        .map_err(|err| CliError::new(format!("invalid pipeline settings: {}", err), settings_hint()))?;
    Ok(config)
}

fn ensure_distinct_output(input: &Path, report: Option<&Path>) -> Result<(), CliError> {
    let Some(report_path) = report else {
        return Ok(());
    };
    let input_abs = fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve input path: {}", input.display()))?;
    let report_dir = match report_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::canonicalize(parent),
        _ => fs::canonicalize("."),
    };
    // A missing output directory cannot contain the input.
    let Ok(report_dir) = report_dir else {
        return Ok(());
    };
    let file_name = report_path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid report path: {}", report_path.display()))?;
    if report_dir.join(file_name) == input_abs {
        return Err(CliError::new(
            format!(
                "report path must differ from input: {}",
                report_path.display()
            ),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn serialize_report(rep: &Report, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(rep)
    } else {
        serde_json::to_string(rep)
    };
    Ok(json.context("JSON serialization failed")?)
}

fn print_problems(rep: &Report) {
    let errors = &rep.decode.errors;
    if errors.total() > 0 {
        eprintln!(
            "Decode errors: {} of {} packets (framing {}, too short {}, checksum {}, unknown id {}, length {})",
            rep.decode.decode_errors,
            rep.decode.packets_seen,
            errors.framing_incomplete,
            errors.too_short,
            errors.checksum_mismatch,
            errors.unknown_channel,
            errors.payload_length_mismatch
        );
    }
    for failure in &rep.quantization_failures {
        eprintln!(
            "  channel {} not quantized (min {}, max {}): {}",
            failure.id, failure.v_min, failure.v_max, failure.reason
        );
    }
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .gdat capture file".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .gdat capture file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "gdat" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .gdat file".to_string()),
        ));
    }
    Ok(())
}

/// Expand `input` when it is a glob; the pattern must select one capture.
fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !pattern.contains(['*', '?', '[']) {
        return Ok(input.to_path_buf());
    }

    let bad_pattern = |detail: String| {
        CliError::new(format!("invalid input pattern '{}'", pattern), Some(detail))
    };
    let mut captures = Vec::new();
    for entry in glob(&pattern).map_err(|err| bad_pattern(err.msg.to_string()))? {
        let path = entry.map_err(|err| bad_pattern(err.to_string()))?;
        if path.is_file() {
            captures.push(path);
        }
    }

    match captures.len() {
        0 => Err(CliError::new(
            format!("pattern '{}' selects no capture", pattern),
            Some("check the path or quote the pattern".to_string()),
        )),
        1 => Ok(captures.remove(0)),
        n => Err(CliError::new(
            format!(
                "pattern '{}' selects {} captures, starting with {}",
                pattern,
                n,
                captures[0].display()
            ),
            Some("decode one capture per run".to_string()),
        )),
    }
}
