mod aggregate;
mod config;
mod inputs;
mod pattern;
mod wrapper;

use aggregate::{AggregationReport, DuplicatePolicy, IssueKind};
use clap::Parser;
use config::WrapConfig;
use pattern::Preset;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "pose-wrap.toml";

/// Exit status for configuration errors (bad regex, config file, output dir).
const EXIT_CONFIG: u8 = 2;
/// Exit status when at least one session wrapper could not be written.
const EXIT_WRITE_FAILED: u8 = 1;

/// Collect OpenPose one-frame-per-file outputs into per-session wrapper files:
/// one JSON file per session holding every camera recorded for it.
#[derive(Parser, Debug)]
#[command(name = "pose-wrap", version, about)]
pub struct Cli {
    /// OpenPose frame files to collect; quoted glob patterns are expanded
    #[arg(value_name = "INPUT_FILE", required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the wrapper files (default: current directory)
    #[arg(short, long, visible_alias = "outputdir", value_name = "OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Preset filename pattern (default: filename)
    #[arg(short, long, value_enum, value_name = "PRESET")]
    preset: Option<Preset>,

    /// Custom regex with named groups id, camera, width, height, frame; overrides --preset
    #[arg(short, long, visible_alias = "regexp", value_name = "REGEX")]
    regex: Option<String>,

    /// Config file path (default: pose-wrap.toml, if present)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// How to handle two files for the same frame (default: reject)
    #[arg(long, value_enum, value_name = "POLICY")]
    duplicates: Option<DuplicatePolicy>,

    /// Sort input files before processing
    #[arg(long)]
    sort: bool,

    /// Keep keypoint arrays fully indented
    #[arg(long)]
    no_compact: bool,

    /// Report per-file and per-session progress
    #[arg(short, long)]
    verbose: bool,

    /// Only report warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Apply command line overrides on top of the loaded config.
///
/// `--preset` on the command line discards a regex from the config file;
/// `--regex` beats any preset.
fn apply_cli(config: &mut WrapConfig, cli: &Cli) {
    if let Some(dir) = &cli.output {
        config.output.dir = dir.clone();
    }
    if let Some(preset) = cli.preset {
        config.pattern.preset = preset;
        config.pattern.regex = None;
    }
    if let Some(regex) = &cli.regex {
        config.pattern.regex = Some(regex.clone());
    }
    if let Some(duplicates) = cli.duplicates {
        config.merge.duplicates = duplicates;
    }
    if cli.sort {
        config.merge.sort_inputs = true;
    }
    if cli.no_compact {
        config.output.compact_keypoints = false;
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

fn log_summary(report: &AggregationReport) {
    for issue in &report.skipped {
        tracing::warn!(file = %issue.path.display(), kind = %issue.kind, "skipped: {}", issue.detail);
    }
    for issue in &report.warnings {
        tracing::warn!(file = %issue.path.display(), "{}", issue.detail);
    }

    tracing::info!(
        processed = report.files_seen,
        merged = report.files_merged,
        skipped = report.skipped.len(),
        name_errors = report.skipped_of(IssueKind::NameParse),
        content_errors = report.skipped_of(IssueKind::ContentParse),
        consistency_errors = report.skipped_of(IssueKind::Consistency),
        io_errors = report.skipped_of(IssueKind::Io),
        written = report.written.len(),
        "wrapping complete"
    );

    tracing::debug!(sessions = ?report.written_sessions(), "wrapper sessions");
    for written in &report.written {
        tracing::debug!(
            session = %written.session_id,
            file = %written.path.display(),
            cameras = written.cameras,
            frames = written.frames,
            "session written"
        );
    }

    if report.written.is_empty() && report.failed.is_empty() {
        tracing::warn!(
            processed = report.files_seen,
            "no wrapper files were written: none of the inputs could be used"
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    tracing::debug!(?cli, "parsed CLI arguments");

    let loaded = match &cli.config {
        Some(path) => config::load(path, true),
        None => config::load(Path::new(DEFAULT_CONFIG), false),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    apply_cli(&mut config, &cli);

    let pattern = match config.filename_pattern() {
        Ok(pattern) => pattern,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let options = config.wrap_options();
    let inputs = inputs::expand_inputs(&cli.inputs, config.merge.sort_inputs);

    tracing::info!(
        files = inputs.len(),
        pattern = pattern.preset().map_or("custom", Preset::name),
        output = %options.output_dir.display(),
        "wrapping OpenPose frame files"
    );

    let report = match aggregate::aggregate(&inputs, &pattern, &options) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    log_summary(&report);

    if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        for failure in &report.failed {
            tracing::error!("{failure}");
        }
        ExitCode::from(EXIT_WRITE_FAILED)
    }
}
