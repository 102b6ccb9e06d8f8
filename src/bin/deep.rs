//! `deep` command line diff tool.
//!
//! Loads two files, diffs them, and prints the result.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Log level filter (default: warn)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! Logs go to stderr; the diff view goes to stdout.
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | No differences |
//! | 1 | Differences found |
//! | 2 | Error |
//!
//! ## Usage
//!
//! ```bash
//! cargo run --features cli --bin deep -- old.json new.yaml --ignore-order --view pretty
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deepdiff_kernel::{load_path, DiffConfig, DiffEngine, Error, TypeRegistry};

/// Output view.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum View {
    /// JSON text view.
    Text,
    /// One sentence per difference.
    Pretty,
}

/// Deep difference of two data files.
#[derive(Debug, Parser)]
#[command(name = "deep", version, about)]
struct Args {
    /// Old file (.json, .yaml, .yml, .toml, .csv, .ddpayload).
    t1: PathBuf,
    /// New file.
    t2: PathBuf,

    /// Compare sequences without regard to order.
    #[arg(long)]
    ignore_order: bool,
    /// Report multiplicity changes (with --ignore-order).
    #[arg(long)]
    report_repetition: bool,
    /// Compare numbers rounded to this many digits after the decimal point.
    #[arg(long)]
    significant_digits: Option<u32>,
    /// Compare strings case-insensitively.
    #[arg(long)]
    ignore_string_case: bool,
    /// Treat int and float as one type.
    #[arg(long)]
    ignore_numeric_type_changes: bool,
    /// Text view verbosity (0, 1 or 2).
    #[arg(long)]
    verbose_level: Option<u8>,
    /// Path to exclude, e.g. "root['meta']". Repeatable.
    #[arg(long = "exclude-paths")]
    exclude_paths: Vec<String>,
    /// Regular expression of paths to exclude. Repeatable.
    #[arg(long = "exclude-regex-paths")]
    exclude_regex_paths: Vec<String>,
    /// Recursion cutoff.
    #[arg(long)]
    max_depth: Option<usize>,
    /// TOML file with a full configuration; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output view.
    #[arg(long, value_enum, default_value = "text")]
    view: View,
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn build_config(args: &Args) -> Result<DiffConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
        None => DiffConfig::default(),
    };
    config.ignore_order |= args.ignore_order;
    config.report_repetition |= args.report_repetition;
    config.ignore_string_case |= args.ignore_string_case;
    config.ignore_numeric_type_changes |= args.ignore_numeric_type_changes;
    if args.significant_digits.is_some() {
        config.significant_digits = args.significant_digits;
    }
    if let Some(level) = args.verbose_level {
        config.verbose_level = level;
    }
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }
    config.exclude_paths.extend(args.exclude_paths.iter().cloned());
    config.exclude_regex_paths.extend(args.exclude_regex_paths.iter().cloned());
    Ok(config)
}

fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let config = build_config(args)?;
    let old = load_path(&args.t1).map_err(Error::from)?;
    let new = load_path(&args.t2).map_err(Error::from)?;

    let engine = DiffEngine::new(config).map_err(Error::from)?;
    let tree = engine.diff(&old, &new).map_err(Error::from)?;
    tracing::info!(
        entries = tree.len(),
        config_hash = %engine.config().params_hash(),
        "Diff complete"
    );

    match args.view {
        View::Text => {
            let json = tree.text().to_json_value(&TypeRegistry::new()).map_err(Error::from)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        View::Pretty => {
            let pretty = tree.pretty();
            if !pretty.is_empty() {
                println!("{pretty}");
            }
        }
    }
    Ok(!tree.is_empty())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "deep failed");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
