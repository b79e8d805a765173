//! archsight CLI binary entry point.
//!
//! Runs serialized pipelines over class dumps produced by a bytecode reader.
//! All results are JSON on stdout; diagnostics go to stderr.
//!
//! ```bash
//! # Build a model
//! archsight run --classes classes.json --pipeline pipeline.json > model.json
//!
//! # Validate a pipeline without running it
//! archsight check pipeline.json
//!
//! # Compare two runs
//! archsight diff old-model.json model.json
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

use archsight::action::Action;
use archsight::config::{ConfigOverrides, ResolvedConfig};
use archsight::context::Context;
use archsight::element::ClassDecl;
use archsight::error::{ArchError, Result};
use archsight::model::SystemModel;

/// Architecture models from compiled class files.
#[derive(Parser)]
#[command(name = "archsight")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level for diagnostics on stderr (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Emit diagnostics as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline over parsed classes and print the system model.
    Run(RunArgs),

    /// Validate a pipeline: patterns compile and every relation names a
    /// registered entity type.
    Check {
        /// Pipeline file (JSON action tree)
        pipeline: PathBuf,
    },

    /// Compare two saved system models.
    Diff {
        /// Earlier model
        old: PathBuf,
        /// Later model
        new: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Parsed classes (JSON array)
    #[arg(long)]
    classes: PathBuf,

    /// Pipeline file (JSON action tree)
    #[arg(long)]
    pipeline: PathBuf,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print debug taps
    #[arg(long)]
    debug: bool,

    /// Write per-step measurements to this file
    #[arg(long)]
    measurements: Option<PathBuf>,

    /// Allow an element to be rebound to a different entity type
    #[arg(long)]
    lenient: bool,

    /// Cap on stored traces per element
    #[arg(long)]
    max_traces: Option<usize>,

    /// Write the model here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level, cli.log_json);

    match execute(&cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.error_code();
            let response = serde_json::json!({
                "status": "error",
                "code": code.code(),
                "message": err.to_string(),
            });
            let mut stdout = io::stdout();
            let _ = writeln!(stdout, "{}", response);
            let _ = stdout.flush();
            ExitCode::from(code.code())
        }
    }
}

/// Initialize tracing subscriber. Debug taps are always let through; the
/// pipeline only emits them when debugging is enabled.
fn init_tracing(level: LogLevel, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},archsight::debug=info", level.as_str())));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn execute(command: &Commands) -> Result<()> {
    match command {
        Commands::Run(args) => execute_run(args),
        Commands::Check { pipeline } => {
            let action: Action = serde_json::from_str(&read(pipeline)?)?;
            action.validate()?;
            println!("{}", serde_json::json!({ "status": "ok", "pipeline": action.id() }));
            Ok(())
        }
        Commands::Diff { old, new } => {
            let old = SystemModel::from_json(&read(old)?)?;
            let new = SystemModel::from_json(&read(new)?)?;
            println!("{}", serde_json::to_string_pretty(&old.diff(&new))?);
            Ok(())
        }
    }
}

fn execute_run(args: &RunArgs) -> Result<()> {
    let file_body = args.config.as_deref().map(read).transpose()?;
    let overrides = ConfigOverrides {
        debug: args.debug.then_some(true),
        profile: args.measurements.is_some().then_some(true),
        strict_entities: args.lenient.then_some(false),
        max_traces_per_element: args.max_traces,
    };
    let resolved = ResolvedConfig::resolve(
        file_body.as_deref(),
        |key| std::env::var(key).ok(),
        &overrides,
    )?;
    tracing::debug!(
        "config: debug={} ({:?}), profile={} ({:?}), strict={} ({:?})",
        resolved.debug.value,
        resolved.debug.source,
        resolved.profile.value,
        resolved.profile.source,
        resolved.strict_entities.value,
        resolved.strict_entities.source,
    );

    let classes: Vec<ClassDecl> = serde_json::from_str(&read(&args.classes)?)?;
    let pipeline: Action = serde_json::from_str(&read(&args.pipeline)?)?;
    tracing::info!("running {} over {} classes", pipeline.id(), classes.len());

    let mut ctx = Context::new(classes, resolved.into_config());
    ctx.execute(&pipeline)?;

    if let Some(path) = &args.measurements {
        write(path, &serde_json::to_string_pretty(ctx.measurements())?)?;
    }

    let model = ctx.into_model();
    let body = model.to_json()?;
    match &args.output {
        Some(path) => write(path, &body),
        None => {
            println!("{}", body);
            Ok(())
        }
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ArchError::io(path.display(), e))
}

fn write(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body).map_err(|e| ArchError::io(path.display(), e))
}
