//! SQLFORGE CLI
//!
//! Generates type-safe code from SQL for every package in a configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use sqlforge_core::{DebugOptions, VERSION};
use sqlforge_runtime::{
    Config, DEFAULT_CONFIG_FILE, GenerateOutput, Orchestrator, RunError, RunOptions,
};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "SQLFORGE_DEBUG";

#[derive(Parser)]
#[command(name = "sqlforge")]
#[command(about = "SQLFORGE - Generate type-safe code from SQL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code and write it next to the configuration
    Generate(RunArgs),
    /// Compile and generate everything without writing
    Compile(RunArgs),
    /// Report generated files that differ from what is on disk
    Diff(RunArgs),
    /// Print the version
    Version,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,
    /// Maximum number of concurrent tasks
    #[arg(long)]
    jobs: Option<NonZeroUsize>,
    /// Deadline for each backend call, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl RunArgs {
    fn options(&self, debug: DebugOptions, cancel: CancellationToken) -> RunOptions {
        RunOptions::new()
            .with_parallelism(self.jobs)
            .with_timeout(self.timeout_secs.map(Duration::from_secs))
            .with_debug(debug)
            .with_cancel(cancel)
    }

    /// Directory that relative source paths and outputs resolve against
    fn base_dir(&self) -> PathBuf {
        match self.file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run every package; `None` when a task failed and diagnostics were printed
async fn run(args: &RunArgs, debug: DebugOptions) -> Result<Option<GenerateOutput>> {
    let config = Config::load(&args.file)
        .wrap_err_with(|| format!("loading {}", args.file.display()))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let orchestrator = Orchestrator::new(config, args.base_dir(), args.options(debug, cancel));
    let mut sink = std::io::stderr();
    match orchestrator.run(&mut sink).await {
        Ok(output) => Ok(Some(output)),
        Err(RunError::Failed { failures, total }) => {
            eprintln!("{} of {} tasks failed", failures.len(), total);
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn write_files(base: &Path, files: &BTreeMap<String, String>) -> Result<()> {
    for (name, contents) in files {
        let path = base.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&path, contents).wrap_err_with(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), "wrote");
    }
    Ok(())
}

/// Generated files whose on-disk content is missing or different
fn changed_files(base: &Path, files: &BTreeMap<String, String>) -> Vec<String> {
    files
        .iter()
        .filter(|(name, contents)| {
            std::fs::read_to_string(base.join(name)).map_or(true, |disk| disk != **contents)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();
    let cli = Cli::parse();
    let debug = DebugOptions::parse(&std::env::var(DEBUG_ENV).unwrap_or_default());

    match cli.command {
        Commands::Generate(args) => {
            let Some(output) = run(&args, debug).await? else {
                return Ok(ExitCode::FAILURE);
            };
            write_files(&args.base_dir(), &output.files)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Compile(args) => Ok(match run(&args, debug).await? {
            Some(_) => ExitCode::SUCCESS,
            None => ExitCode::FAILURE,
        }),
        Commands::Diff(args) => {
            let Some(output) = run(&args, debug).await? else {
                return Ok(ExitCode::FAILURE);
            };
            let changed = changed_files(&args.base_dir(), &output.files);
            for name in &changed {
                println!("{name}");
            }
            Ok(if changed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Version => {
            println!("{VERSION}");
            Ok(ExitCode::SUCCESS)
        }
    }
}
