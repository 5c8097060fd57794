//! Snaplake CLI: run, check and recent commands.
//!
//! Commands:
//! - `run` - execute every configured task once and print the run summary
//! - `check` - validate the config and the archive root, print the resolved config
//! - `recent` - show what the dedup window currently holds for one task
//!
//! Without `--config` the built-in defaults are used. A `.env` file in the
//! working directory is loaded first, so API keys can live there. Set
//! `LOG_OUTPUT=both` to also keep a daily log file under `LOG_DIR`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use snaplake_core::archive::ObjectStore;
use snaplake_core::domain::SystemClock;
use snaplake_runner::{
    build_store, init_logging, inspect_recent, LogConfig, LogLevel, Pipeline, PipelineConfig,
    StoreBackend,
};

#[derive(Parser)]
#[command(
    name = "snaplake",
    version,
    about = "Snaplake: deduplicating market snapshot collector"
)]
struct Cli {
    /// Log level (overrides LOG_LEVEL).
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured task once.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also write the run summary as JSON to this path.
        #[arg(long)]
        summary_json: Option<PathBuf>,

        /// Run only the named tasks (repeatable).
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },
    /// Validate the config and the archive root.
    Check {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show the recent-fingerprint window for one task.
    Recent {
        /// Task name as configured.
        #[arg(long)]
        task: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    if let Some(level) = cli.log_level {
        log_config = log_config.with_level(level);
    }
    // flushes the file log on exit
    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Commands::Run {
            config,
            summary_json,
            only,
        } => run_cmd(config.as_deref(), summary_json.as_deref(), &only),
        Commands::Check { config } => check_cmd(config.as_deref()),
        Commands::Recent { task, config } => recent_cmd(config.as_deref(), &task),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
}

fn run_cmd(config_path: Option<&Path>, summary_json: Option<&Path>, only: &[String]) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = Pipeline::from_config(&config, Arc::new(SystemClock), only)?;
    info!(tasks = ?pipeline.task_names(), "starting run");

    let summary = pipeline.run();
    print!("{}", summary.render_table());

    if let Some(path) = summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }

    if let Err(e) = summary.check(config.run.failure_policy) {
        bail!("run failed: {e}");
    }
    Ok(())
}

fn check_cmd(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;
    let store = build_store(&config)?;

    print!("{}", config.redacted().to_toml()?);
    println!();
    println!("archive: {}", store.describe());
    println!("config ok: {} tasks", config.tasks.len());
    Ok(())
}

fn recent_cmd(config_path: Option<&Path>, task: &str) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;
    if config.archive.backend == StoreBackend::Memory {
        eprintln!("warning: memory backend holds nothing between processes");
    }
    let store = build_store(&config)?;
    let report = inspect_recent(&config, store.as_ref(), task, &SystemClock)?;

    println!("task:            {}", report.task);
    println!("prefix:          {}", report.prefix);
    println!("objects scanned: {}", report.recent.scanned);
    println!("objects skipped: {}", report.recent.skipped);
    println!("fingerprints:    {}", report.recent.len());
    if report.recent.listing_failed {
        println!("listing failed:  every fetched record would be treated as new");
    }
    Ok(())
}
