//! # tap-ringover
//!
//! Singer tap extracting calls from the Ringover API. In discover mode it prints
//! the catalog; otherwise it writes SCHEMA, RECORD and STATE messages to stdout.
//! Logs go to stderr and, when `log_dir` is configured, to a log file.

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueHint};
use lib_common::configs::load_json_file;
use lib_common::loggers::setup_logging;
use lib_common::{discover, run_sync, Catalog, MessageWriter, State, TapConfig};
use serde_json::Value;

const APP_NAME: &str = "tap-ringover";

/// CLI arguments for tap-ringover.
#[derive(Parser, Debug)]
#[clap(
    name = "tap-ringover",
    version,
    author = "ckir",
    about = "Singer tap for Ringover calls.",
    long_about = "Extracts calls from the Ringover public API as Singer messages. \
                  Run with --discover to print the catalog, or with an optional state \
                  and catalog to sync incrementally."
)]
struct Cli {
    /// Tap configuration file.
    #[clap(long, short = 'c', value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// State file from a previous run.
    #[clap(long, short = 's', value_hint = ValueHint::FilePath)]
    state: Option<PathBuf>,

    /// Catalog selecting the streams to sync. Defaults to the discovered catalog.
    #[clap(long, value_hint = ValueHint::FilePath)]
    catalog: Option<PathBuf>,

    /// Print the catalog and exit.
    #[clap(long, short = 'd', action = ArgAction::SetTrue)]
    discover: bool,

    /// Log level; overrides `log_level` from the config file.
    #[clap(long, env = "TAP_RINGOVER_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    if let Err(e) = run(args).await {
        log::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let config = TapConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    if let Some(path) = setup_logging(APP_NAME, config.log_dir.as_deref(), &level)? {
        log::info!("Logging to {}", path.display());
    }
    log::debug!("{}", config);

    if args.discover {
        log::info!("Running discovery");
        let catalog = discover()?;
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    let state = match &args.state {
        Some(path) => State::from_value(
            load_json_file::<Value>(path).with_context(|| format!("Failed to load state {}", path.display()))?,
        ),
        None => State::new(),
    };
    let catalog: Catalog = match &args.catalog {
        Some(path) => load_json_file(path).with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => discover()?,
    };

    let mut writer = MessageWriter::stdout();
    run_sync(&config, state, &catalog, &mut writer).await?;
    log::info!("Sync completed");
    Ok(())
}
