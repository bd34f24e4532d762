use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use st_core::NullNotifier;
use tracing_subscriber::EnvFilter;

use st_cli::commands::{asset, history, open_database, open_engine, run, schedule, settings, status};
use st_cli::{Cli, Commands, Config, ScheduleAction};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support; logs go to stderr so
    // stdout stays machine-readable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command {
        Commands::Status { json } => {
            let engine = open_engine(&config, Arc::new(NullNotifier))?;
            status::run(&mut out, &engine, *json)?;
        }
        Commands::Schedule(action) => {
            let mut engine = open_engine(&config, Arc::new(NullNotifier))?;
            match action {
                ScheduleAction::List { json } => schedule::list(&mut out, &engine, *json)?,
                ScheduleAction::Add(args) => schedule::add(&mut out, &mut engine, args)?,
                ScheduleAction::Import { file } => schedule::import(&mut out, &mut engine, file)?,
                ScheduleAction::Remove { positions } => {
                    schedule::remove(&mut out, &mut engine, positions)?;
                }
            }
        }
        Commands::History(action) => {
            let mut engine = open_engine(&config, Arc::new(NullNotifier))?;
            history::run(&mut out, &mut engine, action, config.history_limit)?;
        }
        Commands::Settings(action) => {
            let mut engine = open_engine(&config, Arc::new(NullNotifier))?;
            settings::run(&mut out, &mut engine, action)?;
        }
        Commands::Asset(action) => {
            let db = open_database(&config)?;
            asset::run(&mut out, &db, action)?;
        }
        Commands::Run => {
            drop(out);
            run::run(&config)?;
            return Ok(());
        }
    }
    out.flush()?;

    Ok(())
}
