//! CLI subcommand implementations.

pub mod asset;
pub mod history;
pub mod run;
pub mod schedule;
pub mod settings;
pub mod status;
pub mod util;

use std::sync::Arc;

use anyhow::{Context, Result};
use st_core::{Engine, Notifier, SystemClock};
use st_db::Database;

use crate::Config;

/// Opens the configured database, ensuring the parent directory exists.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Opens the database and loads the engine on the system clock.
pub fn open_engine(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Engine<Database>> {
    let db = open_database(config)?;
    Engine::new(db, Arc::new(SystemClock), notifier).context("failed to load schedule")
}
