//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Stage timer.
///
/// Keeps a multi-day running order, counts down the entry on stage and
/// records what actually happened.
#[derive(Debug, Parser)]
#[command(name = "stagetimer", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the timer as of now without changing anything.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect and edit the schedule.
    #[command(subcommand)]
    Schedule(ScheduleAction),

    /// Inspect and curate the history of finished entries.
    #[command(subcommand)]
    History(HistoryAction),

    /// Show and change display settings.
    #[command(subcommand)]
    Settings(SettingsAction),

    /// Manage per-label display assets.
    #[command(subcommand)]
    Asset(AssetAction),

    /// Run the timer, printing every event as a JSON line.
    ///
    /// Operator commands are read from stdin: start, pause, adjust N,
    /// add DATE START END LABEL, remove POS..., reload, status,
    /// message SECONDS TEXT, quit.
    Run,
}

#[derive(Debug, Subcommand)]
pub enum ScheduleAction {
    /// List all entries grouped by date.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Add one entry.
    Add(AddArgs),
    /// Replace the whole schedule from a JSON file.
    Import {
        /// JSON array of `{date, label, start, end}` objects.
        file: PathBuf,
    },
    /// Remove entries by position (as shown by `schedule list`).
    Remove {
        #[arg(required = true)]
        positions: Vec<usize>,
    },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Date the entry starts (YYYY-MM-DD).
    #[arg(long)]
    pub date: String,
    /// Start time (HH:MM).
    #[arg(long)]
    pub start: String,
    /// End time (HH:MM); earlier than start means past midnight.
    #[arg(long)]
    pub end: String,
    /// Label shown on stage displays.
    #[arg(long)]
    pub label: String,
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// List finished entries, newest first.
    List {
        /// Include hidden records.
        #[arg(long)]
        all: bool,
        /// Maximum number of records (defaults to `history_limit`).
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Hide one record.
    Hide { id: i64 },
    /// Hide every visible record.
    HideAll,
    /// Show a hidden record again.
    Unhide { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Show current settings.
    Show,
    /// Set the warning thresholds in minutes.
    Warn {
        #[arg(long)]
        orange: i64,
        #[arg(long)]
        red: i64,
    },
    /// Set the logo size as a percentage of the display.
    LogoSize { percent: i64 },
}

#[derive(Debug, Subcommand)]
pub enum AssetAction {
    /// List all assets.
    List,
    /// Attach an asset reference (path or URL) to a label.
    Set { label: String, reference: String },
    /// Detach the asset of a label.
    Remove { label: String },
}
