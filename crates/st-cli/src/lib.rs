//! Stage timer CLI library.
//!
//! This crate provides the command-line interface and the long-running timer
//! service built on `st-core` and `st-db`.

mod cli;
pub mod commands;
mod config;

pub use cli::{AddArgs, AssetAction, Cli, Commands, HistoryAction, ScheduleAction, SettingsAction};
pub use config::Config;
