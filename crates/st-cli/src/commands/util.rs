//! Shared utilities for CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use st_core::EntryDraft;

/// Formats seconds as `M:SS`, or `H:MM:SS` from one hour up.
pub fn format_countdown(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Reads a JSON array of entry drafts.
pub fn read_drafts(path: &Path) -> Result<Vec<EntryDraft>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid schedule file {}", path.display()))
}
