//! Status command for showing the timer as of now.

use std::io::Write;

use anyhow::Result;
use st_core::{Engine, PlaybackStatus, ScheduleStore, Snapshot};

use super::util::format_countdown;

pub fn run<W: Write, S: ScheduleStore>(writer: &mut W, engine: &Engine<S>, json: bool) -> Result<()> {
    let snapshot = engine.snapshot();
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&snapshot)?)?;
        return Ok(());
    }

    write_snapshot(writer, &snapshot)?;
    let conflicts = engine.load_conflicts();
    if !conflicts.is_empty() {
        writeln!(
            writer,
            "Stored schedule was not loaded ({} conflict(s)):",
            conflicts.len()
        )?;
        for conflict in conflicts {
            writeln!(writer, "- {conflict}")?;
        }
    }
    Ok(())
}

/// Writes a snapshot in human-readable form.
pub fn write_snapshot<W: Write>(writer: &mut W, snapshot: &Snapshot) -> Result<()> {
    writeln!(writer, "Status: {}", snapshot.status)?;
    if snapshot.status == PlaybackStatus::Playing {
        let label = snapshot.active_label.as_deref().unwrap_or("?");
        let remaining = format_countdown(snapshot.remaining_seconds.unwrap_or_default());
        let total = format_countdown(snapshot.total_duration_seconds.unwrap_or_default());
        writeln!(writer, "Active: {label} ({remaining} left of {total})")?;
        if let Some(asset) = &snapshot.asset {
            writeln!(writer, "Asset: {asset}")?;
        }
    }
    match &snapshot.next {
        Some(next) => writeln!(
            writer,
            "Next: {} at {} on {} (in {})",
            next.label,
            next.start.format("%H:%M"),
            next.date,
            format_countdown(next.countdown_seconds)
        )?,
        None if snapshot.status != PlaybackStatus::Waiting => {
            writeln!(writer, "Next: nothing else today")?;
        }
        None => {}
    }
    writeln!(
        writer,
        "Warnings: orange at {} min, red at {} min",
        snapshot.warn_orange_seconds / 60,
        snapshot.warn_red_seconds / 60
    )?;
    Ok(())
}
