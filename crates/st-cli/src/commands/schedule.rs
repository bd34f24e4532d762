//! Schedule commands: list, add, import and remove entries.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use st_core::{Engine, EntryDraft, ScheduleStore};

use super::util::read_drafts;
use crate::AddArgs;

pub fn list<W: Write, S: ScheduleStore>(writer: &mut W, engine: &Engine<S>, json: bool) -> Result<()> {
    let view = engine.schedule_view();
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&view)?)?;
        return Ok(());
    }

    if view.entries.is_empty() {
        writeln!(writer, "No entries scheduled.")?;
        return Ok(());
    }

    let mut current_date = None;
    for (position, entry) in view.entries.iter().enumerate() {
        if current_date != Some(entry.date()) {
            current_date = Some(entry.date());
            if entry.date() == view.event_date {
                writeln!(writer, "{} (event day)", entry.date())?;
            } else {
                writeln!(writer, "{}", entry.date())?;
            }
        }
        write!(
            writer,
            "  {position:>3}  {}  {:>4} min  {}",
            entry.time_range(),
            entry.duration(),
            entry.label()
        )?;
        if entry.crosses_midnight() {
            write!(writer, " (ends {})", entry.end_date())?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn add<W: Write, S: ScheduleStore>(writer: &mut W, engine: &mut Engine<S>, args: &AddArgs) -> Result<()> {
    let draft = EntryDraft::new(&args.date, &args.start, &args.end, &args.label);
    let id = engine.add_draft(draft)?;
    let position = engine.schedule().position(id).unwrap_or_default();
    if let Some(entry) = engine.schedule().get(id) {
        writeln!(writer, "Added {entry} at position {position}")?;
    }
    Ok(())
}

pub fn import<W: Write, S: ScheduleStore>(writer: &mut W, engine: &mut Engine<S>, file: &Path) -> Result<()> {
    let drafts = read_drafts(file)?;
    let outcome = engine.import_drafts(drafts)?;
    writeln!(writer, "Imported {} entries", outcome.entries)?;
    for rename in &outcome.renames {
        writeln!(writer, "Renamed '{}' to '{}'", rename.from, rename.to)?;
    }
    Ok(())
}

pub fn remove<W: Write, S: ScheduleStore>(
    writer: &mut W,
    engine: &mut Engine<S>,
    positions: &[usize],
) -> Result<()> {
    let removed = engine.remove_entries(positions)?;
    for entry in &removed {
        writeln!(writer, "Removed {entry}")?;
    }
    Ok(())
}
