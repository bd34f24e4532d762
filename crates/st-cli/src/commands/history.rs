//! History commands: list and curate finished entries.

use std::io::Write;

use anyhow::{Result, bail};
use st_core::{Engine, HistoryQuery, ScheduleStore};

use crate::HistoryAction;

pub fn run<W: Write, S: ScheduleStore + HistoryQuery>(
    writer: &mut W,
    engine: &mut Engine<S>,
    action: &HistoryAction,
    default_limit: usize,
) -> Result<()> {
    match action {
        HistoryAction::List { all, limit, json } => {
            list(writer, engine, *all, limit.unwrap_or(default_limit), *json)
        }
        HistoryAction::Hide { id } => {
            if !engine.hide_history(*id)? {
                bail!("no visible history record with id {id}");
            }
            writeln!(writer, "Hid record {id}")?;
            Ok(())
        }
        HistoryAction::HideAll => {
            let hidden = engine.hide_all_history()?;
            writeln!(writer, "Hid {hidden} record(s)")?;
            Ok(())
        }
        HistoryAction::Unhide { id } => {
            if !engine.unhide_history(*id)? {
                bail!("no hidden history record with id {id}");
            }
            writeln!(writer, "Restored record {id}")?;
            Ok(())
        }
    }
}

fn list<W: Write, S: ScheduleStore + HistoryQuery>(
    writer: &mut W,
    engine: &Engine<S>,
    all: bool,
    limit: usize,
    json: bool,
) -> Result<()> {
    let records = if all {
        engine.all_history(limit)?
    } else {
        engine.history(limit)?
    };
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&records)?)?;
        return Ok(());
    }
    if records.is_empty() {
        writeln!(writer, "No history recorded.")?;
        return Ok(());
    }

    writeln!(writer, "History (newest first):")?;
    for stored in &records {
        let record = &stored.record;
        write!(
            writer,
            "{:>4}  {} {}-{}  {}  played {}-{} ({} min)",
            stored.id,
            record.scheduled_date,
            record.scheduled_start.format("%H:%M"),
            record.scheduled_end.format("%H:%M"),
            record.label,
            record.actual_start.format("%H:%M:%S"),
            record.actual_end.format("%H:%M:%S"),
            record.duration
        )?;
        if record.hidden {
            write!(writer, " [hidden]")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use st_db::Database;

    use crate::commands::testing::{at, engine_at, engine_with_clock, evening};

    /// Plays both evening entries to completion, the first one 5 minutes long.
    fn played_evening() -> Engine<Database> {
        let (mut engine, clock) = engine_with_clock(&evening(), at("2026-07-10", 18, 0, 0));
        engine.tick().unwrap();
        engine.adjust(5).unwrap();
        clock.set(at("2026-07-10", 19, 5, 0));
        engine.tick().unwrap();
        clock.set(at("2026-07-10", 19, 40, 0));
        engine.tick().unwrap();
        clock.set(at("2026-07-10", 21, 10, 0));
        engine.tick().unwrap();
        engine
    }

    fn output_of(engine: &mut Engine<Database>, action: &HistoryAction) -> String {
        let mut output = Vec::new();
        run(&mut output, engine, action, 50).unwrap();
        String::from_utf8(output).unwrap()
    }

    const LIST: HistoryAction = HistoryAction::List {
        all: false,
        limit: None,
        json: false,
    };

    #[test]
    fn list_empty_history() {
        let mut engine = engine_at(&evening(), at("2026-07-10", 12, 0, 0));

        assert_snapshot!(output_of(&mut engine, &LIST), @"No history recorded.");
    }

    #[test]
    fn list_shows_plan_against_actual_times() {
        let mut engine = played_evening();

        assert_snapshot!(output_of(&mut engine, &LIST), @r"
        History (newest first):
           2  2026-07-10 19:30-21:00  B  played 19:40:00-21:10:00 (90 min)
           1  2026-07-10 18:00-19:00  A  played 18:00:00-19:05:00 (65 min)
        ");
    }

    #[test]
    fn hide_unhide_and_list_all() {
        let mut engine = played_evening();

        assert_snapshot!(output_of(&mut engine, &HistoryAction::Hide { id: 1 }), @"Hid record 1");
        let all = output_of(
            &mut engine,
            &HistoryAction::List {
                all: true,
                limit: Some(1),
                json: false,
            },
        );
        assert!(all.contains("   2  "));
        assert!(!all.contains("   1  "));

        let visible = output_of(&mut engine, &LIST);
        assert!(!visible.contains("  A  "));

        assert_snapshot!(output_of(&mut engine, &HistoryAction::HideAll), @"Hid 1 record(s)");
        assert_snapshot!(output_of(&mut engine, &HistoryAction::Unhide { id: 1 }), @"Restored record 1");
        assert!(output_of(&mut engine, &LIST).contains("  A  played"));
    }

    #[test]
    fn hide_unknown_record_fails() {
        let mut engine = played_evening();

        let err = run(&mut Vec::new(), &mut engine, &HistoryAction::Hide { id: 99 }, 50).unwrap_err();

        assert_eq!(err.to_string(), "no visible history record with id 99");
    }

    #[test]
    fn list_json_flattens_record() {
        let mut engine = played_evening();

        let output = output_of(
            &mut engine,
            &HistoryAction::List {
                all: false,
                limit: Some(1),
                json: true,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["id"], 2);
        assert_eq!(value[0]["label"], "B");
        assert_eq!(value[0]["scheduled_start"], "19:30");
        assert_eq!(value[0]["hidden"], false);
    }
}
