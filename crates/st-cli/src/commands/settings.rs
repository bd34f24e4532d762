//! Settings commands for warning thresholds and display options.

use std::io::Write;

use anyhow::Result;
use st_core::{Engine, ScheduleStore};

use crate::SettingsAction;

pub fn run<W: Write, S: ScheduleStore>(writer: &mut W, engine: &mut Engine<S>, action: &SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let thresholds = engine.thresholds();
            writeln!(writer, "Warn orange: {} min", thresholds.orange_minutes)?;
            writeln!(writer, "Warn red: {} min", thresholds.red_minutes)?;
            writeln!(writer, "Logo size: {}%", engine.logo_size_percent()?)?;
        }
        SettingsAction::Warn { orange, red } => {
            let thresholds = engine.set_warn_thresholds(*orange, *red)?;
            writeln!(
                writer,
                "Warnings set: orange at {} min, red at {} min",
                thresholds.orange_minutes, thresholds.red_minutes
            )?;
        }
        SettingsAction::LogoSize { percent } => {
            engine.set_logo_size_percent(*percent)?;
            writeln!(writer, "Logo size set to {percent}%")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::testing::{at, engine_at};

    fn output_of(engine: &mut Engine<st_db::Database>, action: &SettingsAction) -> Result<String> {
        let mut output = Vec::new();
        run(&mut output, engine, action)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn show_defaults() {
        let mut engine = engine_at(&[], at("2026-07-10", 12, 0, 0));

        assert_snapshot!(output_of(&mut engine, &SettingsAction::Show).unwrap(), @r"
        Warn orange: 5 min
        Warn red: 1 min
        Logo size: 10%
        ");
    }

    #[test]
    fn changes_are_stored() {
        let mut engine = engine_at(&[], at("2026-07-10", 12, 0, 0));

        output_of(&mut engine, &SettingsAction::Warn { orange: 10, red: 3 }).unwrap();
        output_of(&mut engine, &SettingsAction::LogoSize { percent: 25 }).unwrap();

        assert_snapshot!(output_of(&mut engine, &SettingsAction::Show).unwrap(), @r"
        Warn orange: 10 min
        Warn red: 3 min
        Logo size: 25%
        ");
        assert_eq!(
            engine.store().get_setting("warn_red").unwrap().as_deref(),
            Some("3")
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut engine = engine_at(&[], at("2026-07-10", 12, 0, 0));

        assert!(output_of(&mut engine, &SettingsAction::Warn { orange: 1, red: 1 }).is_err());
        assert!(output_of(&mut engine, &SettingsAction::Warn { orange: 0, red: -1 }).is_err());
        assert!(output_of(&mut engine, &SettingsAction::LogoSize { percent: 0 }).is_err());
        assert!(output_of(&mut engine, &SettingsAction::LogoSize { percent: 101 }).is_err());
        assert_eq!(engine.thresholds().orange_minutes, 5);
    }
}
