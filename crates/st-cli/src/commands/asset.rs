//! Asset commands for per-label display assets (logos).

use std::io::Write;

use anyhow::{Result, bail};
use st_db::Database;

use crate::AssetAction;

pub fn run<W: Write>(writer: &mut W, db: &Database, action: &AssetAction) -> Result<()> {
    match action {
        AssetAction::List => {
            let assets = db.list_assets()?;
            if assets.is_empty() {
                writeln!(writer, "No assets.")?;
            }
            for asset in assets {
                writeln!(writer, "{}: {}", asset.label, asset.asset)?;
            }
        }
        AssetAction::Set { label, reference } => {
            let label = label.trim();
            if label.is_empty() {
                bail!("label cannot be empty");
            }
            db.set_asset(label, reference)?;
            writeln!(writer, "Asset for '{label}' set to {reference}")?;
        }
        AssetAction::Remove { label } => {
            if !db.remove_asset(label)? {
                bail!("no asset for '{label}'");
            }
            writeln!(writer, "Asset for '{label}' removed")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    fn output_of(db: &Database, action: &AssetAction) -> Result<String> {
        let mut output = Vec::new();
        run(&mut output, db, action)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn set_list_and_remove() {
        let db = Database::open_in_memory().unwrap();

        output_of(
            &db,
            &AssetAction::Set {
                label: "Headliner".to_string(),
                reference: "logos/headliner.png".to_string(),
            },
        )
        .unwrap();
        output_of(
            &db,
            &AssetAction::Set {
                label: "Opener".to_string(),
                reference: "logos/opener.svg".to_string(),
            },
        )
        .unwrap();

        assert_snapshot!(output_of(&db, &AssetAction::List).unwrap(), @r"
        Headliner: logos/headliner.png
        Opener: logos/opener.svg
        ");

        let removed = output_of(
            &db,
            &AssetAction::Remove {
                label: "Opener".to_string(),
            },
        )
        .unwrap();
        assert_snapshot!(removed, @"Asset for 'Opener' removed");
        assert!(
            output_of(
                &db,
                &AssetAction::Remove {
                    label: "Opener".to_string()
                }
            )
            .is_err()
        );
    }

    #[test]
    fn blank_label_is_rejected() {
        let db = Database::open_in_memory().unwrap();

        let err = output_of(
            &db,
            &AssetAction::Set {
                label: "  ".to_string(),
                reference: "x.png".to_string(),
            },
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "label cannot be empty");
    }
}
