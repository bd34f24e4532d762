//! Pairwise overlap detection between entries.
//!
//! Two entries conflict iff their half-open windows `[starts_at, ends_at)`
//! overlap. Both ends are resolved from each entry's own `end_date`, so slots
//! crossing midnight compare correctly against the next day's slots.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::entry::{Entry, hhmm};

/// One side of a conflict: enough to locate and describe the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictSide {
    /// Position in the batch that was validated, or in the existing schedule.
    pub position: usize,
    pub label: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub end_date: NaiveDate,
}

impl ConflictSide {
    fn of(position: usize, entry: &Entry) -> Self {
        Self {
            position,
            label: entry.label().to_string(),
            date: entry.date(),
            start: entry.start(),
            end: entry.end(),
            end_date: entry.end_date(),
        }
    }

    fn range(&self) -> String {
        let mut range = format!(
            "{}-{}",
            self.start.format(hhmm::FORMAT),
            self.end.format(hhmm::FORMAT)
        );
        if self.end_date != self.date {
            range.push_str(&format!(" (until {})", self.end_date));
        }
        range
    }
}

/// Two colliding entries.
///
/// `entry` is the one being validated; `other` is the one it collides with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub entry: ConflictSide,
    pub other: ConflictSide,
}

impl Conflict {
    /// Human-readable reason suitable for showing to an operator.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' on {} ({}) overlaps '{}' on {} ({})",
            self.entry.label,
            self.entry.date,
            self.entry.range(),
            self.other.label,
            self.other.date,
            self.other.range()
        )
    }
}

/// Returns whether two entries overlap. Symmetric in its arguments.
pub fn conflicts(a: &Entry, b: &Entry) -> bool {
    a.starts_at() < b.ends_at() && a.ends_at() > b.starts_at()
}

/// Finds every overlapping pair within a batch.
///
/// Each entry is checked against all entries before it, so each pair is
/// reported once, with the later entry as [`Conflict::entry`].
pub fn find_conflicts(entries: &[Entry]) -> Vec<Conflict> {
    let mut found = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        for (j, other) in entries[..i].iter().enumerate() {
            if conflicts(entry, other) {
                found.push(Conflict {
                    entry: ConflictSide::of(i, entry),
                    other: ConflictSide::of(j, other),
                });
            }
        }
    }
    found
}

/// Finds every existing entry that a new entry would overlap.
///
/// The new entry is not compared against itself; its position is reported as
/// the position it would take once inserted.
pub fn find_conflicts_with<'a>(
    entry: &Entry,
    existing: impl IntoIterator<Item = &'a Entry>,
) -> Vec<Conflict> {
    let existing: Vec<&Entry> = existing.into_iter().collect();
    let insert_at = existing
        .iter()
        .take_while(|other| other.sort_key() <= entry.sort_key())
        .count();
    existing
        .iter()
        .enumerate()
        .filter(|(_, other)| conflicts(entry, other))
        .map(|(j, other)| Conflict {
            entry: ConflictSide::of(insert_at, entry),
            other: ConflictSide::of(j, other),
        })
        .collect()
}
