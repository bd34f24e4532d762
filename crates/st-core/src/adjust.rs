//! Live stretching and shrinking of the active entry.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::entry::{Entry, ValidationError, hhmm};
use crate::schedule::Slot;

/// Why an adjustment was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdjustmentError {
    #[error("no entry is playing")]
    NotPlaying,

    #[error("adjustment must be non-zero")]
    ZeroDelta,

    /// The entry would be shorter than one minute.
    #[error("'{label}' cannot be adjusted by {delta} min: it lasts {duration} min and must keep at least 1")]
    BelowMinimum {
        label: String,
        duration: i64,
        delta: i64,
    },

    /// The entry would run into the next one.
    #[error("{}", overlap_message(.available, .next_label, .next_date, .next_start))]
    Overlap {
        requested: i64,
        /// Largest extension in minutes that still fits.
        available: i64,
        next_label: String,
        next_date: NaiveDate,
        next_start: NaiveTime,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

fn overlap_message(available: &i64, label: &str, date: &NaiveDate, start: &NaiveTime) -> String {
    let start = start.format(hhmm::FORMAT);
    if *available > 0 {
        format!("only +{available} min possible ('{label}' starts at {start} on {date})")
    } else {
        format!("no extension possible ('{label}' starts at {start} on {date})")
    }
}

/// Computes the adjusted version of `entry`.
///
/// `next` is the entry that follows it in the schedule. A positive `delta` may
/// not push the end past the start of `next`; a negative one may not leave
/// less than one minute.
pub fn adjusted_entry(entry: &Entry, next: Option<&Slot>, delta: i64) -> Result<Entry, AdjustmentError> {
    if delta == 0 {
        return Err(AdjustmentError::ZeroDelta);
    }
    let duration = entry
        .duration()
        .checked_add(delta)
        .ok_or(ValidationError::OutOfRange)?;
    if duration < 1 {
        return Err(AdjustmentError::BelowMinimum {
            label: entry.label().to_string(),
            duration: entry.duration(),
            delta,
        });
    }
    let adjusted = entry.with_duration(duration)?;
    if delta > 0 {
        if let Some(next) = next.map(|slot| &slot.entry) {
            if adjusted.ends_at() > next.starts_at() {
                return Err(AdjustmentError::Overlap {
                    requested: delta,
                    available: (next.starts_at() - entry.ends_at()).num_minutes().max(0),
                    next_label: next.label().to_string(),
                    next_date: next.date(),
                    next_start: next.start(),
                });
            }
        }
    }
    Ok(adjusted)
}
