//! Scheduled performance slots with derived-field invariants.
//!
//! An [`Entry`] stores its calendar date, start time and label together with the
//! derived `end`, `end_date` and `duration`. The derived fields are always
//! recomputed together from `date + start + duration`, so they can never drift
//! apart.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a full day; the longest slot a single `start`/`end` pair can describe.
const MINUTES_PER_DAY: i64 = 24 * 60;

/// Validation errors for entry fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was missing or blank.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The date was not in `YYYY-MM-DD` form.
    #[error("invalid {field}: {value} (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },

    /// The time was not in `HH:MM` form.
    #[error("invalid {field}: {value} (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },

    /// The duration would be shorter than one minute.
    #[error("duration must be at least 1 minute, got {minutes}")]
    DurationTooShort { minutes: i64 },

    /// The entry would end after the end of the representable calendar.
    #[error("entry end is out of range")]
    OutOfRange,
}

/// Raw operator input for an entry, prior to validation.
///
/// Used by bulk import and the admin commands. `end <= start` means the slot
/// crosses midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub date: String,
    #[serde(alias = "band")]
    pub label: String,
    pub start: String,
    pub end: String,
}

impl EntryDraft {
    pub fn new(
        date: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            label: label.into(),
            start: start.into(),
            end: end.into(),
        }
    }
}

impl TryFrom<EntryDraft> for Entry {
    type Error = ValidationError;

    fn try_from(draft: EntryDraft) -> Result<Self, Self::Error> {
        Self::parse(&draft.date, &draft.start, &draft.end, &draft.label)
    }
}

/// One scheduled performance slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    date: NaiveDate,
    #[serde(with = "hhmm")]
    start: NaiveTime,
    #[serde(with = "hhmm")]
    end: NaiveTime,
    end_date: NaiveDate,
    duration: i64,
    label: String,
}

impl Entry {
    /// Creates an entry from its start and end time of day.
    ///
    /// If `end` is not after `start` the slot is taken to end on the following day.
    pub fn new(
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        label: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);
        let mut minutes = (end - start).num_minutes();
        if minutes <= 0 {
            minutes += MINUTES_PER_DAY;
        }
        Self::with_duration_from(date, start, minutes, label)
    }

    /// Creates an entry from its start and a duration in minutes.
    pub fn with_duration_from(
        date: NaiveDate,
        start: NaiveTime,
        duration: i64,
        label: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let label = label.into().trim().to_string();
        if label.is_empty() {
            return Err(ValidationError::Empty { field: "label" });
        }
        let mut entry = Self {
            date,
            start: truncate_to_minute(start),
            end: start,
            end_date: date,
            duration: 0,
            label,
        };
        entry.set_duration(duration)?;
        Ok(entry)
    }

    /// Parses operator input (`YYYY-MM-DD`, `HH:MM`, `HH:MM`, label).
    pub fn parse(date: &str, start: &str, end: &str, label: &str) -> Result<Self, ValidationError> {
        let date = parse_date(date, "date")?;
        let start = parse_time(start, "start")?;
        let end = parse_time(end, "end")?;
        Self::new(date, start, end, label)
    }

    /// Returns a copy of this entry with a new duration, keeping `date` and `start`.
    pub fn with_duration(&self, duration: i64) -> Result<Self, ValidationError> {
        let mut entry = self.clone();
        entry.set_duration(duration)?;
        Ok(entry)
    }

    fn set_duration(&mut self, duration: i64) -> Result<(), ValidationError> {
        if duration < 1 {
            return Err(ValidationError::DurationTooShort { minutes: duration });
        }
        let end = Duration::try_minutes(duration)
            .and_then(|length| self.starts_at().checked_add_signed(length))
            .ok_or(ValidationError::OutOfRange)?;
        self.duration = duration;
        self.end = end.time();
        self.end_date = end.date();
        Ok(())
    }

    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    pub const fn start(&self) -> NaiveTime {
        self.start
    }

    pub const fn end(&self) -> NaiveTime {
        self.end
    }

    pub const fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Duration in minutes.
    pub const fn duration(&self) -> i64 {
        self.duration
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wall-clock start (`date + start`).
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }

    /// Wall-clock end (`end_date + end`).
    pub fn ends_at(&self) -> NaiveDateTime {
        self.end_date.and_time(self.end)
    }

    /// Whether the slot ends on a later calendar day than it starts.
    pub fn crosses_midnight(&self) -> bool {
        self.end_date != self.date
    }

    /// Whether the half-open window `[starts_at, ends_at)` contains `at`.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.starts_at() <= at && at < self.ends_at()
    }

    /// Canonical ordering key.
    pub fn sort_key(&self) -> (NaiveDate, NaiveTime) {
        (self.date, self.start)
    }

    /// `HH:MM-HH:MM` range used in operator-facing messages.
    pub fn time_range(&self) -> String {
        format!(
            "{}-{}",
            self.start.format(hhmm::FORMAT),
            self.end.format(hhmm::FORMAT)
        )
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.date, self.time_range(), self.label)
    }
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(value: &str, field: &'static str) -> Result<NaiveDate, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// Parses an `HH:MM` time of day. Seconds (`HH:MM:SS`) are accepted and dropped.
pub fn parse_time(value: &str, field: &'static str) -> Result<NaiveTime, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    NaiveTime::parse_from_str(value, hhmm::FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map(truncate_to_minute)
        .map_err(|_| ValidationError::InvalidTime {
            field,
            value: value.to_string(),
        })
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Serde adapter for `HH:MM` times.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
