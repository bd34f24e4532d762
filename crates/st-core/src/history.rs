//! Records of finished entries.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::entry::hhmm;

/// Immutable fact about one finished entry: the plan versus what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub label: String,
    pub scheduled_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub scheduled_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub scheduled_end: NaiveTime,
    pub actual_start: NaiveDateTime,
    pub actual_end: NaiveDateTime,
    /// Actual duration in minutes.
    pub duration: i64,
    pub hidden: bool,
}

/// A history record as kept by storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredHistory {
    pub id: i64,
    pub recorded_at: NaiveDateTime,
    #[serde(flatten)]
    pub record: HistoryRecord,
}
