//! Read models and events published to observers.

use std::sync::{Mutex, PoisonError};

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::conflict::Conflict;
use crate::entry::{Entry, hhmm};
use crate::history::HistoryRecord;

/// Coarse timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Nothing left to play today.
    #[default]
    Idle,
    /// An entry is due later today.
    Waiting,
    /// An entry's window contains now.
    Playing,
}

impl PlaybackStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Playing => "playing",
        }
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The next entry today and how long until it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upcoming {
    #[serde(rename = "next_label")]
    pub label: String,
    #[serde(rename = "next_date")]
    pub date: NaiveDate,
    #[serde(rename = "next_start", with = "hhmm")]
    pub start: NaiveTime,
    #[serde(rename = "next_countdown_seconds")]
    pub countdown_seconds: i64,
}

/// What the timer shows at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub status: PlaybackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<i64>,
    #[serde(flatten)]
    pub next: Option<Upcoming>,
    /// Display asset for the active entry, supplied by storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub warn_orange_seconds: i64,
    pub warn_red_seconds: i64,
}

/// The full schedule grouped for display.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub entries: Vec<Entry>,
    /// Current event day (days start at 02:00).
    pub event_date: NaiveDate,
    pub all_dates: Vec<NaiveDate>,
}

/// Discrete updates published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Periodic or immediate timer state.
    Status(Snapshot),
    EntryStarted { label: String },
    EntryFinished { record: HistoryRecord },
    ScheduleChanged { reason: String },
    /// The stored schedule could not be adopted because it conflicts.
    ScheduleRejected { conflicts: Vec<Conflict> },
    /// Free-text operator message to show for a while.
    Message { text: String, seconds: u32 },
}

/// Receives engine events. Implemented by the transport layer.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn publish(&self, _event: EngineEvent) {}
}

/// Keeps every event in memory. Useful for inspection and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, event: EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
