//! Playback state and the schedule lookups that drive it.
//!
//! The state machine has three observable states:
//!
//! - **Idle**: nothing (left) to play today
//! - **Waiting**: an entry starts later today
//! - **Playing**: an entry has been activated and its countdown runs
//!
//! "Today" is the calendar date of the current instant. Only entries starting
//! today are considered for a fresh activation, but an entry that is already
//! playing keeps playing across midnight until its countdown reaches zero.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::entry::Entry;
use crate::history::HistoryRecord;
use crate::schedule::{EntryId, Schedule, Slot};
use crate::snapshot::{PlaybackStatus, Upcoming};

/// The plan of the active entry as it stood when it was activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPlan {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub duration: i64,
}

impl ScheduledPlan {
    fn of(entry: &Entry) -> Self {
        Self {
            date: entry.date(),
            start: entry.start(),
            end: entry.end(),
            duration: entry.duration(),
        }
    }
}

/// The entry whose countdown is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePlayback {
    pub entry_id: EntryId,
    /// When the countdown actually began (never before the scheduled start).
    pub actual_start: NaiveDateTime,
    /// When the countdown reaches zero.
    pub end_time: NaiveDateTime,
    /// Captured once at activation; adjustments never touch it.
    pub original: ScheduledPlan,
    /// Set once the history record has been persisted, so a retried finish
    /// does not append it twice.
    pub history_written: bool,
}

impl ActivePlayback {
    /// Activates `entry` at `now`.
    ///
    /// A late activation starts the countdown at `now`; it never starts in the
    /// past.
    pub fn activate(entry_id: EntryId, entry: &Entry, now: NaiveDateTime) -> Self {
        let actual_start = now.max(entry.starts_at());
        Self {
            entry_id,
            actual_start,
            end_time: actual_start + Duration::minutes(entry.duration()),
            original: ScheduledPlan::of(entry),
            history_written: false,
        }
    }

    /// Seconds left on the countdown, never negative.
    pub fn remaining_seconds(&self, now: NaiveDateTime) -> i64 {
        (self.end_time - now).num_seconds().max(0)
    }

    pub fn is_finished(&self, now: NaiveDateTime) -> bool {
        now >= self.end_time
    }

    /// The history record for this playback, ending at `end_time`.
    pub fn history_record(&self, label: &str) -> HistoryRecord {
        HistoryRecord {
            label: label.to_string(),
            scheduled_date: self.original.date,
            scheduled_start: self.original.start,
            scheduled_end: self.original.end,
            actual_start: self.actual_start,
            actual_end: self.end_time,
            duration: (self.end_time - self.actual_start).num_minutes(),
            hidden: false,
        }
    }
}

/// Process-wide timer state.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub active: Option<ActivePlayback>,
    /// While held, nothing is activated.
    pub held: bool,
    /// Calendar date seen by the previous tick, for rollover detection.
    pub last_date: Option<NaiveDate>,
}

impl PlaybackState {
    pub const fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<EntryId> {
        self.active.as_ref().map(|active| active.entry_id)
    }

    pub fn reset(&mut self) {
        self.active = None;
    }

    /// Records the date seen at `now` and reports a rollover from the previous one.
    pub fn observe_date(&mut self, now: NaiveDateTime) -> Option<(NaiveDate, NaiveDate)> {
        let today = now.date();
        let previous = self.last_date.replace(today)?;
        (previous != today).then_some((previous, today))
    }
}

/// Result of looking at the schedule without an active entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// An entry today whose window contains now.
    Due(&'a Slot),
    /// The earliest entry later today.
    Upcoming(&'a Slot),
    Nothing,
}

impl Lookup<'_> {
    pub const fn status(&self) -> PlaybackStatus {
        match self {
            Self::Due(_) => PlaybackStatus::Playing,
            Self::Upcoming(_) => PlaybackStatus::Waiting,
            Self::Nothing => PlaybackStatus::Idle,
        }
    }
}

/// Finds what should happen at `now` when nothing is playing.
pub fn lookup(schedule: &Schedule, now: NaiveDateTime) -> Lookup<'_> {
    let today = now.date();
    if let Some(slot) = schedule
        .on_date(today)
        .find(|slot| slot.entry.contains(now))
    {
        return Lookup::Due(slot);
    }
    schedule
        .on_date(today)
        .find(|slot| slot.entry.starts_at() > now)
        .map_or(Lookup::Nothing, Lookup::Upcoming)
}

/// The first entry after `id` that starts today, with its countdown from `now`.
pub fn next_today(schedule: &Schedule, id: EntryId, now: NaiveDateTime) -> Option<Upcoming> {
    let position = schedule.position(id)?;
    schedule.slots()[position + 1..]
        .iter()
        .find(|slot| slot.entry.date() == now.date())
        .map(|slot| upcoming(&slot.entry, now))
}

/// Describes `entry` as the upcoming one, as seen from `now`.
pub fn upcoming(entry: &Entry, now: NaiveDateTime) -> Upcoming {
    Upcoming {
        label: entry.label().to_string(),
        date: entry.date(),
        start: entry.start(),
        countdown_seconds: (entry.starts_at() - now).num_seconds(),
    }
}
