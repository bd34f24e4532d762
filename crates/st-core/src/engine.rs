//! The schedule and timer engine.
//!
//! [`Engine`] owns the schedule, the playback state and the storage
//! collaborator. Every operation is a read-modify-write on that one object, so
//! callers share it behind a single lock (see [`SharedEngine`]) and the poller
//! and operator actions never interleave.
//!
//! Mutations follow one pattern: build a candidate schedule, persist it, and
//! only then adopt it. A failed write leaves the in-memory state untouched.

use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adjust::{AdjustmentError, adjusted_entry};
use crate::clock::{Clock, event_day, truncate_to_second};
use crate::conflict::Conflict;
use crate::entry::{Entry, EntryDraft, ValidationError};
use crate::history::StoredHistory;
use crate::playback::{ActivePlayback, Lookup, PlaybackState, lookup, next_today, upcoming};
use crate::schedule::{EntryId, LabelRename, Schedule, renamed_labels};
use crate::settings::{
    LOGO_SIZE_KEY, SettingsError, WARN_ORANGE_KEY, WARN_RED_KEY, WarnThresholds,
    logo_size_percent, validate_logo_size,
};
use crate::snapshot::{EngineEvent, Notifier, PlaybackStatus, ScheduleView, Snapshot};
use crate::store::{HistoryQuery, ScheduleStore, StoreError};

/// Ticks between idle status lines in the log (one hour at one tick per second).
const IDLE_LOG_EVERY: u64 = 3600;

/// An engine shared between the poller and request handlers.
pub type SharedEngine<S> = Arc<Mutex<Engine<S>>>;

/// Errors from engine operations. All are recoverable.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An entry in a bulk batch failed validation.
    #[error("entry {position}: {source}")]
    InvalidDraft {
        position: usize,
        #[source]
        source: ValidationError,
    },

    #[error("{}", describe_conflicts(.0))]
    Conflicts(Vec<Conflict>),

    #[error(transparent)]
    Adjustment(#[from] AdjustmentError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("no entry at position {position} (schedule has {len})")]
    InvalidPosition { position: usize, len: usize },

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl EngineError {
    /// The conflicts behind a rejected mutation, if that is why it failed.
    pub fn conflicts(&self) -> Option<&[Conflict]> {
        match self {
            Self::Conflicts(conflicts) => Some(conflicts),
            _ => None,
        }
    }
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    let mut message = format!("{} time conflict(s) found", conflicts.len());
    for conflict in conflicts {
        message.push_str("\n- ");
        message.push_str(&conflict.reason());
    }
    message
}

/// Result of a bulk schedule replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub entries: usize,
    /// Labels that changed at an unchanged `(date, start)`.
    pub renames: Vec<LabelRename>,
}

/// The schedule and timer engine.
pub struct Engine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    schedule: Schedule,
    playback: PlaybackState,
    thresholds: WarnThresholds,
    load_conflicts: Vec<Conflict>,
    idle_ticks: u64,
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("schedule", &self.schedule)
            .field("playback", &self.playback)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl<S: ScheduleStore> Engine<S> {
    /// Creates an engine and loads the stored schedule.
    ///
    /// A stored schedule that conflicts with itself is not adopted; the engine
    /// starts empty and the conflicts are available from [`Self::load_conflicts`].
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        let thresholds = WarnThresholds::from_stored(
            store.setting(WARN_ORANGE_KEY)?.as_deref(),
            store.setting(WARN_RED_KEY)?.as_deref(),
        );
        let mut engine = Self {
            store,
            clock,
            notifier,
            schedule: Schedule::new(),
            playback: PlaybackState::default(),
            thresholds,
            load_conflicts: Vec::new(),
            idle_ticks: 0,
        };
        match engine.reload() {
            Ok(_) | Err(EngineError::Conflicts(_)) => Ok(engine),
            Err(err) => Err(err),
        }
    }

    /// Wraps the engine for sharing between the poller and request handlers.
    pub fn shared(self) -> SharedEngine<S> {
        Arc::new(Mutex::new(self))
    }

    /// Re-reads the schedule from storage.
    ///
    /// If the stored entries conflict, the current schedule is kept and the
    /// conflicts are returned.
    pub fn reload(&mut self) -> Result<usize, EngineError> {
        let entries = self.store.load_entries()?;
        match Schedule::from_entries(entries) {
            Ok(schedule) => {
                self.load_conflicts.clear();
                let count = schedule.len();
                self.adopt(schedule);
                info!(entries = count, days = self.schedule.dates().len(), "schedule loaded");
                self.publish(EngineEvent::ScheduleChanged {
                    reason: "schedule reloaded".to_string(),
                });
                Ok(count)
            }
            Err(conflicts) => {
                warn!(
                    conflicts = conflicts.len(),
                    "stored schedule has time conflicts, not loaded"
                );
                for conflict in &conflicts {
                    warn!("{conflict}");
                }
                self.load_conflicts.clone_from(&conflicts);
                self.publish(EngineEvent::ScheduleRejected {
                    conflicts: conflicts.clone(),
                });
                Err(EngineError::Conflicts(conflicts))
            }
        }
    }

    /// Conflicts found the last time the stored schedule was loaded.
    pub fn load_conflicts(&self) -> &[Conflict] {
        &self.load_conflicts
    }

    pub const fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub const fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn thresholds(&self) -> WarnThresholds {
        self.thresholds
    }

    /// Adds one entry after checking it against the existing schedule.
    pub fn add_entry(&mut self, entry: Entry) -> Result<EntryId, EngineError> {
        let mut candidate = self.schedule.clone();
        let id = candidate.add_one(entry).map_err(|conflicts| {
            warn!(conflicts = conflicts.len(), "entry rejected");
            EngineError::Conflicts(conflicts)
        })?;
        if let Some(entry) = candidate.get(id) {
            info!(entry = %entry, "entry added");
        }
        self.commit(candidate, "entry added")?;
        Ok(id)
    }

    /// Validates and adds one entry from operator input.
    pub fn add_draft(&mut self, draft: EntryDraft) -> Result<EntryId, EngineError> {
        self.add_entry(Entry::try_from(draft)?)
    }

    /// Replaces the whole schedule, or rejects the batch with every conflict.
    pub fn replace_schedule(&mut self, entries: Vec<Entry>) -> Result<ReplaceOutcome, EngineError> {
        let mut candidate = self.schedule.clone();
        candidate.replace_all(entries).map_err(|conflicts| {
            warn!(conflicts = conflicts.len(), "schedule batch rejected");
            EngineError::Conflicts(conflicts)
        })?;
        let renames = renamed_labels(&self.schedule, candidate.entries());
        let count = candidate.len();
        self.commit(candidate, "schedule replaced")?;
        info!(entries = count, "schedule replaced");

        for rename in &renames {
            match self.store.rename_asset(&rename.from, &rename.to) {
                Ok(()) => info!(from = %rename.from, to = %rename.to, "asset follows renamed label"),
                Err(err) => warn!(%err, from = %rename.from, "failed to move asset to renamed label"),
            }
        }
        Ok(ReplaceOutcome {
            entries: count,
            renames,
        })
    }

    /// Validates a batch of drafts and replaces the schedule with it.
    pub fn import_drafts(&mut self, drafts: Vec<EntryDraft>) -> Result<ReplaceOutcome, EngineError> {
        let entries = drafts
            .into_iter()
            .enumerate()
            .map(|(position, draft)| {
                Entry::try_from(draft).map_err(|source| EngineError::InvalidDraft { position, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.replace_schedule(entries)
    }

    /// Removes entries by position. Removing the active entry stops the timer
    /// without writing history.
    pub fn remove_entries(&mut self, positions: &[usize]) -> Result<Vec<Entry>, EngineError> {
        let mut candidate = self.schedule.clone();
        let removed = candidate
            .remove(positions)
            .map_err(|position| EngineError::InvalidPosition {
                position,
                len: self.schedule.len(),
            })?;
        self.commit(candidate, "entries removed")?;
        info!(removed = removed.len(), "entries removed");
        Ok(removed.into_iter().map(|slot| slot.entry).collect())
    }

    /// Holds the timer: the active countdown is dropped and nothing new is
    /// activated until [`Self::start`].
    pub fn pause(&mut self) -> Snapshot {
        self.playback.held = true;
        if let Some(active) = self.playback.active.take() {
            let label = self.label_of(active.entry_id);
            info!(label = %label, "timer paused");
        } else {
            info!("timer held");
        }
        let snapshot = self.idle_snapshot();
        self.publish(EngineEvent::Status(snapshot.clone()));
        snapshot
    }

    /// Releases a hold and evaluates the schedule immediately.
    pub fn start(&mut self) -> Result<Snapshot, EngineError> {
        if self.playback.held {
            info!("timer released");
        }
        self.playback.held = false;
        self.tick()
    }

    /// Advances the state machine to the current wall-clock time.
    ///
    /// Called once per second by the poller. Publishes the resulting snapshot
    /// and any transitions.
    pub fn tick(&mut self) -> Result<Snapshot, EngineError> {
        let now = self.now();
        if let Some((from, to)) = self.playback.observe_date(now) {
            if self.playback.is_playing() {
                info!(%from, %to, "date changed, letting the active entry finish");
            } else {
                info!(%from, %to, "date changed");
            }
        }

        if let Some(active) = &self.playback.active {
            if !active.is_finished(now) {
                if let Some(snapshot) = self.playing_snapshot(now) {
                    debug!(remaining = snapshot.remaining_seconds, "playing");
                    self.publish(EngineEvent::Status(snapshot.clone()));
                    return Ok(snapshot);
                }
                warn!("active entry vanished from the schedule, resetting");
                self.playback.reset();
            } else {
                self.finish_active()?;
            }
        }

        let snapshot = self.evaluate(now);
        self.log_idle(now);
        Ok(snapshot)
    }

    /// Stretches or shrinks the active entry by `delta` minutes.
    pub fn adjust(&mut self, delta: i64) -> Result<Snapshot, EngineError> {
        let now = self.now();
        let id = self.playback.active_id().ok_or(AdjustmentError::NotPlaying)?;
        let entry = self.schedule.get(id).ok_or(AdjustmentError::NotPlaying)?;
        let adjusted = adjusted_entry(entry, self.schedule.successor(id), delta).inspect_err(|err| {
            warn!(%err, delta, "adjustment rejected");
        })?;
        let end_time = self
            .playback
            .active
            .as_ref()
            .and_then(|active| {
                Duration::try_minutes(delta).and_then(|shift| active.end_time.checked_add_signed(shift))
            })
            .ok_or(AdjustmentError::Invalid(ValidationError::OutOfRange))?;

        let mut candidate = self.schedule.clone();
        if !candidate.update(id, adjusted) {
            warn!(%id, "active entry is no longer in the schedule");
            return Err(AdjustmentError::NotPlaying.into());
        }
        self.store.replace_entries(&candidate.to_entries())?;
        self.schedule = candidate;
        if let Some(active) = self.playback.active.as_mut() {
            active.end_time = end_time;
        }
        info!(label = %self.label_of(id), delta, "active entry adjusted");

        let snapshot = self
            .playing_snapshot(now)
            .unwrap_or_else(|| self.idle_snapshot());
        self.publish(EngineEvent::Status(snapshot.clone()));
        Ok(snapshot)
    }

    /// Side-effect-free view of the timer at the current time.
    ///
    /// Unlike [`Self::tick`] this never activates or finishes anything. An
    /// entry whose window contains now but which has not been activated yet is
    /// reported against its scheduled end.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.now();
        if let Some(snapshot) = self.playing_snapshot(now) {
            return snapshot;
        }
        if self.playback.held {
            return self.idle_snapshot();
        }
        match lookup(&self.schedule, now) {
            Lookup::Due(slot) => {
                let mut snapshot = self.idle_snapshot();
                snapshot.status = PlaybackStatus::Playing;
                snapshot.active_label = Some(slot.entry.label().to_string());
                snapshot.remaining_seconds = Some((slot.entry.ends_at() - now).num_seconds());
                snapshot.total_duration_seconds = Some(slot.entry.duration() * 60);
                snapshot.next = next_today(&self.schedule, slot.id, now);
                snapshot.asset = self.asset_for(slot.entry.label());
                snapshot
            }
            found => self.waiting_snapshot(found, now),
        }
    }

    /// The schedule with the current event day and all dates in use.
    pub fn schedule_view(&self) -> ScheduleView {
        ScheduleView {
            entries: self.schedule.to_entries(),
            event_date: event_day(self.now()),
            all_dates: self.schedule.dates(),
        }
    }

    /// Stores new warning thresholds.
    pub fn set_warn_thresholds(&mut self, orange: i64, red: i64) -> Result<WarnThresholds, EngineError> {
        let thresholds = WarnThresholds::new(orange, red)?;
        let previous = self.store.setting(WARN_ORANGE_KEY)?;
        self.store.set_setting(WARN_ORANGE_KEY, &orange.to_string())?;
        if let Err(err) = self.store.set_setting(WARN_RED_KEY, &red.to_string()) {
            let restored = previous.unwrap_or_else(|| self.thresholds.orange_minutes.to_string());
            if let Err(restore_err) = self.store.set_setting(WARN_ORANGE_KEY, &restored) {
                warn!(%restore_err, "failed to restore orange threshold");
            }
            return Err(err.into());
        }
        self.thresholds = thresholds;
        info!(orange, red, "warning thresholds updated");
        Ok(thresholds)
    }

    pub fn logo_size_percent(&self) -> Result<i64, EngineError> {
        Ok(logo_size_percent(self.store.setting(LOGO_SIZE_KEY)?.as_deref()))
    }

    pub fn set_logo_size_percent(&mut self, percent: i64) -> Result<(), EngineError> {
        let percent = validate_logo_size(percent)?;
        self.store.set_setting(LOGO_SIZE_KEY, &percent.to_string())?;
        info!(percent, "logo size updated");
        Ok(())
    }

    /// Broadcasts a free-text operator message.
    pub fn broadcast_message(&self, text: impl Into<String>, seconds: u32) {
        let text = text.into();
        info!(%text, seconds, "operator message");
        self.publish(EngineEvent::Message { text, seconds });
    }

    fn now(&self) -> NaiveDateTime {
        truncate_to_second(self.clock.now())
    }

    fn publish(&self, event: EngineEvent) {
        self.notifier.publish(event);
    }

    fn label_of(&self, id: EntryId) -> String {
        self.schedule
            .get(id)
            .map_or_else(|| id.to_string(), |entry| entry.label().to_string())
    }

    fn asset_for(&self, label: &str) -> Option<String> {
        self.store.asset_for(label).unwrap_or_else(|err| {
            warn!(%err, label, "failed to look up display asset");
            None
        })
    }

    /// Persists a candidate schedule and adopts it.
    fn commit(&mut self, candidate: Schedule, reason: &str) -> Result<(), EngineError> {
        self.store.replace_entries(&candidate.to_entries())?;
        self.adopt(candidate);
        self.publish(EngineEvent::ScheduleChanged {
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Switches to a new schedule, following the active entry by `(date, start)`.
    fn adopt(&mut self, schedule: Schedule) {
        let carried = self.playback.active.as_ref().and_then(|active| {
            let (date, start) = self.schedule.get(active.entry_id)?.sort_key();
            let slot = schedule.find_at(date, start)?;
            Some((slot.id, slot.entry.duration()))
        });
        if self.playback.is_playing() {
            match carried {
                Some((id, duration)) => {
                    if let Some(active) = self.playback.active.as_mut() {
                        active.entry_id = id;
                        active.end_time = active.actual_start + Duration::minutes(duration);
                    }
                }
                None => {
                    info!("active entry was removed, timer stopped");
                    self.playback.reset();
                }
            }
        }
        self.schedule = schedule;
    }

    /// Records the active entry to history and retires it from the schedule.
    fn finish_active(&mut self) -> Result<(), EngineError> {
        let Some(active) = self.playback.active.clone() else {
            return Ok(());
        };
        let Some(entry) = self.schedule.get(active.entry_id) else {
            warn!("finished entry is no longer scheduled");
            self.playback.reset();
            return Ok(());
        };
        let record = active.history_record(entry.label());

        if !active.history_written {
            self.store.append_history(&record)?;
            if let Some(active) = self.playback.active.as_mut() {
                active.history_written = true;
            }
        }

        let mut candidate = self.schedule.clone();
        candidate.remove_id(active.entry_id);
        self.store.replace_entries(&candidate.to_entries())?;
        self.schedule = candidate;
        self.playback.reset();

        info!(label = %record.label, duration = record.duration, "entry finished");
        let reason = format!("'{}' finished", record.label);
        self.publish(EngineEvent::EntryFinished { record });
        self.publish(EngineEvent::ScheduleChanged { reason });
        Ok(())
    }

    /// Decides what to do when nothing is playing.
    fn evaluate(&mut self, now: NaiveDateTime) -> Snapshot {
        if self.playback.held {
            let snapshot = self.idle_snapshot();
            self.publish(EngineEvent::Status(snapshot.clone()));
            return snapshot;
        }

        let due = match lookup(&self.schedule, now) {
            Lookup::Due(slot) => Some((slot.id, slot.entry.clone())),
            _ => None,
        };
        if let Some((id, entry)) = due {
            let active = ActivePlayback::activate(id, &entry, now);
            info!(label = %entry.label(), end_time = %active.end_time, "entry started");
            self.playback.active = Some(active);
            self.publish(EngineEvent::EntryStarted {
                label: entry.label().to_string(),
            });
        }

        let snapshot = self
            .playing_snapshot(now)
            .unwrap_or_else(|| self.waiting_snapshot(lookup(&self.schedule, now), now));
        self.publish(EngineEvent::Status(snapshot.clone()));
        snapshot
    }

    fn playing_snapshot(&self, now: NaiveDateTime) -> Option<Snapshot> {
        let active = self.playback.active.as_ref()?;
        let entry = self.schedule.get(active.entry_id)?;
        Some(Snapshot {
            status: PlaybackStatus::Playing,
            active_label: Some(entry.label().to_string()),
            remaining_seconds: Some(active.remaining_seconds(now)),
            total_duration_seconds: Some(entry.duration() * 60),
            next: next_today(&self.schedule, active.entry_id, now),
            asset: self.asset_for(entry.label()),
            warn_orange_seconds: self.thresholds.orange_seconds(),
            warn_red_seconds: self.thresholds.red_seconds(),
        })
    }

    fn waiting_snapshot(&self, found: Lookup<'_>, now: NaiveDateTime) -> Snapshot {
        let mut snapshot = self.idle_snapshot();
        if let Lookup::Upcoming(slot) = found {
            snapshot.status = PlaybackStatus::Waiting;
            snapshot.next = Some(upcoming(&slot.entry, now));
        }
        snapshot
    }

    fn idle_snapshot(&self) -> Snapshot {
        Snapshot {
            status: PlaybackStatus::Idle,
            active_label: None,
            remaining_seconds: None,
            total_duration_seconds: None,
            next: None,
            asset: None,
            warn_orange_seconds: self.thresholds.orange_seconds(),
            warn_red_seconds: self.thresholds.red_seconds(),
        }
    }

    fn log_idle(&mut self, now: NaiveDateTime) {
        if self.playback.is_playing() {
            self.idle_ticks = 0;
            return;
        }
        self.idle_ticks += 1;
        if self.idle_ticks % IDLE_LOG_EVERY != 0 {
            return;
        }
        match lookup(&self.schedule, now) {
            Lookup::Upcoming(slot) => {
                let hours = (slot.entry.starts_at() - now).num_hours();
                info!(next = %slot.entry.label(), start = %slot.entry.start(), "idle, next entry in ~{hours}h");
            }
            _ => debug!(date = %now.date(), "idle, nothing left today"),
        }
    }

    #[cfg(test)]
    fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

impl<S: ScheduleStore + HistoryQuery> Engine<S> {
    /// Visible history, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<StoredHistory>, EngineError> {
        Ok(self.store.visible_history(limit)?)
    }

    /// All history including hidden records, newest first.
    pub fn all_history(&self, limit: usize) -> Result<Vec<StoredHistory>, EngineError> {
        Ok(self.store.all_history(limit)?)
    }

    pub fn hide_history(&mut self, id: i64) -> Result<bool, EngineError> {
        let hidden = self.store.hide_history(id)?;
        if hidden {
            info!(id, "history record hidden");
        }
        Ok(hidden)
    }

    pub fn hide_all_history(&mut self) -> Result<usize, EngineError> {
        let hidden = self.store.hide_all_history()?;
        info!(hidden, "history cleared");
        Ok(hidden)
    }

    pub fn unhide_history(&mut self, id: i64) -> Result<bool, EngineError> {
        let shown = self.store.unhide_history(id)?;
        if shown {
            info!(id, "history record restored");
        }
        Ok(shown)
    }
}
