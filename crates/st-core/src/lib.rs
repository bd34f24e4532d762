//! Core schedule and timer engine for stage timing.
//!
//! This crate contains the fundamental types and logic for:
//! - Entries: validated performance slots with derived end date and duration
//! - Conflicts: overlap detection across days, including slots past midnight
//! - Playback: activating, counting down and retiring the current entry
//! - Adjustment: stretching the active entry without running into the next one
//!
//! Storage and event delivery are collaborators supplied by the caller through
//! [`ScheduleStore`] and [`Notifier`].

pub mod adjust;
pub mod clock;
pub mod conflict;
mod engine;
pub mod entry;
pub mod history;
pub mod playback;
pub mod schedule;
pub mod settings;
pub mod snapshot;
pub mod store;

pub use adjust::AdjustmentError;
pub use clock::{Clock, ManualClock, SystemClock, event_day};
pub use conflict::{Conflict, ConflictSide};
pub use engine::{Engine, EngineError, ReplaceOutcome, SharedEngine};
pub use entry::{Entry, EntryDraft, ValidationError};
pub use history::{HistoryRecord, StoredHistory};
pub use playback::PlaybackState;
pub use schedule::{EntryId, LabelRename, Schedule, Slot};
pub use settings::{SettingsError, WarnThresholds};
pub use snapshot::{
    EngineEvent, Notifier, NullNotifier, PlaybackStatus, RecordingNotifier, ScheduleView,
    Snapshot, Upcoming,
};
pub use store::{HistoryQuery, MemoryStore, ScheduleStore, StoreError};
