//! Storage collaborator contract.
//!
//! The engine needs very little from storage: load and overwrite the schedule,
//! append history, and read/write a few named settings. History queries and
//! per-label display assets are separate, optional capabilities.

use std::collections::HashMap;
use std::error::Error as StdError;

use thiserror::Error;

use crate::entry::Entry;
use crate::history::{HistoryRecord, StoredHistory};

/// A failure reported by the storage collaborator.
#[derive(Debug, Error)]
#[error("storage failure: {0}")]
pub struct StoreError(#[source] Box<dyn StdError + Send + Sync>);

impl StoreError {
    pub fn new(err: impl StdError + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    /// A failure described only by a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

/// Persistence operations required by the engine.
pub trait ScheduleStore: Send {
    /// Loads the stored schedule in `(date, start)` order.
    fn load_entries(&self) -> Result<Vec<Entry>, StoreError>;

    /// Overwrites the stored schedule.
    fn replace_entries(&mut self, entries: &[Entry]) -> Result<(), StoreError>;

    fn append_history(&mut self, record: &HistoryRecord) -> Result<(), StoreError>;

    fn setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_setting(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Display asset reference for an entry label, if the store keeps any.
    fn asset_for(&self, _label: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    /// Moves a display asset reference to a renamed label.
    fn rename_asset(&mut self, _from: &str, _to: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// History queries and soft deletion.
pub trait HistoryQuery {
    /// Visible records, newest first.
    fn visible_history(&self, limit: usize) -> Result<Vec<StoredHistory>, StoreError>;

    /// All records including hidden ones, newest first.
    fn all_history(&self, limit: usize) -> Result<Vec<StoredHistory>, StoreError>;

    /// Hides one record. Returns whether a visible record was hidden.
    fn hide_history(&mut self, id: i64) -> Result<bool, StoreError>;

    /// Hides every visible record and returns how many were hidden.
    fn hide_all_history(&mut self) -> Result<usize, StoreError>;

    /// Makes a hidden record visible again.
    fn unhide_history(&mut self, id: i64) -> Result<bool, StoreError>;
}

/// Volatile store kept entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Vec<Entry>,
    history: Vec<StoredHistory>,
    settings: HashMap<String, String>,
    assets: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with a schedule.
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn history(&self) -> &[StoredHistory] {
        &self.history
    }

    pub fn set_asset(&mut self, label: impl Into<String>, asset: impl Into<String>) {
        self.assets.insert(label.into(), asset.into());
    }

    fn newest_first(&self, limit: usize, include_hidden: bool) -> Vec<StoredHistory> {
        self.history
            .iter()
            .rev()
            .filter(|h| include_hidden || !h.record.hidden)
            .take(limit)
            .cloned()
            .collect()
    }

    fn set_hidden(&mut self, id: i64, hidden: bool) -> bool {
        match self
            .history
            .iter_mut()
            .find(|h| h.id == id && h.record.hidden != hidden)
        {
            Some(h) => {
                h.record.hidden = hidden;
                true
            }
            None => false,
        }
    }
}

impl ScheduleStore for MemoryStore {
    fn load_entries(&self) -> Result<Vec<Entry>, StoreError> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(Entry::sort_key);
        Ok(entries)
    }

    fn replace_entries(&mut self, entries: &[Entry]) -> Result<(), StoreError> {
        self.entries = entries.to_vec();
        Ok(())
    }

    fn append_history(&mut self, record: &HistoryRecord) -> Result<(), StoreError> {
        let id = i64::try_from(self.history.len()).map_err(StoreError::new)? + 1;
        self.history.push(StoredHistory {
            id,
            recorded_at: record.actual_end,
            record: record.clone(),
        });
        Ok(())
    }

    fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.settings.get(key).cloned())
    }

    fn set_setting(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn asset_for(&self, label: &str) -> Result<Option<String>, StoreError> {
        Ok(self.assets.get(label).cloned())
    }

    fn rename_asset(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        if let Some(asset) = self.assets.remove(from) {
            self.assets.insert(to.to_string(), asset);
        }
        Ok(())
    }
}

impl HistoryQuery for MemoryStore {
    fn visible_history(&self, limit: usize) -> Result<Vec<StoredHistory>, StoreError> {
        Ok(self.newest_first(limit, false))
    }

    fn all_history(&self, limit: usize) -> Result<Vec<StoredHistory>, StoreError> {
        Ok(self.newest_first(limit, true))
    }

    fn hide_history(&mut self, id: i64) -> Result<bool, StoreError> {
        Ok(self.set_hidden(id, true))
    }

    fn hide_all_history(&mut self) -> Result<usize, StoreError> {
        let mut hidden = 0;
        for h in self.history.iter_mut().filter(|h| !h.record.hidden) {
            h.record.hidden = true;
            hidden += 1;
        }
        Ok(hidden)
    }

    fn unhide_history(&mut self, id: i64) -> Result<bool, StoreError> {
        Ok(self.set_hidden(id, false))
    }
}
