//! Storage layer for the stage timer.
//!
//! Provides persistence for the schedule, history, settings and display
//! assets using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The engine owns its store and is itself shared behind a `Mutex`, which serializes
//! every access to the connection.
//!
//! # Schema
//!
//! Dates are stored as `YYYY-MM-DD`, times of day as `HH:MM` and instants as
//! local `YYYY-MM-DDTHH:MM:SS` TEXT, so lexicographic ordering matches
//! chronological ordering.
//!
//! The `entries` table is rewritten as a whole on every schedule change. Only
//! `date`, `start_time`, `duration` and `label` are read back; `end_time` and
//! `end_date` are derived and stored for people inspecting the file.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension, params};
use st_core::entry::{ValidationError, hhmm};
use st_core::{Entry, HistoryQuery, HistoryRecord, ScheduleStore, StoreError, StoredHistory};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";
const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored schedule row no longer forms a valid entry.
    #[error("invalid entry row {id}: {source}")]
    InvalidEntry {
        id: i64,
        #[source]
        source: ValidationError,
    },
    /// A stored date, time or timestamp could not be parsed.
    #[error("invalid {column} in {table} row {id}: {value}")]
    InvalidValue {
        table: &'static str,
        column: &'static str,
        id: i64,
        value: String,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::new(err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A display asset reference attached to an entry label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub label: String,
    pub asset: String,
    pub updated_at: String,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Schedule: one row per entry, rewritten on every change
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                label TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                end_date TEXT NOT NULL,
                duration INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_date_start ON entries(date, start_time);

            -- History: finished entries, soft-deleted through `hidden`
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL,
                scheduled_date TEXT NOT NULL,
                scheduled_start TEXT NOT NULL,
                scheduled_end TEXT NOT NULL,
                actual_start TEXT NOT NULL,
                actual_end TEXT NOT NULL,
                duration INTEGER NOT NULL,
                hidden INTEGER NOT NULL DEFAULT 0,
                recorded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S', 'now', 'localtime'))
            );

            CREATE INDEX IF NOT EXISTS idx_history_hidden ON history(hidden);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Display assets (logos) keyed by entry label
            CREATE TABLE IF NOT EXISTS entry_assets (
                label TEXT PRIMARY KEY,
                asset TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S', 'now', 'localtime'))
            );
            ",
        )?;
        Ok(())
    }

    /// Lists the stored schedule ordered by date then start time.
    pub fn list_entries(&self) -> Result<Vec<Entry>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, date, start_time, duration, label
            FROM entries
            ORDER BY date ASC, start_time ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, date, start, duration, label) = row?;
            let date = parse_date("entries", "date", id, &date)?;
            let start = parse_time("entries", "start_time", id, &start)?;
            let entry = Entry::with_duration_from(date, start, duration, label)
                .map_err(|source| DbError::InvalidEntry { id, source })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Replaces the stored schedule in one transaction.
    pub fn write_entries(&mut self, entries: &[Entry]) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM entries", [])?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO entries (date, label, start_time, end_time, end_date, duration)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.date().format(DATE_FORMAT).to_string(),
                    entry.label(),
                    entry.start().format(hhmm::FORMAT).to_string(),
                    entry.end().format(hhmm::FORMAT).to_string(),
                    entry.end_date().format(DATE_FORMAT).to_string(),
                    entry.duration(),
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(entries = entries.len(), "schedule written");
        Ok(())
    }

    /// Appends one history record and returns its id.
    pub fn insert_history(&self, record: &HistoryRecord) -> Result<i64, DbError> {
        self.conn.execute(
            "
            INSERT INTO history
            (label, scheduled_date, scheduled_start, scheduled_end, actual_start, actual_end, duration, hidden)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                record.label,
                record.scheduled_date.format(DATE_FORMAT).to_string(),
                record.scheduled_start.format(hhmm::FORMAT).to_string(),
                record.scheduled_end.format(hhmm::FORMAT).to_string(),
                record.actual_start.format(INSTANT_FORMAT).to_string(),
                record.actual_end.format(INSTANT_FORMAT).to_string(),
                record.duration,
                record.hidden,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Lists history newest first, optionally including hidden records.
    pub fn list_history(&self, limit: usize, include_hidden: bool) -> Result<Vec<StoredHistory>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "
            SELECT id, label, scheduled_date, scheduled_start, scheduled_end,
                   actual_start, actual_end, duration, hidden, recorded_at
            FROM history
            WHERE hidden = 0 OR ?1
            ORDER BY id DESC
            LIMIT ?2
            ",
        )?;
        let rows = stmt.query_map(params![include_hidden, limit], |row| {
            Ok(HistoryRow {
                id: row.get(0)?,
                label: row.get(1)?,
                scheduled_date: row.get(2)?,
                scheduled_start: row.get(3)?,
                scheduled_end: row.get(4)?,
                actual_start: row.get(5)?,
                actual_end: row.get(6)?,
                duration: row.get(7)?,
                hidden: row.get(8)?,
                recorded_at: row.get(9)?,
            })
        })?;
        let mut history = Vec::new();
        for row in rows {
            history.push(row?.into_stored()?);
        }
        Ok(history)
    }

    /// Sets the hidden flag on one record. Returns whether the flag changed.
    pub fn set_history_hidden(&self, id: i64, hidden: bool) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE history SET hidden = ?1 WHERE id = ?2 AND hidden != ?1",
            params![hidden, id],
        )?;
        Ok(changed > 0)
    }

    /// Hides every visible record.
    pub fn hide_all(&self) -> Result<usize, DbError> {
        Ok(self
            .conn
            .execute("UPDATE history SET hidden = 1 WHERE hidden = 0", [])?)
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| row.get(0))
            .optional()?)
    }

    /// Inserts or overwrites a setting.
    pub fn put_setting(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            ",
            params![key, value],
        )?;
        Ok(())
    }

    /// Attaches a display asset to a label, replacing any previous one.
    pub fn set_asset(&self, label: &str, asset: &str) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO entry_assets (label, asset) VALUES (?1, ?2)
            ON CONFLICT(label) DO UPDATE SET
                asset = excluded.asset,
                updated_at = strftime('%Y-%m-%dT%H:%M:%S', 'now', 'localtime')
            ",
            params![label, asset],
        )?;
        Ok(())
    }

    /// Detaches the asset of a label. Returns whether one existed.
    pub fn remove_asset(&self, label: &str) -> Result<bool, DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM entry_assets WHERE label = ?", [label])?;
        Ok(removed > 0)
    }

    pub fn get_asset(&self, label: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT asset FROM entry_assets WHERE label = ?",
                [label],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Lists every asset ordered by label.
    pub fn list_assets(&self) -> Result<Vec<AssetRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT label, asset, updated_at FROM entry_assets ORDER BY label ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(AssetRecord {
                label: row.get(0)?,
                asset: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        let mut assets = Vec::new();
        for row in rows {
            assets.push(row?);
        }
        Ok(assets)
    }

    /// Moves the asset of `from` to `to`, replacing any asset `to` already had.
    pub fn move_asset(&mut self, from: &str, to: &str) -> Result<bool, DbError> {
        let tx = self.conn.transaction()?;
        let asset: Option<String> = tx
            .query_row(
                "SELECT asset FROM entry_assets WHERE label = ?",
                [from],
                |row| row.get(0),
            )
            .optional()?;
        let Some(asset) = asset else {
            return Ok(false);
        };
        tx.execute("DELETE FROM entry_assets WHERE label = ?", [from])?;
        tx.execute(
            "INSERT OR REPLACE INTO entry_assets (label, asset) VALUES (?, ?)",
            params![to, asset],
        )?;
        tx.commit()?;
        Ok(true)
    }
}

impl ScheduleStore for Database {
    fn load_entries(&self) -> Result<Vec<Entry>, StoreError> {
        Ok(self.list_entries()?)
    }

    fn replace_entries(&mut self, entries: &[Entry]) -> Result<(), StoreError> {
        Ok(self.write_entries(entries)?)
    }

    fn append_history(&mut self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.insert_history(record)?;
        Ok(())
    }

    fn setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_setting(key)?)
    }

    fn set_setting(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.put_setting(key, value)?)
    }

    fn asset_for(&self, label: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_asset(label)?)
    }

    fn rename_asset(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        self.move_asset(from, to)?;
        Ok(())
    }
}

impl HistoryQuery for Database {
    fn visible_history(&self, limit: usize) -> Result<Vec<StoredHistory>, StoreError> {
        Ok(self.list_history(limit, false)?)
    }

    fn all_history(&self, limit: usize) -> Result<Vec<StoredHistory>, StoreError> {
        Ok(self.list_history(limit, true)?)
    }

    fn hide_history(&mut self, id: i64) -> Result<bool, StoreError> {
        Ok(self.set_history_hidden(id, true)?)
    }

    fn hide_all_history(&mut self) -> Result<usize, StoreError> {
        Ok(self.hide_all()?)
    }

    fn unhide_history(&mut self, id: i64) -> Result<bool, StoreError> {
        Ok(self.set_history_hidden(id, false)?)
    }
}

struct HistoryRow {
    id: i64,
    label: String,
    scheduled_date: String,
    scheduled_start: String,
    scheduled_end: String,
    actual_start: String,
    actual_end: String,
    duration: i64,
    hidden: bool,
    recorded_at: String,
}

impl HistoryRow {
    fn into_stored(self) -> Result<StoredHistory, DbError> {
        let id = self.id;
        Ok(StoredHistory {
            id,
            recorded_at: parse_instant("recorded_at", id, &self.recorded_at)?,
            record: HistoryRecord {
                scheduled_date: parse_date("history", "scheduled_date", id, &self.scheduled_date)?,
                scheduled_start: parse_time("history", "scheduled_start", id, &self.scheduled_start)?,
                scheduled_end: parse_time("history", "scheduled_end", id, &self.scheduled_end)?,
                actual_start: parse_instant("actual_start", id, &self.actual_start)?,
                actual_end: parse_instant("actual_end", id, &self.actual_end)?,
                label: self.label,
                duration: self.duration,
                hidden: self.hidden,
            },
        })
    }
}

fn parse_date(table: &'static str, column: &'static str, id: i64, value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| DbError::InvalidValue {
        table,
        column,
        id,
        value: value.to_string(),
    })
}

fn parse_time(table: &'static str, column: &'static str, id: i64, value: &str) -> Result<NaiveTime, DbError> {
    NaiveTime::parse_from_str(value, hhmm::FORMAT).map_err(|_| DbError::InvalidValue {
        table,
        column,
        id,
        value: value.to_string(),
    })
}

fn parse_instant(column: &'static str, id: i64, value: &str) -> Result<NaiveDateTime, DbError> {
    NaiveDateTime::parse_from_str(value, INSTANT_FORMAT).map_err(|_| DbError::InvalidValue {
        table: "history",
        column,
        id,
        value: value.to_string(),
    })
}
