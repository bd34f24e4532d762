//! The ordered collection of entries.
//!
//! A [`Schedule`] is always sorted by `(date, start)` and never contains
//! overlapping entries. Every slot carries an [`EntryId`] that is stable for as
//! long as the entry stays in the schedule, so the playback state can follow an
//! entry through inserts and removals instead of relying on its position.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::conflict::{Conflict, find_conflicts, find_conflicts_with};
use crate::entry::Entry;

/// In-memory identity of a scheduled entry. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An entry together with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: EntryId,
    pub entry: Entry,
}

/// A label change at an unchanged `(date, start)` between two schedule versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelRename {
    pub from: String,
    pub to: String,
}

/// Sorted, conflict-free sequence of entries.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    slots: Vec<Slot>,
    next_id: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schedule from a candidate batch.
    ///
    /// Fails with every conflicting pair if the batch overlaps itself. Positions
    /// in the returned conflicts refer to the batch as given.
    pub fn from_entries(entries: Vec<Entry>) -> Result<Self, Vec<Conflict>> {
        let mut schedule = Self::new();
        schedule.replace_all(entries)?;
        Ok(schedule)
    }

    /// Replaces every entry with the candidate batch, or leaves the schedule
    /// untouched and returns all conflicts.
    pub fn replace_all(&mut self, mut entries: Vec<Entry>) -> Result<(), Vec<Conflict>> {
        let conflicts = find_conflicts(&entries);
        if !conflicts.is_empty() {
            return Err(conflicts);
        }
        entries.sort_by_key(Entry::sort_key);
        self.slots = entries
            .into_iter()
            .map(|entry| Slot {
                id: self.allocate_id(),
                entry,
            })
            .collect();
        Ok(())
    }

    /// Inserts a single entry in sorted position after checking it against the
    /// existing entries.
    pub fn add_one(&mut self, entry: Entry) -> Result<EntryId, Vec<Conflict>> {
        let conflicts = find_conflicts_with(&entry, self.entries());
        if !conflicts.is_empty() {
            return Err(conflicts);
        }
        let position = self
            .slots
            .partition_point(|slot| slot.entry.sort_key() <= entry.sort_key());
        let id = self.allocate_id();
        self.slots.insert(position, Slot { id, entry });
        Ok(id)
    }

    /// Removes the entries at the given positions.
    ///
    /// Duplicate positions are collapsed. Returns the removed slots in schedule
    /// order, or the first out-of-range position without removing anything.
    pub fn remove(&mut self, positions: &[usize]) -> Result<Vec<Slot>, usize> {
        let positions: BTreeSet<usize> = positions.iter().copied().collect();
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.slots.len()) {
            return Err(bad);
        }
        let mut removed = Vec::with_capacity(positions.len());
        for &position in positions.iter().rev() {
            removed.push(self.slots.remove(position));
        }
        removed.reverse();
        Ok(removed)
    }

    /// Removes an entry by identity.
    pub fn remove_id(&mut self, id: EntryId) -> Option<Slot> {
        let position = self.position(id)?;
        Some(self.slots.remove(position))
    }

    /// Replaces an entry in place. The replacement must keep the same
    /// `(date, start)` so the ordering is preserved.
    pub fn update(&mut self, id: EntryId, entry: Entry) -> bool {
        match self.slots.iter_mut().find(|slot| slot.id == id) {
            Some(slot) if slot.entry.sort_key() == entry.sort_key() => {
                slot.entry = entry;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().map(|slot| &slot.entry)
    }

    /// Entries in canonical order, as handed to persistence.
    pub fn to_entries(&self) -> Vec<Entry> {
        self.entries().cloned().collect()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.slots
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| &slot.entry)
    }

    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == id)
    }

    /// Finds the slot starting at the given `(date, start)`.
    pub fn find_at(&self, date: NaiveDate, start: NaiveTime) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|slot| slot.entry.sort_key() == (date, start))
    }

    /// The entry immediately after `id` in schedule order.
    pub fn successor(&self, id: EntryId) -> Option<&Slot> {
        let position = self.position(id)?;
        self.slots.get(position + 1)
    }

    /// Slots scheduled to start on the given calendar date.
    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(move |slot| slot.entry.date() == date)
    }

    /// Sorted distinct dates that have at least one entry.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.entries().map(Entry::date).collect();
        dates.dedup();
        dates
    }

    const fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Finds slots whose label changed while keeping the same `(date, start)`.
pub fn renamed_labels<'a>(
    before: &Schedule,
    after: impl IntoIterator<Item = &'a Entry>,
) -> Vec<LabelRename> {
    let previous: HashMap<(NaiveDate, NaiveTime), &str> = before
        .entries()
        .map(|entry| (entry.sort_key(), entry.label()))
        .collect();
    after
        .into_iter()
        .filter_map(|entry| {
            let old = previous.get(&entry.sort_key())?;
            (*old != entry.label()).then(|| LabelRename {
                from: (*old).to_string(),
                to: entry.label().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: &str, start: &str, end: &str, label: &str) -> Entry {
        Entry::parse(date, start, end, label).unwrap()
    }

    fn labels(schedule: &Schedule) -> Vec<&str> {
        schedule.entries().map(Entry::label).collect()
    }

    fn sample() -> Schedule {
        Schedule::from_entries(vec![
            entry("2026-07-10", "21:00", "22:00", "C"),
            entry("2026-07-10", "18:00", "19:00", "A"),
            entry("2026-07-11", "14:00", "15:00", "D"),
            entry("2026-07-10", "19:30", "21:00", "B"),
        ])
        .unwrap()
    }

    #[test]
    fn test_replace_all_sorts_by_date_and_start() {
        assert_eq!(labels(&sample()), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_replace_all_with_conflicts_is_atomic() {
        let mut schedule = sample();
        let before: Vec<Entry> = schedule.to_entries();

        let result = schedule.replace_all(vec![
            entry("2026-07-12", "10:00", "11:00", "Valid"),
            entry("2026-07-12", "12:00", "13:00", "Clash 1"),
            entry("2026-07-12", "12:30", "13:30", "Clash 2"),
        ]);

        let conflicts = result.unwrap_err();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entry.label, "Clash 2");
        assert_eq!(conflicts[0].other.label, "Clash 1");
        assert_eq!(schedule.to_entries(), before);
    }

    #[test]
    fn test_add_one_inserts_in_sorted_position() {
        let mut schedule = sample();

        schedule
            .add_one(entry("2026-07-10", "22:00", "23:00", "C2"))
            .unwrap();

        assert_eq!(labels(&schedule), vec!["A", "B", "C", "C2", "D"]);
    }

    #[test]
    fn test_add_one_rejects_overlap_with_existing() {
        let mut schedule = sample();

        let conflicts = schedule
            .add_one(entry("2026-07-10", "20:30", "21:30", "X"))
            .unwrap_err();

        let others: Vec<&str> = conflicts.iter().map(|c| c.other.label.as_str()).collect();
        assert_eq!(others, vec!["B", "C"]);
        assert_eq!(schedule.len(), 4);
    }

    #[test]
    fn test_ids_survive_insertions() {
        let mut schedule = sample();
        let c_id = schedule.slots()[2].id;

        schedule
            .add_one(entry("2026-07-10", "12:00", "13:00", "Early"))
            .unwrap();

        assert_eq!(schedule.get(c_id).unwrap().label(), "C");
        assert_eq!(schedule.position(c_id), Some(3));
    }

    #[test]
    fn test_remove_by_positions() {
        let mut schedule = sample();

        let removed = schedule.remove(&[2, 0, 2]).unwrap();

        let removed: Vec<&str> = removed.iter().map(|s| s.entry.label()).collect();
        assert_eq!(removed, vec!["A", "C"]);
        assert_eq!(labels(&schedule), vec!["B", "D"]);
    }

    #[test]
    fn test_remove_out_of_range_removes_nothing() {
        let mut schedule = sample();

        assert_eq!(schedule.remove(&[1, 9]), Err(9));
        assert_eq!(schedule.len(), 4);
    }

    #[test]
    fn test_update_refuses_to_move_entry() {
        let mut schedule = sample();
        let id = schedule.slots()[0].id;

        let moved = entry("2026-07-10", "18:30", "19:00", "A");
        assert!(!schedule.update(id, moved));

        let longer = schedule.get(id).unwrap().with_duration(75).unwrap();
        assert!(schedule.update(id, longer));
        assert_eq!(schedule.get(id).unwrap().duration(), 75);
    }

    #[test]
    fn test_successor_crosses_dates() {
        let schedule = sample();
        let c = schedule.slots()[2].id;
        let d = schedule.slots()[3].id;

        assert_eq!(schedule.successor(c).unwrap().entry.label(), "D");
        assert!(schedule.successor(d).is_none());
    }

    #[test]
    fn test_dates_are_sorted_and_distinct() {
        let dates: Vec<String> = sample().dates().iter().map(ToString::to_string).collect();
        assert_eq!(dates, vec!["2026-07-10", "2026-07-11"]);
    }

    #[test]
    fn test_renamed_labels_matches_on_date_and_start() {
        let before = sample();
        let after = [
            entry("2026-07-10", "18:00", "19:00", "A"),
            entry("2026-07-10", "19:30", "21:00", "B renamed"),
            entry("2026-07-10", "21:15", "22:00", "C moved"),
        ];

        let renames = renamed_labels(&before, &after);

        assert_eq!(
            renames,
            vec![LabelRename {
                from: "B".to_string(),
                to: "B renamed".to_string()
            }]
        );
    }
}
