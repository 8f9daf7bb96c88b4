//! SlotConflictIndex: an in-memory index of
//! `(fieldKey, gameDate) -> [(startMin,endMin)]` used for overlap detection
//! against the live, non-cancelled slot set.
//!
//! The index itself does not talk to a `Store`. Callers seed it with
//! whatever records they already fetched (see `wizard::load_conflict_index`
//! for the store-backed `load` operation below).

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::errors::ScheduleResult;
use crate::model::SlotStatus;
use crate::store::{SlotQuery, SlotStore};
use crate::time_grid::overlaps;

fn bucket_key(field_key: &str, date: NaiveDate) -> String {
    format!("{}|{}", field_key.to_lowercase(), date)
}

#[derive(Debug, Default, Clone)]
pub struct SlotConflictIndex {
    buckets: HashMap<String, Vec<(u32, u32)>>,
}

impl SlotConflictIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the index from already-filtered records: non-cancelled
    /// slots in the caller's window, with availability slots excluded
    /// unless the caller wants them (`includeAvailability`).
    pub fn seed<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (String, NaiveDate, u32, u32)>,
    {
        for (field_key, date, start, end) in records {
            self.add(&field_key, date, start, end);
        }
    }

    pub fn add(&mut self, field_key: &str, date: NaiveDate, start_min: u32, end_min: u32) {
        self.buckets
            .entry(bucket_key(field_key, date))
            .or_default()
            .push((start_min, end_min));
    }

    pub fn has_overlap(&self, field_key: &str, date: NaiveDate, start_min: u32, end_min: u32) -> bool {
        self.buckets
            .get(&bucket_key(field_key, date))
            .is_some_and(|ranges| ranges.iter().any(|&(s, e)| overlaps(start_min, end_min, s, e)))
    }

    /// How many existing ranges overlap `[start_min, end_min)`.
    pub fn conflict_count(&self, field_key: &str, date: NaiveDate, start_min: u32, end_min: u32) -> usize {
        self.buckets
            .get(&bucket_key(field_key, date))
            .map(|ranges| ranges.iter().filter(|&&(s, e)| overlaps(start_min, end_min, s, e)).count())
            .unwrap_or(0)
    }
}

/// `load(leagueId, fieldKey?, from, to)`: scan non-cancelled slots in the
/// window via the store and populate a fresh index.
pub async fn load(
    store: &dyn SlotStore,
    league_id: &str,
    field_key: Option<&str>,
    from: NaiveDate,
    to: NaiveDate,
    include_availability: bool,
) -> ScheduleResult<SlotConflictIndex> {
    let page = store
        .query(
            league_id,
            SlotQuery {
                field_key: field_key.map(|s| s.to_string()),
                date_from: Some(from),
                date_to: Some(to),
                ..Default::default()
            },
        )
        .await?;

    let mut index = SlotConflictIndex::new();
    for slot in page.slots {
        if slot.status == SlotStatus::Cancelled {
            continue;
        }
        if slot.is_availability && !include_availability {
            continue;
        }
        index.add(&slot.field_key, slot.game_date, slot.start_min, slot.end_min);
    }
    Ok(index)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditConflictReport {
    pub conflict_count: usize,
    pub accepted: bool,
}

/// Slot-edit conflict detection: load the live slot set for `field_key` on
/// `date` (excluding the slot being edited itself) and check whether the
/// proposed `[start_min, end_min)` would overlap it.
#[allow(clippy::too_many_arguments)]
pub async fn check_edit(
    store: &dyn SlotStore,
    league_id: &str,
    field_key: &str,
    date: NaiveDate,
    exclude_slot_id: &str,
    start_min: u32,
    end_min: u32,
    include_availability: bool,
) -> ScheduleResult<EditConflictReport> {
    let existing = store.list_by_field_and_date(league_id, field_key, date).await?;

    let mut index = SlotConflictIndex::new();
    for slot in &existing {
        if slot.slot_id == exclude_slot_id || slot.status == SlotStatus::Cancelled {
            continue;
        }
        if slot.is_availability && !include_availability {
            continue;
        }
        index.add(&slot.field_key, slot.game_date, slot.start_min, slot.end_min);
    }

    let conflict_count = index.conflict_count(field_key, date, start_min, end_min);
    Ok(EditConflictReport {
        conflict_count,
        accepted: conflict_count == 0,
    })
}

/// A location+payload pair to run through [`split_by_overlap`]. `T` is
/// whatever the caller wants to carry through (a slot id, a full
/// `Candidate`, ...).
#[derive(Debug, Clone)]
pub struct ConflictCandidate<T> {
    pub field_key: String,
    pub game_date: NaiveDate,
    pub start_min: u32,
    pub end_min: u32,
    pub payload: T,
}

/// `splitByOverlap`: order-sensitive, total. A candidate conflicts with
/// either the preloaded index or an earlier candidate in this same batch
/// (accepted candidates are folded back into the index as they go, so
/// duplicates within one batch also conflict with each other).
pub fn split_by_overlap<T>(
    index: &mut SlotConflictIndex,
    candidates: Vec<ConflictCandidate<T>>,
) -> (Vec<ConflictCandidate<T>>, Vec<ConflictCandidate<T>>) {
    let mut accepted = Vec::new();
    let mut conflicts = Vec::new();

    for candidate in candidates {
        if index.has_overlap(
            &candidate.field_key,
            candidate.game_date,
            candidate.start_min,
            candidate.end_min,
        ) {
            conflicts.push(candidate);
        } else {
            index.add(
                &candidate.field_key,
                candidate.game_date,
                candidate.start_min,
                candidate.end_min,
            );
            accepted.push(candidate);
        }
    }

    (accepted, conflicts)
}
