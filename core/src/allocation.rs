//! `FieldAvailabilityAllocation` import: enforces the no-overlap rule ("no
//! two active allocations for the same `fieldKey` may have overlapping
//! `(dateRange ∩ dayOfWeek ∩ timeRange)`") at import time, and partitions
//! accepted records into batches of at most 100 keyed by the field, the
//! natural partition key for this write path.
//!
//! Actual CSV parsing is out of scope here; this module only owns the
//! contract the core must enforce once records have been parsed.

use std::collections::HashMap;

use crate::errors::ScheduleError;
use crate::model::FieldAvailabilityAllocation;
use crate::time_grid;

/// Writer batches top out at 100 operations.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub accepted: Vec<FieldAvailabilityAllocation>,
    pub rejected: Vec<(FieldAvailabilityAllocation, ScheduleError)>,
}

fn date_ranges_intersect(a: &FieldAvailabilityAllocation, b: &FieldAvailabilityAllocation) -> bool {
    a.starts_on <= b.ends_on && b.starts_on <= a.ends_on
}

fn time_ranges_overlap(a: &FieldAvailabilityAllocation, b: &FieldAvailabilityAllocation) -> bool {
    let (Ok((a_start, a_end)), Ok((b_start, b_end))) = (
        time_grid::is_valid_range(&a.start_time_local, &a.end_time_local),
        time_grid::is_valid_range(&b.start_time_local, &b.end_time_local),
    ) else {
        return false;
    };
    time_grid::overlaps(a_start, a_end, b_start, b_end)
}

fn conflicts(a: &FieldAvailabilityAllocation, b: &FieldAvailabilityAllocation) -> bool {
    date_ranges_intersect(a, b) && !a.days_of_week.is_disjoint(&b.days_of_week) && time_ranges_overlap(a, b)
}

/// Import a batch of allocations against the caller's already-active set.
/// An inactive incoming record is accepted unconditionally (it cannot
/// collide with anything). Within the incoming batch, earlier accepted
/// records also guard later ones, same order-sensitivity as
/// [`crate::conflict_index::split_by_overlap`].
pub fn import(
    existing: &[FieldAvailabilityAllocation],
    incoming: Vec<FieldAvailabilityAllocation>,
) -> ImportOutcome {
    let mut active_by_field: HashMap<String, Vec<FieldAvailabilityAllocation>> = HashMap::new();
    for allocation in existing.iter().filter(|a| a.is_active) {
        active_by_field
            .entry(allocation.field_key.clone())
            .or_default()
            .push(allocation.clone());
    }

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for allocation in incoming {
        if !allocation.is_active {
            accepted.push(allocation);
            continue;
        }
        if time_grid::is_valid_range(&allocation.start_time_local, &allocation.end_time_local).is_err() {
            rejected.push((
                allocation.clone(),
                ScheduleError::invalid("startTimeLocal", "invalid allocation time range"),
            ));
            continue;
        }

        let bucket = active_by_field.entry(allocation.field_key.clone()).or_default();
        if bucket.iter().any(|other| conflicts(&allocation, other)) {
            rejected.push((
                allocation,
                ScheduleError::invalid("allocation", "overlaps an existing active allocation for this field"),
            ));
        } else {
            bucket.push(allocation.clone());
            accepted.push(allocation);
        }
    }

    ImportOutcome { accepted, rejected }
}

/// Partition accepted allocations into writer batches, grouped by `fieldKey`
/// and capped at [`MAX_BATCH_SIZE`].
pub fn batch_by_field_key(allocations: &[FieldAvailabilityAllocation]) -> Vec<Vec<FieldAvailabilityAllocation>> {
    let mut by_field: HashMap<&str, Vec<FieldAvailabilityAllocation>> = HashMap::new();
    for allocation in allocations {
        by_field.entry(allocation.field_key.as_str()).or_default().push(allocation.clone());
    }

    let mut batches = Vec::new();
    for (_field_key, group) in by_field {
        for chunk in group.chunks(MAX_BATCH_SIZE) {
            batches.push(chunk.to_vec());
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AllocationScope, SlotType};
    use crate::time_grid::{parse_date, Day};
    use std::collections::BTreeSet;

    fn allocation(field_key: &str, starts: &str, ends: &str, days: &[Day], start_t: &str, end_t: &str) -> FieldAvailabilityAllocation {
        FieldAvailabilityAllocation {
            allocation_id: "a1".into(),
            league_id: "L".into(),
            scope: AllocationScope::League,
            field_key: field_key.into(),
            starts_on: parse_date(starts).unwrap(),
            ends_on: parse_date(ends).unwrap(),
            days_of_week: BTreeSet::from_iter(days.iter().copied()),
            start_time_local: start_t.into(),
            end_time_local: end_t.into(),
            slot_type: SlotType::Game,
            priority_rank: None,
            is_active: true,
        }
    }

    #[test]
    fn overlapping_allocation_is_rejected() {
        let existing = vec![allocation("park-a/field-1", "2025-04-01", "2025-06-01", &[Day::Mon], "18:00", "21:00")];
        let incoming = vec![allocation("park-a/field-1", "2025-04-15", "2025-04-15", &[Day::Mon], "19:00", "20:00")];
        let outcome = import(&existing, incoming);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn disjoint_day_of_week_is_accepted() {
        let existing = vec![allocation("park-a/field-1", "2025-04-01", "2025-06-01", &[Day::Mon], "18:00", "21:00")];
        let incoming = vec![allocation("park-a/field-1", "2025-04-01", "2025-06-01", &[Day::Tue], "18:00", "21:00")];
        let outcome = import(&existing, incoming);
        assert_eq!(outcome.accepted.len(), 1);
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn batches_are_capped_at_max_size() {
        let allocations: Vec<_> = (0..250)
            .map(|i| {
                let mut a = allocation("park-a/field-1", "2025-04-01", "2025-04-01", &[Day::Mon], "18:00", "19:00");
                a.allocation_id = format!("a{i}");
                a
            })
            .collect();
        let batches = batch_by_field_key(&allocations);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() <= MAX_BATCH_SIZE));
    }
}
