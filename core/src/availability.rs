//! AvailabilityExpander: turns recurring rules, exceptions and blackouts
//! into a concrete set of candidate slots over a date window.
//!
//! The expander never fails the whole batch on one bad input: an invalid
//! rule is skipped, an invalid exception is ignored (it does not suppress
//! the rule it belongs to).

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use log::debug;

use crate::model::{is_blacked_out, AvailabilityException, AvailabilityRule, BlackoutRange};
use crate::time_grid::{self, Day};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub game_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub start_min: u32,
    pub end_min: u32,
    pub field_key: String,
    pub division: String,
}

fn dedup_key(c: &Candidate) -> (NaiveDate, String, String, String) {
    (
        c.game_date,
        c.start_time.clone(),
        c.end_time.clone(),
        c.field_key.clone(),
    )
}

fn walk_slots(
    game_date: NaiveDate,
    field_key: &str,
    division: &str,
    start_min: u32,
    end_min: u32,
    game_length_minutes: u32,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut start = start_min;
    while start + game_length_minutes <= end_min {
        out.push(Candidate {
            game_date,
            start_time: time_grid::format_minutes(start),
            end_time: time_grid::format_minutes(start + game_length_minutes),
            start_min: start,
            end_min: start + game_length_minutes,
            field_key: field_key.to_string(),
            division: division.to_string(),
        });
        start += game_length_minutes;
    }
    out
}

/// Expand a set of active, rule-based recurrences over `[window_start,
/// window_end]`. `exceptions_by_rule` need only contain entries for rules
/// that actually have exceptions.
pub fn expand_rules(
    rules: &[AvailabilityRule],
    exceptions_by_rule: &HashMap<String, Vec<AvailabilityException>>,
    blackouts: &[BlackoutRange],
    window_start: NaiveDate,
    window_end: NaiveDate,
    game_length_minutes: u32,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for rule in rules {
        if !rule.is_active {
            continue;
        }
        let Ok((rule_start_min, rule_end_min)) = rule.validate() else {
            debug!("skipping invalid rule {}", rule.rule_id);
            continue;
        };

        let from = rule.starts_on.max(window_start);
        let to = rule.ends_on.min(window_end);
        if from > to {
            continue;
        }

        let empty_exceptions = Vec::new();
        let exceptions = exceptions_by_rule.get(&rule.rule_id).unwrap_or(&empty_exceptions);

        let mut date = from;
        while date <= to {
            if rule.days_of_week.contains(&Day::from_chrono(date.weekday()))
                && !is_blacked_out(date, blackouts)
                && !exceptions
                    .iter()
                    .any(|ex| ex.suppresses(date, rule_start_min, rule_end_min))
            {
                let division = rule
                    .division
                    .clone()
                    .or_else(|| rule.division_ids.first().cloned())
                    .unwrap_or_default();

                for candidate in walk_slots(
                    date,
                    &rule.field_key,
                    &division,
                    rule_start_min,
                    rule_end_min,
                    game_length_minutes,
                ) {
                    if seen.insert(dedup_key(&candidate)) {
                        out.push(candidate);
                    }
                }
            }
            date += Duration::days(1);
        }
    }

    out
}

/// Fixed-window generation: the same walk, driven directly by caller
/// supplied days/time/field rather than a stored rule.
#[allow(clippy::too_many_arguments)]
pub fn expand_fixed_window(
    field_key: &str,
    division: &str,
    days_of_week: &HashSet<Day>,
    start_time: &str,
    end_time: &str,
    date_from: NaiveDate,
    date_to: NaiveDate,
    blackouts: &[BlackoutRange],
    game_length_minutes: u32,
) -> Vec<Candidate> {
    let Ok((start_min, end_min)) = time_grid::is_valid_range(start_time, end_time) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut date = date_from;
    while date <= date_to {
        if days_of_week.contains(&Day::from_chrono(date.weekday())) && !is_blacked_out(date, blackouts)
        {
            for candidate in walk_slots(date, field_key, division, start_min, end_min, game_length_minutes)
            {
                if seen.insert(dedup_key(&candidate)) {
                    out.push(candidate);
                }
            }
        }
        date += Duration::days(1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecurrencePattern;
    use std::collections::BTreeSet;

    fn rule(starts: &str, ends: &str, days: &[Day]) -> AvailabilityRule {
        AvailabilityRule {
            rule_id: "R".into(),
            league_id: "L".into(),
            field_key: "park-a/field-1".into(),
            division: Some("10u".into()),
            division_ids: vec![],
            starts_on: time_grid::parse_date(starts).unwrap(),
            ends_on: time_grid::parse_date(ends).unwrap(),
            days_of_week: BTreeSet::from_iter(days.iter().copied()),
            start_time_local: "18:00".into(),
            end_time_local: "21:00".into(),
            recurrence_pattern: RecurrencePattern::Weekly,
            timezone: "America/Los_Angeles".into(),
            is_active: true,
        }
    }

    #[test]
    fn expands_mondays_into_hour_slots() {
        let r = rule("2025-04-07", "2025-04-28", &[Day::Mon]);
        let out = expand_rules(&[r], &HashMap::new(), &[], time_grid::parse_date("2025-04-01").unwrap(), time_grid::parse_date("2025-04-30").unwrap(), 60);
        // 4 Mondays x 3 slots/night
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|c| c.field_key == "park-a/field-1"));
    }

    #[test]
    fn exception_suppresses_one_date() {
        let r = rule("2025-04-07", "2025-04-28", &[Day::Mon]);
        let exception = AvailabilityException {
            exception_id: "E".into(),
            rule_id: "R".into(),
            date_from: time_grid::parse_date("2025-04-14").unwrap(),
            date_to: time_grid::parse_date("2025-04-14").unwrap(),
            start_time_local: "18:00".into(),
            end_time_local: "21:00".into(),
            reason: None,
        };
        let mut exceptions = HashMap::new();
        exceptions.insert("R".to_string(), vec![exception]);

        let out = expand_rules(&[r], &exceptions, &[], time_grid::parse_date("2025-04-01").unwrap(), time_grid::parse_date("2025-04-30").unwrap(), 60);
        assert_eq!(out.len(), 9);
        assert!(!out.iter().any(|c| c.game_date == time_grid::parse_date("2025-04-14").unwrap()));
    }

    #[test]
    fn blackout_removes_whole_range() {
        let r = rule("2025-04-01", "2025-04-30", &[Day::Mon]);
        let blackout = BlackoutRange::new(
            time_grid::parse_date("2025-04-14").unwrap(),
            time_grid::parse_date("2025-04-20").unwrap(),
        )
        .unwrap();
        let out = expand_rules(&[r], &HashMap::new(), &[blackout], time_grid::parse_date("2025-04-01").unwrap(), time_grid::parse_date("2025-04-30").unwrap(), 60);
        assert!(!out.iter().any(|c| c.game_date == time_grid::parse_date("2025-04-14").unwrap()));
    }

    #[test]
    fn invalid_rule_is_skipped_not_fatal() {
        let mut r = rule("2025-04-07", "2025-04-28", &[Day::Mon]);
        r.end_time_local = "17:00".into(); // end before start
        let out = expand_rules(&[r], &HashMap::new(), &[], time_grid::parse_date("2025-04-01").unwrap(), time_grid::parse_date("2025-04-30").unwrap(), 60);
        assert!(out.is_empty());
    }

    #[test]
    fn expansion_is_idempotent_across_split_windows() {
        let r = rule("2025-04-01", "2025-04-30", &[Day::Mon]);
        let whole = expand_rules(&[r.clone()], &HashMap::new(), &[], time_grid::parse_date("2025-04-01").unwrap(), time_grid::parse_date("2025-04-30").unwrap(), 60);

        let first = expand_rules(&[r.clone()], &HashMap::new(), &[], time_grid::parse_date("2025-04-01").unwrap(), time_grid::parse_date("2025-04-14").unwrap(), 60);
        let second = expand_rules(&[r], &HashMap::new(), &[], time_grid::parse_date("2025-04-15").unwrap(), time_grid::parse_date("2025-04-30").unwrap(), 60);
        let mut split = first;
        split.extend(second);

        let mut whole_sorted = whole;
        let mut split_sorted = split;
        whole_sorted.sort_by_key(|c| (c.game_date, c.start_min));
        split_sorted.sort_by_key(|c| (c.game_date, c.start_min));
        assert_eq!(whole_sorted, split_sorted);
    }
}
