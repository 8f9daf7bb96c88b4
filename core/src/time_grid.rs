//! Date/time primitives shared by every other component: parsing,
//! half-open overlap checks, day-of-week tokens and ISO week keys.
//!
//! The half-open overlap convention is load-bearing: slots sharing an edge
//! (10:00-11:00 and 11:00-12:00) do not conflict. Every overlap check in the
//! core routes through [`overlaps`] so that convention can't drift.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::ScheduleError;

/// Sunday..Saturday, matching the spec's day ordering (index 0 = Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Sun = 0,
    Mon = 1,
    Tue = 2,
    Wed = 3,
    Thu = 4,
    Fri = 5,
    Sat = 6,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Sun,
        Day::Mon,
        Day::Tue,
        Day::Wed,
        Day::Thu,
        Day::Fri,
        Day::Sat,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_chrono(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Sun => Day::Sun,
            chrono::Weekday::Mon => Day::Mon,
            chrono::Weekday::Tue => Day::Tue,
            chrono::Weekday::Wed => Day::Wed,
            chrono::Weekday::Thu => Day::Thu,
            chrono::Weekday::Fri => Day::Fri,
            chrono::Weekday::Sat => Day::Sat,
        }
    }

    fn from_token(token: &str) -> Option<Day> {
        let lower = token.to_ascii_lowercase();
        Day::ALL.into_iter().find(|d| d.token() == lower)
    }

    pub fn token(self) -> &'static str {
        match self {
            Day::Sun => "sun",
            Day::Mon => "mon",
            Day::Tue => "tue",
            Day::Wed => "wed",
            Day::Thu => "thu",
            Day::Fri => "fri",
            Day::Sat => "sat",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// `dayToken(dow)`: three-letter token for a day index.
pub fn day_token(day: Day) -> &'static str {
    day.token()
}

/// `parseDayList(s)`: comma/semicolon separated day tokens, case-insensitive,
/// matched by prefix against "sun".."sat".
pub fn parse_day_list(s: &str) -> Result<BTreeSet<Day>, ScheduleError> {
    let mut days = BTreeSet::new();
    for raw in s.split([',', ';']) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let prefix: String = trimmed.chars().take(3).collect();
        match Day::from_token(&prefix) {
            Some(day) => {
                days.insert(day);
            }
            None => {
                return Err(ScheduleError::invalid(
                    "daysOfWeek",
                    format!("invalid day token `{trimmed}`"),
                ))
            }
        }
    }
    Ok(days)
}

/// `parseDate(s)`: strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ScheduleError::invalid("date", format!("invalid date `{s}`")))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `parseMinutes(s)`: `HH:MM`, 0-23:0-59, returned as minutes since local
/// midnight. Returns `Err` for a malformed string or an out-of-range hour
/// or minute.
pub fn parse_minutes(s: &str) -> Result<u32, ScheduleError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| ScheduleError::invalid("time", format!("invalid time `{s}`")))?;
    let h: u32 = h
        .parse()
        .map_err(|_| ScheduleError::invalid("time", format!("invalid time `{s}`")))?;
    let m: u32 = m
        .parse()
        .map_err(|_| ScheduleError::invalid("time", format!("invalid time `{s}`")))?;
    if h > 23 || m > 59 {
        return Err(ScheduleError::invalid(
            "time",
            format!("time `{s}` out of range"),
        ));
    }
    Ok(h * 60 + m)
}

pub fn format_minutes(total: u32) -> String {
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// `isValidRange(start,end)`: parses both times and checks `end > start`.
pub fn is_valid_range(start: &str, end: &str) -> Result<(u32, u32), ScheduleError> {
    let start_min = parse_minutes(start)?;
    let end_min = parse_minutes(end)?;
    if end_min <= start_min {
        return Err(ScheduleError::invalid(
            "endTime",
            format!("end `{end}` is not after start `{start}`"),
        ));
    }
    Ok((start_min, end_min))
}

/// `overlaps(aS,aE,bS,bE)`: half-open interval overlap. Touching edges do
/// not count as an overlap.
pub fn overlaps(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && b_start < a_end
}

/// `weekKey(date)`: `YYYY-Www`, ISO-like, Monday-based, first-four-day rule.
/// `NaiveDate::iso_week` already implements this rule (ISO 8601).
pub fn week_key(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{:04}-W{:02}", iso.year(), iso.week())
}

/// `inRange(d,from,to)`: inclusive containment.
pub fn in_range(date: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    from <= date && date <= to
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_half_open() {
        assert!(!overlaps(600, 660, 660, 720));
        assert!(overlaps(600, 661, 660, 720));
        assert!(overlaps(600, 720, 630, 690));
    }

    #[test]
    fn parses_day_list_case_insensitively() {
        let days = parse_day_list("Mon, WED,fri").unwrap();
        assert_eq!(days, BTreeSet::from([Day::Mon, Day::Wed, Day::Fri]));
    }

    #[test]
    fn rejects_bad_day_token() {
        assert!(parse_day_list("funday").is_err());
    }

    #[test]
    fn valid_range_requires_end_after_start() {
        assert!(is_valid_range("18:00", "18:00").is_err());
        assert_eq!(is_valid_range("18:00", "19:30").unwrap(), (1080, 1170));
    }

    #[test]
    fn week_key_is_monday_based_iso() {
        // 2025-04-07 is a Monday.
        let date = parse_date("2025-04-07").unwrap();
        assert_eq!(week_key(date), "2025-W15");
    }

    #[test]
    fn in_range_is_inclusive() {
        let a = parse_date("2025-04-14").unwrap();
        let b = parse_date("2025-04-20").unwrap();
        assert!(in_range(a, a, b));
        assert!(in_range(b, a, b));
        assert!(!in_range(parse_date("2025-04-21").unwrap(), a, b));
    }
}
