//! The data model from DATA MODEL: leagues, divisions, teams, fields,
//! availability rules/exceptions, allocations, slots and the scheduling
//! outputs derived from them.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ScheduleError;
use crate::time_grid::{self, Day};

/// `[A-Za-z0-9._-]+`, no path separators, no control characters.
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

pub fn validate_identifier(field: &str, s: &str) -> Result<(), ScheduleError> {
    if is_valid_identifier(s) {
        Ok(())
    } else {
        Err(ScheduleError::invalid(
            field,
            format!("`{s}` is not a valid identifier"),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeagueStatus {
    Active,
    Disabled,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub league_id: String,
    pub name: String,
    pub timezone: String,
    pub status: LeagueStatus,
    pub contact: String,
    pub season_config: SeasonConfig,
}

/// A date range during which no slots may be generated or confirmed.
/// `endDate >= startDate`; a date is blacked out iff it lies in any range,
/// inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub label: Option<String>,
}

impl BlackoutRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, ScheduleError> {
        if end_date < start_date {
            return Err(ScheduleError::invalid(
                "endDate",
                "blackout endDate precedes startDate",
            ));
        }
        Ok(Self {
            start_date,
            end_date,
            label: None,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        time_grid::in_range(date, self.start_date, self.end_date)
    }
}

pub fn is_blacked_out(date: NaiveDate, blackouts: &[BlackoutRange]) -> bool {
    blackouts.iter().any(|b| b.contains(date))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonConfig {
    pub spring_start: Option<NaiveDate>,
    pub spring_end: Option<NaiveDate>,
    pub fall_start: Option<NaiveDate>,
    pub fall_end: Option<NaiveDate>,
    pub game_length_minutes: u32,
    pub blackouts: Vec<BlackoutRange>,
}

impl SeasonConfig {
    /// The effective blackout set when a division override and a field's own
    /// blackouts both exist: their union.
    pub fn effective_blackouts(
        &self,
        division_override: Option<&SeasonConfig>,
        field_blackouts: &[BlackoutRange],
    ) -> Vec<BlackoutRange> {
        let mut all = self.blackouts.clone();
        if let Some(division) = division_override {
            all.extend(division.blackouts.clone());
        }
        all.extend(field_blackouts.iter().cloned());
        all
    }

    /// Division override if `>0`, else the league value.
    pub fn effective_game_length(&self, division_override: Option<u32>) -> u32 {
        match division_override {
            Some(v) if v > 0 => v,
            _ => self.game_length_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Division {
    pub league_id: String,
    pub code: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub league_id: String,
    pub division: String,
    pub team_id: String,
    pub name: String,
    pub primary_contact: String,
    pub assistant_coaches: Vec<String>,
    pub onboarding_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub league_id: String,
    pub park_code: String,
    pub field_code: String,
    pub park_name: String,
    pub field_name: String,
    pub display_name: String,
    pub is_active: bool,
    pub blackouts: Vec<BlackoutRange>,
    pub address: Option<String>,
}

impl Field {
    pub fn field_key(&self) -> String {
        field_key(&self.park_code, &self.field_code)
    }
}

/// `parkCode/fieldCode`, the canonical field identifier.
pub fn field_key(park_code: &str, field_code: &str) -> String {
    format!("{park_code}/{field_code}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrencePattern {
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub rule_id: String,
    pub league_id: String,
    pub field_key: String,
    pub division: Option<String>,
    pub division_ids: Vec<String>,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub days_of_week: BTreeSet<Day>,
    pub start_time_local: String,
    pub end_time_local: String,
    pub recurrence_pattern: RecurrencePattern,
    pub timezone: String,
    pub is_active: bool,
}

impl AvailabilityRule {
    pub fn validate(&self) -> Result<(u32, u32), ScheduleError> {
        if self.starts_on > self.ends_on {
            return Err(ScheduleError::invalid(
                "startsOn",
                "rule startsOn is after endsOn",
            ));
        }
        if self.days_of_week.is_empty() {
            return Err(ScheduleError::invalid(
                "daysOfWeek",
                "rule has no days of week",
            ));
        }
        time_grid::is_valid_range(&self.start_time_local, &self.end_time_local)
    }

    /// A rule applies to `division` iff `self.division` matches, or
    /// `self.division` is empty and `division_ids` is empty or contains the
    /// target.
    pub fn applies_to_division(&self, division: &str) -> bool {
        match &self.division {
            Some(d) if !d.is_empty() => d == division,
            _ => self.division_ids.is_empty() || self.division_ids.iter().any(|d| d == division),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityException {
    pub exception_id: String,
    pub rule_id: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub start_time_local: String,
    pub end_time_local: String,
    pub reason: Option<String>,
}

impl AvailabilityException {
    /// Whether this exception suppresses a rule occurrence on `date` given
    /// the rule's own time range: the exception's date range must cover
    /// `date` *and* its time range must overlap the rule's.
    pub fn suppresses(&self, date: NaiveDate, rule_start_min: u32, rule_end_min: u32) -> bool {
        if !time_grid::in_range(date, self.date_from, self.date_to) {
            return false;
        }
        let (Ok(ex_start), Ok(ex_end)) = (
            time_grid::parse_minutes(&self.start_time_local),
            time_grid::parse_minutes(&self.end_time_local),
        ) else {
            return false;
        };
        time_grid::overlaps(rule_start_min, rule_end_min, ex_start, ex_end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotType {
    Practice,
    Game,
    Both,
}

impl SlotType {
    /// 0 for game/both, 1 for practice; lower sorts first when ordering
    /// slots for assignment.
    pub fn scheduling_priority(self) -> u8 {
        match self {
            SlotType::Game | SlotType::Both => 0,
            SlotType::Practice => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationScope {
    League,
    Division(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAvailabilityAllocation {
    pub allocation_id: String,
    pub league_id: String,
    pub scope: AllocationScope,
    pub field_key: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub days_of_week: BTreeSet<Day>,
    pub start_time_local: String,
    pub end_time_local: String,
    pub slot_type: SlotType,
    pub priority_rank: Option<u32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Open,
    Confirmed,
    Cancelled,
}

pub const AVAILABLE_OFFERING_TEAM: &str = "AVAILABLE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: String,
    pub league_id: String,
    pub division: String,
    pub game_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub start_min: u32,
    pub end_min: u32,
    pub field_key: String,
    pub park_name: String,
    pub field_name: String,
    pub display_name: String,
    pub offering_team_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub is_availability: bool,
    pub is_external_offer: bool,
    pub status: SlotStatus,
    pub schedule_run_id: Option<String>,
    pub game_type: SlotType,
    pub created_utc: chrono::DateTime<chrono::Utc>,
    pub updated_utc: chrono::DateTime<chrono::Utc>,
    pub updated_by: String,
    pub version: u64,
    /// Free-text annotations; accumulates a `" | Wizard: <phase>"` marker
    /// per phase the Wizard has touched.
    pub notes: String,
}

impl Slot {
    /// Append a `" | Wizard: <phase>"` note if it isn't already present.
    pub fn append_wizard_note(&mut self, phase_label: &str) {
        let marker = format!(" | Wizard: {phase_label}");
        if !self.notes.contains(&marker) {
            self.notes.push_str(&marker);
        }
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.start_min >= self.end_min {
            return Err(ScheduleError::invalid(
                "startMin",
                "slot startMin is not before endMin",
            ));
        }
        if self.status == SlotStatus::Confirmed
            && (self.home_team_id.is_empty() || self.away_team_id.is_empty() || self.is_availability)
        {
            return Err(ScheduleError::invalid(
                "status",
                "confirmed slot must have both teams set and isAvailability=false",
            ));
        }
        if self.is_availability
            && (!self.home_team_id.is_empty()
                || !self.away_team_id.is_empty()
                || self.offering_team_id != AVAILABLE_OFFERING_TEAM)
        {
            return Err(ScheduleError::invalid(
                "isAvailability",
                "availability slot must have empty team ids and offeringTeamId=AVAILABLE",
            ));
        }
        Ok(())
    }

    pub fn day_of_week(&self) -> Day {
        Day::from_chrono(chrono::Datelike::weekday(&self.game_date))
    }

    pub fn week_key(&self) -> String {
        time_grid::week_key(self.game_date)
    }
}

/// Emitted by MatchupBuilder; unordered for round-robin, but home/away is
/// meaningful after rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchupPair {
    pub home_team_id: String,
    pub away_team_id: String,
}

impl MatchupPair {
    pub fn swapped(&self) -> MatchupPair {
        MatchupPair {
            home_team_id: self.away_team_id.clone(),
            away_team_id: self.home_team_id.clone(),
        }
    }
}

/// Output of PhaseAssigner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAssignment {
    pub slot_id: String,
    pub game_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub field_key: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub is_external_offer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub league_id: String,
    pub division: String,
    pub run_id: String,
    pub created_by: String,
    pub created_utc: chrono::DateTime<chrono::Utc>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub constraints_json: serde_json::Value,
    pub summary_json: serde_json::Value,
}

/// A `(dayOfWeek, startTime, endTime, fieldKey)` preference used to pick
/// which availability slots become external offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestAnchor {
    pub day_of_week: Day,
    pub start_time: String,
    pub end_time: String,
    pub field_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_reject_path_separators() {
        assert!(is_valid_identifier("park-a.field_1"));
        assert!(!is_valid_identifier("park/a"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a#b"));
    }

    #[test]
    fn rule_applies_to_matching_division_only() {
        let mut rule = sample_rule();
        rule.division = Some("10u".into());
        assert!(rule.applies_to_division("10u"));
        assert!(!rule.applies_to_division("12u"));
    }

    #[test]
    fn rule_with_empty_division_falls_back_to_division_ids() {
        let mut rule = sample_rule();
        rule.division = None;
        rule.division_ids = vec!["10u".into()];
        assert!(rule.applies_to_division("10u"));
        assert!(!rule.applies_to_division("12u"));

        rule.division_ids = vec![];
        assert!(rule.applies_to_division("anything"));
    }

    fn sample_rule() -> AvailabilityRule {
        AvailabilityRule {
            rule_id: "r1".into(),
            league_id: "l1".into(),
            field_key: "park-a/field-1".into(),
            division: None,
            division_ids: vec![],
            starts_on: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2025, 4, 28).unwrap(),
            days_of_week: BTreeSet::from([Day::Mon]),
            start_time_local: "18:00".into(),
            end_time_local: "21:00".into(),
            recurrence_pattern: RecurrencePattern::Weekly,
            timezone: "America/Los_Angeles".into(),
            is_active: true,
        }
    }
}
