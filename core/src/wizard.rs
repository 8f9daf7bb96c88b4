//! The Wizard: the one place the core is externally observable.
//! `Feasibility` and `Preview` never mutate; `Apply` persists slot updates
//! and one `ScheduleRun` record. Ties together `AvailabilityExpander`'s
//! sibling slot-fetch, `SlotConflictIndex`, `MatchupBuilder` and
//! `PhaseAssigner` across the Regular Season, Pool Play and Bracket phases,
//! sharing one `AssignmentContext` per phase across its guest-offer
//! reservation and backfill passes (already true of
//! [`crate::phase_assigner::assign_regular_season`]).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cancellation::CancellationSignal;
use crate::errors::{ScheduleError, ScheduleResult};
use crate::feasibility::{self, FeasibilityInput, Shortfall};
use crate::matchup;
use crate::model::{
    is_valid_identifier, BlackoutRange, GuestAnchor, LeagueStatus, MatchupPair, ScheduleAssignment, ScheduleRun,
    Slot, SlotStatus, SlotType,
};
use crate::phase_assigner::{
    self, AssignableSlot, PhaseAssignmentResult, ScheduleConstraints, ValidationIssue,
};
use crate::store::{AdvisoryLock, LeagueStore, ScheduleRunStore, SlotQuery, SlotStore, TeamStore};
use crate::time_grid::{self, Day};

/// `slotPlan` entries: per-slot overrides the caller applies before
/// ordering and assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotPlanEntry {
    pub slot_id: String,
    pub slot_type: SlotType,
    pub priority_rank: Option<u32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardRequest {
    pub league_id: String,
    pub division: String,
    pub season_start: NaiveDate,
    pub season_end: NaiveDate,
    pub pool_start: Option<NaiveDate>,
    pub pool_end: Option<NaiveDate>,
    pub bracket_start: Option<NaiveDate>,
    pub bracket_end: Option<NaiveDate>,
    pub blocked_date_ranges: Vec<BlackoutRange>,
    pub min_games_per_team: u32,
    pub pool_games_per_team: u32,
    pub max_games_per_week: u32,
    pub external_offer_per_week: u32,
    pub no_double_headers: bool,
    pub balance_home_away: bool,
    pub preferred_weeknights: Vec<Day>,
    pub strict_preferred_weeknights: bool,
    pub slot_plan: Vec<SlotPlanEntry>,
    pub guest_anchor_primary: Option<GuestAnchor>,
    pub guest_anchor_secondary: Option<GuestAnchor>,
    pub created_by: String,
}

impl WizardRequest {
    /// Request-shape validation applied before any store I/O.
    pub fn validate(&self) -> ScheduleResult<()> {
        if !is_valid_identifier(&self.division) {
            return Err(ScheduleError::invalid(
                "division",
                "division is required and must be a valid identifier",
            ));
        }
        if self.season_start > self.season_end {
            return Err(ScheduleError::invalid("seasonEnd", "seasonEnd precedes seasonStart"));
        }
        match (self.pool_start, self.pool_end) {
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(ScheduleError::invalid("poolEnd", "poolEnd precedes poolStart"));
                }
                if start < self.season_start || end > self.season_end {
                    return Err(ScheduleError::invalid(
                        "poolStart",
                        "pool window must fall within the season window",
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ScheduleError::invalid(
                    "poolStart",
                    "poolStart and poolEnd must both be present or both absent",
                ))
            }
        }
        match (self.bracket_start, self.bracket_end) {
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(ScheduleError::invalid("bracketEnd", "bracketEnd precedes bracketStart"));
                }
                if start < self.season_start {
                    return Err(ScheduleError::invalid(
                        "bracketStart",
                        "bracketStart must be on or after seasonStart",
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ScheduleError::invalid(
                    "bracketStart",
                    "bracketStart and bracketEnd must both be present or both absent",
                ))
            }
        }
        // poolGamesPerTeam minimum is taken as >=2 (see DESIGN.md).
        if self.pool_games_per_team < 2 {
            return Err(ScheduleError::invalid(
                "poolGamesPerTeam",
                "poolGamesPerTeam must be at least 2",
            ));
        }
        let distinct_nights: HashSet<Day> = self.preferred_weeknights.iter().copied().collect();
        if distinct_nights.len() > 3 {
            return Err(ScheduleError::invalid(
                "preferredWeeknights",
                "at most 3 distinct preferred weeknights are allowed",
            ));
        }
        Ok(())
    }

    fn constraints(&self) -> ScheduleConstraints {
        ScheduleConstraints {
            max_games_per_week: self.max_games_per_week,
            no_double_headers: self.no_double_headers,
            balance_home_away: self.balance_home_away,
            external_offer_per_week: self.external_offer_per_week,
            preferred_weeknights: self.preferred_weeknights.clone(),
            strict_preferred_weeknights: self.strict_preferred_weeknights,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub assignments: usize,
    pub external_offers: usize,
    pub unassigned_slots: usize,
    pub unassigned_matchups: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WizardSummary {
    pub regular: PhaseSummary,
    pub pool: PhaseSummary,
    pub bracket: PhaseSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WizardResult {
    pub shortfalls: Vec<Shortfall>,
    pub warnings: Vec<String>,
    pub summary: WizardSummary,
    pub assignments: Vec<ScheduleAssignment>,
    pub unassigned_slots: Vec<String>,
    pub unassigned_matchups: Vec<MatchupPair>,
    pub issues: Vec<ValidationIssue>,
}

/// The store handles a `Wizard` run needs. `rules`/`exceptions`/`fields`
/// aren't here: the Wizard operates on already-materialized `Slot`
/// records; the rule-based generation path is a separate, upstream step,
/// see [`crate::availability`].
pub struct Stores {
    pub teams: Arc<dyn TeamStore>,
    pub slots: Arc<dyn SlotStore>,
    pub leagues: Arc<dyn LeagueStore>,
    pub schedule_runs: Arc<dyn ScheduleRunStore>,
    pub lock: Arc<dyn AdvisoryLock>,
}

fn to_assignable(slot: &Slot) -> AssignableSlot {
    AssignableSlot::new(
        slot.slot_id.clone(),
        slot.game_date,
        slot.start_time.clone(),
        slot.end_time.clone(),
        slot.field_key.clone(),
        slot.game_type,
        None,
    )
}

fn apply_slot_plan(mut slots: Vec<AssignableSlot>, plan: &[SlotPlanEntry]) -> Vec<AssignableSlot> {
    for entry in plan {
        if let Some(slot) = slots.iter_mut().find(|s| s.slot_id == entry.slot_id) {
            slot.slot_type = entry.slot_type;
            if entry.priority_rank.is_some() {
                slot.priority_rank = entry.priority_rank;
            }
            if let (Some(start), Some(end)) = (&entry.start_time, &entry.end_time) {
                slot.start_time = start.clone();
                slot.end_time = end.clone();
            }
        }
    }
    slots
}

fn in_optional_window(date: NaiveDate, window: Option<(NaiveDate, NaiveDate)>) -> bool {
    window.is_some_and(|(start, end)| time_grid::in_range(date, start, end))
}

/// Partition the fetched slot pool into the three phases by date, dropping
/// anything inside a `blockedDateRanges` entry.
fn partition_phases(
    slots: Vec<AssignableSlot>,
    req: &WizardRequest,
) -> (Vec<AssignableSlot>, Vec<AssignableSlot>, Vec<AssignableSlot>) {
    let pool_window = req.pool_start.zip(req.pool_end);
    let bracket_window = req.bracket_start.zip(req.bracket_end);

    let mut regular = Vec::new();
    let mut pool = Vec::new();
    let mut bracket = Vec::new();

    for slot in slots {
        if req.blocked_date_ranges.iter().any(|b| b.contains(slot.game_date)) {
            continue;
        }
        if in_optional_window(slot.game_date, bracket_window) {
            bracket.push(slot);
        } else if in_optional_window(slot.game_date, pool_window) {
            pool.push(slot);
        } else if time_grid::in_range(slot.game_date, req.season_start, req.season_end) {
            regular.push(slot);
        }
    }

    (regular, pool, bracket)
}

fn week_span(start: NaiveDate, end: NaiveDate) -> u32 {
    let days = (end - start).num_days().max(0) as u32 + 1;
    days.div_ceil(7).max(1)
}

fn phase_summary(result: &PhaseAssignmentResult) -> PhaseSummary {
    PhaseSummary {
        assignments: result.assignments.len(),
        external_offers: result.assignments.iter().filter(|a| a.is_external_offer).count(),
        unassigned_slots: result.unassigned_slots.len(),
        unassigned_matchups: result.unassigned_matchups.len(),
    }
}

struct ComputedPhases {
    feasibility_report: feasibility::FeasibilityReport,
    summary: WizardSummary,
    assignments: Vec<ScheduleAssignment>,
    unassigned_slots: Vec<String>,
    unassigned_matchups: Vec<MatchupPair>,
    issues: Vec<ValidationIssue>,
}

fn compute(req: &WizardRequest, teams: &[String], slot_pool: Vec<AssignableSlot>) -> ComputedPhases {
    let constraints = req.constraints();
    let slot_pool = apply_slot_plan(slot_pool, &req.slot_plan);
    let (regular_slots, pool_slots, bracket_slots) = partition_phases(slot_pool, req);

    let regular_weeks = week_span(req.season_start, req.season_end);
    let feasibility_input = FeasibilityInput {
        team_count: teams.len() as u32,
        available_regular_slots: regular_slots.len() as u32,
        available_pool_slots: pool_slots.len() as u32,
        available_bracket_slots: bracket_slots.len() as u32,
        min_games_per_team: req.min_games_per_team,
        pool_games_per_team: req.pool_games_per_team,
        max_games_per_week: req.max_games_per_week,
        regular_weeks_count: regular_weeks,
        guest_games_per_week: req.external_offer_per_week,
    };
    let feasibility_report = feasibility::analyze(&feasibility_input);

    let regular_ordered = phase_assigner::order_slots(regular_slots, &constraints);
    let regular_matchups = if req.min_games_per_team > 0 {
        matchup::build_target(teams, req.min_games_per_team)
    } else {
        matchup::build_round_robin(teams)
    };
    let regular_result = phase_assigner::assign_regular_season(
        regular_ordered,
        regular_matchups,
        teams,
        &constraints,
        req.guest_anchor_primary.as_ref(),
        req.guest_anchor_secondary.as_ref(),
    );

    let pool_ordered = phase_assigner::order_slots(pool_slots, &constraints);
    let pool_matchups = matchup::build_target(teams, req.pool_games_per_team);
    let pool_result = phase_assigner::assign_pool_play(pool_ordered, pool_matchups, teams, &constraints);

    let bracket_ordered = phase_assigner::order_slots(bracket_slots, &constraints);
    let bracket_matchups = matchup::build_bracket();
    let bracket_result = phase_assigner::assign_bracket(bracket_ordered, bracket_matchups);

    let mut issues = Vec::new();
    issues.extend(phase_assigner::validate(&regular_result, &constraints, 1).0);
    issues.extend(phase_assigner::validate(&pool_result, &constraints, 1).0);
    issues.extend(phase_assigner::validate(&bracket_result, &constraints, 1).0);

    let summary = WizardSummary {
        regular: phase_summary(&regular_result),
        pool: phase_summary(&pool_result),
        bracket: phase_summary(&bracket_result),
    };

    let mut assignments = Vec::new();
    let mut unassigned_slots = Vec::new();
    let mut unassigned_matchups = Vec::new();
    for result in [regular_result, pool_result, bracket_result] {
        assignments.extend(result.assignments);
        unassigned_slots.extend(result.unassigned_slots.into_iter().map(|s| s.slot_id));
        unassigned_matchups.extend(result.unassigned_matchups);
    }

    ComputedPhases {
        feasibility_report,
        summary,
        assignments,
        unassigned_slots,
        unassigned_matchups,
        issues,
    }
}

async fn load_teams_and_slots(
    stores: &Stores,
    req: &WizardRequest,
) -> ScheduleResult<(Vec<String>, HashMap<String, Slot>)> {
    let league = stores.leagues.get(&req.league_id).await?;
    if league.status != LeagueStatus::Active {
        return Err(ScheduleError::invalid("leagueId", "league is not active"));
    }

    let teams = stores.teams.list_by_division(&req.league_id, &req.division).await?;
    let team_ids: Vec<String> = teams.into_iter().map(|t| t.team_id).collect();

    let window_end = [req.bracket_end, req.pool_end, Some(req.season_end)]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(req.season_end);

    let page = stores
        .slots
        .query(
            &req.league_id,
            SlotQuery {
                division: Some(req.division.clone()),
                status: Some(SlotStatus::Open),
                field_key: None,
                date_from: Some(req.season_start),
                date_to: Some(window_end),
                page_size: None,
                cursor: None,
            },
        )
        .await?;

    let slot_map = page.slots.into_iter().map(|s| (s.slot_id.clone(), s)).collect();
    Ok((team_ids, slot_map))
}

/// Feasibility: never mutates.
pub async fn feasibility(stores: &Stores, req: &WizardRequest, cancel: &CancellationSignal) -> ScheduleResult<WizardResult> {
    req.validate()?;
    if cancel.is_cancelled() {
        return Ok(WizardResult::default());
    }

    let (teams, slot_map) = load_teams_and_slots(stores, req).await?;
    let slot_pool: Vec<AssignableSlot> = slot_map.values().map(to_assignable).collect();
    let computed = compute(req, &teams, slot_pool);

    Ok(WizardResult {
        shortfalls: computed.feasibility_report.shortfalls,
        summary: computed.summary,
        ..Default::default()
    })
}

/// Preview: full compute, no persistence.
pub async fn preview(stores: &Stores, req: &WizardRequest, cancel: &CancellationSignal) -> ScheduleResult<WizardResult> {
    req.validate()?;
    if cancel.is_cancelled() {
        return Ok(WizardResult::default());
    }

    let (teams, slot_map) = load_teams_and_slots(stores, req).await?;
    let slot_pool: Vec<AssignableSlot> = slot_map.values().map(to_assignable).collect();
    let computed = compute(req, &teams, slot_pool);

    Ok(WizardResult {
        shortfalls: computed.feasibility_report.shortfalls,
        warnings: Vec::new(),
        summary: computed.summary,
        assignments: computed.assignments,
        unassigned_slots: computed.unassigned_slots,
        unassigned_matchups: computed.unassigned_matchups,
        issues: computed.issues,
    })
}

fn phase_label(assignment: &ScheduleAssignment, req: &WizardRequest) -> &'static str {
    let in_bracket = req
        .bracket_start
        .zip(req.bracket_end)
        .is_some_and(|(s, e)| time_grid::in_range(assignment.game_date, s, e));
    let in_pool = req
        .pool_start
        .zip(req.pool_end)
        .is_some_and(|(s, e)| time_grid::in_range(assignment.game_date, s, e));
    if in_bracket {
        "Bracket"
    } else if in_pool {
        "Pool Play"
    } else {
        "Regular Season"
    }
}

/// Apply: same computation as Preview, plus persistence of slot mutations
/// and one `ScheduleRun` record. A per-slot `VersionConflict` is fatal only
/// for that slot: it is skipped, logged, and recorded as a warning; every
/// other write proceeds.
pub async fn apply(
    stores: &Stores,
    req: &WizardRequest,
    run_id: &str,
    cancel: &CancellationSignal,
) -> ScheduleResult<WizardResult> {
    req.validate()?;

    if !stores.lock.acquire(&req.league_id, &req.division).await {
        return Err(ScheduleError::invalid(
            "division",
            "another ScheduleWizardApply is already running for this league/division",
        ));
    }

    let result = apply_locked(stores, req, run_id, cancel).await;
    stores.lock.release(&req.league_id, &req.division).await;
    result
}

async fn apply_locked(
    stores: &Stores,
    req: &WizardRequest,
    run_id: &str,
    cancel: &CancellationSignal,
) -> ScheduleResult<WizardResult> {
    let (teams, mut slot_map) = load_teams_and_slots(stores, req).await?;
    let slot_pool: Vec<AssignableSlot> = slot_map.values().map(to_assignable).collect();
    let computed = compute(req, &teams, slot_pool);

    let mut warnings = Vec::new();
    let mut persisted = Vec::new();

    for assignment in &computed.assignments {
        if cancel.is_cancelled() {
            warnings.push("apply cancelled; partial result discarded past the last successful write".into());
            break;
        }

        let Some(original) = slot_map.remove(&assignment.slot_id) else {
            warnings.push(format!("slot `{}` vanished between read and write", assignment.slot_id));
            continue;
        };

        let mut updated = original.clone();
        updated.home_team_id = assignment.home_team_id.clone();
        updated.away_team_id = assignment.away_team_id.clone();
        updated.is_availability = false;
        updated.schedule_run_id = Some(run_id.to_string());
        updated.updated_by = "Wizard".to_string();
        updated.updated_utc = Utc::now();
        updated.append_wizard_note(phase_label(assignment, req));
        updated.is_external_offer = assignment.is_external_offer;
        updated.status = if assignment.is_external_offer {
            SlotStatus::Open
        } else {
            SlotStatus::Confirmed
        };

        match stores.slots.upsert(updated, original.version).await {
            Ok(saved) => persisted.push(saved),
            Err(ScheduleError::VersionConflict { slot_id }) => {
                warn!("version conflict on slot `{slot_id}`, skipping");
                warnings.push(format!("slot `{slot_id}` changed since it was read; skipped"));
            }
            Err(other) => return Err(other),
        }
    }

    debug!("persisted {} of {} assignments for run `{run_id}`", persisted.len(), computed.assignments.len());

    let run = ScheduleRun {
        league_id: req.league_id.clone(),
        division: req.division.clone(),
        run_id: run_id.to_string(),
        created_by: req.created_by.clone(),
        created_utc: Utc::now(),
        date_from: req.season_start,
        date_to: req.bracket_end.or(req.pool_end).unwrap_or(req.season_end),
        constraints_json: serde_json::to_value(req).unwrap_or_else(|_| json!({})),
        summary_json: serde_json::to_value(&computed.summary).unwrap_or_else(|_| json!({})),
    };
    stores.schedule_runs.insert(run).await?;

    Ok(WizardResult {
        shortfalls: computed.feasibility_report.shortfalls,
        warnings,
        summary: computed.summary,
        assignments: computed.assignments,
        unassigned_slots: computed.unassigned_slots,
        unassigned_matchups: computed.unassigned_matchups,
        issues: computed.issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_pool_window() {
        let req = sample_request();
        let mut bad = req.clone();
        bad.pool_start = Some(bad.season_start);
        bad.pool_end = None;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn rejects_pool_games_below_two() {
        let mut req = sample_request();
        req.pool_games_per_team = 1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_more_than_three_preferred_nights() {
        let mut req = sample_request();
        req.preferred_weeknights = vec![Day::Mon, Day::Tue, Day::Wed, Day::Thu];
        assert!(req.validate().is_err());
    }

    #[test]
    fn week_span_rounds_up_partial_weeks() {
        let start = time_grid::parse_date("2025-04-07").unwrap();
        let end = time_grid::parse_date("2025-04-20").unwrap();
        assert_eq!(week_span(start, end), 2);
    }

    fn sample_request() -> WizardRequest {
        WizardRequest {
            league_id: "L".into(),
            division: "10u".into(),
            season_start: time_grid::parse_date("2025-04-07").unwrap(),
            season_end: time_grid::parse_date("2025-06-01").unwrap(),
            pool_start: None,
            pool_end: None,
            bracket_start: None,
            bracket_end: None,
            blocked_date_ranges: Vec::new(),
            min_games_per_team: 3,
            pool_games_per_team: 2,
            max_games_per_week: 1,
            external_offer_per_week: 0,
            no_double_headers: true,
            balance_home_away: true,
            preferred_weeknights: vec![Day::Mon],
            strict_preferred_weeknights: false,
            slot_plan: Vec::new(),
            guest_anchor_primary: None,
            guest_anchor_secondary: None,
            created_by: "tester".into(),
        }
    }
}
