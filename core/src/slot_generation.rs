//! The slot-generation path: materializes availability slots from
//! recurring rules, turning [`AvailabilityExpander`](crate::availability)'s
//! in-memory [`crate::availability::Candidate`]s into persisted [`Slot`]
//! records. Owns the `Append`/`Regenerate` mode switch.
//!
//! Grounded in `db::TimeSlotExtensions::create_time_slot`
//! (`db/src/lib.rs`): check for conflicts against the live set before
//! writing, reject (don't silently coerce) on overlap, and only hit the
//! store once a batch is known to be conflict-free. This module replaces
//! that single-record, database-transaction-guarded write with a
//! whole-window batch over [`crate::conflict_index::SlotConflictIndex`],
//! since the expander naturally produces many candidates per call rather
//! than one record per request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use log::{debug, warn};

use crate::availability::{self, Candidate};
use crate::conflict_index::{ConflictCandidate, SlotConflictIndex};
use crate::errors::{ScheduleError, ScheduleResult};
use crate::model::{
    field_key as make_field_key, is_valid_identifier, AvailabilityException, AvailabilityRule, BlackoutRange,
    LeagueStatus, Slot, SlotStatus, SlotType, AVAILABLE_OFFERING_TEAM,
};
use crate::store::{AdvisoryLock, ExceptionStore, FieldStore, LeagueStore, RuleStore, SlotQuery, SlotStore};

/// The store handles slot generation needs: rules/exceptions/fields to
/// expand from, the live slot set to clear (regenerate) or check against
/// (conflict rejection), and the same advisory lock `Wizard::apply` uses,
/// consulted read-only here.
pub struct GenerationStores {
    pub leagues: Arc<dyn LeagueStore>,
    pub fields: Arc<dyn FieldStore>,
    pub rules: Arc<dyn RuleStore>,
    pub exceptions: Arc<dyn ExceptionStore>,
    pub slots: Arc<dyn SlotStore>,
    pub lock: Arc<dyn AdvisoryLock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Add newly expanded candidates to whatever availability slots
    /// already exist.
    Append,
    /// Clear existing `isAvailability=true, status=Open` slots in the
    /// window first, then re-create from the current rule set. Leaves any
    /// `Confirmed` slot untouched.
    Regenerate,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub league_id: String,
    pub division: String,
    /// Restrict generation to one field; `None` generates across every
    /// active rule for the division.
    pub field_key: Option<String>,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Division-level `SeasonConfig` override, if any.
    pub division_game_length_minutes: Option<u32>,
    pub division_blackouts: Vec<BlackoutRange>,
    pub mode: GenerationMode,
    pub created_by: String,
}

impl GenerationRequest {
    fn validate(&self) -> ScheduleResult<()> {
        if !is_valid_identifier(&self.division) {
            return Err(ScheduleError::invalid("division", "division is required and must be a valid identifier"));
        }
        if self.window_start > self.window_end {
            return Err(ScheduleError::invalid("windowEnd", "windowEnd precedes windowStart"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub created: Vec<Slot>,
    /// Pre-existing availability slots removed before re-creating
    /// (`Regenerate` mode only).
    pub cleared: usize,
    /// Candidates dropped because they overlapped a slot already on the
    /// field/date (either pre-existing or earlier in this same batch).
    pub conflicts: usize,
}

fn split_field_key(field_key: &str) -> Option<(&str, &str)> {
    field_key.split_once('/')
}

/// Deterministic, collision-resistant id for a generated slot: the same
/// `(division, fieldKey, date, startMin)` always yields the same id, so a
/// re-`Append` over a window already covered by a prior generation lands on
/// the same record instead of duplicating it.
fn generated_slot_id(division: &str, field_key: &str, date: NaiveDate, start_min: u32) -> String {
    format!("gen-{division}-{}-{date}-{start_min}", field_key.replace('/', "-"))
}

fn candidate_to_slot(
    candidate: &Candidate,
    league_id: &str,
    division: &str,
    park_name: &str,
    field_name: &str,
    display_name: &str,
    created_by: &str,
) -> Slot {
    let now = Utc::now();
    Slot {
        slot_id: generated_slot_id(division, &candidate.field_key, candidate.game_date, candidate.start_min),
        league_id: league_id.to_string(),
        division: division.to_string(),
        game_date: candidate.game_date,
        start_time: candidate.start_time.clone(),
        end_time: candidate.end_time.clone(),
        start_min: candidate.start_min,
        end_min: candidate.end_min,
        field_key: candidate.field_key.clone(),
        park_name: park_name.to_string(),
        field_name: field_name.to_string(),
        display_name: display_name.to_string(),
        offering_team_id: AVAILABLE_OFFERING_TEAM.to_string(),
        home_team_id: String::new(),
        away_team_id: String::new(),
        is_availability: true,
        is_external_offer: false,
        status: SlotStatus::Open,
        schedule_run_id: None,
        game_type: SlotType::Game,
        created_utc: now,
        updated_utc: now,
        updated_by: created_by.to_string(),
        version: 0,
        notes: String::new(),
    }
}

/// Materialize availability slots for `req.window_start..=req.window_end`.
///
/// An invalid rule is skipped by [`availability::expand_rules`] rather than
/// failing the whole batch; a field lookup failure for one rule's
/// `fieldKey` likewise drops just that rule (logged) rather than the
/// request.
pub async fn generate(stores: &GenerationStores, req: &GenerationRequest) -> ScheduleResult<GenerationOutcome> {
    req.validate()?;

    if req.mode == GenerationMode::Regenerate && stores.lock.is_held(&req.league_id, &req.division).await {
        return Err(ScheduleError::invalid(
            "mode",
            "cannot regenerate while a ScheduleWizardApply is in flight for this league/division",
        ));
    }

    let league = stores.leagues.get(&req.league_id).await?;
    if league.status != LeagueStatus::Active {
        return Err(ScheduleError::invalid("leagueId", "league is not active"));
    }

    let all_rules = stores
        .rules
        .list_active(&req.league_id, req.field_key.as_deref(), (req.window_start, req.window_end))
        .await?;
    let rules: Vec<AvailabilityRule> = all_rules
        .into_iter()
        .filter(|r| r.applies_to_division(&req.division))
        .collect();

    let mut exceptions_by_rule: HashMap<String, Vec<AvailabilityException>> = HashMap::new();
    for rule in &rules {
        let exceptions = stores.exceptions.list_by_rule(&rule.rule_id).await?;
        if !exceptions.is_empty() {
            exceptions_by_rule.insert(rule.rule_id.clone(), exceptions);
        }
    }

    let game_length = league.season_config.effective_game_length(req.division_game_length_minutes);

    // Group rules by field so each field's own blackouts apply only to its
    // own rules.
    let mut rules_by_field: HashMap<String, Vec<AvailabilityRule>> = HashMap::new();
    for rule in rules {
        rules_by_field.entry(rule.field_key.clone()).or_default().push(rule);
    }

    let mut field_names: HashMap<String, (String, String, String)> = HashMap::new();
    let mut candidates: Vec<Candidate> = Vec::new();

    for (field_key, field_rules) in &rules_by_field {
        let Some((park_code, field_code)) = split_field_key(field_key) else {
            warn!("skipping rules for malformed field key `{field_key}`");
            continue;
        };
        let field = match stores.fields.get(&req.league_id, park_code, field_code).await {
            Ok(field) => field,
            Err(err) => {
                warn!("skipping field `{field_key}`: {err}");
                continue;
            }
        };
        field_names.insert(
            field_key.clone(),
            (field.park_name.clone(), field.field_name.clone(), field.display_name.clone()),
        );

        let mut blackouts = league.season_config.effective_blackouts(None, &field.blackouts);
        blackouts.extend(req.division_blackouts.iter().cloned());

        let mut expanded = availability::expand_rules(
            field_rules,
            &exceptions_by_rule,
            &blackouts,
            req.window_start,
            req.window_end,
            game_length,
        );
        candidates.append(&mut expanded);
    }

    let existing_page = stores
        .slots
        .query(
            &req.league_id,
            SlotQuery {
                division: Some(req.division.clone()),
                field_key: req.field_key.clone(),
                date_from: Some(req.window_start),
                date_to: Some(req.window_end),
                ..Default::default()
            },
        )
        .await?;

    let mut cleared = 0usize;
    let mut index = SlotConflictIndex::new();
    for slot in existing_page.slots {
        let clear_this_one =
            req.mode == GenerationMode::Regenerate && slot.is_availability && slot.status == SlotStatus::Open;
        if clear_this_one {
            stores.slots.delete(&req.league_id, &req.division, &slot.slot_id).await?;
            cleared += 1;
            continue;
        }
        if slot.status != SlotStatus::Cancelled {
            index.add(&slot.field_key, slot.game_date, slot.start_min, slot.end_min);
        }
    }

    let conflict_candidates: Vec<ConflictCandidate<Candidate>> = candidates
        .into_iter()
        .map(|c| ConflictCandidate {
            field_key: c.field_key.clone(),
            game_date: c.game_date,
            start_min: c.start_min,
            end_min: c.end_min,
            payload: c,
        })
        .collect();
    let (accepted, conflicts) = crate::conflict_index::split_by_overlap(&mut index, conflict_candidates);

    let mut created = Vec::with_capacity(accepted.len());
    let mut seen_ids = HashSet::new();
    for candidate in accepted {
        let c = candidate.payload;
        let (park_name, field_name, display_name) = field_names
            .get(&c.field_key)
            .cloned()
            .unwrap_or_else(|| (String::new(), String::new(), String::new()));
        let slot = candidate_to_slot(&c, &req.league_id, &req.division, &park_name, &field_name, &display_name, &req.created_by);
        if !seen_ids.insert(slot.slot_id.clone()) {
            continue;
        }
        let saved = stores.slots.upsert(slot, 0).await?;
        created.push(saved);
    }

    debug!(
        "slot generation for `{}`/`{}`: {} created, {} cleared, {} conflicts",
        req.league_id,
        req.division,
        created.len(),
        cleared,
        conflicts.len()
    );

    Ok(GenerationOutcome {
        created,
        cleared,
        conflicts: conflicts.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_deterministic_and_field_safe() {
        let date = crate::time_grid::parse_date("2025-04-07").unwrap();
        let id = generated_slot_id("10u", "park-a/field-1", date, 1080);
        assert_eq!(id, "gen-10u-park-a-field-1-2025-04-07-1080");
        assert!(is_valid_identifier(&id));
    }

    #[test]
    fn split_field_key_roundtrips_with_make_field_key() {
        let key = make_field_key("park-a", "field-1");
        assert_eq!(split_field_key(&key), Some(("park-a", "field-1")));
    }
}
