//! PhaseAssigner: the scheduling engine itself. Greedy, deterministic
//! assignment of matchups to ordered slots under per-week caps, doubleheader
//! prohibition, home/away balance and guest-anchor reservation, plus the
//! external-offer backfill pass and post-hoc validation.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::model::{GuestAnchor, MatchupPair, ScheduleAssignment, SlotType};
use crate::time_grid::{self, Day};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RegularSeason,
    PoolPlay,
    Bracket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConstraints {
    pub max_games_per_week: u32,
    pub no_double_headers: bool,
    pub balance_home_away: bool,
    pub external_offer_per_week: u32,
    pub preferred_weeknights: Vec<Day>,
    pub strict_preferred_weeknights: bool,
}

impl Default for ScheduleConstraints {
    fn default() -> Self {
        Self {
            max_games_per_week: 0,
            no_double_headers: true,
            balance_home_away: true,
            external_offer_per_week: 0,
            preferred_weeknights: Vec::new(),
            strict_preferred_weeknights: false,
        }
    }
}

/// A slot as seen by the assigner: just enough to order it and to emit a
/// [`ScheduleAssignment`] from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignableSlot {
    pub slot_id: String,
    pub game_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub field_key: String,
    pub slot_type: SlotType,
    pub priority_rank: Option<u32>,
    order_index: usize,
}

impl AssignableSlot {
    pub fn new(
        slot_id: impl Into<String>,
        game_date: NaiveDate,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        field_key: impl Into<String>,
        slot_type: SlotType,
        priority_rank: Option<u32>,
    ) -> Self {
        Self {
            slot_id: slot_id.into(),
            game_date,
            start_time: start_time.into(),
            end_time: end_time.into(),
            field_key: field_key.into(),
            slot_type,
            priority_rank,
            order_index: 0,
        }
    }

    pub fn day_of_week(&self) -> Day {
        Day::from_chrono(self.game_date.weekday())
    }

    pub fn week_key(&self) -> String {
        time_grid::week_key(self.game_date)
    }
}

/// Apply the deterministic slot ordering, dropping non-preferred days first
/// if `strictPreferredWeeknights` is set.
pub fn order_slots(mut slots: Vec<AssignableSlot>, constraints: &ScheduleConstraints) -> Vec<AssignableSlot> {
    if constraints.strict_preferred_weeknights && !constraints.preferred_weeknights.is_empty() {
        slots.retain(|s| constraints.preferred_weeknights.contains(&s.day_of_week()));
    }

    let preferred_rank = |slot: &AssignableSlot| -> usize {
        constraints
            .preferred_weeknights
            .iter()
            .take(3)
            .position(|d| *d == slot.day_of_week())
            .unwrap_or(usize::MAX)
    };

    slots.sort_by(|a, b| {
        let key = |s: &AssignableSlot| {
            (
                s.slot_type.scheduling_priority(),
                s.priority_rank.is_none() as u8,
                s.priority_rank.unwrap_or(0),
                preferred_rank(s),
                s.game_date,
                s.start_time.clone(),
                s.field_key.clone(),
            )
        };
        key(a).cmp(&key(b))
    });

    for (i, slot) in slots.iter_mut().enumerate() {
        slot.order_index = i;
    }
    slots
}

fn anchor_score(slot: &AssignableSlot, primary: &GuestAnchor, secondary: Option<&GuestAnchor>) -> u32 {
    let day = slot.day_of_week();
    let exact = |a: &GuestAnchor| {
        day == a.day_of_week
            && slot.start_time == a.start_time
            && slot.end_time == a.end_time
            && slot.field_key == a.field_key
    };
    let day_time = |a: &GuestAnchor| day == a.day_of_week && slot.start_time == a.start_time && slot.end_time == a.end_time;

    if exact(primary) {
        0
    } else if secondary.is_some_and(&exact) {
        1
    } else if day_time(primary) {
        2
    } else if secondary.is_some_and(&day_time) {
        3
    } else {
        100
    }
}

/// Guest-anchor reservation (Regular Season only): pull up to
/// `externalOfferPerWeek` slots per ISO week out of the regular pool for
/// external-offer backfill, scored against the primary/secondary anchors.
pub fn reserve_guest_anchors(
    slots: Vec<AssignableSlot>,
    primary: &GuestAnchor,
    secondary: Option<&GuestAnchor>,
    external_offer_per_week: u32,
) -> (Vec<AssignableSlot>, Vec<AssignableSlot>) {
    let mut by_week: BTreeMap<String, Vec<AssignableSlot>> = BTreeMap::new();
    for slot in slots {
        by_week.entry(slot.week_key()).or_default().push(slot);
    }

    let mut remaining = Vec::new();
    let mut reserved = Vec::new();

    for (_week, week_slots) in by_week {
        let mut scored: Vec<(u32, AssignableSlot)> = week_slots
            .into_iter()
            .map(|s| (anchor_score(&s, primary, secondary), s))
            .collect();
        scored.sort_by_key(|(score, slot)| (*score, slot.order_index));

        let mut taken = 0u32;
        for (score, slot) in scored {
            if score < 100 && taken < external_offer_per_week {
                reserved.push(slot);
                taken += 1;
            } else {
                remaining.push(slot);
            }
        }
    }

    remaining.sort_by_key(|s| s.order_index);
    reserved.sort_by_key(|s| s.order_index);
    (remaining, reserved)
}

#[derive(Debug, Default, Clone)]
struct AssignmentContext {
    total: HashMap<String, u32>,
    home: HashMap<String, u32>,
    external_count: HashMap<String, u32>,
    team_week: HashMap<(String, String), u32>,
    played_on_date: HashMap<(String, NaiveDate), ()>,
}

impl AssignmentContext {
    fn week_count(&self, team: &str, week: &str) -> u32 {
        self.team_week.get(&(team.to_string(), week.to_string())).copied().unwrap_or(0)
    }

    fn played(&self, team: &str, date: NaiveDate) -> bool {
        self.played_on_date.contains_key(&(team.to_string(), date))
    }

    fn fits(&self, constraints: &ScheduleConstraints, team: &str, date: NaiveDate, week: &str) -> bool {
        if constraints.no_double_headers && self.played(team, date) {
            return false;
        }
        if constraints.max_games_per_week > 0 && self.week_count(team, week) >= constraints.max_games_per_week {
            return false;
        }
        true
    }

    fn record(&mut self, team: &str, date: NaiveDate, week: &str, is_home: bool) {
        *self.total.entry(team.to_string()).or_insert(0) += 1;
        if is_home {
            *self.home.entry(team.to_string()).or_insert(0) += 1;
        }
        *self.team_week.entry((team.to_string(), week.to_string())).or_insert(0) += 1;
        self.played_on_date.insert((team.to_string(), date), ());
    }

    fn home_away_choice(&self, pair: &MatchupPair, balance: bool) -> (String, String) {
        if !balance {
            return (pair.home_team_id.clone(), pair.away_team_id.clone());
        }
        let gap_after = |team: &str| {
            let mut counts = self.home.clone();
            *counts.entry(team.to_string()).or_insert(0) += 1;
            let max = *counts.values().max().unwrap_or(&0);
            let min = *counts.values().min().unwrap_or(&0);
            max - min
        };
        if gap_after(&pair.home_team_id) <= gap_after(&pair.away_team_id) {
            (pair.home_team_id.clone(), pair.away_team_id.clone())
        } else {
            (pair.away_team_id.clone(), pair.home_team_id.clone())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhaseAssignmentResult {
    pub assignments: Vec<ScheduleAssignment>,
    pub unassigned_slots: Vec<AssignableSlot>,
    pub unassigned_matchups: Vec<MatchupPair>,
}

fn greedy_assign(
    slots: &[AssignableSlot],
    matchups: Vec<MatchupPair>,
    constraints: &ScheduleConstraints,
    ctx: &mut AssignmentContext,
) -> (Vec<ScheduleAssignment>, Vec<AssignableSlot>, VecDeque<MatchupPair>) {
    let mut queue: VecDeque<MatchupPair> = matchups.into();
    let mut assignments = Vec::new();
    let mut unassigned_slots = Vec::new();

    for slot in slots {
        if queue.is_empty() {
            unassigned_slots.push(slot.clone());
            continue;
        }

        let week = slot.week_key();
        let attempts = queue.len();
        let mut placed = false;

        for _ in 0..attempts {
            let candidate = queue.pop_front().expect("attempts bounded by queue length");
            let fits = ctx.fits(constraints, &candidate.home_team_id, slot.game_date, &week)
                && ctx.fits(constraints, &candidate.away_team_id, slot.game_date, &week);

            if fits {
                let (home, away) = ctx.home_away_choice(&candidate, constraints.balance_home_away);
                ctx.record(&home, slot.game_date, &week, true);
                ctx.record(&away, slot.game_date, &week, false);
                assignments.push(ScheduleAssignment {
                    slot_id: slot.slot_id.clone(),
                    game_date: slot.game_date,
                    start_time: slot.start_time.clone(),
                    end_time: slot.end_time.clone(),
                    field_key: slot.field_key.clone(),
                    home_team_id: home,
                    away_team_id: away,
                    is_external_offer: false,
                });
                placed = true;
                break;
            } else {
                queue.push_back(candidate);
            }
        }

        if !placed {
            unassigned_slots.push(slot.clone());
        }
    }

    (assignments, unassigned_slots, queue)
}

fn backfill_external_offers(
    pool: Vec<AssignableSlot>,
    teams: &[String],
    constraints: &ScheduleConstraints,
    ctx: &mut AssignmentContext,
) -> (Vec<ScheduleAssignment>, Vec<AssignableSlot>) {
    let mut by_week: BTreeMap<String, Vec<AssignableSlot>> = BTreeMap::new();
    for slot in pool {
        by_week.entry(slot.week_key()).or_default().push(slot);
    }

    let mut assignments = Vec::new();
    let mut leftover = Vec::new();

    for (week, mut week_slots) in by_week {
        week_slots.sort_by_key(|s| s.order_index);
        let mut filled = 0u32;

        for slot in week_slots {
            if filled >= constraints.external_offer_per_week {
                leftover.push(slot);
                continue;
            }

            let mut eligible: Vec<&String> = teams
                .iter()
                .filter(|t| {
                    constraints.max_games_per_week == 0
                        || ctx.week_count(t, &week) < constraints.max_games_per_week
                })
                .collect();

            if eligible.is_empty() {
                leftover.push(slot);
                continue;
            }

            eligible.sort_by_key(|t| {
                (
                    ctx.external_count.get(t.as_str()).copied().unwrap_or(0),
                    ctx.total.get(t.as_str()).copied().unwrap_or(0),
                    ctx.home.get(t.as_str()).copied().unwrap_or(0),
                    (*t).clone(),
                )
            });

            let chosen = eligible[0].clone();
            ctx.record(&chosen, slot.game_date, &week, true);
            *ctx.external_count.entry(chosen.clone()).or_insert(0) += 1;

            assignments.push(ScheduleAssignment {
                slot_id: slot.slot_id.clone(),
                game_date: slot.game_date,
                start_time: slot.start_time.clone(),
                end_time: slot.end_time.clone(),
                field_key: slot.field_key.clone(),
                home_team_id: chosen,
                away_team_id: String::new(),
                is_external_offer: true,
            });
            filled += 1;
        }
    }

    (assignments, leftover)
}

/// Run the Regular Season phase: optional guest-anchor reservation, the
/// greedy loop, then external-offer backfill.
pub fn assign_regular_season(
    ordered_slots: Vec<AssignableSlot>,
    matchups: Vec<MatchupPair>,
    teams: &[String],
    constraints: &ScheduleConstraints,
    guest_anchor_primary: Option<&GuestAnchor>,
    guest_anchor_secondary: Option<&GuestAnchor>,
) -> PhaseAssignmentResult {
    let mut ctx = AssignmentContext::default();
    for team in teams {
        ctx.total.entry(team.clone()).or_insert(0);
        ctx.home.entry(team.clone()).or_insert(0);
    }

    let (regular_pool, reserved) = match guest_anchor_primary {
        Some(primary) if constraints.external_offer_per_week > 0 => {
            reserve_guest_anchors(ordered_slots, primary, guest_anchor_secondary, constraints.external_offer_per_week)
        }
        _ => (ordered_slots, Vec::new()),
    };

    let (mut assignments, leftover_slots, remaining_matchups) =
        greedy_assign(&regular_pool, matchups, constraints, &mut ctx);

    let mut unassigned_slots = Vec::new();
    if constraints.external_offer_per_week > 0 {
        let mut pool = reserved;
        pool.extend(leftover_slots);
        let (backfill_assignments, leftover) = backfill_external_offers(pool, teams, constraints, &mut ctx);
        assignments.extend(backfill_assignments);
        unassigned_slots.extend(leftover);
    } else {
        unassigned_slots.extend(reserved);
        unassigned_slots.extend(leftover_slots);
    }
    unassigned_slots.sort_by_key(|s| s.order_index);

    PhaseAssignmentResult {
        assignments,
        unassigned_slots,
        unassigned_matchups: remaining_matchups.into_iter().collect(),
    }
}

/// Pool Play: same greedy loop, no guest anchors or external offers.
pub fn assign_pool_play(
    ordered_slots: Vec<AssignableSlot>,
    matchups: Vec<MatchupPair>,
    teams: &[String],
    constraints: &ScheduleConstraints,
) -> PhaseAssignmentResult {
    let mut ctx = AssignmentContext::default();
    for team in teams {
        ctx.total.entry(team.clone()).or_insert(0);
        ctx.home.entry(team.clone()).or_insert(0);
    }
    let (assignments, unassigned_slots, remaining_matchups) = greedy_assign(&ordered_slots, matchups, constraints, &mut ctx);
    PhaseAssignmentResult {
        assignments,
        unassigned_slots,
        unassigned_matchups: remaining_matchups.into_iter().collect(),
    }
}

/// Bracket: ignore constraints beyond ordering, dequeue matchups into slots
/// in `(slotType, priorityRank, gameDate, startTime, fieldKey)` order.
pub fn assign_bracket(ordered_slots: Vec<AssignableSlot>, matchups: Vec<MatchupPair>) -> PhaseAssignmentResult {
    let mut queue: VecDeque<MatchupPair> = matchups.into();
    let mut assignments = Vec::new();
    let mut unassigned_slots = Vec::new();

    for slot in ordered_slots {
        match queue.pop_front() {
            Some(pair) => assignments.push(ScheduleAssignment {
                slot_id: slot.slot_id,
                game_date: slot.game_date,
                start_time: slot.start_time,
                end_time: slot.end_time,
                field_key: slot.field_key,
                home_team_id: pair.home_team_id,
                away_team_id: pair.away_team_id,
                is_external_offer: false,
            }),
            None => unassigned_slots.push(slot),
        }
    }

    PhaseAssignmentResult {
        assignments,
        unassigned_slots,
        unassigned_matchups: queue.into_iter().collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

/// One issue per violated rule, grounded in the teacher's
/// `RegionalUnionU64: Display` pattern (`db/src/pre_schedule_report.rs`):
/// a small aggregate type with a human-readable rendering, rather than a
/// bare `Vec` every caller has to format itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleValidation(pub Vec<ValidationIssue>);

impl ScheduleValidation {
    pub fn is_clean(&self) -> bool {
        !self.0.iter().any(|issue| issue.severity == Severity::Error)
    }
}

impl std::fmt::Display for ScheduleValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no issues");
        }
        let mut iter = self.0.iter();
        let Some(first) = iter.next() else {
            return Ok(());
        };
        write!(f, "[{:?}] {}", first.severity, first.message)?;
        for issue in iter {
            write!(f, "; [{:?}] {}", issue.severity, issue.message)?;
        }
        Ok(())
    }
}

/// `ScheduleValidation.Validate`: one issue per violated rule.
pub fn validate(
    result: &PhaseAssignmentResult,
    constraints: &ScheduleConstraints,
    home_away_imbalance_threshold: u32,
) -> ScheduleValidation {
    let mut issues = Vec::new();

    if result.assignments.is_empty() {
        issues.push(ValidationIssue {
            rule_id: "empty-phase".into(),
            severity: Severity::Warning,
            message: "no assignments were produced for this phase".into(),
            details: json!({}),
        });
        return ScheduleValidation(issues);
    }

    if !result.unassigned_slots.is_empty() {
        issues.push(ValidationIssue {
            rule_id: "unassigned-slots".into(),
            severity: Severity::Warning,
            message: format!("{} slot(s) were not filled", result.unassigned_slots.len()),
            details: json!({ "count": result.unassigned_slots.len() }),
        });
    }

    if !result.unassigned_matchups.is_empty() {
        issues.push(ValidationIssue {
            rule_id: "unassigned-matchups".into(),
            severity: Severity::Warning,
            message: format!("{} matchup(s) could not be scheduled", result.unassigned_matchups.len()),
            details: json!({ "count": result.unassigned_matchups.len() }),
        });
    }

    if constraints.max_games_per_week > 0 {
        let mut week_counts: HashMap<(String, String), u32> = HashMap::new();
        for a in &result.assignments {
            let week = time_grid::week_key(a.game_date);
            *week_counts.entry((a.home_team_id.clone(), week.clone())).or_insert(0) += 1;
            if !a.away_team_id.is_empty() {
                *week_counts.entry((a.away_team_id.clone(), week)).or_insert(0) += 1;
            }
        }
        for ((team, week), count) in week_counts {
            if count > constraints.max_games_per_week {
                issues.push(ValidationIssue {
                    rule_id: "games-per-week-exceeded".into(),
                    severity: Severity::Error,
                    message: format!("team `{team}` plays {count} games in week {week}, exceeding the cap"),
                    details: json!({ "team": team, "week": week, "count": count }),
                });
            }
        }
    }

    if constraints.no_double_headers {
        let mut by_date: HashMap<(String, NaiveDate), u32> = HashMap::new();
        for a in &result.assignments {
            *by_date.entry((a.home_team_id.clone(), a.game_date)).or_insert(0) += 1;
            if !a.away_team_id.is_empty() {
                *by_date.entry((a.away_team_id.clone(), a.game_date)).or_insert(0) += 1;
            }
        }
        for ((team, date), count) in by_date {
            if count > 1 {
                issues.push(ValidationIssue {
                    rule_id: "doubleheader".into(),
                    severity: Severity::Error,
                    message: format!("team `{team}` is scheduled twice on {date}"),
                    details: json!({ "team": team, "date": date.to_string() }),
                });
            }
        }
    }

    let mut home_counts: HashMap<String, u32> = HashMap::new();
    for a in &result.assignments {
        *home_counts.entry(a.home_team_id.clone()).or_insert(0) += 1;
    }
    if let (Some(max), Some(min)) = (home_counts.values().max(), home_counts.values().min()) {
        if max - min > home_away_imbalance_threshold {
            issues.push(ValidationIssue {
                rule_id: "home-away-imbalance".into(),
                severity: Severity::Warning,
                message: format!("home-game counts span {min}..{max}, exceeding the imbalance threshold"),
                details: json!({ "min": min, "max": max }),
            });
        }
    }

    ScheduleValidation(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_grid::parse_date;

    fn slot(id: &str, date: &str, start: &str, end: &str, field: &str) -> AssignableSlot {
        AssignableSlot::new(id, parse_date(date).unwrap(), start, end, field, SlotType::Game, None)
    }

    #[test]
    fn strict_preferred_weeknights_filters_other_days() {
        let slots = vec![
            slot("s1", "2025-04-07", "18:00", "19:00", "f1"), // Monday
            slot("s2", "2025-04-08", "18:00", "19:00", "f1"), // Tuesday
        ];
        let constraints = ScheduleConstraints {
            preferred_weeknights: vec![Day::Mon],
            strict_preferred_weeknights: true,
            ..Default::default()
        };
        let ordered = order_slots(slots, &constraints);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].slot_id, "s1");
    }

    fn teams(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("T{i}")).collect()
    }

    #[test]
    fn regular_season_respects_double_headers_and_week_cap() {
        // 4 teams, 6 Monday-night slots across 6 weeks, 1 slot/week => S1 shape.
        let mut slots = Vec::new();
        let mut date = parse_date("2025-04-07").unwrap();
        for i in 0..6 {
            slots.push(slot(&format!("s{i}"), &date.to_string(), "18:00", "19:00", "park-a/field-1"));
            date += chrono::Duration::days(7);
        }
        let ordered = order_slots(slots, &ScheduleConstraints::default());
        let matchups = crate::matchup::build_round_robin(&teams(4));
        let constraints = ScheduleConstraints {
            max_games_per_week: 1,
            ..Default::default()
        };
        let result = assign_regular_season(ordered, matchups, &teams(4), &constraints, None, None);
        assert_eq!(result.assignments.len(), 6);
        assert!(result.unassigned_slots.is_empty());
        assert!(result.unassigned_matchups.is_empty());

        let mut per_team = HashMap::new();
        for a in &result.assignments {
            *per_team.entry(a.home_team_id.clone()).or_insert(0) += 1;
            *per_team.entry(a.away_team_id.clone()).or_insert(0) += 1;
        }
        for count in per_team.values() {
            assert_eq!(*count, 3);
        }
    }

    #[test]
    fn guest_anchor_reserves_one_slot_per_week() {
        let mut slots = Vec::new();
        let mut date = parse_date("2025-04-05").unwrap(); // a Saturday
        for i in 0..3 {
            slots.push(slot(&format!("sat{i}"), &date.to_string(), "10:00", "11:00", "park-a/field-1"));
            slots.push(slot(&format!("wed{i}"), &(date + chrono::Duration::days(4)).to_string(), "18:00", "19:00", "park-a/field-1"));
            date += chrono::Duration::days(7);
        }
        let ordered = order_slots(slots, &ScheduleConstraints::default());
        let anchor = GuestAnchor {
            day_of_week: Day::Sat,
            start_time: "10:00".into(),
            end_time: "11:00".into(),
            field_key: "park-a/field-1".into(),
        };
        let matchups = crate::matchup::build_round_robin(&teams(5));
        let constraints = ScheduleConstraints {
            external_offer_per_week: 1,
            ..Default::default()
        };
        let result = assign_regular_season(ordered, matchups, &teams(5), &constraints, Some(&anchor), None);

        let external: Vec<_> = result.assignments.iter().filter(|a| a.is_external_offer).collect();
        assert_eq!(external.len(), 3);
        for a in &external {
            assert_eq!(a.start_time, "10:00");
            assert!(a.away_team_id.is_empty());
        }
    }
}
