//! FeasibilityAnalyzer: before assignment, compute whether a requested
//! phase configuration is achievable given slots, teams and caps, and emit
//! actionable shortfalls rather than an error. Infeasibility is reported as
//! a structured shortfall list, not an error per se.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct FeasibilityInput {
    pub team_count: u32,
    pub available_regular_slots: u32,
    pub available_pool_slots: u32,
    pub available_bracket_slots: u32,
    pub min_games_per_team: u32,
    pub pool_games_per_team: u32,
    pub max_games_per_week: u32,
    pub regular_weeks_count: u32,
    pub guest_games_per_week: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortfall {
    /// A stable slug identifying the kind of shortfall, e.g.
    /// `"regular-slot-count"`.
    pub kind: String,
    /// The numeric deficit: how far short of the requirement the inputs fall.
    pub deficit: f64,
    /// The knob that would close the gap, named for the caller (e.g.
    /// `"minGamesPerTeam"`, `"maxGamesPerWeek"`).
    pub knob: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub shortfalls: Vec<Shortfall>,
}

impl FeasibilityReport {
    pub fn is_feasible(&self) -> bool {
        self.shortfalls.is_empty()
    }
}

fn ceil_div(numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        0
    } else {
        numerator.div_ceil(denominator)
    }
}

/// Required regular-season game-slots = `ceil(teamCount * minGamesPerTeam / 2)`.
pub fn required_regular_slots(team_count: u32, min_games_per_team: u32) -> u32 {
    ceil_div(team_count * min_games_per_team, 2)
}

/// Required pool-play game-slots = `ceil(teamCount * poolGamesPerTeam / 2)`.
pub fn required_pool_slots(team_count: u32, pool_games_per_team: u32) -> u32 {
    ceil_div(team_count * pool_games_per_team, 2)
}

/// Required bracket slots: 3 (two semifinals + a final) once there are
/// enough teams to need semifinals, else a single championship slot.
pub fn required_bracket_slots(team_count: u32) -> u32 {
    if team_count >= 4 {
        3
    } else {
        1
    }
}

/// Compute the full feasibility report for a requested phase configuration.
pub fn analyze(input: &FeasibilityInput) -> FeasibilityReport {
    let mut shortfalls = Vec::new();

    let guest_reserved = input.guest_games_per_week * input.regular_weeks_count;
    let effective_regular_slots = input.available_regular_slots.saturating_sub(guest_reserved);

    let required_regular = required_regular_slots(input.team_count, input.min_games_per_team);
    if effective_regular_slots < required_regular {
        let deficit = (required_regular - effective_regular_slots) as f64;
        shortfalls.push(Shortfall {
            kind: "regular-slot-count".into(),
            deficit,
            knob: "minGamesPerTeam".into(),
            message: format!(
                "regular season needs {required_regular} game-slots ({} after reserving {guest_reserved} for guest games) but only {effective_regular_slots} are available; lower minGamesPerTeam or add availability",
                required_regular,
            ),
        });
    }

    let required_pool = required_pool_slots(input.team_count, input.pool_games_per_team);
    if input.available_pool_slots < required_pool {
        let deficit = (required_pool - input.available_pool_slots) as f64;
        shortfalls.push(Shortfall {
            kind: "pool-slot-count".into(),
            deficit,
            knob: "poolGamesPerTeam".into(),
            message: format!(
                "pool play needs {required_pool} game-slots but only {} are available; lower poolGamesPerTeam or add availability",
                input.available_pool_slots,
            ),
        });
    }

    let required_bracket = required_bracket_slots(input.team_count);
    if input.available_bracket_slots < required_bracket {
        let deficit = (required_bracket - input.available_bracket_slots) as f64;
        shortfalls.push(Shortfall {
            kind: "bracket-slot-count".into(),
            deficit,
            knob: "bracketStart/bracketEnd".into(),
            message: format!(
                "bracket play needs {required_bracket} slot(s) but only {} are available; widen the bracket window",
                input.available_bracket_slots,
            ),
        });
    }

    if input.max_games_per_week > 0 && input.regular_weeks_count > 0 {
        let weekly_game_cap = (input.team_count * input.max_games_per_week) as f64 / 2.0;
        let weekly_slot_supply = effective_regular_slots as f64 / input.regular_weeks_count as f64;
        let weekly_required = required_regular as f64 / input.regular_weeks_count as f64;

        if weekly_slot_supply < weekly_required {
            shortfalls.push(Shortfall {
                kind: "weekly-slot-supply".into(),
                deficit: weekly_required - weekly_slot_supply,
                knob: "availability rules / field allocations".into(),
                message: format!(
                    "averaging {weekly_slot_supply:.2} regular slots/week but {weekly_required:.2} are needed to hit minGamesPerTeam across {} week(s)",
                    input.regular_weeks_count,
                ),
            });
        }
        if weekly_game_cap < weekly_required {
            shortfalls.push(Shortfall {
                kind: "max-games-per-week-cap".into(),
                deficit: weekly_required - weekly_game_cap,
                knob: "maxGamesPerWeek".into(),
                message: format!(
                    "maxGamesPerWeek={} caps throughput at {weekly_game_cap:.2} games/week but {weekly_required:.2} are needed",
                    input.max_games_per_week,
                ),
            });
        }
    }

    FeasibilityReport { shortfalls }
}
