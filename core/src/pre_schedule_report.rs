//! `PreScheduleReport`: one structured "can I even start this phase"
//! object combining [`FeasibilityAnalyzer`](crate::feasibility)
//! output with a pre-existing-conflict count, adapted from the teacher's
//! `db::pre_schedule_report` module (there, a SeaORM aggregate query over
//! the team/field/reservation tables; here, pure in-memory aggregation over
//! records a `Wizard` caller already pulled from the `Store` traits).

use std::fmt::Display;

use crate::feasibility::{self, FeasibilityInput, FeasibilityReport};

#[derive(Debug, Clone)]
pub struct PreScheduleReport {
    pub feasibility: FeasibilityReport,
    /// Overlaps found by [`crate::conflict_index::split_by_overlap`] against
    /// the already-live slot set, supplied by the caller.
    pub preexisting_conflicts: u32,
}

impl PreScheduleReport {
    pub fn compute(input: &FeasibilityInput, preexisting_conflicts: u32) -> Self {
        Self {
            feasibility: feasibility::analyze(input),
            preexisting_conflicts,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.feasibility.is_feasible() && self.preexisting_conflicts == 0
    }
}

impl Display for PreScheduleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_ready() {
            return write!(f, "ready: no shortfalls, no conflicts");
        }
        let mut wrote = false;
        for shortfall in &self.feasibility.shortfalls {
            if wrote {
                write!(f, "; ")?;
            }
            write!(f, "{}", shortfall.message)?;
            wrote = true;
        }
        if self.preexisting_conflicts > 0 {
            if wrote {
                write!(f, "; ")?;
            }
            write!(f, "{} pre-existing slot conflict(s)", self.preexisting_conflicts)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_report_has_no_shortfalls_or_conflicts() {
        let input = FeasibilityInput {
            team_count: 4,
            available_regular_slots: 12,
            available_pool_slots: 4,
            available_bracket_slots: 3,
            min_games_per_team: 3,
            pool_games_per_team: 2,
            max_games_per_week: 0,
            regular_weeks_count: 4,
            guest_games_per_week: 0,
        };
        let report = PreScheduleReport::compute(&input, 0);
        assert!(report.is_ready());
        assert_eq!(report.to_string(), "ready: no shortfalls, no conflicts");
    }

    #[test]
    fn conflicts_make_the_report_not_ready() {
        let input = FeasibilityInput {
            team_count: 4,
            available_regular_slots: 12,
            available_pool_slots: 4,
            available_bracket_slots: 3,
            min_games_per_team: 3,
            pool_games_per_team: 2,
            max_games_per_week: 0,
            regular_weeks_count: 4,
            guest_games_per_week: 0,
        };
        let report = PreScheduleReport::compute(&input, 2);
        assert!(!report.is_ready());
        assert!(report.to_string().contains("2 pre-existing"));
    }
}
