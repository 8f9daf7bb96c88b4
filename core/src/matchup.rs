//! MatchupBuilder: round-robin matchup generation by the circle method,
//! with variants for minimum-games-per-team, exact-games-per-team, and the
//! fixed bracket placeholder shape.

use std::collections::HashMap;

use itertools::Itertools;

use crate::model::MatchupPair;

/// `buildRoundRobin(teams)`: circle method. Odd team counts get a sentinel
/// "BYE" seat; pairs involving it are dropped. Round 0's pairs come first,
/// then round 1's, etc. Home/away alternates by round parity.
pub fn build_round_robin(teams: &[String]) -> Vec<MatchupPair> {
    if teams.len() < 2 {
        return Vec::new();
    }

    let mut seats: Vec<Option<String>> = teams.iter().cloned().map(Some).collect();
    if seats.len() % 2 == 1 {
        seats.push(None); // BYE
    }
    let n = seats.len();
    let rounds = n - 1;

    let mut out = Vec::with_capacity(teams.len() * (teams.len() - 1) / 2);

    for round in 0..rounds {
        for i in 0..n / 2 {
            let a = seats[i].clone();
            let b = seats[n - 1 - i].clone();
            if let (Some(a), Some(b)) = (a, b) {
                let (home, away) = if round % 2 == 0 { (a, b) } else { (b, a) };
                out.push(MatchupPair {
                    home_team_id: home,
                    away_team_id: away,
                });
            }
        }
        rotate(&mut seats);
    }

    out
}

/// Rotate positions `1..n-1` clockwise by one step; position 0 stays fixed.
fn rotate(seats: &mut [Option<String>]) {
    let n = seats.len();
    if n <= 2 {
        return;
    }
    let last = seats[n - 1].clone();
    for i in (2..n).rev() {
        seats[i] = seats[i - 1].clone();
    }
    seats[1] = last;
}

/// `buildRepeated(teams, gamesPerTeam)`: repeat `buildRoundRobin`
/// `ceil(gamesPerTeam / max(1, |teams|-1))` times, swapping home/away on
/// every odd cycle, and concatenate in order.
pub fn build_repeated(teams: &[String], games_per_team: u32) -> Vec<MatchupPair> {
    if teams.is_empty() {
        return Vec::new();
    }
    let denom = (teams.len() as u32).saturating_sub(1).max(1);
    let cycles = games_per_team.div_ceil(denom);

    let base = build_round_robin(teams);
    let mut out = Vec::with_capacity(base.len() * cycles as usize);
    for cycle in 0..cycles {
        if cycle % 2 == 1 {
            out.extend(base.iter().map(MatchupPair::swapped));
        } else {
            out.extend(base.iter().cloned());
        }
    }
    out
}

/// `buildTarget(teams, gamesPerTeam)`: like `buildRepeated`, but filters
/// against a per-team counter so no team exceeds `gamesPerTeam`; stops once
/// every team has reached the target.
pub fn build_target(teams: &[String], games_per_team: u32) -> Vec<MatchupPair> {
    if teams.is_empty() || games_per_team == 0 {
        return Vec::new();
    }

    let mut counts: HashMap<&str, u32> = teams.iter().map(|t| (t.as_str(), 0)).collect();
    let candidates = build_repeated(teams, games_per_team);
    let mut out = Vec::new();

    for pair in candidates {
        if counts.values().all(|&c| c >= games_per_team) {
            break;
        }
        let home_ok = counts.get(pair.home_team_id.as_str()).copied().unwrap_or(games_per_team) < games_per_team;
        let away_ok = counts.get(pair.away_team_id.as_str()).copied().unwrap_or(games_per_team) < games_per_team;
        if home_ok && away_ok {
            *counts.entry(&pair.home_team_id).or_insert(0) += 1;
            *counts.entry(&pair.away_team_id).or_insert(0) += 1;
            out.push(pair);
        }
    }

    out
}

/// `buildBracket()`: fixed semifinal+final placeholders.
pub fn build_bracket() -> Vec<MatchupPair> {
    vec![
        MatchupPair {
            home_team_id: "Seed1".into(),
            away_team_id: "Seed4".into(),
        },
        MatchupPair {
            home_team_id: "Seed2".into(),
            away_team_id: "Seed3".into(),
        },
        MatchupPair {
            home_team_id: "WinnerSF1".into(),
            away_team_id: "WinnerSF2".into(),
        },
    ]
}

/// Every unordered pair exactly once, used by tests and feasibility checks.
pub fn unordered_pairs_covered(pairs: &[MatchupPair], teams: &[String]) -> bool {
    let expected: usize = teams.len() * teams.len().saturating_sub(1) / 2;
    if pairs.len() != expected {
        return false;
    }
    teams
        .iter()
        .tuple_combinations()
        .all(|(a, b)| {
            pairs.iter().any(|p| {
                (&p.home_team_id == a && &p.away_team_id == b)
                    || (&p.home_team_id == b && &p.away_team_id == a)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("T{i}")).collect()
    }

    #[test]
    fn four_teams_yields_six_pairs_each_once() {
        let t = teams(4);
        let pairs = build_round_robin(&t);
        assert_eq!(pairs.len(), 6);
        assert!(unordered_pairs_covered(&pairs, &t));
    }

    #[test]
    fn five_teams_drops_bye_and_covers_every_pair() {
        let t = teams(5);
        let pairs = build_round_robin(&t);
        assert_eq!(pairs.len(), 10);
        assert!(unordered_pairs_covered(&pairs, &t));
    }

    #[test]
    fn repeated_doubles_with_home_away_swap() {
        let t = teams(4);
        let pairs = build_repeated(&t, 6); // 2 cycles of 3 rounds (6 pairs) each
        assert_eq!(pairs.len(), 12);
        // first cycle pair 0 should be reversed in the second cycle's matching slot.
        assert_eq!(pairs[0].home_team_id, pairs[6].away_team_id);
        assert_eq!(pairs[0].away_team_id, pairs[6].home_team_id);
    }

    #[test]
    fn target_build_stops_once_every_team_hits_target() {
        let t = teams(4);
        let pairs = build_target(&t, 3);
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for p in &pairs {
            *counts.entry(p.home_team_id.as_str()).or_insert(0) += 1;
            *counts.entry(p.away_team_id.as_str()).or_insert(0) += 1;
        }
        assert!(counts.values().all(|&c| c == 3));
    }

    #[test]
    fn bracket_has_fixed_shape() {
        let b = build_bracket();
        assert_eq!(b.len(), 3);
        assert_eq!(b[2].home_team_id, "WinnerSF1");
    }
}
