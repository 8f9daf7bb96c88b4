//! [`InMemoryStore`]: one struct, every trait. Each collection is a plain
//! `Vec`/`HashMap` behind its own `Mutex`, with no cross-collection
//! locking, so a query never blocks a write to an unrelated table.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use scheduling_core::errors::{ScheduleError, ScheduleResult};
use scheduling_core::model::{
    AvailabilityException, AvailabilityRule, Field, FieldAvailabilityAllocation, League, ScheduleRun, Slot, Team,
};
use scheduling_core::store::{
    AdvisoryLock, AllocationStore, ExceptionStore, FieldStore, LeagueStore, RuleStore, ScheduleRunStore, SlotPage,
    SlotQuery, SlotStore, TeamStore,
};

fn slot_key(league_id: &str, slot_id: &str) -> String {
    format!("{league_id}::{slot_id}")
}

fn run_key(league_id: &str, division: &str, run_id: &str) -> String {
    format!("{league_id}::{division}::{run_id}")
}

#[derive(Default)]
pub struct InMemoryStore {
    leagues: Mutex<HashMap<String, League>>,
    teams: Mutex<Vec<Team>>,
    fields: Mutex<HashMap<String, Field>>,
    rules: Mutex<Vec<AvailabilityRule>>,
    exceptions: Mutex<Vec<AvailabilityException>>,
    allocations: Mutex<Vec<FieldAvailabilityAllocation>>,
    slots: Mutex<HashMap<String, Slot>>,
    schedule_runs: Mutex<HashMap<String, ScheduleRun>>,
    locks: Mutex<HashSet<(String, String)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_league(self, league: League) -> Self {
        self.leagues.lock().unwrap().insert(league.league_id.clone(), league);
        self
    }

    pub fn with_teams(self, teams: impl IntoIterator<Item = Team>) -> Self {
        self.teams.lock().unwrap().extend(teams);
        self
    }

    pub fn with_field(self, field: Field) -> Self {
        let key = field.field_key();
        self.fields.lock().unwrap().insert(format!("{}::{}", field.league_id, key), field);
        self
    }

    pub fn with_rules(self, rules: impl IntoIterator<Item = AvailabilityRule>) -> Self {
        self.rules.lock().unwrap().extend(rules);
        self
    }

    pub fn with_exceptions(self, exceptions: impl IntoIterator<Item = AvailabilityException>) -> Self {
        self.exceptions.lock().unwrap().extend(exceptions);
        self
    }

    pub fn with_allocations(self, allocations: impl IntoIterator<Item = FieldAvailabilityAllocation>) -> Self {
        self.allocations.lock().unwrap().extend(allocations);
        self
    }

    pub fn with_slots(self, slots: impl IntoIterator<Item = Slot>) -> Self {
        let mut guard = self.slots.lock().unwrap();
        for slot in slots {
            guard.insert(slot_key(&slot.league_id, &slot.slot_id), slot);
        }
        drop(guard);
        self
    }

    /// A snapshot of every slot currently stored, for test assertions.
    pub fn all_slots(&self) -> Vec<Slot> {
        self.slots.lock().unwrap().values().cloned().collect()
    }

    pub fn schedule_run_count(&self) -> usize {
        self.schedule_runs.lock().unwrap().len()
    }
}

#[async_trait]
impl TeamStore for InMemoryStore {
    async fn list_by_division(&self, league_id: &str, division: &str) -> ScheduleResult<Vec<Team>> {
        Ok(self
            .teams
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.league_id == league_id && t.division == division)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SlotStore for InMemoryStore {
    async fn query(&self, league_id: &str, query: SlotQuery) -> ScheduleResult<SlotPage> {
        let mut slots: Vec<Slot> = self
            .slots
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.league_id == league_id)
            .filter(|s| query.division.as_deref().map_or(true, |d| d == s.division))
            .filter(|s| query.status.map_or(true, |status| status == s.status))
            .filter(|s| query.field_key.as_deref().map_or(true, |fk| fk == s.field_key))
            .filter(|s| query.date_from.map_or(true, |from| s.game_date >= from))
            .filter(|s| query.date_to.map_or(true, |to| s.game_date <= to))
            .cloned()
            .collect();
        slots.sort_by(|a, b| (a.game_date, &a.start_time, &a.slot_id).cmp(&(b.game_date, &b.start_time, &b.slot_id)));
        Ok(SlotPage { slots, next_cursor: None })
    }

    async fn get(&self, league_id: &str, division: &str, slot_id: &str) -> ScheduleResult<Slot> {
        self.slots
            .lock()
            .unwrap()
            .get(&slot_key(league_id, slot_id))
            .filter(|s| s.division == division)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("slot", slot_id))
    }

    async fn upsert(&self, slot: Slot, version_token: u64) -> ScheduleResult<Slot> {
        let mut guard = self.slots.lock().unwrap();
        let key = slot_key(&slot.league_id, &slot.slot_id);
        match guard.get(&key) {
            Some(current) if current.version != version_token => {
                return Err(ScheduleError::VersionConflict {
                    slot_id: slot.slot_id.clone(),
                });
            }
            _ => {}
        }
        let mut saved = slot;
        saved.version = version_token + 1;
        guard.insert(key, saved.clone());
        Ok(saved)
    }

    async fn delete(&self, league_id: &str, division: &str, slot_id: &str) -> ScheduleResult<()> {
        let mut guard = self.slots.lock().unwrap();
        let key = slot_key(league_id, slot_id);
        match guard.get(&key) {
            Some(s) if s.division == division => {
                guard.remove(&key);
                Ok(())
            }
            _ => Err(ScheduleError::not_found("slot", slot_id)),
        }
    }

    async fn list_by_field_and_date(
        &self,
        league_id: &str,
        field_key: &str,
        date: NaiveDate,
    ) -> ScheduleResult<Vec<Slot>> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.league_id == league_id && s.field_key == field_key && s.game_date == date)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn list_active(
        &self,
        league_id: &str,
        field_key: Option<&str>,
        window: (NaiveDate, NaiveDate),
    ) -> ScheduleResult<Vec<AvailabilityRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.league_id == league_id && r.is_active)
            .filter(|r| field_key.map_or(true, |fk| fk == r.field_key))
            .filter(|r| r.starts_on <= window.1 && window.0 <= r.ends_on)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExceptionStore for InMemoryStore {
    async fn list_by_rule(&self, rule_id: &str) -> ScheduleResult<Vec<AvailabilityException>> {
        Ok(self
            .exceptions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.rule_id == rule_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LeagueStore for InMemoryStore {
    async fn get(&self, league_id: &str) -> ScheduleResult<League> {
        self.leagues
            .lock()
            .unwrap()
            .get(league_id)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("league", league_id))
    }
}

#[async_trait]
impl FieldStore for InMemoryStore {
    async fn get(&self, league_id: &str, park_code: &str, field_code: &str) -> ScheduleResult<Field> {
        let key = format!("{league_id}::{}", scheduling_core::model::field_key(park_code, field_code));
        self.fields
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("field", &key))
    }
}

#[async_trait]
impl AllocationStore for InMemoryStore {
    async fn list_active_by_field(
        &self,
        league_id: &str,
        field_key: &str,
    ) -> ScheduleResult<Vec<FieldAvailabilityAllocation>> {
        Ok(self
            .allocations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.league_id == league_id && a.field_key == field_key && a.is_active)
            .cloned()
            .collect())
    }

    async fn insert_batch(&self, batch: Vec<FieldAvailabilityAllocation>) -> ScheduleResult<()> {
        if batch.len() > scheduling_core::allocation::MAX_BATCH_SIZE {
            return Err(ScheduleError::invalid(
                "batch",
                format!("batch of {} exceeds the {}-entry cap", batch.len(), scheduling_core::allocation::MAX_BATCH_SIZE),
            ));
        }
        self.allocations.lock().unwrap().extend(batch);
        Ok(())
    }
}

#[async_trait]
impl ScheduleRunStore for InMemoryStore {
    async fn insert(&self, run: ScheduleRun) -> ScheduleResult<()> {
        let key = run_key(&run.league_id, &run.division, &run.run_id);
        self.schedule_runs.lock().unwrap().insert(key, run);
        Ok(())
    }

    async fn get(&self, league_id: &str, division: &str, run_id: &str) -> ScheduleResult<ScheduleRun> {
        self.schedule_runs
            .lock()
            .unwrap()
            .get(&run_key(league_id, division, run_id))
            .cloned()
            .ok_or_else(|| ScheduleError::not_found("scheduleRun", run_id))
    }
}

#[async_trait]
impl AdvisoryLock for InMemoryStore {
    async fn acquire(&self, league_id: &str, division: &str) -> bool {
        self.locks.lock().unwrap().insert((league_id.to_string(), division.to_string()))
    }

    async fn release(&self, league_id: &str, division: &str) {
        self.locks.lock().unwrap().remove(&(league_id.to_string(), division.to_string()));
    }

    async fn is_held(&self, league_id: &str, division: &str) -> bool {
        self.locks.lock().unwrap().contains(&(league_id.to_string(), division.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scheduling_core::model::{SlotStatus, SlotType, AVAILABLE_OFFERING_TEAM};
    use scheduling_core::time_grid;

    fn sample_slot(id: &str, date: &str) -> Slot {
        Slot {
            slot_id: id.into(),
            league_id: "L".into(),
            division: "10u".into(),
            game_date: time_grid::parse_date(date).unwrap(),
            start_time: "18:00".into(),
            end_time: "19:00".into(),
            start_min: 1080,
            end_min: 1140,
            field_key: "park-a/field-1".into(),
            park_name: "Park A".into(),
            field_name: "Field 1".into(),
            display_name: "Park A / Field 1".into(),
            offering_team_id: AVAILABLE_OFFERING_TEAM.into(),
            home_team_id: String::new(),
            away_team_id: String::new(),
            is_availability: true,
            is_external_offer: false,
            status: SlotStatus::Open,
            schedule_run_id: None,
            game_type: SlotType::Game,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
            updated_by: "seed".into(),
            version: 0,
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn upsert_detects_version_conflict() {
        let store = InMemoryStore::new().with_slots([sample_slot("s1", "2025-05-03")]);
        let mut slot = store.get("L", "10u", "s1").await.unwrap();
        slot.status = SlotStatus::Confirmed;
        slot.home_team_id = "T1".into();
        slot.away_team_id = "T2".into();
        slot.is_availability = false;

        // stale version token (slot was seeded at version 0, we claim 5).
        let err = store.upsert(slot.clone(), 5).await.unwrap_err();
        assert!(matches!(err, ScheduleError::VersionConflict { .. }));

        let saved = store.upsert(slot, 0).await.unwrap();
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn query_filters_by_division_and_date_window() {
        let store = InMemoryStore::new().with_slots([
            sample_slot("s1", "2025-05-03"),
            sample_slot("s2", "2025-06-10"),
        ]);
        let page = store
            .query(
                "L",
                SlotQuery {
                    date_from: Some(time_grid::parse_date("2025-05-01").unwrap()),
                    date_to: Some(time_grid::parse_date("2025-05-31").unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.slots.len(), 1);
        assert_eq!(page.slots[0].slot_id, "s1");
    }

    #[tokio::test]
    async fn advisory_lock_rejects_second_acquire() {
        let store = InMemoryStore::new();
        assert!(store.acquire("L", "10u").await);
        assert!(!store.acquire("L", "10u").await);
        store.release("L", "10u").await;
        assert!(store.acquire("L", "10u").await);
    }

    #[tokio::test]
    async fn league_lookup_reports_not_found() {
        let store = InMemoryStore::new();
        let err = LeagueStore::get(&store, "missing").await.unwrap_err();
        assert!(matches!(err, ScheduleError::NotFound { .. }));
    }
}
