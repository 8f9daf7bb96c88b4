//! The narrow store contract consumed by the core. Every method is
//! asynchronous and cancellable and returns domain records, never a
//! storage-specific type. `memstore` is the pure in-memory implementation
//! used by this crate's own tests; a real deployment backs these traits
//! with whatever persistent KV table store it runs.
//!
//! `ScheduleRunStore` exists because `Apply` persists a `ScheduleRun`
//! record on every run; it is added here as the same kind of narrow
//! domain interface as the rest of this module, collapsing what would
//! otherwise be several source-specific repositories into a small set of
//! interfaces keyed by domain.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::ScheduleResult;
use crate::model::{
    AvailabilityException, AvailabilityRule, Field, FieldAvailabilityAllocation, League, ScheduleRun, Slot,
    SlotStatus, Team,
};

/// Filter/pagination parameters for `SlotStore::query`.
#[derive(Debug, Clone, Default)]
pub struct SlotQuery {
    pub division: Option<String>,
    pub status: Option<SlotStatus>,
    pub field_key: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page_size: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SlotPage {
    pub slots: Vec<Slot>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn list_by_division(&self, league_id: &str, division: &str) -> ScheduleResult<Vec<Team>>;
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn query(&self, league_id: &str, query: SlotQuery) -> ScheduleResult<SlotPage>;
    async fn get(&self, league_id: &str, division: &str, slot_id: &str) -> ScheduleResult<Slot>;
    /// `versionToken` must match the slot's current version or the call
    /// fails with `VersionConflict`.
    async fn upsert(&self, slot: Slot, version_token: u64) -> ScheduleResult<Slot>;
    async fn delete(&self, league_id: &str, division: &str, slot_id: &str) -> ScheduleResult<()>;
    async fn list_by_field_and_date(
        &self,
        league_id: &str,
        field_key: &str,
        date: NaiveDate,
    ) -> ScheduleResult<Vec<Slot>>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_active(
        &self,
        league_id: &str,
        field_key: Option<&str>,
        window: (NaiveDate, NaiveDate),
    ) -> ScheduleResult<Vec<AvailabilityRule>>;
}

#[async_trait]
pub trait ExceptionStore: Send + Sync {
    async fn list_by_rule(&self, rule_id: &str) -> ScheduleResult<Vec<AvailabilityException>>;
}

#[async_trait]
pub trait LeagueStore: Send + Sync {
    async fn get(&self, league_id: &str) -> ScheduleResult<League>;
}

#[async_trait]
pub trait FieldStore: Send + Sync {
    async fn get(&self, league_id: &str, park_code: &str, field_code: &str) -> ScheduleResult<Field>;
}

#[async_trait]
pub trait AllocationStore: Send + Sync {
    async fn list_active_by_field(
        &self,
        league_id: &str,
        field_key: &str,
    ) -> ScheduleResult<Vec<FieldAvailabilityAllocation>>;
    /// Persist one batch (at most `allocation::MAX_BATCH_SIZE` entries).
    async fn insert_batch(&self, batch: Vec<FieldAvailabilityAllocation>) -> ScheduleResult<()>;
}

#[async_trait]
pub trait ScheduleRunStore: Send + Sync {
    async fn insert(&self, run: ScheduleRun) -> ScheduleResult<()>;
    async fn get(&self, league_id: &str, division: &str, run_id: &str) -> ScheduleResult<ScheduleRun>;
}

/// An advisory, in-process lock keyed by `(leagueId, division)`.
/// Cross-request serialization for `ScheduleWizardApply` is not enforced by
/// the core's data model; a caller that needs it injects an implementation
/// of this trait. `memstore` backs it with a simple mutex-guarded set.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// Attempt to take the lock; `false` means another Apply already holds it.
    async fn acquire(&self, league_id: &str, division: &str) -> bool;
    async fn release(&self, league_id: &str, division: &str);
    /// Non-mutating probe used by [`crate::slot_generation`]'s regenerate
    /// mode to check whether an `Apply` is currently in flight for this
    /// league/division, without taking the lock itself.
    async fn is_held(&self, league_id: &str, division: &str) -> bool;
}

/// A lock that never contends, for callers (and tests) that don't need
/// cross-request serialization.
pub struct NoopAdvisoryLock;

#[async_trait]
impl AdvisoryLock for NoopAdvisoryLock {
    async fn acquire(&self, _league_id: &str, _division: &str) -> bool {
        true
    }
    async fn release(&self, _league_id: &str, _division: &str) {}
    async fn is_held(&self, _league_id: &str, _division: &str) -> bool {
        false
    }
}
