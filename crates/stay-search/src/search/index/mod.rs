//! Index store contract shared by the search engine and the index maintainer.
//!
//! Three logical indices back the engine: units, availability blocks, and price periods,
//! each record tagged with its `unit_id`. The engine only reads through [`IndexStore`];
//! upstream domain events write through [`IndexMaintainer`].

mod memory;

pub use memory::InMemoryIndexStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{
    AvailabilityBlockRecord, DateSpan, PricePeriodRecord, StayRange, UnitId, UnitIndexRecord,
};
use super::query::{ExclusionQuery, UnitsQuery};

/// How the store walks candidates inside one atomic script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Materialise the whole blocked set, refusing when it exceeds the cap.
    Full { blocked_safety_cap: usize },
    /// Probe the next `chunk_size` candidates (in unit-id order) after `after`.
    Chunked {
        after: Option<UnitId>,
        chunk_size: usize,
    },
}

/// Units query, exclusion query and subtraction, executed as one store-side operation.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicSearchScript {
    pub units: UnitsQuery,
    pub exclusion: Option<ExclusionQuery>,
    pub limit: usize,
    pub strategy: ScanStrategy,
}

/// A surviving unit plus the blocks overlapping the stay (non-empty only in annotate mode).
#[derive(Debug, Clone, PartialEq)]
pub struct UnitHit {
    pub unit: UnitIndexRecord,
    pub overlapping_blocks: Vec<DateSpan>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptBatch {
    /// Survivors in unit-id order, at most `limit`.
    pub hits: Vec<UnitHit>,
    /// Units matching the units query within the scanned range.
    pub matched: usize,
    /// Matched units removed by the exclusion query.
    pub excluded: usize,
    /// Set when a chunked scan has candidates left after this batch.
    pub next_cursor: Option<UnitId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicSearchReply {
    Completed(ScriptBatch),
    BlockedSetOverflow { blocked: usize },
}

/// Failures surfaced by an index store implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("index store unavailable: {0}")]
    Unavailable(String),
    #[error("index store rejected record: {0}")]
    Rejected(String),
}

/// Read side of the index. Every method is exactly one round trip.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn search_atomic(
        &self,
        script: &AtomicSearchScript,
    ) -> Result<AtomicSearchReply, IndexError>;

    /// Price periods overlapping `stay` for every unit in `unit_ids`, in one batch.
    async fn fetch_price_periods(
        &self,
        unit_ids: &[UnitId],
        stay: StayRange,
    ) -> Result<HashMap<UnitId, Vec<PricePeriodRecord>>, IndexError>;
}

/// Write side of the index, driven by property, unit, availability and pricing events.
#[async_trait]
pub trait IndexMaintainer: Send + Sync {
    async fn upsert_unit(&self, record: UnitIndexRecord) -> Result<(), IndexError>;
    async fn remove_unit(&self, unit_id: &UnitId) -> Result<(), IndexError>;
    async fn upsert_availability_block(
        &self,
        record: AvailabilityBlockRecord,
    ) -> Result<(), IndexError>;
    async fn remove_availability_block(&self, block_id: &str) -> Result<(), IndexError>;
    async fn upsert_price_period(&self, record: PricePeriodRecord) -> Result<(), IndexError>;
    async fn remove_price_period(&self, period_id: &str) -> Result<(), IndexError>;
}

/// Upstream change notification mapped onto the maintainer contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexEvent {
    UnitChanged { unit: UnitIndexRecord },
    UnitRemoved { unit_id: UnitId },
    AvailabilityChanged { block: AvailabilityBlockRecord },
    AvailabilityReleased { block_id: String },
    PricingChanged { period: PricePeriodRecord },
    PricingRemoved { period_id: String },
}

pub async fn apply_event<M>(maintainer: &M, event: IndexEvent) -> Result<(), IndexError>
where
    M: IndexMaintainer + ?Sized,
{
    match event {
        IndexEvent::UnitChanged { unit } => maintainer.upsert_unit(unit).await,
        IndexEvent::UnitRemoved { unit_id } => maintainer.remove_unit(&unit_id).await,
        IndexEvent::AvailabilityChanged { block } => {
            maintainer.upsert_availability_block(block).await
        }
        IndexEvent::AvailabilityReleased { block_id } => {
            maintainer.remove_availability_block(&block_id).await
        }
        IndexEvent::PricingChanged { period } => maintainer.upsert_price_period(period).await,
        IndexEvent::PricingRemoved { period_id } => {
            maintainer.remove_price_period(&period_id).await
        }
    }
}

/// Snapshot of all three indices, used to seed a store from a JSON fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFixture {
    #[serde(default)]
    pub units: Vec<UnitIndexRecord>,
    #[serde(default)]
    pub blocks: Vec<AvailabilityBlockRecord>,
    #[serde(default)]
    pub price_periods: Vec<PricePeriodRecord>,
}

impl IndexFixture {
    pub fn into_events(self) -> impl Iterator<Item = IndexEvent> {
        let units = self
            .units
            .into_iter()
            .map(|unit| IndexEvent::UnitChanged { unit });
        let blocks = self
            .blocks
            .into_iter()
            .map(|block| IndexEvent::AvailabilityChanged { block });
        let periods = self
            .price_periods
            .into_iter()
            .map(|period| IndexEvent::PricingChanged { period });
        units.chain(blocks).chain(periods)
    }

    /// Replay every record through `maintainer`, returning how many were applied.
    pub async fn load_into<M>(self, maintainer: &M) -> Result<usize, IndexError>
    where
        M: IndexMaintainer + ?Sized,
    {
        let mut applied = 0;
        for event in self.into_events() {
            apply_event(maintainer, event).await?;
            applied += 1;
        }
        Ok(applied)
    }
}
