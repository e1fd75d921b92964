use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    AtomicSearchReply, AtomicSearchScript, IndexError, IndexMaintainer, IndexStore, ScanStrategy,
    ScriptBatch, UnitHit,
};
use crate::search::domain::{
    AvailabilityBlockRecord, DateSpan, PricePeriodRecord, StayRange, UnitId, UnitIndexRecord,
};
use crate::search::query::{ExclusionMode, ExclusionQuery};

#[derive(Debug, Default)]
struct Indices {
    units: BTreeMap<UnitId, UnitIndexRecord>,
    blocks: HashMap<UnitId, BTreeMap<String, AvailabilityBlockRecord>>,
    block_owner: HashMap<String, UnitId>,
    periods: HashMap<UnitId, BTreeMap<String, PricePeriodRecord>>,
    period_owner: HashMap<String, UnitId>,
}

impl Indices {
    fn overlapping_blocks(&self, unit_id: &UnitId, stay: &DateSpan) -> Vec<DateSpan> {
        self.blocks
            .get(unit_id)
            .map(|blocks| {
                blocks
                    .values()
                    .map(AvailabilityBlockRecord::span)
                    .filter(|span| span.overlaps(stay))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn blocked_units(&self, stay: &DateSpan) -> HashSet<&UnitId> {
        self.blocks
            .iter()
            .filter(|(_, blocks)| blocks.values().any(|block| block.span().overlaps(stay)))
            .map(|(unit_id, _)| unit_id)
            .collect()
    }

    fn hit(&self, unit: &UnitIndexRecord, exclusion: Option<&ExclusionQuery>) -> UnitHit {
        let overlapping_blocks = match exclusion {
            Some(query) if query.mode == ExclusionMode::Annotate => {
                self.overlapping_blocks(&unit.unit_id, &query.stay.span())
            }
            _ => Vec::new(),
        };
        UnitHit {
            unit: unit.clone(),
            overlapping_blocks,
        }
    }

    fn run_full(&self, script: &AtomicSearchScript, blocked_safety_cap: usize) -> AtomicSearchReply {
        let excluding = script
            .exclusion
            .filter(|query| query.mode == ExclusionMode::Exclude);

        let blocked = match excluding {
            Some(query) => {
                let blocked = self.blocked_units(&query.stay.span());
                if blocked.len() > blocked_safety_cap {
                    return AtomicSearchReply::BlockedSetOverflow {
                        blocked: blocked.len(),
                    };
                }
                blocked
            }
            None => HashSet::new(),
        };

        let mut batch = ScriptBatch::default();
        for unit in self
            .units
            .values()
            .filter(|unit| unit.is_active && script.units.matches(unit))
        {
            batch.matched += 1;
            if blocked.contains(&unit.unit_id) {
                batch.excluded += 1;
                continue;
            }
            if batch.hits.len() < script.limit {
                batch.hits.push(self.hit(unit, script.exclusion.as_ref()));
            }
        }
        AtomicSearchReply::Completed(batch)
    }

    fn run_chunk(
        &self,
        script: &AtomicSearchScript,
        after: Option<&UnitId>,
        chunk_size: usize,
    ) -> AtomicSearchReply {
        let excluding = script
            .exclusion
            .filter(|query| query.mode == ExclusionMode::Exclude)
            .map(|query| query.stay.span());

        let mut batch = ScriptBatch::default();
        let mut scanned = 0;
        let mut last_seen = None;
        let mut candidates = self
            .units
            .values()
            .filter(|unit| after.map_or(true, |cursor| unit.unit_id > *cursor))
            .filter(|unit| unit.is_active && script.units.matches(unit))
            .peekable();

        while scanned < chunk_size && batch.hits.len() < script.limit {
            let Some(unit) = candidates.next() else {
                break;
            };
            scanned += 1;
            batch.matched += 1;
            last_seen = Some(unit.unit_id.clone());

            let blocked = excluding
                .as_ref()
                .is_some_and(|stay| !self.overlapping_blocks(&unit.unit_id, stay).is_empty());
            if blocked {
                batch.excluded += 1;
                continue;
            }
            batch.hits.push(self.hit(unit, script.exclusion.as_ref()));
        }

        if candidates.peek().is_some() {
            batch.next_cursor = last_seen;
        }
        AtomicSearchReply::Completed(batch)
    }
}

/// Three-index store held in process memory.
///
/// Each script runs under a single read guard, which gives it the same all-or-nothing view a
/// store-side scripted transaction would. Round trips are counted so callers can assert on
/// batching.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndexStore {
    indices: Arc<RwLock<Indices>>,
    offline: Arc<AtomicBool>,
    round_trips: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every round trip, for exercising timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Acquire)
    }

    pub fn unit_count(&self) -> usize {
        self.read().map(|indices| indices.units.len()).unwrap_or(0)
    }

    async fn round_trip(&self) -> Result<(), IndexError> {
        self.round_trips.fetch_add(1, Ordering::AcqRel);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::Acquire) {
            return Err(IndexError::Unavailable("in-memory index is offline".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Indices>, IndexError> {
        self.indices
            .read()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Indices>, IndexError> {
        self.indices
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))
    }
}

fn check_span(id: &str, span: DateSpan) -> Result<(), IndexError> {
    if span.end <= span.start {
        return Err(IndexError::Rejected(format!(
            "{id}: end {} must be after start {}",
            span.end, span.start
        )));
    }
    Ok(())
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn search_atomic(
        &self,
        script: &AtomicSearchScript,
    ) -> Result<AtomicSearchReply, IndexError> {
        self.round_trip().await?;
        let indices = self.read()?;

        let reply = match &script.strategy {
            ScanStrategy::Full { blocked_safety_cap } => {
                indices.run_full(script, *blocked_safety_cap)
            }
            ScanStrategy::Chunked { after, chunk_size } => {
                indices.run_chunk(script, after.as_ref(), (*chunk_size).max(1))
            }
        };
        Ok(reply)
    }

    async fn fetch_price_periods(
        &self,
        unit_ids: &[UnitId],
        stay: StayRange,
    ) -> Result<HashMap<UnitId, Vec<PricePeriodRecord>>, IndexError> {
        self.round_trip().await?;
        let indices = self.read()?;
        let span = stay.span();

        let mut periods = HashMap::new();
        for unit_id in unit_ids {
            let overlapping: Vec<PricePeriodRecord> = indices
                .periods
                .get(unit_id)
                .map(|records| {
                    records
                        .values()
                        .filter(|period| period.span().overlaps(&span))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if !overlapping.is_empty() {
                periods.insert(unit_id.clone(), overlapping);
            }
        }
        Ok(periods)
    }
}

#[async_trait]
impl IndexMaintainer for InMemoryIndexStore {
    async fn upsert_unit(&self, record: UnitIndexRecord) -> Result<(), IndexError> {
        self.round_trip().await?;
        let mut indices = self.write()?;
        if record.is_active {
            indices.units.insert(record.unit_id.clone(), record);
        } else {
            indices.units.remove(&record.unit_id);
        }
        Ok(())
    }

    async fn remove_unit(&self, unit_id: &UnitId) -> Result<(), IndexError> {
        self.round_trip().await?;
        let mut indices = self.write()?;
        indices.units.remove(unit_id);

        // blocks and periods are keyed by unit, so drop them with it
        if let Some(blocks) = indices.blocks.remove(unit_id) {
            for block_id in blocks.keys() {
                indices.block_owner.remove(block_id);
            }
        }
        if let Some(periods) = indices.periods.remove(unit_id) {
            for period_id in periods.keys() {
                indices.period_owner.remove(period_id);
            }
        }
        Ok(())
    }

    async fn upsert_availability_block(
        &self,
        record: AvailabilityBlockRecord,
    ) -> Result<(), IndexError> {
        check_span(&record.block_id, record.span())?;
        self.round_trip().await?;
        let mut indices = self.write()?;

        if let Some(previous) = indices.block_owner.remove(&record.block_id) {
            if let Some(blocks) = indices.blocks.get_mut(&previous) {
                blocks.remove(&record.block_id);
            }
        }
        indices
            .block_owner
            .insert(record.block_id.clone(), record.unit_id.clone());
        indices
            .blocks
            .entry(record.unit_id.clone())
            .or_default()
            .insert(record.block_id.clone(), record);
        Ok(())
    }

    async fn remove_availability_block(&self, block_id: &str) -> Result<(), IndexError> {
        self.round_trip().await?;
        let mut indices = self.write()?;
        if let Some(owner) = indices.block_owner.remove(block_id) {
            if let Some(blocks) = indices.blocks.get_mut(&owner) {
                blocks.remove(block_id);
            }
        }
        Ok(())
    }

    async fn upsert_price_period(&self, record: PricePeriodRecord) -> Result<(), IndexError> {
        check_span(&record.period_id, record.span())?;
        self.round_trip().await?;
        let mut indices = self.write()?;

        if let Some(previous) = indices.period_owner.remove(&record.period_id) {
            if let Some(periods) = indices.periods.get_mut(&previous) {
                periods.remove(&record.period_id);
            }
        }
        indices
            .period_owner
            .insert(record.period_id.clone(), record.unit_id.clone());
        indices
            .periods
            .entry(record.unit_id.clone())
            .or_default()
            .insert(record.period_id.clone(), record);
        Ok(())
    }

    async fn remove_price_period(&self, period_id: &str) -> Result<(), IndexError> {
        self.round_trip().await?;
        let mut indices = self.write()?;
        if let Some(owner) = indices.period_owner.remove(period_id) {
            if let Some(periods) = indices.periods.get_mut(&owner) {
                periods.remove(period_id);
            }
        }
        Ok(())
    }
}
