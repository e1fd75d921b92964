use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::domain::{PricePeriodRecord, StayRange, UnitId};
use super::error::SearchError;
use super::index::{
    AtomicSearchReply, AtomicSearchScript, IndexError, IndexStore, ScanStrategy, UnitHit,
};
use super::query::CompiledSearch;

/// Knobs for the executor, taken from [`crate::config::SearchConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub candidate_limit: usize,
    pub blocked_safety_cap: usize,
    pub chunk_size: usize,
    pub index_timeout: Duration,
}

/// Matching-minus-blocked units for one compiled search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionOutcome {
    pub hits: Vec<UnitHit>,
    pub matched: usize,
    pub excluded: usize,
    pub round_trips: usize,
    pub chunked: bool,
}

/// Price periods for a batch of candidates, keyed by unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceFetch {
    pub periods: HashMap<UnitId, Vec<PricePeriodRecord>>,
    pub round_trips: usize,
}

/// Runs compiled searches against the index as single atomic store operations.
pub struct AtomicSearchExecutor<S> {
    store: Arc<S>,
    settings: ExecutorSettings,
}

impl<S> AtomicSearchExecutor<S>
where
    S: IndexStore + 'static,
{
    pub fn new(store: Arc<S>, settings: ExecutorSettings) -> Self {
        Self { store, settings }
    }

    /// Execute `compiled`, degrading to chunked scans when the blocked set is over the cap.
    pub async fn execute(
        &self,
        compiled: &CompiledSearch,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, SearchError> {
        let mut script = AtomicSearchScript {
            units: compiled.units.clone(),
            exclusion: compiled.exclusion,
            limit: self.settings.candidate_limit,
            strategy: ScanStrategy::Full {
                blocked_safety_cap: self.settings.blocked_safety_cap,
            },
        };

        let reply = self.guarded("search_atomic", cancel, self.store.search_atomic(&script)).await?;
        match reply {
            AtomicSearchReply::Completed(batch) => Ok(ExecutionOutcome {
                hits: batch.hits,
                matched: batch.matched,
                excluded: batch.excluded,
                round_trips: 1,
                chunked: false,
            }),
            AtomicSearchReply::BlockedSetOverflow { blocked } => {
                warn!(
                    level = ?compiled.level,
                    blocked,
                    cap = self.settings.blocked_safety_cap,
                    "blocked set over safety cap, switching to chunked scan"
                );
                script.strategy = ScanStrategy::Chunked {
                    after: None,
                    chunk_size: self.settings.chunk_size,
                };
                self.execute_chunked(script, cancel).await
            }
        }
    }

    async fn execute_chunked(
        &self,
        mut script: AtomicSearchScript,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, SearchError> {
        let limit = script.limit;
        let mut outcome = ExecutionOutcome {
            round_trips: 1,
            chunked: true,
            ..ExecutionOutcome::default()
        };

        loop {
            script.limit = limit - outcome.hits.len();
            let reply = self
                .guarded("search_atomic_chunk", cancel, self.store.search_atomic(&script))
                .await?;
            outcome.round_trips += 1;

            let batch = match reply {
                AtomicSearchReply::Completed(batch) => batch,
                // chunked scans never build the full blocked set
                AtomicSearchReply::BlockedSetOverflow { blocked } => {
                    return Err(SearchError::IndexUnavailable(format!(
                        "store refused chunked scan with {blocked} blocked units"
                    )))
                }
            };

            debug!(
                hits = batch.hits.len(),
                matched = batch.matched,
                excluded = batch.excluded,
                "chunk scanned"
            );
            outcome.matched += batch.matched;
            outcome.excluded += batch.excluded;
            outcome.hits.extend(batch.hits);

            match batch.next_cursor {
                Some(cursor) if outcome.hits.len() < limit => {
                    if let ScanStrategy::Chunked { after, .. } = &mut script.strategy {
                        *after = Some(cursor);
                    }
                }
                _ => break,
            }
        }

        Ok(outcome)
    }

    /// One batched lookup of price periods for every candidate; no call for an empty batch.
    pub async fn fetch_price_periods(
        &self,
        unit_ids: &[UnitId],
        stay: StayRange,
        cancel: &CancellationToken,
    ) -> Result<PriceFetch, SearchError> {
        if unit_ids.is_empty() {
            return Ok(PriceFetch::default());
        }
        let periods = self
            .guarded(
                "fetch_price_periods",
                cancel,
                self.store.fetch_price_periods(unit_ids, stay),
            )
            .await?;
        Ok(PriceFetch {
            periods,
            round_trips: 1,
        })
    }

    async fn guarded<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, SearchError>
    where
        F: Future<Output = Result<T, IndexError>>,
    {
        let timeout = self.settings.index_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SearchError::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result.map_err(|err| {
                    warn!(operation, error = %err, "index round trip failed");
                    SearchError::from(err)
                }),
                Err(_) => {
                    warn!(operation, timeout_ms = timeout.as_millis() as u64, "index round trip timed out");
                    Err(SearchError::IndexTimeout {
                        operation,
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
        }
    }
}
