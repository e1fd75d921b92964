use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::assembler::{
    build_result, paginate, price_summary, rank, AppliedFilters, SearchNotice, SearchResponse,
    SearchResult, SearchStats, SearchTiming,
};
use super::domain::{SearchRequest, UnitId};
use super::error::SearchError;
use super::executor::{AtomicSearchExecutor, ExecutorSettings};
use super::index::IndexStore;
use super::pricing::{base_quote, resolve_stay_price};
use super::query::{check_stay_length, validate};
use super::relaxation::{relaxed_dimensions, RelaxationController, RelaxationLevel};
use crate::config::SearchConfig;

/// Availability-aware search pipeline: compile, execute, relax, price, assemble.
///
/// Holds no per-request state, so one instance serves concurrent requests.
pub struct StaySearchService<S> {
    executor: AtomicSearchExecutor<S>,
    relaxation: RelaxationController,
    max_stay_nights: u32,
    default_page_size: u32,
    max_page_size: u32,
}

impl<S> StaySearchService<S>
where
    S: IndexStore + 'static,
{
    pub fn new(store: Arc<S>, config: &SearchConfig) -> Self {
        let settings = ExecutorSettings {
            candidate_limit: config.candidate_limit,
            blocked_safety_cap: config.blocked_safety_cap,
            chunk_size: config.chunk_size,
            index_timeout: config.index_timeout,
        };

        Self {
            executor: AtomicSearchExecutor::new(store, settings),
            relaxation: RelaxationController::new(config.min_results),
            max_stay_nights: config.max_stay_nights,
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
        }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        self.search_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Run one search; cancelling `cancel` aborts it and discards any partial attempt.
    pub async fn search_with_cancel(
        &self,
        request: SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        validate(&request)?;
        check_stay_length(&request, self.max_stay_nights)?;

        let outcome = self
            .relaxation
            .run(&request, &self.executor, cancel)
            .await?;
        let mut round_trips = outcome.round_trips;

        let mut results: Vec<SearchResult> = match request.stay {
            Some(stay) => {
                let unit_ids: Vec<UnitId> = outcome
                    .hits
                    .iter()
                    .map(|hit| hit.unit.unit_id.clone())
                    .collect();
                let mut fetch = self
                    .executor
                    .fetch_price_periods(&unit_ids, stay, cancel)
                    .await?;
                round_trips += fetch.round_trips;

                outcome
                    .hits
                    .iter()
                    .map(|hit| {
                        let unit_periods = fetch
                            .periods
                            .remove(&hit.unit.unit_id)
                            .unwrap_or_default();
                        let quote = resolve_stay_price(&hit.unit, stay, &unit_periods);
                        build_result(&request, outcome.level, hit, quote)
                    })
                    .collect()
            }
            None => outcome
                .hits
                .iter()
                .map(|hit| build_result(&request, outcome.level, hit, base_quote(&hit.unit)))
                .collect(),
        };

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        rank(&mut results, request.sort);
        let (min_total, max_total, avg_total) = price_summary(&results);
        let candidates = results.len();

        let page = request.page.unwrap_or(1);
        let page_size = request
            .page_size
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size);
        let (page_results, pagination) = paginate(results, page, page_size);

        let notice = (outcome.level == RelaxationLevel::Exhausted && candidates == 0)
            .then_some(SearchNotice::NoResultsAfterFullRelaxation);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            level = outcome.level.label(),
            candidates,
            attempts = outcome.attempts.len(),
            round_trips,
            elapsed_ms,
            "search completed"
        );

        Ok(SearchResponse {
            results: page_results,
            pagination,
            relaxed_dimensions: relaxed_dimensions(&request, outcome.level),
            applied_filters: AppliedFilters {
                predicates: outcome.plan.units.predicates,
                availability: outcome.plan.exclusion,
                request,
            },
            relaxation_level: outcome.level,
            notice,
            stats: SearchStats {
                candidates,
                min_total,
                max_total,
                avg_total,
                attempts: outcome.attempts,
                index_round_trips: round_trips,
            },
            timing: SearchTiming { elapsed_ms },
        })
    }
}
