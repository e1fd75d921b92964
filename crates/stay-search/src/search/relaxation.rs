use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::domain::SearchRequest;
use super::error::SearchError;
use super::executor::{AtomicSearchExecutor, ExecutionOutcome};
use super::index::{IndexStore, UnitHit};
use super::query::{compile, evaluate_attribute, CompiledSearch, FilterGroup, UnitPredicate};

/// Position on the relaxation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxationLevel {
    Exact,
    RelaxSoft,
    RelaxDates,
    RelaxLocation,
    Exhausted,
}

impl RelaxationLevel {
    pub const fn ordered() -> [RelaxationLevel; 5] {
        [
            RelaxationLevel::Exact,
            RelaxationLevel::RelaxSoft,
            RelaxationLevel::RelaxDates,
            RelaxationLevel::RelaxLocation,
            RelaxationLevel::Exhausted,
        ]
    }

    pub const fn next(self) -> RelaxationLevel {
        match self {
            RelaxationLevel::Exact => RelaxationLevel::RelaxSoft,
            RelaxationLevel::RelaxSoft => RelaxationLevel::RelaxDates,
            RelaxationLevel::RelaxDates => RelaxationLevel::RelaxLocation,
            RelaxationLevel::RelaxLocation | RelaxationLevel::Exhausted => {
                RelaxationLevel::Exhausted
            }
        }
    }

    /// Whether `group` has been dropped at this level. Levels drop cumulatively.
    pub fn drops(self, group: FilterGroup) -> bool {
        let dropped_from = match group {
            FilterGroup::Soft => RelaxationLevel::RelaxSoft,
            FilterGroup::Dates => RelaxationLevel::RelaxDates,
            FilterGroup::Location => RelaxationLevel::RelaxLocation,
        };
        self >= dropped_from
    }

    pub const fn label(self) -> &'static str {
        match self {
            RelaxationLevel::Exact => "exact",
            RelaxationLevel::RelaxSoft => "relax_soft",
            RelaxationLevel::RelaxDates => "relax_dates",
            RelaxationLevel::RelaxLocation => "relax_location",
            RelaxationLevel::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDimension {
    Amenities,
    Rating,
    Price,
    Attributes,
    Dates,
    City,
    Geo,
}

impl FilterDimension {
    pub const fn group(self) -> FilterGroup {
        match self {
            FilterDimension::Amenities
            | FilterDimension::Rating
            | FilterDimension::Price
            | FilterDimension::Attributes => FilterGroup::Soft,
            FilterDimension::Dates => FilterGroup::Dates,
            FilterDimension::City | FilterDimension::Geo => FilterGroup::Location,
        }
    }
}

/// Why a result was included despite not matching a requested filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterMismatch {
    pub dimension: FilterDimension,
    pub requested: Value,
    pub actual: Value,
}

/// Dimensions the request asked for that `level` no longer enforces.
pub fn relaxed_dimensions(request: &SearchRequest, level: RelaxationLevel) -> Vec<FilterDimension> {
    let requested = [
        (FilterDimension::Amenities, request.requested_amenities().is_some()),
        (FilterDimension::Rating, request.min_rating.is_some()),
        (FilterDimension::Price, request.requested_price().is_some()),
        (FilterDimension::Attributes, request.requested_attributes().is_some()),
        (FilterDimension::Dates, request.stay.is_some()),
        (
            FilterDimension::City,
            request.city.as_ref().is_some_and(|c| !c.trim().is_empty()),
        ),
        (
            FilterDimension::Geo,
            request.geo.is_some_and(|geo| geo.radius_km.is_some()),
        ),
    ];

    requested
        .into_iter()
        .filter(|(dimension, present)| *present && level.drops(dimension.group()))
        .map(|(dimension, _)| dimension)
        .collect()
}

/// Mismatch entries for one hit: only relaxed dimensions the unit actually fails.
pub fn mismatches_for(
    request: &SearchRequest,
    level: RelaxationLevel,
    hit: &UnitHit,
) -> Vec<FilterMismatch> {
    let unit = &hit.unit;
    let mut mismatches = Vec::new();

    for dimension in relaxed_dimensions(request, level) {
        let mismatch = match dimension {
            FilterDimension::Amenities => request.requested_amenities().and_then(|wanted| {
                let predicate = UnitPredicate::HasAmenities {
                    amenities: wanted.clone(),
                };
                (!predicate.matches(unit)).then(|| {
                    let offered: Vec<&String> = wanted.intersection(&unit.amenities).collect();
                    (json!(wanted), json!(offered))
                })
            }),
            FilterDimension::Rating => request.min_rating.and_then(|rating| {
                let predicate = UnitPredicate::MinRating { rating };
                (!predicate.matches(unit)).then(|| (json!(rating), json!(unit.rating)))
            }),
            FilterDimension::Price => request.requested_price().and_then(|bounds| {
                (!bounds.contains(unit.base_price))
                    .then(|| (json!(bounds), json!(unit.base_price)))
            }),
            FilterDimension::Attributes => request.requested_attributes().and_then(|predicates| {
                let failing: Vec<_> = predicates
                    .iter()
                    .filter(|predicate| !evaluate_attribute(predicate, unit))
                    .collect();
                (!failing.is_empty()).then(|| {
                    let actual: serde_json::Map<String, Value> = failing
                        .iter()
                        .map(|predicate| {
                            (
                                predicate.key.clone(),
                                json!(unit.attributes.get(&predicate.key)),
                            )
                        })
                        .collect();
                    (json!(failing), Value::Object(actual))
                })
            }),
            FilterDimension::Dates => request.stay.and_then(|stay| {
                (!hit.overlapping_blocks.is_empty())
                    .then(|| (json!(stay), json!(hit.overlapping_blocks)))
            }),
            FilterDimension::City => request.city.as_ref().and_then(|city| {
                (!unit.city.eq_ignore_ascii_case(city.trim()))
                    .then(|| (json!(city), json!(unit.city)))
            }),
            FilterDimension::Geo => request.geo.and_then(|geo| {
                let radius_km = geo.radius_km?;
                let distance = geo.point.distance_km(&unit.location);
                (distance > radius_km).then(|| {
                    (
                        json!({ "point": geo.point, "radius_km": radius_km }),
                        json!({ "distance_km": distance }),
                    )
                })
            }),
        };

        if let Some((requested, actual)) = mismatch {
            mismatches.push(FilterMismatch {
                dimension,
                requested,
                actual,
            });
        }
    }

    mismatches
}

/// Record of one step on the ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaxationAttempt {
    pub level: RelaxationLevel,
    pub candidates: usize,
    /// The compiled plan matched the previous step's, so its candidates were reused.
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxationOutcome {
    pub level: RelaxationLevel,
    /// Plan of the attempt whose candidates are returned.
    pub plan: CompiledSearch,
    pub hits: Vec<UnitHit>,
    pub attempts: Vec<RelaxationAttempt>,
    pub round_trips: usize,
}

/// Walks the ladder `Exact -> RelaxSoft -> RelaxDates -> RelaxLocation -> Exhausted`.
///
/// Steps run strictly in sequence since each decision depends on the previous count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaxationController {
    min_results: usize,
}

impl RelaxationController {
    pub fn new(min_results: usize) -> Self {
        Self {
            min_results: min_results.max(1),
        }
    }

    pub fn min_results(&self) -> usize {
        self.min_results
    }

    pub async fn run<S>(
        &self,
        request: &SearchRequest,
        executor: &AtomicSearchExecutor<S>,
        cancel: &CancellationToken,
    ) -> Result<RelaxationOutcome, SearchError>
    where
        S: IndexStore + 'static,
    {
        let mut level = RelaxationLevel::Exact;
        let mut attempts = Vec::new();
        let mut round_trips = 0;
        let mut previous: Option<(CompiledSearch, ExecutionOutcome)> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            let compiled = compile(request, level)?;
            let reusable = previous
                .as_ref()
                .filter(|(plan, _)| plan.same_plan(&compiled))
                .map(|(_, outcome)| outcome.clone());

            let (outcome, reused) = match reusable {
                Some(outcome) => (outcome, true),
                None => {
                    let outcome = executor.execute(&compiled, cancel).await?;
                    round_trips += outcome.round_trips;
                    (outcome, false)
                }
            };

            debug!(
                level = level.label(),
                candidates = outcome.hits.len(),
                matched = outcome.matched,
                excluded = outcome.excluded,
                reused,
                "relaxation attempt finished"
            );
            attempts.push(RelaxationAttempt {
                level,
                candidates: outcome.hits.len(),
                reused,
            });

            let satisfied = outcome.hits.len() >= self.min_results;
            if satisfied || !request.relaxation_allowed() {
                return Ok(RelaxationOutcome {
                    level,
                    plan: compiled,
                    hits: outcome.hits,
                    attempts,
                    round_trips,
                });
            }

            let next = level.next();
            if next == RelaxationLevel::Exhausted {
                return Ok(RelaxationOutcome {
                    level: RelaxationLevel::Exhausted,
                    plan: compiled,
                    hits: outcome.hits,
                    attempts,
                    round_trips,
                });
            }

            level = next;
            previous = Some((compiled, outcome));
        }
    }
}
