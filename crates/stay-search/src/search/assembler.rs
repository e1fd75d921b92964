use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{GeoPoint, PropertyId, SearchRequest, SortOrder, UnitId};
use super::index::UnitHit;
use super::pricing::PriceQuote;
use super::query::{ExclusionQuery, UnitPredicate};
use super::relaxation::{
    mismatches_for, FilterDimension, FilterMismatch, RelaxationAttempt, RelaxationLevel,
};

/// One ranked, priced unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub unit_id: UnitId,
    pub property_id: PropertyId,
    pub name: String,
    pub city: String,
    pub property_type_id: String,
    pub capacity: u32,
    pub rating: Option<f32>,
    pub amenities: BTreeSet<String>,
    pub location: GeoPoint,
    pub total_price: u64,
    pub currency: String,
    pub price: PriceQuote,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub mismatches: Vec<FilterMismatch>,
    pub relaxation_level: RelaxationLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_results: usize,
    pub total_pages: u32,
}

/// Filters actually enforced by the attempt that produced the results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedFilters {
    pub request: SearchRequest,
    pub predicates: Vec<UnitPredicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<ExclusionQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchStats {
    pub candidates: usize,
    pub min_total: Option<u64>,
    pub max_total: Option<u64>,
    pub avg_total: Option<f64>,
    pub attempts: Vec<RelaxationAttempt>,
    pub index_round_trips: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchTiming {
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchNotice {
    NoResultsAfterFullRelaxation,
}

/// Paginated search output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub pagination: Pagination,
    pub applied_filters: AppliedFilters,
    pub relaxation_level: RelaxationLevel,
    pub relaxed_dimensions: Vec<FilterDimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<SearchNotice>,
    pub stats: SearchStats,
    pub timing: SearchTiming,
}

pub fn build_result(
    request: &SearchRequest,
    level: RelaxationLevel,
    hit: &UnitHit,
    quote: PriceQuote,
) -> SearchResult {
    let unit = &hit.unit;
    let distance_km = request
        .geo
        .map(|geo| geo.point.distance_km(&unit.location));

    SearchResult {
        unit_id: unit.unit_id.clone(),
        property_id: unit.property_id.clone(),
        name: unit.name.clone(),
        city: unit.city.clone(),
        property_type_id: unit.property_type_id.clone(),
        capacity: unit.capacity,
        rating: unit.rating,
        amenities: unit.amenities.clone(),
        location: unit.location,
        total_price: quote.total,
        currency: quote.currency.clone(),
        price: quote,
        distance_km,
        mismatches: mismatches_for(request, level, hit),
        relaxation_level: level,
    }
}

fn missing_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_distance(a: &SearchResult, b: &SearchResult) -> Ordering {
    missing_last(a.distance_km, b.distance_km, |x, y| x.total_cmp(&y))
}

fn by_price(a: &SearchResult, b: &SearchResult) -> Ordering {
    a.total_price.cmp(&b.total_price)
}

fn by_rating_desc(a: &SearchResult, b: &SearchResult) -> Ordering {
    missing_last(a.rating, b.rating, |x, y| y.total_cmp(&x))
}

/// Distance ascending, price ascending, rating descending, unit id as the final key.
fn recommended(a: &SearchResult, b: &SearchResult) -> Ordering {
    by_distance(a, b)
        .then_with(|| by_price(a, b))
        .then_with(|| by_rating_desc(a, b))
        .then_with(|| a.unit_id.cmp(&b.unit_id))
}

pub fn rank(results: &mut [SearchResult], sort: SortOrder) {
    results.sort_by(|a, b| {
        let primary = match sort {
            SortOrder::Recommended | SortOrder::DistanceAsc => Ordering::Equal,
            SortOrder::PriceAsc => by_price(a, b),
            SortOrder::PriceDesc => by_price(b, a),
            SortOrder::RatingDesc => by_rating_desc(a, b),
        };
        primary.then_with(|| recommended(a, b))
    });
}

/// Slice out one 1-based page.
pub fn paginate(
    results: Vec<SearchResult>,
    page: u32,
    page_size: u32,
) -> (Vec<SearchResult>, Pagination) {
    let total_results = results.len();
    let page_size = page_size.max(1);
    let page = page.max(1);
    let total_pages = total_results.div_ceil(page_size as usize) as u32;

    let skip = (page as usize - 1).saturating_mul(page_size as usize);
    let page_results = results
        .into_iter()
        .skip(skip)
        .take(page_size as usize)
        .collect();

    (
        page_results,
        Pagination {
            page,
            page_size,
            total_results,
            total_pages,
        },
    )
}

/// Price spread across every ranked candidate, not just the current page.
pub fn price_summary(results: &[SearchResult]) -> (Option<u64>, Option<u64>, Option<f64>) {
    let totals = results.iter().map(|result| result.total_price);
    let min = totals.clone().min();
    let max = totals.clone().max();
    let avg = (!results.is_empty())
        .then(|| totals.map(|total| total as f64).sum::<f64>() / results.len() as f64);
    (min, max, avg)
}
