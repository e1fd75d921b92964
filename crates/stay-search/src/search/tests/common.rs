use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::SearchConfig;
use crate::search::domain::{
    AvailabilityBlockRecord, BlockSource, GeoPoint, PricePeriodRecord, PropertyId, StayRange,
    UnitId, UnitIndexRecord,
};
use crate::search::executor::{AtomicSearchExecutor, ExecutorSettings};
use crate::search::index::{InMemoryIndexStore, IndexFixture};
use crate::search::service::StaySearchService;

pub(super) const SANAA: GeoPoint = GeoPoint {
    lat: 15.3694,
    lon: 44.1910,
};

pub(super) const ADEN: GeoPoint = GeoPoint {
    lat: 12.7855,
    lon: 45.0187,
};

pub(super) fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, d).expect("valid date")
}

pub(super) fn stay(check_in: u32, check_out: u32) -> StayRange {
    StayRange {
        check_in: day(check_in),
        check_out: day(check_out),
    }
}

pub(super) fn unit(id: &str, city: &str) -> UnitIndexRecord {
    UnitIndexRecord {
        unit_id: UnitId(id.to_string()),
        property_id: PropertyId(format!("prop-{id}")),
        name: format!("Unit {id}"),
        city: city.to_string(),
        property_type_id: "apartment".to_string(),
        location: if city == "Aden" { ADEN } else { SANAA },
        capacity: 4,
        base_price: 100,
        currency: "YER".to_string(),
        rating: Some(4.0),
        amenities: BTreeSet::new(),
        attributes: BTreeMap::new(),
        is_active: true,
    }
}

pub(super) fn with_amenities(mut record: UnitIndexRecord, amenities: &[&str]) -> UnitIndexRecord {
    record.amenities = amenities.iter().map(|a| a.to_string()).collect();
    record
}

pub(super) fn block(id: &str, unit_id: &str, start: u32, end: u32) -> AvailabilityBlockRecord {
    AvailabilityBlockRecord {
        block_id: id.to_string(),
        unit_id: UnitId(unit_id.to_string()),
        start: day(start),
        end: day(end),
        source: BlockSource::Booking,
    }
}

pub(super) fn period(
    id: &str,
    unit_id: &str,
    start: u32,
    end: u32,
    nightly_price: u64,
    priority: u64,
) -> PricePeriodRecord {
    PricePeriodRecord {
        period_id: id.to_string(),
        unit_id: UnitId(unit_id.to_string()),
        start: day(start),
        end: day(end),
        nightly_price,
        currency: "YER".to_string(),
        priority,
    }
}

pub(super) fn search_config() -> SearchConfig {
    SearchConfig {
        min_results: 5,
        candidate_limit: 100,
        blocked_safety_cap: 10_000,
        chunk_size: 8,
        index_timeout: Duration::from_millis(200),
        max_stay_nights: 60,
        default_page_size: 20,
        max_page_size: 50,
    }
}

pub(super) fn executor_settings() -> ExecutorSettings {
    let config = search_config();
    ExecutorSettings {
        candidate_limit: config.candidate_limit,
        blocked_safety_cap: config.blocked_safety_cap,
        chunk_size: config.chunk_size,
        index_timeout: config.index_timeout,
    }
}

pub(super) async fn seeded_store(
    units: Vec<UnitIndexRecord>,
    blocks: Vec<AvailabilityBlockRecord>,
    price_periods: Vec<PricePeriodRecord>,
) -> InMemoryIndexStore {
    let store = InMemoryIndexStore::new();
    IndexFixture {
        units,
        blocks,
        price_periods,
    }
    .load_into(&store)
    .await
    .expect("fixture loads");
    store
}

/// Five Sanaa units without a pool plus two in Aden, one with a pool.
pub(super) fn sanaa_units() -> Vec<UnitIndexRecord> {
    let mut units: Vec<UnitIndexRecord> = (1..=5)
        .map(|n| with_amenities(unit(&format!("sanaa-{n}"), "Sanaa"), &["wifi"]))
        .collect();
    units.push(unit("aden-1", "Aden"));
    units.push(with_amenities(unit("aden-2", "Aden"), &["pool"]));
    units
}

pub(super) fn build_executor(
    store: &InMemoryIndexStore,
) -> AtomicSearchExecutor<InMemoryIndexStore> {
    AtomicSearchExecutor::new(Arc::new(store.clone()), executor_settings())
}

pub(super) fn build_service(store: &InMemoryIndexStore) -> StaySearchService<InMemoryIndexStore> {
    StaySearchService::new(Arc::new(store.clone()), &search_config())
}

pub(super) fn build_service_with(
    store: &InMemoryIndexStore,
    config: SearchConfig,
) -> StaySearchService<InMemoryIndexStore> {
    StaySearchService::new(Arc::new(store.clone()), &config)
}

pub(super) fn unit_ids<'a>(ids: impl IntoIterator<Item = &'a UnitId>) -> Vec<String> {
    ids.into_iter().map(|id| id.0.clone()).collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
