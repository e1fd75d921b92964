use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;

use super::common::*;
use crate::config::SearchConfig;
use crate::search::assembler::SearchNotice;
use crate::search::domain::{SearchRequest, StayRange, UnitId};
use crate::search::error::SearchError;
use crate::search::query::{ExclusionMode, ValidationError};
use crate::search::relaxation::{FilterDimension, RelaxationLevel};

fn sanaa_stay(check_in: u32, check_out: u32) -> SearchRequest {
    SearchRequest {
        city: Some("Sanaa".to_string()),
        stay: Some(stay(check_in, check_out)),
        ..SearchRequest::default()
    }
}

#[tokio::test]
async fn invalid_request_never_reaches_the_index() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service(&store);
    let request = SearchRequest {
        stay: Some(StayRange {
            check_in: day(5),
            check_out: day(5),
        }),
        ..SearchRequest::default()
    };

    let before = store.round_trips();
    let error = service.search(request).await.expect_err("rejected");

    assert_eq!(
        error,
        SearchError::Validation(ValidationError::EmptyStay {
            check_in: day(5),
            check_out: day(5),
        })
    );
    assert_eq!(store.round_trips(), before);
}

#[tokio::test]
async fn pricing_is_fetched_in_one_batch() {
    let store = seeded_store(
        sanaa_units(),
        Vec::new(),
        vec![
            period("p-1", "sanaa-1", 2, 5, 150, 1),
            period("p-2", "sanaa-2", 1, 10, 90, 1),
            period("p-3", "sanaa-3", 1, 2, 300, 1),
        ],
    )
    .await;
    let service = build_service(&store);

    let before = store.round_trips();
    let response = service.search(sanaa_stay(1, 6)).await.expect("search runs");

    assert_eq!(store.round_trips() - before, 2);
    assert_eq!(response.stats.index_round_trips, 2);
    assert_eq!(response.relaxation_level, RelaxationLevel::Exact);
    assert_eq!(response.results.len(), 5);

    let total_of = |id: &str| {
        response
            .results
            .iter()
            .find(|result| result.unit_id.0 == id)
            .map(|result| result.total_price)
            .expect("unit present")
    };
    assert_eq!(total_of("sanaa-1"), 650);
    assert_eq!(total_of("sanaa-2"), 450);
    assert_eq!(total_of("sanaa-3"), 700);
    assert_eq!(total_of("sanaa-4"), 500);

    assert_eq!(response.stats.min_total, Some(450));
    assert_eq!(response.stats.max_total, Some(700));
    assert_eq!(response.results[0].unit_id.0, "sanaa-2");
}

#[tokio::test]
async fn search_without_stay_quotes_base_price() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service(&store);
    let request = SearchRequest {
        city: Some("Sanaa".to_string()),
        ..SearchRequest::default()
    };

    let before = store.round_trips();
    let response = service.search(request).await.expect("search runs");

    assert_eq!(store.round_trips() - before, 1);
    assert!(response.applied_filters.availability.is_none());
    assert!(response
        .results
        .iter()
        .all(|result| result.total_price == 100 && result.price.nights == 0));
}

#[tokio::test]
async fn relaxed_response_reports_applied_filters_and_mismatches() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service(&store);
    let request = SearchRequest {
        amenities: Some(BTreeSet::from(["pool".to_string()])),
        ..sanaa_stay(1, 4)
    };

    let response = service.search(request).await.expect("search runs");

    assert_eq!(response.relaxation_level, RelaxationLevel::RelaxSoft);
    assert_eq!(response.relaxed_dimensions, vec![FilterDimension::Amenities]);
    assert_eq!(response.results.len(), 5);
    assert!(response.results.iter().all(|result| {
        result.relaxation_level == RelaxationLevel::RelaxSoft
            && result.mismatches.len() == 1
            && result.mismatches[0].dimension == FilterDimension::Amenities
    }));
    assert!(response
        .applied_filters
        .predicates
        .iter()
        .all(|predicate| predicate.field() != "amenities"));
    assert_eq!(
        response.applied_filters.availability.map(|query| query.mode),
        Some(ExclusionMode::Exclude)
    );
    assert_eq!(response.stats.attempts.len(), 2);
}

#[tokio::test]
async fn exhausted_search_returns_notice() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service(&store);
    let request = SearchRequest {
        property_type_id: Some("villa".to_string()),
        ..sanaa_stay(1, 4)
    };

    let response = service.search(request).await.expect("search runs");

    assert!(response.results.is_empty());
    assert_eq!(response.relaxation_level, RelaxationLevel::Exhausted);
    assert_eq!(
        response.notice,
        Some(SearchNotice::NoResultsAfterFullRelaxation)
    );
    assert_eq!(response.pagination.total_results, 0);
    assert_eq!(response.stats.min_total, None);
}

#[tokio::test]
async fn page_size_is_clamped_to_configured_maximum() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service_with(
        &store,
        SearchConfig {
            min_results: 1,
            ..search_config()
        },
    );

    let response = service
        .search(SearchRequest {
            page_size: Some(500),
            ..SearchRequest::default()
        })
        .await
        .expect("search runs");
    assert_eq!(response.pagination.page_size, 50);
    assert_eq!(response.pagination.total_results, 7);

    let response = service
        .search(SearchRequest {
            page: Some(2),
            page_size: Some(3),
            ..SearchRequest::default()
        })
        .await
        .expect("search runs");
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.pagination.total_pages, 3);
    assert_eq!(response.stats.candidates, 7);
}

#[tokio::test]
async fn unavailable_index_surfaces_as_error() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    store.set_offline(true);
    let service = build_service(&store);

    match service.search(sanaa_stay(1, 4)).await {
        Err(SearchError::IndexUnavailable(_)) => {}
        other => panic!("expected unavailable error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_search_returns_nothing() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service(&store);
    let cancel = CancellationToken::new();
    cancel.cancel();

    match service.search_with_cancel(sanaa_stay(1, 4), &cancel).await {
        Err(SearchError::Cancelled) => {}
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test]
async fn index_updates_are_visible_to_the_next_search() {
    use crate::search::index::IndexMaintainer;

    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service_with(
        &store,
        SearchConfig {
            min_results: 1,
            ..search_config()
        },
    );

    let before = service.search(sanaa_stay(1, 4)).await.expect("search runs");
    assert_eq!(before.results.len(), 5);

    store
        .upsert_availability_block(block("b-new", "sanaa-3", 2, 3))
        .await
        .expect("block indexed");
    let after = service.search(sanaa_stay(1, 4)).await.expect("search runs");
    assert_eq!(after.results.len(), 4);
    assert!(after.results.iter().all(|result| result.unit_id.0 != "sanaa-3"));

    store
        .remove_availability_block("b-new")
        .await
        .expect("block released");
    let released = service.search(sanaa_stay(1, 4)).await.expect("search runs");
    assert_eq!(released.results.len(), 5);
}

#[tokio::test]
async fn overlong_stay_is_rejected_before_the_index() {
    let store = seeded_store(sanaa_units(), Vec::new(), Vec::new()).await;
    let service = build_service_with(
        &store,
        SearchConfig {
            max_stay_nights: 7,
            ..search_config()
        },
    );

    let before = store.round_trips();
    let error = service
        .search(sanaa_stay(1, 20))
        .await
        .expect_err("stay too long");

    assert_eq!(
        error,
        SearchError::Validation(ValidationError::StayTooLong { nights: 19, max: 7 })
    );
    assert_eq!(store.round_trips(), before);

    let at_limit = service.search(sanaa_stay(1, 8)).await.expect("search runs");
    assert_eq!(at_limit.results.len(), 5);
    assert!(at_limit.results.iter().all(|result| result.price.nights == 7));
}

#[tokio::test]
async fn removed_unit_comes_back_without_its_old_blocks_and_periods() {
    use crate::search::index::IndexMaintainer;

    let store = seeded_store(
        sanaa_units(),
        vec![block("b-old", "sanaa-3", 2, 3)],
        vec![period("p-old", "sanaa-3", 1, 10, 300, 1)],
    )
    .await;
    let service = build_service_with(
        &store,
        SearchConfig {
            min_results: 1,
            ..search_config()
        },
    );

    store
        .remove_unit(&UnitId("sanaa-3".to_string()))
        .await
        .expect("unit removed");
    store
        .upsert_unit(with_amenities(unit("sanaa-3", "Sanaa"), &["wifi"]))
        .await
        .expect("unit reindexed");

    let response = service.search(sanaa_stay(1, 4)).await.expect("search runs");

    assert_eq!(response.relaxation_level, RelaxationLevel::Exact);
    assert_eq!(response.results.len(), 5);
    let returned = response
        .results
        .iter()
        .find(|result| result.unit_id.0 == "sanaa-3")
        .expect("reindexed unit is bookable");
    assert_eq!(returned.total_price, 300);
}
