use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use stay_search::error::AppError;
use stay_search::search::{apply_event, search_router, IndexEvent, IndexStore, StaySearchService};
use tracing::debug;

pub(crate) fn with_search_routes<S>(service: Arc<StaySearchService<S>>) -> axum::Router
where
    S: IndexStore + 'static,
{
    search_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/index/events",
            axum::routing::post(index_event_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready", "indexed_units": state.index.unit_count() })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Applies one upstream change event to the in-memory index.
pub(crate) async fn index_event_endpoint(
    Extension(state): Extension<AppState>,
    Json(event): Json<IndexEvent>,
) -> Result<StatusCode, AppError> {
    debug!(?event, "applying index event");
    apply_event(state.index.as_ref(), event).await?;
    Ok(StatusCode::ACCEPTED)
}
