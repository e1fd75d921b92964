use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;

use super::domain::SearchRequest;
use super::error::SearchError;
use super::index::IndexStore;
use super::service::StaySearchService;

/// Router builder exposing the availability search endpoint.
pub fn search_router<S>(service: Arc<StaySearchService<S>>) -> Router
where
    S: IndexStore + 'static,
{
    Router::new()
        .route("/api/v1/search", post(search_handler::<S>))
        .with_state(service)
}

pub(crate) fn error_status(error: &SearchError) -> StatusCode {
    match error {
        SearchError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SearchError::IndexUnavailable(_) | SearchError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SearchError::IndexTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

pub(crate) async fn search_handler<S>(
    State(service): State<Arc<StaySearchService<S>>>,
    axum::Json(request): axum::Json<SearchRequest>,
) -> Response
where
    S: IndexStore + 'static,
{
    match service.search(request).await {
        Ok(response) => (StatusCode::OK, axum::Json(response)).into_response(),
        Err(error) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (error_status(&error), axum::Json(payload)).into_response()
        }
    }
}
