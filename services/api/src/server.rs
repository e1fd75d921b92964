use crate::cli::ServeArgs;
use crate::infra::{seed_store, AppState};
use crate::routes::with_search_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use stay_search::config::AppConfig;
use stay_search::error::AppError;
use stay_search::search::StaySearchService;
use stay_search::telemetry;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let index = Arc::new(seed_store(args.fixture.as_deref()).await?);
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        index: index.clone(),
    };

    let search_service = Arc::new(StaySearchService::new(index, &config.search));

    let app = with_search_routes(search_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        min_results = config.search.min_results,
        index_timeout_ms = config.search.index_timeout.as_millis() as u64,
        "stay search service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
