use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use stay_search::error::AppError;
use stay_search::search::{InMemoryIndexStore, IndexFixture};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) index: Arc<InMemoryIndexStore>,
}

pub(crate) fn read_fixture(path: &Path) -> Result<IndexFixture, AppError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Build the in-memory index, replaying `fixture` through the maintainer when given.
pub(crate) async fn seed_store(fixture: Option<&Path>) -> Result<InMemoryIndexStore, AppError> {
    let store = InMemoryIndexStore::new();
    if let Some(path) = fixture {
        let applied = read_fixture(path)?.load_into(&store).await?;
        info!(fixture = %path.display(), applied, units = store.unit_count(), "index seeded");
    }
    Ok(store)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
