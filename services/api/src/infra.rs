use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use talent_hub::config::HubConfig;
use talent_hub::error::AppError;
use talent_hub::integrations::{InMemoryHubStore, Integration, IntegrationHub, ProviderRegistry};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Hub = IntegrationHub<InMemoryHubStore>;

/// Reads the integration records the process starts with: a JSON array of integrations,
/// credentials included.
pub(crate) fn load_integrations(path: &Path) -> Result<Vec<Integration>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    parse_integrations(&raw)
}

pub(crate) fn parse_integrations(raw: &str) -> Result<Vec<Integration>, AppError> {
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn build_hub(config: &HubConfig, integrations: Vec<Integration>) -> Arc<Hub> {
    let store = Arc::new(InMemoryHubStore::with_integrations(integrations));
    Arc::new(IntegrationHub::new(
        store,
        ProviderRegistry::with_defaults(),
        config.clone(),
    ))
}
