use crate::cli::ServeArgs;
use crate::infra::{build_hub, load_integrations, AppState};
use crate::routes::with_hub_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use talent_hub::config::AppConfig;
use talent_hub::error::AppError;
use talent_hub::telemetry;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.integrations.take() {
        config.integrations_file = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let integrations = match &config.integrations_file {
        Some(path) => load_integrations(path)?,
        None => {
            warn!("HUB_INTEGRATIONS_FILE not set; starting without integrations");
            Vec::new()
        }
    };
    info!(count = integrations.len(), "integrations loaded");

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let hub = build_hub(&config.hub, integrations);
    let app = with_hub_routes(hub)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "integration hub ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
