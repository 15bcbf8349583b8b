use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::campaign::CampaignRequest;
use super::domain::IntegrationId;
use super::error::{ErrorKind, HubError};
use super::scheduling::SchedulingRequest;
use super::service::IntegrationHub;
use super::store::{CanonicalStore, IntegrationRepository, SyncLogRepository};
use super::sync_log::SyncMode;

/// Trigger and read endpoints for the hub's composite operations.
pub fn hub_router<S>(hub: Arc<IntegrationHub<S>>) -> Router
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore + 'static,
{
    Router::new()
        .route("/api/v1/integrations/:integration_id", get(integration_handler::<S>))
        .route(
            "/api/v1/integrations/:integration_id/sync",
            post(sync_handler::<S>),
        )
        .route(
            "/api/v1/integrations/:integration_id/sync-logs",
            get(sync_logs_handler::<S>),
        )
        .route(
            "/api/v1/integrations/:integration_id/test",
            post(test_handler::<S>),
        )
        .route(
            "/api/v1/integrations/:integration_id/campaigns",
            post(campaign_handler::<S>),
        )
        .route("/api/v1/scheduling", post(scheduling_handler::<S>))
        .with_state(hub)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncTrigger {
    #[serde(default)]
    mode: SyncMode,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::IntegrationNotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::IntegrationDisabled | ErrorKind::Cancelled | ErrorKind::NoAvailability => {
                StatusCode::CONFLICT
            }
            ErrorKind::CapabilityMismatch
            | ErrorKind::UnknownProvider
            | ErrorKind::UnsupportedOperation
            | ErrorKind::InvalidConfiguration
            | ErrorKind::MappingRejection => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::AuthenticationFailed | ErrorKind::TransientProviderError => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let mut payload = json!({
            "kind": self.kind,
            "error": self.message,
        });
        if let Some(retry_at) = self.retry_at {
            payload["retry_at"] = json!(retry_at);
        }

        let mut response = (self.kind.status_code(), Json(payload)).into_response();
        if let Some(retry_at) = self.retry_at {
            let wait = (retry_at - Utc::now()).num_seconds().max(1);
            if let Ok(value) = HeaderValue::from_str(&wait.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Runs `job` on its own task. If the caller goes away the token is cancelled, so the
/// run stops starting new calls and still closes its records.
async fn detached<T, F, Fut>(job: F) -> Result<T, HubError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<T, HubError>> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    tokio::spawn(job(cancel))
        .await
        .map_err(|err| HubError::new(ErrorKind::Storage, format!("run aborted: {err}")))?
}

pub(crate) async fn sync_handler<S>(
    State(hub): State<Arc<IntegrationHub<S>>>,
    Path(integration_id): Path<String>,
    trigger: Option<Json<SyncTrigger>>,
) -> Response
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore + 'static,
{
    let mode = trigger.map(|Json(trigger)| trigger.mode).unwrap_or_default();
    let id = IntegrationId(integration_id);
    let outcome = detached(move |cancel| async move {
        hub.run_sync(&id, mode, &cancel).await
    })
    .await;

    match outcome {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn campaign_handler<S>(
    State(hub): State<Arc<IntegrationHub<S>>>,
    Path(integration_id): Path<String>,
    Json(request): Json<CampaignRequest>,
) -> Response
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore + 'static,
{
    let id = IntegrationId(integration_id);
    let outcome = detached(move |cancel| async move {
        hub.run_campaign(&id, &request, &cancel).await
    })
    .await;

    match outcome {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn scheduling_handler<S>(
    State(hub): State<Arc<IntegrationHub<S>>>,
    Json(request): Json<SchedulingRequest>,
) -> Response
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore + 'static,
{
    match hub.run_scheduling(&request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.report())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn test_handler<S>(
    State(hub): State<Arc<IntegrationHub<S>>>,
    Path(integration_id): Path<String>,
) -> Response
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore + 'static,
{
    match hub.test_connection(&IntegrationId(integration_id)).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn integration_handler<S>(
    State(hub): State<Arc<IntegrationHub<S>>>,
    Path(integration_id): Path<String>,
) -> Response
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore + 'static,
{
    match hub.integration_view(&IntegrationId(integration_id)).await {
        Ok(integration) => (StatusCode::OK, Json(integration)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn sync_logs_handler<S>(
    State(hub): State<Arc<IntegrationHub<S>>>,
    Path(integration_id): Path<String>,
) -> Response
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore + 'static,
{
    match hub.sync_logs(&IntegrationId(integration_id)).await {
        Ok(logs) => (StatusCode::OK, Json(json!({ "sync_logs": logs }))).into_response(),
        Err(err) => err.into_response(),
    }
}
