use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use super::common::*;
use crate::integrations::domain::{IntegrationId, IntegrationStatus, RateLimitState};
use crate::integrations::error::ErrorKind;
use crate::integrations::sync_log::SyncMode;

#[tokio::test]
async fn unknown_integration_is_not_found() {
    let fakes = Fakes::default();
    let (hub, _) = default_hub(&fakes);

    let err = hub
        .run_sync(
            &IntegrationId("missing".to_string()),
            SyncMode::Full,
            &CancellationToken::new(),
        )
        .await
        .expect_err("missing integration");

    assert_eq!(err.kind, ErrorKind::IntegrationNotFound);
}

#[tokio::test]
async fn disabled_integration_is_refused() {
    let fakes = Fakes::default();
    let mut integration = ats_integration();
    integration.enabled = false;
    let (hub, store) = build_hub(&fakes, [integration]);

    let err = hub
        .run_sync(&ats_id(), SyncMode::Full, &CancellationToken::new())
        .await
        .expect_err("disabled");

    assert_eq!(err.kind, ErrorKind::IntegrationDisabled);
    assert_eq!(fakes.ats.auth_calls.load(Ordering::SeqCst), 0);
    assert!(store.candidates(&ats_id()).is_empty());
}

#[tokio::test]
async fn sync_on_calendar_integration_is_a_capability_mismatch() {
    let fakes = Fakes::default();
    let (hub, _) = default_hub(&fakes);

    let err = hub
        .run_sync(&calendar_id(), SyncMode::Full, &CancellationToken::new())
        .await
        .expect_err("wrong family");

    assert_eq!(err.kind, ErrorKind::CapabilityMismatch);
}

#[tokio::test]
async fn unregistered_provider_is_reported() {
    let fakes = Fakes::default();
    let mut integration = ats_integration();
    integration.provider = "workday".to_string();
    let (hub, _) = build_hub(&fakes, [integration]);

    let err = hub
        .run_sync(&ats_id(), SyncMode::Full, &CancellationToken::new())
        .await
        .expect_err("unknown provider");

    assert_eq!(err.kind, ErrorKind::UnknownProvider);
}

#[tokio::test]
async fn connection_test_marks_integration_active() {
    let fakes = Fakes::default();
    let quota = RateLimitState {
        limit: 600,
        remaining: 599,
        reset_time: at(12, 0),
    };
    *fakes.messenger.rate_limits.lock().expect("rate limits") = Some(quota);
    let (hub, _) = default_hub(&fakes);

    let report = hub
        .test_connection(&messenger_id())
        .await
        .expect("test runs");

    assert!(report.authenticated);
    assert!(report.reachable);
    assert_eq!(report.rate_limits, Some(quota));
    assert_eq!(hub.rates().current(&messenger_id()), Some(quota));

    let integration = hub.integration_view(&messenger_id()).await.expect("view");
    assert_eq!(integration.status, IntegrationStatus::Active);
    assert!(integration.last_error.is_none());
}

#[tokio::test]
async fn connection_test_skips_probe_when_credentials_fail() {
    let fakes = Fakes::default();
    fakes.calendar.reject_credentials();
    let (hub, _) = default_hub(&fakes);

    let report = hub
        .test_connection(&calendar_id())
        .await
        .expect("test runs");

    assert!(!report.authenticated);
    assert!(!report.reachable);
    assert_eq!(fakes.calendar.probe_calls.load(Ordering::SeqCst), 0);

    let integration = hub.integration_view(&calendar_id()).await.expect("view");
    assert_eq!(integration.status, IntegrationStatus::Error);
    assert!(integration.last_error.is_some());
}

#[tokio::test]
async fn integration_view_never_exposes_credentials() {
    let fakes = Fakes::default();
    let (hub, _) = default_hub(&fakes);

    let integration = hub.integration_view(&ats_id()).await.expect("view");
    let payload = serde_json::to_value(&integration).expect("serializable");

    assert!(payload.get("credentials").is_none());
    assert!(!payload.to_string().contains("gh-secret"));
    assert!(!format!("{integration:?}").contains("gh-secret"));
}

#[tokio::test]
async fn sync_logs_are_listed_newest_first() {
    let fakes = Fakes::default();
    let (hub, _) = default_hub(&fakes);

    let first = hub
        .run_sync(&ats_id(), SyncMode::Full, &CancellationToken::new())
        .await
        .expect("first sync");
    let second = hub
        .run_sync(&ats_id(), SyncMode::Incremental, &CancellationToken::new())
        .await
        .expect("second sync");

    let logs = hub.sync_logs(&ats_id()).await.expect("logs");
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].id, second.log.id);
    assert_eq!(logs[1].id, first.log.id);
}
