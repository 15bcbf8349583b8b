use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;

use super::campaign::{CampaignEngine, CampaignRequest, CampaignRun};
use super::connectors::ProviderRegistry;
use super::domain::{Integration, IntegrationId, IntegrationKind, IntegrationStatus, RateLimitState};
use super::error::{ErrorKind, HubError};
use super::quota::RateTracker;
use super::scheduling::{SchedulingOutcome, SchedulingRequest, SchedulingWorkflow};
use super::store::{CanonicalStore, IntegrationRepository, SyncLogRepository};
use super::sync::{SyncOrchestrator, SyncOutcome};
use super::sync_log::{SyncLog, SyncMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub authenticated: bool,
    pub reachable: bool,
    pub rate_limits: Option<RateLimitState>,
}

/// Entry point for the composite operations exposed to the API layer.
///
/// Every run resolves its integration, checks it may run, and builds a fresh connector
/// from a snapshot of the stored credentials.
pub struct IntegrationHub<S> {
    store: Arc<S>,
    registry: ProviderRegistry,
    rates: Arc<RateTracker>,
    config: HubConfig,
    sync: SyncOrchestrator<S>,
    campaigns: CampaignEngine,
    scheduling: SchedulingWorkflow,
}

impl<S> IntegrationHub<S>
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore,
{
    pub fn new(store: Arc<S>, registry: ProviderRegistry, config: HubConfig) -> Self {
        let rates = Arc::new(RateTracker::new());
        Self {
            sync: SyncOrchestrator::new(store.clone(), rates.clone(), &config),
            campaigns: CampaignEngine::new(rates.clone(), &config),
            scheduling: SchedulingWorkflow::new(&config),
            store,
            registry,
            rates,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn rates(&self) -> &RateTracker {
        &self.rates
    }

    pub async fn run_sync(
        &self,
        id: &IntegrationId,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, HubError> {
        let integration = self.runnable(id, Some(IntegrationKind::Ats)).await?;
        let connector = self
            .registry
            .build_ats(&integration, self.config.call_timeout)?;
        self.sync
            .run(&integration, connector.as_ref(), mode, cancel)
            .await
    }

    pub async fn run_campaign(
        &self,
        id: &IntegrationId,
        request: &CampaignRequest,
        cancel: &CancellationToken,
    ) -> Result<CampaignRun, HubError> {
        let integration = self
            .runnable(id, Some(IntegrationKind::Communication))
            .await?;
        let connector = self
            .registry
            .build_communication(&integration, self.config.call_timeout)?;
        self.campaigns
            .run(&integration.id, connector.as_ref(), request, cancel)
            .await
    }

    pub async fn run_scheduling(
        &self,
        request: &SchedulingRequest,
    ) -> Result<SchedulingOutcome, HubError> {
        request.validate()?;
        let calendar_integration = self
            .runnable(&request.calendar_integration_id, Some(IntegrationKind::Calendar))
            .await?;
        let messenger_integration = self
            .runnable(
                &request.communication_integration_id,
                Some(IntegrationKind::Communication),
            )
            .await?;

        let calendar = self
            .registry
            .build_calendar(&calendar_integration, self.config.call_timeout)?;
        let messenger = self
            .registry
            .build_communication(&messenger_integration, self.config.call_timeout)?;

        let outcome = self
            .scheduling
            .run(calendar.as_ref(), messenger.as_ref(), request)
            .await;
        self.rates
            .observe(&calendar_integration.id, calendar.rate_limits());
        self.rates
            .observe(&messenger_integration.id, messenger.rate_limits());
        outcome
    }

    /// Authenticates, then probes, and records the result on the integration.
    #[tracing::instrument(skip_all, fields(integration_id = %id))]
    pub async fn test_connection(&self, id: &IntegrationId) -> Result<ConnectionReport, HubError> {
        let mut integration = self.runnable(id, None).await?;
        let connector = self
            .registry
            .build_base(&integration, self.config.call_timeout)?;

        let timeout = self.config.call_timeout;
        let authenticated = tokio::time::timeout(timeout, connector.authenticate())
            .await
            .unwrap_or(false);
        let reachable = authenticated
            && tokio::time::timeout(timeout, connector.test_connection())
                .await
                .unwrap_or(false);
        let rate_limits = connector.rate_limits();
        self.rates.observe(&integration.id, rate_limits);

        if authenticated && reachable {
            integration.status = IntegrationStatus::Active;
            integration.last_error = None;
        } else {
            integration.status = IntegrationStatus::Error;
            integration.last_error = Some(if authenticated {
                format!("{} is unreachable", integration.provider)
            } else {
                format!("{} rejected the configured credentials", integration.provider)
            });
        }
        self.store.save_integration(integration).await?;

        Ok(ConnectionReport {
            authenticated,
            reachable,
            rate_limits,
        })
    }

    /// Stored integration; its serialized form never includes credentials.
    pub async fn integration_view(&self, id: &IntegrationId) -> Result<Integration, HubError> {
        self.store
            .integration(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn sync_logs(&self, id: &IntegrationId) -> Result<Vec<SyncLog>, HubError> {
        self.integration_view(id).await?;
        Ok(self.store.logs_for(id).await?)
    }

    async fn runnable(
        &self,
        id: &IntegrationId,
        kind: Option<IntegrationKind>,
    ) -> Result<Integration, HubError> {
        let integration = self.integration_view(id).await?;

        if !integration.enabled || integration.status == IntegrationStatus::Disabled {
            return Err(HubError::new(
                ErrorKind::IntegrationDisabled,
                format!("integration {id} is disabled"),
            ));
        }
        if let Some(expected) = kind {
            if integration.kind != expected {
                return Err(HubError::new(
                    ErrorKind::CapabilityMismatch,
                    format!(
                        "integration {id} is a {} integration, expected {}",
                        integration.kind.label(),
                        expected.label()
                    ),
                ));
            }
        }
        if !self.registry.knows(integration.kind, &integration.provider) {
            return Err(HubError::new(
                ErrorKind::UnknownProvider,
                format!("no {} provider named '{}'", integration.kind.label(), integration.provider),
            ));
        }
        Ok(integration)
    }
}

fn not_found(id: &IntegrationId) -> HubError {
    HubError::new(
        ErrorKind::IntegrationNotFound,
        format!("integration {id} not found"),
    )
}
