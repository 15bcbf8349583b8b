use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;

use super::connectors::AtsConnector;
use super::domain::{
    CanonicalCandidate, CanonicalJob, Integration, IntegrationId, IntegrationStatus,
    NativeRecord, RecordFilters,
};
use super::error::{ConnectorError, ErrorKind, HubError};
use super::mapping::{self, FieldMapping};
use super::quota::{Admission, RateTracker};
use super::retry::{CallKind, CallPolicy};
use super::store::{CanonicalStore, IntegrationRepository, RepositoryError, SyncLogRepository};
use super::sync_log::{SyncErrorDetail, SyncLog, SyncMode, SyncStage, SyncStatus};

/// Closed sync log plus the run-level error kind when the run failed outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub log: SyncLog,
    pub error: Option<ErrorKind>,
}

enum Work {
    Candidate(NativeRecord),
    Job(NativeRecord),
}

enum RecordResult {
    Stored,
    Failed(SyncErrorDetail),
}

/// Pulls records from an ATS connector into the canonical store and keeps the sync log.
pub struct SyncOrchestrator<S> {
    store: Arc<S>,
    rates: Arc<RateTracker>,
    policy: CallPolicy,
    concurrency: usize,
    progress_interval: u32,
}

impl<S> SyncOrchestrator<S>
where
    S: IntegrationRepository + SyncLogRepository + CanonicalStore,
{
    pub fn new(store: Arc<S>, rates: Arc<RateTracker>, config: &HubConfig) -> Self {
        Self {
            store,
            rates,
            policy: CallPolicy::from_config(config),
            concurrency: config.sync_concurrency.max(1),
            progress_interval: config.sync_progress_interval,
        }
    }

    /// Runs one sync. A deferred run (exhausted quota) creates no log and issues no call.
    #[tracing::instrument(
        skip_all,
        fields(integration_id = %integration.id, mode = mode.label())
    )]
    pub async fn run(
        &self,
        integration: &Integration,
        connector: &dyn AtsConnector,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, HubError> {
        if let Admission::Defer { retry_at } = self.rates.admit(&integration.id, Utc::now()) {
            tracing::info!(%retry_at, "sync deferred by quota pre-check");
            return Err(HubError::deferred(retry_at));
        }

        let mut log = SyncLog::start(integration.id.clone(), mode, Utc::now());
        self.store.insert_log(log.clone()).await?;

        let authenticated = tokio::time::timeout(self.policy.timeout, connector.authenticate())
            .await
            .unwrap_or(false);
        self.rates.observe(&integration.id, connector.rate_limits());
        if !authenticated {
            note(
                &mut log,
                SyncErrorDetail::run(
                    SyncStage::Authenticate,
                    ErrorKind::AuthenticationFailed,
                    format!("{} rejected the configured credentials", connector.provider()),
                ),
            );
            return self.finish(integration, log).await;
        }

        let filters = RecordFilters {
            updated_since: match mode {
                SyncMode::Full => None,
                SyncMode::Incremental => integration.last_sync_at,
            },
            limit: None,
        };

        let mut work = Vec::new();
        if !cancel.is_cancelled() {
            let candidates = self
                .policy
                .run("get_candidates", CallKind::Idempotent, || {
                    connector.get_candidates(&filters)
                })
                .await;
            self.rates.observe(&integration.id, connector.rate_limits());
            collect(&mut log, &mut work, SyncStage::FetchCandidates, candidates, Work::Candidate);
        }

        if !cancel.is_cancelled() {
            let jobs = match self.rates.admit(&integration.id, Utc::now()) {
                Admission::Proceed => {
                    self.policy
                        .run("get_jobs", CallKind::Idempotent, || connector.get_jobs(&filters))
                        .await
                }
                Admission::Defer { retry_at } => Err(ConnectorError::Throttled {
                    retry_after: (retry_at - Utc::now()).to_std().ok(),
                }),
            };
            self.rates.observe(&integration.id, connector.rate_limits());
            collect(&mut log, &mut work, SyncStage::FetchJobs, jobs, Work::Job);
        }

        let total = work.len();
        let candidate_rules = mapping::candidate_rules(integration);
        let job_rules = mapping::job_rules(integration);
        let integration_id = &integration.id;

        let mut results = stream::iter(work)
            .map(|item| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(
                    self.process(integration_id, item, candidate_rules, job_rules)
                        .await,
                )
            })
            .buffer_unordered(self.concurrency);

        // Single accumulation point: only this loop touches the log counters.
        while let Some(result) = results.next().await {
            let tallied = match result {
                Some(RecordResult::Stored) => log.record_success(),
                Some(RecordResult::Failed(detail)) => log.record_failure(detail),
                None => continue,
            };
            if let Err(err) = tallied {
                tracing::warn!(error = %err, "dropping record result for closed sync log");
            }
            if self.progress_interval > 0 && log.records_processed % self.progress_interval == 0 {
                if let Err(err) = self.store.update_log(log.clone()).await {
                    tracing::warn!(error = %err, "failed to persist sync progress");
                }
            }
        }
        let processed = log.records_processed;
        if cancel.is_cancelled() && (processed as usize) < total.max(1) {
            note(
                &mut log,
                SyncErrorDetail::run(
                    SyncStage::Cancelled,
                    ErrorKind::Cancelled,
                    format!("run cancelled after {processed} of {total} records"),
                ),
            );
        }

        self.finish(integration, log).await
    }

    async fn process(
        &self,
        integration_id: &IntegrationId,
        work: Work,
        candidate_rules: &[FieldMapping],
        job_rules: &[FieldMapping],
    ) -> RecordResult {
        let (record, rules, is_candidate) = match &work {
            Work::Candidate(record) => (record, candidate_rules, true),
            Work::Job(record) => (record, job_rules, false),
        };
        let external_id = mapping::external_id_hint(record, rules);

        let stored = if is_candidate {
            match mapping::transform::<CanonicalCandidate>(record, rules) {
                Ok(candidate) => self.store.upsert_candidate(integration_id, candidate).await,
                Err(rejection) => return rejected(external_id, rejection),
            }
        } else {
            match mapping::transform::<CanonicalJob>(record, rules) {
                Ok(job) => self.store.upsert_job(integration_id, job).await,
                Err(rejection) => return rejected(external_id, rejection),
            }
        };

        match stored {
            Ok(_) => RecordResult::Stored,
            Err(err) => RecordResult::Failed(SyncErrorDetail::record(
                SyncStage::Upsert,
                ErrorKind::Storage,
                external_id,
                err.to_string(),
            )),
        }
    }

    /// Closes the log once, persists it, and reflects the outcome on the integration.
    async fn finish(
        &self,
        integration: &Integration,
        mut log: SyncLog,
    ) -> Result<SyncOutcome, HubError> {
        let status = log.close(Utc::now()).unwrap_or(log.status);
        self.persist_closed(&log).await?;

        let first_error = log.error_details.first();
        let error = (status == SyncStatus::Failed)
            .then(|| first_error.map(|detail| detail.kind))
            .flatten();

        let mut current = self
            .store
            .integration(&integration.id)
            .await?
            .unwrap_or_else(|| integration.clone());
        if status == SyncStatus::Failed {
            current.status = IntegrationStatus::Error;
        } else {
            current.status = IntegrationStatus::Active;
            current.last_sync_at = Some(log.started_at);
        }
        current.last_error = first_error.map(|detail| detail.message.clone());
        self.store.save_integration(current).await?;

        tracing::info!(
            status = status.label(),
            processed = log.records_processed,
            success = log.records_success,
            failed = log.records_failed,
            "sync finished"
        );
        Ok(SyncOutcome { log, error })
    }
}

impl<S> SyncOrchestrator<S>
where
    S: SyncLogRepository,
{
    /// Writes the closed log, retrying storage faults up to the call policy's attempts.
    async fn persist_closed(&self, log: &SyncLog) -> Result<(), HubError> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.store.update_log(log.clone()).await {
                Ok(()) | Err(RepositoryError::Closed(_)) => return Ok(()),
                Err(err) => err,
            };
            if attempt >= attempts {
                tracing::error!(log_id = %log.id, error = %err, "sync log left unclosed in storage");
                return Err(HubError::new(
                    ErrorKind::Storage,
                    format!("sync log {} could not be closed: {err}", log.id),
                ));
            }
            tracing::warn!(log_id = %log.id, attempt, error = %err, "retrying closed sync log write");
            tokio::time::sleep(self.policy.backoff.saturating_mul(attempt)).await;
            attempt += 1;
        }
    }
}

fn note(log: &mut SyncLog, detail: SyncErrorDetail) {
    if let Err(err) = log.note(detail) {
        tracing::warn!(error = %err, "dropping error entry for closed sync log");
    }
}

fn collect(
    log: &mut SyncLog,
    work: &mut Vec<Work>,
    stage: SyncStage,
    fetched: Result<Vec<NativeRecord>, ConnectorError>,
    wrap: fn(NativeRecord) -> Work,
) {
    match fetched {
        Ok(records) => work.extend(records.into_iter().map(wrap)),
        Err(err) => {
            tracing::warn!(?stage, error = %err, "fetch failed");
            note(log, SyncErrorDetail::run(stage, err.kind(), err.to_string()));
        }
    }
}

fn rejected(external_id: Option<String>, rejection: mapping::MappingRejection) -> RecordResult {
    RecordResult::Failed(SyncErrorDetail::record(
        SyncStage::Mapping,
        ErrorKind::MappingRejection,
        external_id,
        rejection.to_string(),
    ))
}
