use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::domain::{CanonicalCandidate, CanonicalJob, Integration, IntegrationId};
use super::error::{ErrorKind, HubError};
use super::sync_log::SyncLog;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("sync log {0} is closed and cannot change")]
    Closed(Uuid),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for HubError {
    fn from(value: RepositoryError) -> Self {
        HubError::new(ErrorKind::Storage, value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn integration(&self, id: &IntegrationId)
        -> Result<Option<Integration>, RepositoryError>;

    async fn save_integration(&self, integration: Integration) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    async fn insert_log(&self, log: SyncLog) -> Result<(), RepositoryError>;

    /// Replaces a running log. Logs that are already closed are rejected.
    async fn update_log(&self, log: SyncLog) -> Result<(), RepositoryError>;

    async fn sync_log(&self, id: Uuid) -> Result<Option<SyncLog>, RepositoryError>;

    /// Most recent first.
    async fn logs_for(&self, integration_id: &IntegrationId)
        -> Result<Vec<SyncLog>, RepositoryError>;
}

/// Canonical records keyed by `(integration_id, external_id)`.
#[async_trait]
pub trait CanonicalStore: Send + Sync {
    async fn upsert_candidate(
        &self,
        integration_id: &IntegrationId,
        candidate: CanonicalCandidate,
    ) -> Result<UpsertOutcome, RepositoryError>;

    async fn upsert_job(
        &self,
        integration_id: &IntegrationId,
        job: CanonicalJob,
    ) -> Result<UpsertOutcome, RepositoryError>;

    async fn candidate(
        &self,
        integration_id: &IntegrationId,
        external_id: &str,
    ) -> Result<Option<CanonicalCandidate>, RepositoryError>;

    async fn job(
        &self,
        integration_id: &IntegrationId,
        external_id: &str,
    ) -> Result<Option<CanonicalJob>, RepositoryError>;
}

type RecordKey = (IntegrationId, String);

#[derive(Debug, Default)]
struct Tables {
    integrations: HashMap<IntegrationId, Integration>,
    logs: HashMap<Uuid, SyncLog>,
    candidates: HashMap<RecordKey, CanonicalCandidate>,
    jobs: HashMap<RecordKey, CanonicalJob>,
}

/// Process-local store backing the service binary and the tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHubStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryHubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_integrations(integrations: impl IntoIterator<Item = Integration>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.lock();
            for integration in integrations {
                tables
                    .integrations
                    .insert(integration.id.clone(), integration);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn candidates(&self, integration_id: &IntegrationId) -> Vec<CanonicalCandidate> {
        let tables = self.lock();
        let mut candidates: Vec<CanonicalCandidate> = tables
            .candidates
            .iter()
            .filter(|((owner, _), _)| owner == integration_id)
            .map(|(_, candidate)| candidate.clone())
            .collect();
        candidates.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        candidates
    }

    pub fn jobs(&self, integration_id: &IntegrationId) -> Vec<CanonicalJob> {
        let tables = self.lock();
        let mut jobs: Vec<CanonicalJob> = tables
            .jobs
            .iter()
            .filter(|((owner, _), _)| owner == integration_id)
            .map(|(_, job)| job.clone())
            .collect();
        jobs.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        jobs
    }
}

#[async_trait]
impl IntegrationRepository for InMemoryHubStore {
    async fn integration(
        &self,
        id: &IntegrationId,
    ) -> Result<Option<Integration>, RepositoryError> {
        Ok(self.lock().integrations.get(id).cloned())
    }

    async fn save_integration(&self, integration: Integration) -> Result<(), RepositoryError> {
        self.lock()
            .integrations
            .insert(integration.id.clone(), integration);
        Ok(())
    }
}

#[async_trait]
impl SyncLogRepository for InMemoryHubStore {
    async fn insert_log(&self, log: SyncLog) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        if tables.logs.contains_key(&log.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.logs.insert(log.id, log);
        Ok(())
    }

    async fn update_log(&self, log: SyncLog) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        match tables.logs.get(&log.id) {
            None => Err(RepositoryError::NotFound),
            Some(stored) if stored.is_closed() => Err(RepositoryError::Closed(log.id)),
            Some(_) => {
                tables.logs.insert(log.id, log);
                Ok(())
            }
        }
    }

    async fn sync_log(&self, id: Uuid) -> Result<Option<SyncLog>, RepositoryError> {
        Ok(self.lock().logs.get(&id).cloned())
    }

    async fn logs_for(
        &self,
        integration_id: &IntegrationId,
    ) -> Result<Vec<SyncLog>, RepositoryError> {
        let tables = self.lock();
        let mut logs: Vec<SyncLog> = tables
            .logs
            .values()
            .filter(|log| &log.integration_id == integration_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(logs)
    }
}

#[async_trait]
impl CanonicalStore for InMemoryHubStore {
    async fn upsert_candidate(
        &self,
        integration_id: &IntegrationId,
        candidate: CanonicalCandidate,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let key = (integration_id.clone(), candidate.external_id.clone());
        let mut tables = self.lock();
        match tables.candidates.get_mut(&key) {
            Some(stored) => {
                stored.merge_from(candidate);
                Ok(UpsertOutcome::Merged)
            }
            None => {
                tables.candidates.insert(key, candidate);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn upsert_job(
        &self,
        integration_id: &IntegrationId,
        job: CanonicalJob,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let key = (integration_id.clone(), job.external_id.clone());
        let mut tables = self.lock();
        match tables.jobs.get_mut(&key) {
            Some(stored) => {
                stored.merge_from(job);
                Ok(UpsertOutcome::Merged)
            }
            None => {
                tables.jobs.insert(key, job);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn candidate(
        &self,
        integration_id: &IntegrationId,
        external_id: &str,
    ) -> Result<Option<CanonicalCandidate>, RepositoryError> {
        let key = (integration_id.clone(), external_id.to_string());
        Ok(self.lock().candidates.get(&key).cloned())
    }

    async fn job(
        &self,
        integration_id: &IntegrationId,
        external_id: &str,
    ) -> Result<Option<CanonicalJob>, RepositoryError> {
        let key = (integration_id.clone(), external_id.to_string());
        Ok(self.lock().jobs.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::domain::CandidateStatus;
    use crate::integrations::sync_log::SyncMode;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn candidate(status: CandidateStatus, phone: Option<&str>) -> CanonicalCandidate {
        CanonicalCandidate {
            external_id: "c-1".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada Lovelace".to_string(),
            phone: phone.map(str::to_string),
            resume_url: None,
            status,
            job_ref: None,
            custom_fields: BTreeMap::from([("source".to_string(), json!("referral"))]),
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_per_integration_and_merges() {
        let store = InMemoryHubStore::new();
        let first = IntegrationId("int-1".to_string());
        let second = IntegrationId("int-2".to_string());

        assert_eq!(
            store
                .upsert_candidate(&first, candidate(CandidateStatus::Applied, Some("+15550100")))
                .await,
            Ok(UpsertOutcome::Inserted)
        );
        assert_eq!(
            store
                .upsert_candidate(&second, candidate(CandidateStatus::Applied, None))
                .await,
            Ok(UpsertOutcome::Inserted)
        );
        assert_eq!(
            store
                .upsert_candidate(&first, candidate(CandidateStatus::Hired, None))
                .await,
            Ok(UpsertOutcome::Merged)
        );

        let stored = store
            .candidate(&first, "c-1")
            .await
            .expect("read")
            .expect("present");
        assert_eq!(stored.status, CandidateStatus::Hired);
        assert_eq!(stored.phone.as_deref(), Some("+15550100"));
        assert_eq!(store.candidates(&second).len(), 1);
    }

    #[tokio::test]
    async fn closed_logs_reject_updates() {
        let store = InMemoryHubStore::new();
        let mut log = SyncLog::start(IntegrationId("int-1".to_string()), SyncMode::Full, Utc::now());
        store.insert_log(log.clone()).await.expect("insert");
        assert_eq!(
            store.insert_log(log.clone()).await,
            Err(RepositoryError::Conflict)
        );

        log.close(Utc::now()).expect("close");
        store.update_log(log.clone()).await.expect("closing update");
        assert_eq!(
            store.update_log(log.clone()).await,
            Err(RepositoryError::Closed(log.id))
        );
        assert_eq!(
            store
                .logs_for(&IntegrationId("int-1".to_string()))
                .await
                .expect("list")
                .len(),
            1
        );
    }
}
