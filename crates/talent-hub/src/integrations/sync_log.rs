use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::IntegrationId;
use super::error::ErrorKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Full,
    Incremental,
}

impl SyncMode {
    pub const fn label(self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl SyncStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::CompletedWithErrors => "completed_with_errors",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Pipeline step an error entry was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Authenticate,
    FetchCandidates,
    FetchJobs,
    Mapping,
    Upsert,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorDetail {
    pub stage: SyncStage,
    pub kind: ErrorKind,
    pub external_id: Option<String>,
    pub message: String,
}

impl SyncErrorDetail {
    pub fn run(stage: SyncStage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            external_id: None,
            message: message.into(),
        }
    }

    pub fn record(
        stage: SyncStage,
        kind: ErrorKind,
        external_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            kind,
            external_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncLogError {
    #[error("sync log {0} is already closed")]
    AlreadyClosed(Uuid),
}

/// Audit record of one sync run. Closed exactly once; frozen afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: Uuid,
    pub integration_id: IntegrationId,
    pub operation_type: SyncMode,
    pub status: SyncStatus,
    pub records_processed: u32,
    pub records_success: u32,
    pub records_failed: u32,
    pub error_details: Vec<SyncErrorDetail>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncLog {
    pub fn start(integration_id: IntegrationId, mode: SyncMode, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            integration_id,
            operation_type: mode,
            status: SyncStatus::Running,
            records_processed: 0,
            records_success: 0,
            records_failed: 0,
            error_details: Vec::new(),
            started_at: now,
            completed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.completed_at.is_some()
    }

    fn ensure_open(&self) -> Result<(), SyncLogError> {
        if self.is_closed() {
            Err(SyncLogError::AlreadyClosed(self.id))
        } else {
            Ok(())
        }
    }

    pub fn record_success(&mut self) -> Result<(), SyncLogError> {
        self.ensure_open()?;
        self.records_processed += 1;
        self.records_success += 1;
        Ok(())
    }

    pub fn record_failure(&mut self, detail: SyncErrorDetail) -> Result<(), SyncLogError> {
        self.ensure_open()?;
        self.records_processed += 1;
        self.records_failed += 1;
        self.error_details.push(detail);
        Ok(())
    }

    /// Appends a run-level error (authentication, fetch, cancellation) without
    /// counting a record.
    pub fn note(&mut self, detail: SyncErrorDetail) -> Result<(), SyncLogError> {
        self.ensure_open()?;
        self.error_details.push(detail);
        Ok(())
    }

    /// Derives the final status and stamps `completed_at`.
    ///
    /// No errors at all means `completed`; any error with at least one stored record
    /// means `completed_with_errors`; errors without a single success mean `failed`.
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<SyncStatus, SyncLogError> {
        self.ensure_open()?;
        let has_errors = self.records_failed > 0 || !self.error_details.is_empty();
        self.status = if !has_errors {
            SyncStatus::Completed
        } else if self.records_success > 0 {
            SyncStatus::CompletedWithErrors
        } else {
            SyncStatus::Failed
        };
        self.completed_at = Some(now);
        Ok(self.status)
    }
}
