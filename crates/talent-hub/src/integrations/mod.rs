//! Provider connectors, field mapping, and the composite runs built on top of them.
//!
//! A run always goes through [`IntegrationHub`]: it resolves the stored integration,
//! builds a connector from the [`ProviderRegistry`], and hands it to the sync, campaign,
//! or scheduling orchestrator. Remote failures surface as data on the run's result.

pub mod campaign;
pub mod connectors;
pub mod domain;
pub mod error;
pub mod mapping;
pub mod quota;
pub mod retry;
pub mod router;
pub mod scheduling;
pub mod service;
pub mod store;
pub mod sync;
pub mod sync_log;

#[cfg(test)]
mod tests;

pub use campaign::{render, CampaignError, CampaignRequest, CampaignRun, Recipient};
pub use connectors::{
    AtsConnector, BulkSendReport, CalendarConnector, Channel, CommunicationConnector,
    Connector, ConnectorContext, EmailMessage, ProviderRegistry,
};
pub use domain::{
    CalendarEvent, CandidateStatus, CanonicalCandidate, CanonicalJob, CompanyId, Credentials,
    Integration, IntegrationId, IntegrationKind, IntegrationStatus, JobStatus, NativeRecord,
    RateLimitState, RecordFilters, TimeSlot,
};
pub use error::{ConnectorError, ErrorKind, HubError};
pub use mapping::{FieldMapping, MappingRejection, MappingSet, Transform};
pub use router::hub_router;
pub use scheduling::{
    CandidateContact, SchedulingOutcome, SchedulingReport, SchedulingRequest,
};
pub use service::{ConnectionReport, IntegrationHub};
pub use store::{
    CanonicalStore, InMemoryHubStore, IntegrationRepository, RepositoryError,
    SyncLogRepository, UpsertOutcome,
};
pub use sync::SyncOutcome;
pub use sync_log::{SyncErrorDetail, SyncLog, SyncMode, SyncStage, SyncStatus};
