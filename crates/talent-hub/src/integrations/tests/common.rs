use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::config::HubConfig;
use crate::integrations::connectors::{
    AtsConnector, CalendarConnector, Channel, CommunicationConnector, Connector, EmailMessage,
    ProviderRegistry,
};
use crate::integrations::domain::{
    CalendarEvent, CanonicalCandidate, CanonicalJob, Credentials, Integration, IntegrationKind,
    NativeRecord, RateLimitState, RecordFilters, TimeSlot,
};
use crate::integrations::error::ConnectorError;
use crate::integrations::scheduling::{CandidateContact, SchedulingRequest};
use crate::integrations::service::IntegrationHub;
use crate::integrations::store::{
    CanonicalStore, InMemoryHubStore, IntegrationRepository, RepositoryError, SyncLogRepository,
    UpsertOutcome,
};
use crate::integrations::sync_log::SyncLog;
use crate::integrations::IntegrationId;

pub(super) const ATS_ID: &str = "ats-greenhouse";
pub(super) const CALENDAR_ID: &str = "cal-google";
pub(super) const MESSENGER_ID: &str = "msg-sendgrid";

const EMAIL_ONLY: &[Channel] = &[Channel::Email];
const SMS_ONLY: &[Channel] = &[Channel::Sms];

pub(super) fn hub_config() -> HubConfig {
    HubConfig {
        call_timeout: Duration::from_secs(1),
        retry_attempts: 2,
        retry_backoff: Duration::from_millis(1),
        sync_concurrency: 4,
        campaign_concurrency: 2,
        campaign_deadline: Duration::from_secs(5),
        sync_progress_interval: 2,
    }
}

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn ats_integration() -> Integration {
    Integration::new(
        ATS_ID,
        "acme",
        IntegrationKind::Ats,
        "greenhouse",
        [("api_key", "gh-secret")].into_iter().collect::<Credentials>(),
    )
}

pub(super) fn calendar_integration() -> Integration {
    Integration::new(
        CALENDAR_ID,
        "acme",
        IntegrationKind::Calendar,
        "google_calendar",
        [("access_token", "ya29.token")]
            .into_iter()
            .collect::<Credentials>(),
    )
}

pub(super) fn messenger_integration() -> Integration {
    Integration::new(
        MESSENGER_ID,
        "acme",
        IntegrationKind::Communication,
        "sendgrid",
        [("api_key", "SG.secret")].into_iter().collect::<Credentials>(),
    )
    .with_setting("from_email", "talent@acme.test")
}

pub(super) fn ats_id() -> IntegrationId {
    IntegrationId(ATS_ID.to_string())
}

pub(super) fn calendar_id() -> IntegrationId {
    IntegrationId(CALENDAR_ID.to_string())
}

pub(super) fn messenger_id() -> IntegrationId {
    IntegrationId(MESSENGER_ID.to_string())
}

/// Greenhouse-shaped candidate payload.
pub(super) fn candidate(id: &str, email: Option<&str>) -> NativeRecord {
    let mut record = json!({
        "id": id,
        "first_name": "Ada",
        "last_name": format!("Candidate {id}"),
        "phone_numbers": [{ "value": "(555) 010-2000" }],
        "applications": [{ "status": "active", "jobs": [{ "id": "job-1" }] }],
    });
    if let Some(email) = email {
        record["email_addresses"] = json!([{ "value": email }]);
    }
    record
}

pub(super) fn job(id: &str) -> NativeRecord {
    json!({
        "id": id,
        "name": "Backend Engineer",
        "status": "open",
        "departments": [{ "name": "Engineering" }],
    })
}

/// Ten candidates, three of which have no email and must be rejected by mapping.
pub(super) fn mixed_candidates() -> Vec<NativeRecord> {
    (1..=10)
        .map(|n| {
            let id = format!("c-{n}");
            if n % 3 == 0 {
                candidate(&id, None)
            } else {
                candidate(&id, Some(&format!("candidate{n}@example.com")))
            }
        })
        .collect()
}

pub(super) struct Fakes {
    pub(super) ats: Arc<FakeAts>,
    pub(super) calendar: Arc<FakeCalendar>,
    pub(super) messenger: Arc<FakeMessenger>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            ats: Arc::new(FakeAts::default()),
            calendar: Arc::new(FakeCalendar::default()),
            messenger: Arc::new(FakeMessenger::default()),
        }
    }
}

impl Fakes {
    pub(super) fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::default();
        let ats = self.ats.clone();
        let calendar = self.calendar.clone();
        let messenger = self.messenger.clone();
        registry
            .register_ats("greenhouse", move |_| Ok(ats.clone() as Arc<dyn AtsConnector>))
            .register_calendar("google_calendar", move |_| {
                Ok(calendar.clone() as Arc<dyn CalendarConnector>)
            })
            .register_communication("sendgrid", move |_| {
                Ok(messenger.clone() as Arc<dyn CommunicationConnector>)
            });
        registry
    }
}

pub(super) fn build_hub(
    fakes: &Fakes,
    integrations: impl IntoIterator<Item = Integration>,
) -> (IntegrationHub<InMemoryHubStore>, Arc<InMemoryHubStore>) {
    build_hub_with(fakes, integrations, hub_config())
}

pub(super) fn build_hub_with(
    fakes: &Fakes,
    integrations: impl IntoIterator<Item = Integration>,
    config: HubConfig,
) -> (IntegrationHub<InMemoryHubStore>, Arc<InMemoryHubStore>) {
    let store = Arc::new(InMemoryHubStore::with_integrations(integrations));
    let hub = IntegrationHub::new(store.clone(), fakes.registry(), config);
    (hub, store)
}

pub(super) fn default_hub(fakes: &Fakes) -> (IntegrationHub<InMemoryHubStore>, Arc<InMemoryHubStore>) {
    build_hub(
        fakes,
        [ats_integration(), calendar_integration(), messenger_integration()],
    )
}

/// Ten candidates that all map cleanly.
pub(super) fn valid_candidates() -> Vec<NativeRecord> {
    (1..=10)
        .map(|n| candidate(&format!("c-{n}"), Some(&format!("candidate{n}@example.com"))))
        .collect()
}

pub(super) fn build_scripted_hub(
    fakes: &Fakes,
    store: Arc<ScriptedStore>,
) -> IntegrationHub<ScriptedStore> {
    IntegrationHub::new(store, fakes.registry(), hub_config())
}

/// In-memory store with slow candidate upserts and failing writes of closed logs.
#[derive(Default)]
pub(super) struct ScriptedStore {
    pub(super) inner: InMemoryHubStore,
    pub(super) upsert_delay: Mutex<Option<Duration>>,
    pub(super) closing_failures: AtomicUsize,
    pub(super) closing_writes: AtomicUsize,
}

impl ScriptedStore {
    pub(super) fn with_integrations(integrations: impl IntoIterator<Item = Integration>) -> Self {
        Self {
            inner: InMemoryHubStore::with_integrations(integrations),
            ..Self::default()
        }
    }
}

#[async_trait]
impl IntegrationRepository for ScriptedStore {
    async fn integration(
        &self,
        id: &IntegrationId,
    ) -> Result<Option<Integration>, RepositoryError> {
        self.inner.integration(id).await
    }

    async fn save_integration(&self, integration: Integration) -> Result<(), RepositoryError> {
        self.inner.save_integration(integration).await
    }
}

#[async_trait]
impl SyncLogRepository for ScriptedStore {
    async fn insert_log(&self, log: SyncLog) -> Result<(), RepositoryError> {
        self.inner.insert_log(log).await
    }

    async fn update_log(&self, log: SyncLog) -> Result<(), RepositoryError> {
        if log.is_closed() {
            self.closing_writes.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .closing_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(RepositoryError::Unavailable("connection reset".to_string()));
            }
        }
        self.inner.update_log(log).await
    }

    async fn sync_log(&self, id: uuid::Uuid) -> Result<Option<SyncLog>, RepositoryError> {
        self.inner.sync_log(id).await
    }

    async fn logs_for(
        &self,
        integration_id: &IntegrationId,
    ) -> Result<Vec<SyncLog>, RepositoryError> {
        self.inner.logs_for(integration_id).await
    }
}

#[async_trait]
impl CanonicalStore for ScriptedStore {
    async fn upsert_candidate(
        &self,
        integration_id: &IntegrationId,
        candidate: CanonicalCandidate,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let delay = *self.upsert_delay.lock().expect("scripted store mutex");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.upsert_candidate(integration_id, candidate).await
    }

    async fn upsert_job(
        &self,
        integration_id: &IntegrationId,
        job: CanonicalJob,
    ) -> Result<UpsertOutcome, RepositoryError> {
        self.inner.upsert_job(integration_id, job).await
    }

    async fn candidate(
        &self,
        integration_id: &IntegrationId,
        external_id: &str,
    ) -> Result<Option<CanonicalCandidate>, RepositoryError> {
        self.inner.candidate(integration_id, external_id).await
    }

    async fn job(
        &self,
        integration_id: &IntegrationId,
        external_id: &str,
    ) -> Result<Option<CanonicalJob>, RepositoryError> {
        self.inner.job(integration_id, external_id).await
    }
}

pub(super) fn exhausted_quota() -> RateLimitState {
    RateLimitState {
        limit: 100,
        remaining: 0,
        reset_time: Utc::now() + chrono::Duration::seconds(120),
    }
}

pub(super) fn scheduling_request() -> SchedulingRequest {
    SchedulingRequest {
        calendar_integration_id: calendar_id(),
        communication_integration_id: messenger_id(),
        attendee: "interviewer@acme.test".to_string(),
        candidate: CandidateContact {
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            phone: None,
        },
        window_start: at(9, 0),
        window_end: at(17, 0),
        duration_minutes: 30,
        title: "Technical interview".to_string(),
        description: "Pairing session".to_string(),
        timezone: "UTC".to_string(),
        location: None,
        meeting_url: Some("https://meet.acme.test/abc".to_string()),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) struct FakeAts {
    pub(super) authenticates: Mutex<bool>,
    pub(super) candidates: Mutex<Result<Vec<NativeRecord>, ConnectorError>>,
    pub(super) jobs: Mutex<Result<Vec<NativeRecord>, ConnectorError>>,
    pub(super) rate_limits: Mutex<Option<RateLimitState>>,
    pub(super) seen_filters: Mutex<Vec<RecordFilters>>,
    pub(super) auth_calls: AtomicUsize,
    pub(super) candidate_calls: AtomicUsize,
    pub(super) job_calls: AtomicUsize,
}

impl Default for FakeAts {
    fn default() -> Self {
        Self {
            authenticates: Mutex::new(true),
            candidates: Mutex::new(Ok(Vec::new())),
            jobs: Mutex::new(Ok(Vec::new())),
            rate_limits: Mutex::new(None),
            seen_filters: Mutex::new(Vec::new()),
            auth_calls: AtomicUsize::new(0),
            candidate_calls: AtomicUsize::new(0),
            job_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeAts {
    pub(super) fn set_candidates(&self, records: Result<Vec<NativeRecord>, ConnectorError>) {
        *self.candidates.lock().expect("fake ats mutex") = records;
    }

    pub(super) fn set_jobs(&self, records: Result<Vec<NativeRecord>, ConnectorError>) {
        *self.jobs.lock().expect("fake ats mutex") = records;
    }

    pub(super) fn reject_credentials(&self) {
        *self.authenticates.lock().expect("fake ats mutex") = false;
    }

    pub(super) fn fetches(&self) -> usize {
        self.candidate_calls.load(Ordering::SeqCst) + self.job_calls.load(Ordering::SeqCst)
    }

    pub(super) fn last_filters(&self) -> Option<RecordFilters> {
        self.seen_filters.lock().expect("fake ats mutex").last().cloned()
    }
}

#[async_trait]
impl Connector for FakeAts {
    fn provider(&self) -> &'static str {
        "greenhouse"
    }

    async fn authenticate(&self) -> bool {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        *self.authenticates.lock().expect("fake ats mutex")
    }

    async fn test_connection(&self) -> bool {
        true
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        *self.rate_limits.lock().expect("fake ats mutex")
    }
}

#[async_trait]
impl AtsConnector for FakeAts {
    async fn get_candidates(
        &self,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError> {
        self.candidate_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_filters
            .lock()
            .expect("fake ats mutex")
            .push(filters.clone());
        self.candidates.lock().expect("fake ats mutex").clone()
    }

    async fn get_jobs(&self, _filters: &RecordFilters) -> Result<Vec<NativeRecord>, ConnectorError> {
        self.job_calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().expect("fake ats mutex").clone()
    }
}

pub(super) struct FakeCalendar {
    pub(super) authenticates: Mutex<bool>,
    pub(super) slots: Mutex<Result<Vec<TimeSlot>, ConnectorError>>,
    pub(super) booking: Mutex<Result<String, ConnectorError>>,
    pub(super) events: Mutex<Vec<CalendarEvent>>,
    pub(super) availability_calls: AtomicUsize,
    pub(super) create_calls: AtomicUsize,
    pub(super) probe_calls: AtomicUsize,
}

impl Default for FakeCalendar {
    fn default() -> Self {
        Self {
            authenticates: Mutex::new(true),
            slots: Mutex::new(Ok(vec![
                TimeSlot::new(at(9, 0), at(9, 20)),
                TimeSlot::new(at(11, 0), at(12, 0)),
                TimeSlot::new(at(14, 0), at(15, 0)),
            ])),
            booking: Mutex::new(Ok("evt-1".to_string())),
            events: Mutex::new(Vec::new()),
            availability_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeCalendar {
    pub(super) fn set_slots(&self, slots: Result<Vec<TimeSlot>, ConnectorError>) {
        *self.slots.lock().expect("fake calendar mutex") = slots;
    }

    pub(super) fn set_booking(&self, booking: Result<String, ConnectorError>) {
        *self.booking.lock().expect("fake calendar mutex") = booking;
    }

    pub(super) fn reject_credentials(&self) {
        *self.authenticates.lock().expect("fake calendar mutex") = false;
    }

    pub(super) fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().expect("fake calendar mutex").clone()
    }
}

#[async_trait]
impl Connector for FakeCalendar {
    fn provider(&self) -> &'static str {
        "google_calendar"
    }

    async fn authenticate(&self) -> bool {
        *self.authenticates.lock().expect("fake calendar mutex")
    }

    async fn test_connection(&self) -> bool {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        None
    }
}

#[async_trait]
impl CalendarConnector for FakeCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, ConnectorError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let booking = self.booking.lock().expect("fake calendar mutex").clone();
        if booking.is_ok() {
            self.events
                .lock()
                .expect("fake calendar mutex")
                .push(event.clone());
        }
        booking
    }

    async fn get_availability(
        &self,
        _subject: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, ConnectorError> {
        self.availability_calls.fetch_add(1, Ordering::SeqCst);
        self.slots.lock().expect("fake calendar mutex").clone()
    }
}

/// Records every delivery; addresses in `failing` are rejected by the "provider".
pub(super) struct FakeMessenger {
    pub(super) authenticates: Mutex<bool>,
    pub(super) reachable: Mutex<bool>,
    pub(super) channels: Mutex<&'static [Channel]>,
    pub(super) failing: Mutex<HashSet<String>>,
    pub(super) send_delay: Mutex<Option<Duration>>,
    pub(super) rate_limits: Mutex<Option<RateLimitState>>,
    pub(super) emails: Mutex<Vec<EmailMessage>>,
    pub(super) sms: Mutex<Vec<(String, String)>>,
    pub(super) send_calls: AtomicUsize,
    pub(super) probe_calls: AtomicUsize,
}

impl Default for FakeMessenger {
    fn default() -> Self {
        Self {
            authenticates: Mutex::new(true),
            reachable: Mutex::new(true),
            channels: Mutex::new(EMAIL_ONLY),
            failing: Mutex::new(HashSet::new()),
            send_delay: Mutex::new(None),
            rate_limits: Mutex::new(None),
            emails: Mutex::new(Vec::new()),
            sms: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeMessenger {
    pub(super) fn fail_for(&self, address: &str) {
        self.failing
            .lock()
            .expect("fake messenger mutex")
            .insert(address.to_string());
    }

    pub(super) fn sms_only(&self) {
        *self.channels.lock().expect("fake messenger mutex") = SMS_ONLY;
    }

    pub(super) fn emails(&self) -> Vec<EmailMessage> {
        self.emails.lock().expect("fake messenger mutex").clone()
    }

    pub(super) fn sms(&self) -> Vec<(String, String)> {
        self.sms.lock().expect("fake messenger mutex").clone()
    }

    async fn deliver(&self, to: &str) -> Result<(), ConnectorError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.send_delay.lock().expect("fake messenger mutex");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing
            .lock()
            .expect("fake messenger mutex")
            .contains(to)
        {
            return Err(ConnectorError::Rejected {
                status: 400,
                message: format!("invalid recipient {to}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for FakeMessenger {
    fn provider(&self) -> &'static str {
        "sendgrid"
    }

    async fn authenticate(&self) -> bool {
        *self.authenticates.lock().expect("fake messenger mutex")
    }

    async fn test_connection(&self) -> bool {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        *self.reachable.lock().expect("fake messenger mutex")
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        *self.rate_limits.lock().expect("fake messenger mutex")
    }
}

#[async_trait]
impl CommunicationConnector for FakeMessenger {
    fn channels(&self) -> &'static [Channel] {
        *self.channels.lock().expect("fake messenger mutex")
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<(), ConnectorError> {
        if !self.supports(Channel::Email) {
            return Err(ConnectorError::Unsupported("email"));
        }
        self.deliver(&message.to).await?;
        self.emails
            .lock()
            .expect("fake messenger mutex")
            .push(message.clone());
        Ok(())
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), ConnectorError> {
        if !self.supports(Channel::Sms) {
            return Err(ConnectorError::Unsupported("sms"));
        }
        self.deliver(to).await?;
        self.sms
            .lock()
            .expect("fake messenger mutex")
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}
