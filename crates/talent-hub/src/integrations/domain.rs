use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::mapping::MappingSet;

/// Identifier wrapper for configured integrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntegrationId(pub String);

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant owning an integration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

/// Capability family an integration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    Ats,
    Calendar,
    Communication,
}

impl IntegrationKind {
    pub const fn label(self) -> &'static str {
        match self {
            IntegrationKind::Ats => "ats",
            IntegrationKind::Calendar => "calendar",
            IntegrationKind::Communication => "communication",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    #[default]
    Pending,
    Active,
    Error,
    Disabled,
}

/// Decrypted provider secrets handed over by the credential store.
///
/// The map is opaque to the hub: connectors pick the fields they need. It is never
/// serialized back out and its `Debug` output only lists field names.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }

    /// Returns the trimmed value of `field`, treating blank values as absent.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.0.keys().map(|key| format!("{key}=<redacted>")))
            .finish()
    }
}

/// One configured connection between a tenant and an external provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub company_id: CompanyId,
    pub kind: IntegrationKind,
    pub provider: String,
    #[serde(default, skip_serializing)]
    pub credentials: Credentials,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub field_mappings: MappingSet,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status: IntegrationStatus,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Integration {
    pub fn new(
        id: impl Into<String>,
        company_id: impl Into<String>,
        kind: IntegrationKind,
        provider: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            id: IntegrationId(id.into()),
            company_id: CompanyId(company_id.into()),
            kind,
            provider: provider.into(),
            credentials,
            settings: Map::new(),
            field_mappings: MappingSet::default(),
            enabled: true,
            status: IntegrationStatus::Pending,
            last_sync_at: None,
            last_error: None,
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_mappings(mut self, mappings: MappingSet) -> Self {
        self.field_mappings = mappings;
        self
    }
}

/// Canonical candidate pipeline states. Provider-native values never leak past mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Applied,
    Screening,
    Interviewing,
    Offered,
    Hired,
    Rejected,
    Withdrawn,
}

impl CandidateStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CandidateStatus::Applied => "applied",
            CandidateStatus::Screening => "screening",
            CandidateStatus::Interviewing => "interviewing",
            CandidateStatus::Offered => "offered",
            CandidateStatus::Hired => "hired",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "applied" => Some(Self::Applied),
            "screening" => Some(Self::Screening),
            "interviewing" => Some(Self::Interviewing),
            "offered" => Some(Self::Offered),
            "hired" => Some(Self::Hired),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Draft,
    OnHold,
    Closed,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Draft => "draft",
            JobStatus::OnHold => "on_hold",
            JobStatus::Closed => "closed",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "draft" => Some(Self::Draft),
            "on_hold" => Some(Self::OnHold),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Provider-agnostic candidate record produced by the mapping engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCandidate {
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub resume_url: Option<String>,
    pub status: CandidateStatus,
    pub job_ref: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CanonicalCandidate {
    /// Last-write-wins merge restricted to the fields the newer mapping produced.
    pub fn merge_from(&mut self, newer: CanonicalCandidate) {
        self.email = newer.email;
        self.name = newer.name;
        self.status = newer.status;
        merge_option(&mut self.phone, newer.phone);
        merge_option(&mut self.resume_url, newer.resume_url);
        merge_option(&mut self.job_ref, newer.job_ref);
        merge_option(&mut self.created_at, newer.created_at);
        merge_option(&mut self.updated_at, newer.updated_at);
        self.custom_fields.extend(newer.custom_fields);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJob {
    pub external_id: String,
    pub title: String,
    pub status: JobStatus,
    pub department: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CanonicalJob {
    pub fn merge_from(&mut self, newer: CanonicalJob) {
        self.title = newer.title;
        self.status = newer.status;
        merge_option(&mut self.department, newer.department);
        merge_option(&mut self.location, newer.location);
        merge_option(&mut self.created_at, newer.created_at);
        merge_option(&mut self.updated_at, newer.updated_at);
        self.custom_fields.extend(newer.custom_fields);
    }
}

fn merge_option<T>(current: &mut Option<T>, newer: Option<T>) {
    if newer.is_some() {
        *current = newer;
    }
}

/// Provider-native payload as returned by an ATS connector.
pub type NativeRecord = Value;

/// Query options passed to ATS fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilters {
    pub updated_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Last-known quota for one integration. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Set only once the provider has confirmed creation.
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
    pub attendees: Vec<String>,
    pub location: Option<String>,
    pub meeting_url: Option<String>,
}
