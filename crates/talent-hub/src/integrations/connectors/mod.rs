//! Capability traits for external providers and the registry that builds them.
//!
//! Every connector implements [`Connector`] plus exactly one capability family. The
//! orchestrators only ever see trait objects, so adding a provider means registering a
//! builder, never touching the sync, campaign, or scheduling code.

mod availability;
mod csv_export;
mod google_calendar;
mod greenhouse;
mod http;
mod lever;
mod outlook;
mod sendgrid;
mod twilio;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::domain::{
    CalendarEvent, Credentials, Integration, IntegrationKind, NativeRecord, RateLimitState,
    RecordFilters, TimeSlot,
};
use super::error::{ConnectorError, ErrorKind, HubError};

pub use availability::free_slots;
pub use csv_export::CsvExportConnector;
pub use google_calendar::GoogleCalendarConnector;
pub use greenhouse::GreenhouseConnector;
pub use lever::LeverConnector;
pub use outlook::OutlookConnector;
pub use sendgrid::SendGridConnector;
pub use twilio::TwilioConnector;

/// Operations every provider supports.
#[async_trait]
pub trait Connector: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Verifies credentials. Fails closed: missing fields or any error yield `false`.
    async fn authenticate(&self) -> bool;

    /// Cheap reachability probe against a read-only endpoint.
    async fn test_connection(&self) -> bool;

    /// Last quota observed in a provider response; never issues a call.
    fn rate_limits(&self) -> Option<RateLimitState>;
}

#[async_trait]
pub trait AtsConnector: Connector {
    async fn get_candidates(
        &self,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError>;

    async fn get_jobs(&self, filters: &RecordFilters) -> Result<Vec<NativeRecord>, ConnectorError>;
}

#[async_trait]
pub trait CalendarConnector: Connector {
    /// Books the event and returns the provider's durable event id.
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, ConnectorError>;

    /// Free intervals for `subject` inside `[start, end)`.
    async fn get_availability(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, ConnectorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub const fn label(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

/// Aggregate of a bulk send. Errors name the recipient address only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSendReport {
    pub sent_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

impl BulkSendReport {
    pub fn unsupported() -> Self {
        Self {
            sent_count: 0,
            failed_count: 0,
            errors: vec!["unsupported operation".to_string()],
        }
    }
}

#[async_trait]
pub trait CommunicationConnector: Connector {
    fn channels(&self) -> &'static [Channel];

    fn supports(&self, channel: Channel) -> bool {
        self.channels().contains(&channel)
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<(), ConnectorError>;

    async fn send_sms(&self, _to: &str, _body: &str) -> Result<(), ConnectorError> {
        Err(ConnectorError::Unsupported("sms"))
    }

    /// Sequential fan-out over [`send_email`](Self::send_email).
    async fn send_bulk(&self, messages: &[EmailMessage]) -> BulkSendReport {
        if !self.supports(Channel::Email) {
            return BulkSendReport::unsupported();
        }

        let mut report = BulkSendReport::default();
        for message in messages {
            match self.send_email(message).await {
                Ok(()) => report.sent_count += 1,
                Err(err) => {
                    report.failed_count += 1;
                    report.errors.push(format!("{}: {err}", message.to));
                }
            }
        }
        report
    }
}

/// Everything a connector may read at construction time.
///
/// Built from a snapshot of the integration, so credential rotation only affects
/// connectors built afterwards.
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    pub credentials: Credentials,
    pub settings: Map<String, Value>,
    pub timeout: Duration,
}

impl ConnectorContext {
    pub fn from_integration(integration: &Integration, timeout: Duration) -> Self {
        Self {
            credentials: integration.credentials.clone(),
            settings: integration.settings.clone(),
            timeout,
        }
    }

    pub(crate) fn credential(&self, field: &str) -> Option<String> {
        self.credentials.get(field).map(str::to_string)
    }

    pub(crate) fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

type Builder<T> = Arc<dyn Fn(&ConnectorContext) -> Result<Arc<T>, ConnectorError> + Send + Sync>;

/// Provider name -> connector builder, one table per capability family.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    ats: HashMap<String, Builder<dyn AtsConnector>>,
    calendar: HashMap<String, Builder<dyn CalendarConnector>>,
    communication: HashMap<String, Builder<dyn CommunicationConnector>>,
}

impl ProviderRegistry {
    /// Registry with every bundled provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register_ats("greenhouse", |ctx| {
            Ok(Arc::new(GreenhouseConnector::new(ctx)?) as Arc<dyn AtsConnector>)
        });
        registry.register_ats("lever", |ctx| {
            Ok(Arc::new(LeverConnector::new(ctx)?) as Arc<dyn AtsConnector>)
        });
        registry.register_ats("csv_export", |ctx| {
            Ok(Arc::new(CsvExportConnector::new(ctx)) as Arc<dyn AtsConnector>)
        });
        registry.register_calendar("google_calendar", |ctx| {
            Ok(Arc::new(GoogleCalendarConnector::new(ctx)?) as Arc<dyn CalendarConnector>)
        });
        registry.register_calendar("outlook", |ctx| {
            Ok(Arc::new(OutlookConnector::new(ctx)?) as Arc<dyn CalendarConnector>)
        });
        registry.register_communication("sendgrid", |ctx| {
            Ok(Arc::new(SendGridConnector::new(ctx)?) as Arc<dyn CommunicationConnector>)
        });
        registry.register_communication("twilio", |ctx| {
            Ok(Arc::new(TwilioConnector::new(ctx)?) as Arc<dyn CommunicationConnector>)
        });
        registry
    }

    pub fn register_ats<F>(&mut self, provider: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn(&ConnectorContext) -> Result<Arc<dyn AtsConnector>, ConnectorError>
            + Send
            + Sync
            + 'static,
    {
        self.ats.insert(provider.into(), Arc::new(builder));
        self
    }

    pub fn register_calendar<F>(&mut self, provider: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn(&ConnectorContext) -> Result<Arc<dyn CalendarConnector>, ConnectorError>
            + Send
            + Sync
            + 'static,
    {
        self.calendar.insert(provider.into(), Arc::new(builder));
        self
    }

    pub fn register_communication<F>(
        &mut self,
        provider: impl Into<String>,
        builder: F,
    ) -> &mut Self
    where
        F: Fn(&ConnectorContext) -> Result<Arc<dyn CommunicationConnector>, ConnectorError>
            + Send
            + Sync
            + 'static,
    {
        self.communication.insert(provider.into(), Arc::new(builder));
        self
    }

    pub fn knows(&self, kind: IntegrationKind, provider: &str) -> bool {
        match kind {
            IntegrationKind::Ats => self.ats.contains_key(provider),
            IntegrationKind::Calendar => self.calendar.contains_key(provider),
            IntegrationKind::Communication => self.communication.contains_key(provider),
        }
    }

    pub fn build_ats(
        &self,
        integration: &Integration,
        timeout: Duration,
    ) -> Result<Arc<dyn AtsConnector>, HubError> {
        build(&self.ats, integration, timeout)
    }

    pub fn build_calendar(
        &self,
        integration: &Integration,
        timeout: Duration,
    ) -> Result<Arc<dyn CalendarConnector>, HubError> {
        build(&self.calendar, integration, timeout)
    }

    pub fn build_communication(
        &self,
        integration: &Integration,
        timeout: Duration,
    ) -> Result<Arc<dyn CommunicationConnector>, HubError> {
        build(&self.communication, integration, timeout)
    }

    /// Builds whichever family `integration.kind` names, as a base connector.
    pub fn build_base(
        &self,
        integration: &Integration,
        timeout: Duration,
    ) -> Result<Arc<dyn Connector>, HubError> {
        Ok(match integration.kind {
            IntegrationKind::Ats => upcast_ats(self.build_ats(integration, timeout)?),
            IntegrationKind::Calendar => {
                upcast_calendar(self.build_calendar(integration, timeout)?)
            }
            IntegrationKind::Communication => {
                upcast_communication(self.build_communication(integration, timeout)?)
            }
        })
    }
}

fn build<T: ?Sized>(
    table: &HashMap<String, Builder<T>>,
    integration: &Integration,
    timeout: Duration,
) -> Result<Arc<T>, HubError> {
    let builder = table.get(&integration.provider).ok_or_else(|| {
        HubError::new(
            ErrorKind::UnknownProvider,
            format!(
                "no {} provider named '{}'",
                integration.kind.label(),
                integration.provider
            ),
        )
    })?;
    let ctx = ConnectorContext::from_integration(integration, timeout);
    builder(&ctx).map_err(HubError::from)
}

// Trait-object upcasting goes through a wrapper until the toolchain floor allows `as`.
struct Base<T: ?Sized>(Arc<T>);

#[async_trait]
impl<T: Connector + ?Sized> Connector for Base<T> {
    fn provider(&self) -> &'static str {
        self.0.provider()
    }

    async fn authenticate(&self) -> bool {
        self.0.authenticate().await
    }

    async fn test_connection(&self) -> bool {
        self.0.test_connection().await
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        self.0.rate_limits()
    }
}

fn upcast_ats(connector: Arc<dyn AtsConnector>) -> Arc<dyn Connector> {
    Arc::new(Base(connector))
}

fn upcast_calendar(connector: Arc<dyn CalendarConnector>) -> Arc<dyn Connector> {
    Arc::new(Base(connector))
}

fn upcast_communication(connector: Arc<dyn CommunicationConnector>) -> Arc<dyn Connector> {
    Arc::new(Base(connector))
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names(table: Vec<&String>) -> Vec<&str> {
            let mut table: Vec<&str> = table.into_iter().map(String::as_str).collect();
            table.sort_unstable();
            table
        }
        f.debug_struct("ProviderRegistry")
            .field("ats", &names(self.ats.keys().collect()))
            .field("calendar", &names(self.calendar.keys().collect()))
            .field("communication", &names(self.communication.keys().collect()))
            .finish()
    }
}
