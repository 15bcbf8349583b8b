//! "Find a slot, book it, notify the candidate" over a calendar and a messaging provider.
//!
//! Each stage produces an explicit value consumed by the next one, so a booking whose
//! notification failed is an ordinary, reportable result. Bookings are never rolled back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HubConfig;

use super::connectors::{CalendarConnector, Channel, CommunicationConnector, EmailMessage};
use super::domain::{CalendarEvent, IntegrationId, TimeSlot};
use super::error::{ConnectorError, ErrorKind, HubError};
use super::retry::{CallKind, CallPolicy};

const DEFAULT_DURATION_MINUTES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateContact {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingRequest {
    pub calendar_integration_id: IntegrationId,
    pub communication_integration_id: IntegrationId,
    /// Calendar whose availability is queried (usually the interviewer).
    pub attendee: String,
    pub candidate: CandidateContact,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub meeting_url: Option<String>,
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_MINUTES
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl SchedulingRequest {
    pub fn validate(&self) -> Result<(), HubError> {
        if self.window_end <= self.window_start {
            return Err(HubError::new(
                ErrorKind::InvalidRequest,
                "window_end must be after window_start",
            ));
        }
        if self.duration_minutes == 0 {
            return Err(HubError::new(
                ErrorKind::InvalidRequest,
                "duration_minutes must be positive",
            ));
        }
        if self.attendee.trim().is_empty() || self.candidate.email.trim().is_empty() {
            return Err(HubError::new(
                ErrorKind::InvalidRequest,
                "attendee and candidate email are required",
            ));
        }
        Ok(())
    }

    fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Terminal result of a scheduling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingOutcome {
    NoAvailability,
    AvailabilityFailed {
        reason: String,
    },
    BookingFailed {
        slot: TimeSlot,
        reason: String,
    },
    Booked {
        event_id: String,
        slot: TimeSlot,
        notified: bool,
        notification_error: Option<String>,
    },
}

impl SchedulingOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            SchedulingOutcome::NoAvailability => "no_availability",
            SchedulingOutcome::AvailabilityFailed { .. } => "availability_failed",
            SchedulingOutcome::BookingFailed { .. } => "booking_failed",
            SchedulingOutcome::Booked { notified: true, .. } => "booked_and_notified",
            SchedulingOutcome::Booked {
                notified: false, ..
            } => "booked_but_not_notified",
        }
    }

    /// Flat view for callers: `{status, event_id, slot, notified, reason}`.
    pub fn report(&self) -> SchedulingReport {
        let mut report = SchedulingReport {
            status: self.status(),
            event_id: None,
            slot: None,
            notified: false,
            reason: None,
        };
        match self {
            SchedulingOutcome::NoAvailability => {}
            SchedulingOutcome::AvailabilityFailed { reason } => {
                report.reason = Some(reason.clone());
            }
            SchedulingOutcome::BookingFailed { slot, reason } => {
                report.slot = Some(*slot);
                report.reason = Some(reason.clone());
            }
            SchedulingOutcome::Booked {
                event_id,
                slot,
                notified,
                notification_error,
            } => {
                report.event_id = Some(event_id.clone());
                report.slot = Some(*slot);
                report.notified = *notified;
                report.reason = notification_error.clone();
            }
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulingReport {
    pub status: &'static str,
    pub event_id: Option<String>,
    pub slot: Option<TimeSlot>,
    pub notified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

struct SlotSelected {
    slot: TimeSlot,
}

struct Booked {
    slot: TimeSlot,
    event_id: String,
}

struct Notified {
    booked: Booked,
    delivery: Result<(), String>,
}

impl From<Notified> for SchedulingOutcome {
    fn from(stage: Notified) -> Self {
        SchedulingOutcome::Booked {
            event_id: stage.booked.event_id,
            slot: stage.booked.slot,
            notified: stage.delivery.is_ok(),
            notification_error: stage.delivery.err(),
        }
    }
}

/// Earliest start wins; equal starts prefer the shorter free interval.
pub fn select_slot(slots: &[TimeSlot], duration: Duration) -> Option<TimeSlot> {
    slots
        .iter()
        .filter(|slot| slot.duration() >= duration)
        .min_by_key(|slot| (slot.start, slot.duration()))
        .map(|slot| TimeSlot::new(slot.start, slot.start + duration))
}

pub struct SchedulingWorkflow {
    policy: CallPolicy,
}

impl SchedulingWorkflow {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            policy: CallPolicy::from_config(config),
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(
            calendar = calendar.provider(),
            messenger = messenger.provider(),
            attendee = %request.attendee
        )
    )]
    pub async fn run(
        &self,
        calendar: &dyn CalendarConnector,
        messenger: &dyn CommunicationConnector,
        request: &SchedulingRequest,
    ) -> Result<SchedulingOutcome, HubError> {
        request.validate()?;

        let (calendar_ok, messenger_ok) = tokio::join!(
            tokio::time::timeout(self.policy.timeout, calendar.authenticate()),
            tokio::time::timeout(self.policy.timeout, messenger.authenticate()),
        );
        for (ok, provider) in [
            (calendar_ok.unwrap_or(false), calendar.provider()),
            (messenger_ok.unwrap_or(false), messenger.provider()),
        ] {
            if !ok {
                return Err(HubError::new(
                    ErrorKind::AuthenticationFailed,
                    format!("{provider} rejected the configured credentials"),
                ));
            }
        }

        let selected = match self.select(calendar, request).await {
            Ok(Some(selected)) => selected,
            Ok(None) => {
                tracing::info!("no free slot in window");
                return Ok(SchedulingOutcome::NoAvailability);
            }
            Err(err) => {
                return Ok(SchedulingOutcome::AvailabilityFailed {
                    reason: err.to_string(),
                })
            }
        };

        let booked = match self.book(calendar, request, selected).await {
            Ok(booked) => booked,
            Err((slot, err)) => {
                return Ok(SchedulingOutcome::BookingFailed {
                    slot,
                    reason: err.to_string(),
                })
            }
        };

        let notified = self.notify(messenger, request, booked).await;
        if let Err(reason) = &notified.delivery {
            tracing::warn!(event_id = %notified.booked.event_id, %reason, "booked but not notified");
        }
        Ok(notified.into())
    }

    async fn select(
        &self,
        calendar: &dyn CalendarConnector,
        request: &SchedulingRequest,
    ) -> Result<Option<SlotSelected>, ConnectorError> {
        let slots = self
            .policy
            .run("get_availability", CallKind::Idempotent, || {
                calendar.get_availability(&request.attendee, request.window_start, request.window_end)
            })
            .await?;
        Ok(select_slot(&slots, request.duration()).map(|slot| SlotSelected { slot }))
    }

    async fn book(
        &self,
        calendar: &dyn CalendarConnector,
        request: &SchedulingRequest,
        selected: SlotSelected,
    ) -> Result<Booked, (TimeSlot, ConnectorError)> {
        let event = CalendarEvent {
            id: None,
            title: request.title.clone(),
            description: request.description.clone(),
            start_time: selected.slot.start,
            end_time: selected.slot.end,
            timezone: request.timezone.clone(),
            attendees: vec![request.attendee.clone(), request.candidate.email.clone()],
            location: request.location.clone(),
            meeting_url: request.meeting_url.clone(),
        };
        self.policy
            .run("create_event", CallKind::SideEffecting, || {
                calendar.create_event(&event)
            })
            .await
            .map(|event_id| Booked {
                slot: selected.slot,
                event_id,
            })
            .map_err(|err| (selected.slot, err))
    }

    async fn notify(
        &self,
        messenger: &dyn CommunicationConnector,
        request: &SchedulingRequest,
        booked: Booked,
    ) -> Notified {
        let when = booked.slot.start.format("%Y-%m-%d %H:%M UTC").to_string();
        let delivery = if messenger.supports(Channel::Email) {
            let message = EmailMessage {
                to: request.candidate.email.clone(),
                subject: format!("Scheduled: {}", request.title),
                html: invitation_html(request, &when),
                text: Some(format!(
                    "Hi {}, your {} is scheduled for {when}.",
                    request.candidate.name, request.title
                )),
            };
            self.policy
                .run("send_email", CallKind::SideEffecting, || {
                    messenger.send_email(&message)
                })
                .await
                .map_err(|err| err.to_string())
        } else if let Some(phone) = request
            .candidate
            .phone
            .as_deref()
            .filter(|_| messenger.supports(Channel::Sms))
        {
            let body = format!("{} scheduled for {when}.", request.title);
            self.policy
                .run("send_sms", CallKind::SideEffecting, || {
                    messenger.send_sms(phone, &body)
                })
                .await
                .map_err(|err| err.to_string())
        } else {
            Err("no notification channel available for candidate".to_string())
        };

        Notified { booked, delivery }
    }
}

fn invitation_html(request: &SchedulingRequest, when: &str) -> String {
    let mut html = format!(
        "<p>Hi {},</p><p>Your <strong>{}</strong> is scheduled for {when}.</p>",
        request.candidate.name, request.title
    );
    if let Some(url) = &request.meeting_url {
        html.push_str(&format!("<p>Join: <a href=\"{url}\">{url}</a></p>"));
    } else if let Some(location) = &request.location {
        html.push_str(&format!("<p>Location: {location}</p>"));
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, hour, minute, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn earliest_slot_wins_then_shortest() {
        let slots = [
            TimeSlot::new(at(11, 0), at(12, 0)),
            TimeSlot::new(at(9, 0), at(10, 0)),
            TimeSlot::new(at(9, 0), at(9, 45)),
            TimeSlot::new(at(8, 0), at(8, 15)),
        ];
        assert_eq!(
            select_slot(&slots, Duration::minutes(30)),
            Some(TimeSlot::new(at(9, 0), at(9, 30)))
        );
    }

    #[test]
    fn slots_shorter_than_duration_never_qualify() {
        let slots = [TimeSlot::new(at(8, 0), at(8, 15))];
        assert!(select_slot(&slots, Duration::minutes(30)).is_none());
        assert!(select_slot(&[], Duration::minutes(30)).is_none());
    }

    #[test]
    fn status_labels_follow_notification() {
        let slot = TimeSlot::new(at(9, 0), at(9, 30));
        let booked = SchedulingOutcome::Booked {
            event_id: "evt-1".to_string(),
            slot,
            notified: false,
            notification_error: Some("smtp down".to_string()),
        };
        assert_eq!(booked.status(), "booked_but_not_notified");
        let report = booked.report();
        assert_eq!(report.event_id.as_deref(), Some("evt-1"));
        assert!(!report.notified);
        assert_eq!(SchedulingOutcome::NoAvailability.status(), "no_availability");
    }
}
