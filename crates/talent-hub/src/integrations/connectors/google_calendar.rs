use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::availability::free_slots;
use super::http::HttpSession;
use super::{CalendarConnector, Connector, ConnectorContext};
use crate::integrations::domain::{CalendarEvent, RateLimitState, TimeSlot};
use crate::integrations::error::ConnectorError;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar v3 with an OAuth bearer token.
#[derive(Debug)]
pub struct GoogleCalendarConnector {
    session: HttpSession,
    base_url: String,
    calendar_id: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Default, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<TimeSlot>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

impl GoogleCalendarConnector {
    pub fn new(ctx: &ConnectorContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            session: HttpSession::new(ctx.timeout)?,
            base_url: ctx
                .setting("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            calendar_id: ctx.setting("calendar_id").unwrap_or("primary").to_string(),
            access_token: ctx.credential("access_token"),
        })
    }

    fn token(&self) -> Result<&str, ConnectorError> {
        self.access_token
            .as_deref()
            .ok_or(ConnectorError::MissingCredential("access_token"))
    }

    async fn probe(&self, path: &str) -> Result<(), ConnectorError> {
        let request = self
            .session
            .client()
            .get(format!("{}/{path}", self.base_url))
            .bearer_auth(self.token()?);
        self.session.send(request).await.map(|_| ())
    }
}

fn event_body(event: &CalendarEvent) -> serde_json::Value {
    let description = match &event.meeting_url {
        Some(url) if !event.description.contains(url.as_str()) => {
            format!("{}\n\n{url}", event.description)
        }
        _ => event.description.clone(),
    };
    json!({
        "summary": event.title,
        "description": description,
        "start": { "dateTime": event.start_time.to_rfc3339(), "timeZone": event.timezone },
        "end": { "dateTime": event.end_time.to_rfc3339(), "timeZone": event.timezone },
        "attendees": event
            .attendees
            .iter()
            .map(|email| json!({ "email": email }))
            .collect::<Vec<_>>(),
        "location": event.location.as_deref().or(event.meeting_url.as_deref()),
    })
}

#[async_trait]
impl Connector for GoogleCalendarConnector {
    fn provider(&self) -> &'static str {
        "google_calendar"
    }

    async fn authenticate(&self) -> bool {
        match self.probe("users/me/calendarList?maxResults=1").await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(provider = "google_calendar", error = %err, "authentication failed");
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.probe(&format!("calendars/{}", self.calendar_id))
            .await
            .is_ok()
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        self.session.rate_limits()
    }
}

#[async_trait]
impl CalendarConnector for GoogleCalendarConnector {
    #[tracing::instrument(skip_all, fields(provider = "google_calendar"))]
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, ConnectorError> {
        let request = self
            .session
            .client()
            .post(format!(
                "{}/calendars/{}/events",
                self.base_url, self.calendar_id
            ))
            .bearer_auth(self.token()?)
            .query(&[("sendUpdates", "all")])
            .json(&event_body(event));
        let created: CreatedEvent = self.session.json(request).await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip_all, fields(provider = "google_calendar"))]
    async fn get_availability(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, ConnectorError> {
        let request = self
            .session
            .client()
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(self.token()?)
            .json(&json!({
                "timeMin": start.to_rfc3339(),
                "timeMax": end.to_rfc3339(),
                "items": [{ "id": subject }],
            }));
        let response: FreeBusyResponse = self.session.json(request).await?;
        let calendar = response.calendars.get(subject).ok_or_else(|| {
            ConnectorError::InvalidResponse(format!("no free/busy data for {subject}"))
        })?;
        if !calendar.errors.is_empty() {
            return Err(ConnectorError::InvalidResponse(format!(
                "free/busy query failed for {subject}"
            )));
        }
        Ok(free_slots(start, end, &calendar.busy))
    }
}
