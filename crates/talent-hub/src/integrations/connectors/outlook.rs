use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::availability::free_slots;
use super::http::HttpSession;
use super::{CalendarConnector, Connector, ConnectorContext};
use crate::integrations::domain::{CalendarEvent, RateLimitState, TimeSlot};
use crate::integrations::error::ConnectorError;

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Outlook calendars through Microsoft Graph. All times are exchanged in UTC.
#[derive(Debug)]
pub struct OutlookConnector {
    session: HttpSession,
    base_url: String,
    user: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    value: Vec<ScheduleInformation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleInformation {
    schedule_id: String,
    #[serde(default)]
    schedule_items: Vec<ScheduleItem>,
}

#[derive(Debug, Deserialize)]
struct ScheduleItem {
    status: String,
    start: GraphTime,
    end: GraphTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphTime {
    date_time: String,
}

impl GraphTime {
    fn to_utc(&self) -> Result<DateTime<Utc>, ConnectorError> {
        NaiveDateTime::parse_from_str(self.date_time.trim(), GRAPH_TIME_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|err| {
                ConnectorError::InvalidResponse(format!("bad dateTime '{}': {err}", self.date_time))
            })
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

fn graph_time(value: DateTime<Utc>) -> serde_json::Value {
    json!({ "dateTime": value.format("%Y-%m-%dT%H:%M:%S").to_string(), "timeZone": "UTC" })
}

impl OutlookConnector {
    pub fn new(ctx: &ConnectorContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            session: HttpSession::new(ctx.timeout)?,
            base_url: ctx
                .setting("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            user: ctx.setting("user").unwrap_or("me").to_string(),
            access_token: ctx.credential("access_token"),
        })
    }

    fn token(&self) -> Result<&str, ConnectorError> {
        self.access_token
            .as_deref()
            .ok_or(ConnectorError::MissingCredential("access_token"))
    }

    fn user_path(&self) -> String {
        if self.user == "me" {
            format!("{}/me", self.base_url)
        } else {
            format!("{}/users/{}", self.base_url, self.user)
        }
    }

    async fn probe(&self, suffix: &str) -> Result<(), ConnectorError> {
        let request = self
            .session
            .client()
            .get(format!("{}{suffix}", self.user_path()))
            .bearer_auth(self.token()?);
        self.session.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl Connector for OutlookConnector {
    fn provider(&self) -> &'static str {
        "outlook"
    }

    async fn authenticate(&self) -> bool {
        match self.probe("").await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(provider = "outlook", error = %err, "authentication failed");
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.probe("/calendar").await.is_ok()
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        self.session.rate_limits()
    }
}

#[async_trait]
impl CalendarConnector for OutlookConnector {
    #[tracing::instrument(skip_all, fields(provider = "outlook"))]
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, ConnectorError> {
        let mut body = json!({
            "subject": event.title,
            "body": { "contentType": "HTML", "content": event.description },
            "start": graph_time(event.start_time),
            "end": graph_time(event.end_time),
            "attendees": event
                .attendees
                .iter()
                .map(|address| json!({ "emailAddress": { "address": address }, "type": "required" }))
                .collect::<Vec<_>>(),
        });
        if let Some(location) = event.location.as_deref().or(event.meeting_url.as_deref()) {
            body["location"] = json!({ "displayName": location });
        }
        if let Some(url) = &event.meeting_url {
            body["onlineMeetingUrl"] = json!(url);
        }

        let request = self
            .session
            .client()
            .post(format!("{}/events", self.user_path()))
            .bearer_auth(self.token()?)
            .json(&body);
        let created: CreatedEvent = self.session.json(request).await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip_all, fields(provider = "outlook"))]
    async fn get_availability(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSlot>, ConnectorError> {
        let request = self
            .session
            .client()
            .post(format!("{}/calendar/getSchedule", self.user_path()))
            .bearer_auth(self.token()?)
            .json(&json!({
                "schedules": [subject],
                "startTime": graph_time(start),
                "endTime": graph_time(end),
                "availabilityViewInterval": 15,
            }));
        let response: ScheduleResponse = self.session.json(request).await?;
        let schedule = response
            .value
            .into_iter()
            .find(|info| info.schedule_id.eq_ignore_ascii_case(subject))
            .ok_or_else(|| {
                ConnectorError::InvalidResponse(format!("no schedule returned for {subject}"))
            })?;

        let busy = schedule
            .schedule_items
            .iter()
            .filter(|item| !item.status.eq_ignore_ascii_case("free"))
            .map(|item| Ok(TimeSlot::new(item.start.to_utc()?, item.end.to_utc()?)))
            .collect::<Result<Vec<_>, ConnectorError>>()?;
        Ok(free_slots(start, end, &busy))
    }
}
