use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;

use super::connectors::{Channel, CommunicationConnector, EmailMessage};
use super::domain::IntegrationId;
use super::error::{ConnectorError, HubError};
use super::quota::{Admission, RateTracker};
use super::retry::{CallKind, CallPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub merge_fields: BTreeMap<String, String>,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            merge_fields: BTreeMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One bulk send. `subject`, `html` and `text` may carry `{{name}}` and
/// `{{<merge field>}}` placeholders. SMS bodies use `text`, falling back to `html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRequest {
    #[serde(default = "default_channel")]
    pub channel: Channel,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: Option<String>,
    pub recipients: Vec<Recipient>,
}

fn default_channel() -> Channel {
    Channel::Email
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignError {
    /// Failing address. Absent only for batch-level failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignRun {
    pub recipients: Vec<String>,
    pub sent_count: usize,
    pub failed_count: usize,
    pub errors: Vec<CampaignError>,
}

impl CampaignRun {
    fn empty(recipients: Vec<String>) -> Self {
        Self {
            recipients,
            sent_count: 0,
            failed_count: 0,
            errors: Vec::new(),
        }
    }

    /// Whole batch refused because the connector lacks the channel.
    pub fn unsupported(recipients: Vec<String>) -> Self {
        Self {
            errors: vec![CampaignError {
                recipient: None,
                reason: "unsupported operation".to_string(),
            }],
            ..Self::empty(recipients)
        }
    }

    fn fail(&mut self, recipient: &str, reason: impl Into<String>) {
        self.failed_count += 1;
        self.errors.push(CampaignError {
            recipient: Some(recipient.to_string()),
            reason: reason.into(),
        });
    }
}

/// Fans a campaign out over a communication connector with bounded concurrency.
pub struct CampaignEngine {
    rates: Arc<RateTracker>,
    policy: CallPolicy,
    concurrency: usize,
    deadline: Duration,
}

impl CampaignEngine {
    pub fn new(rates: Arc<RateTracker>, config: &HubConfig) -> Self {
        Self {
            rates,
            policy: CallPolicy::from_config(config),
            concurrency: config.campaign_concurrency.max(1),
            deadline: config.campaign_deadline,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(
            integration_id = %integration_id,
            channel = request.channel.label(),
            recipients = request.recipients.len()
        )
    )]
    pub async fn run(
        &self,
        integration_id: &IntegrationId,
        connector: &dyn CommunicationConnector,
        request: &CampaignRequest,
        cancel: &CancellationToken,
    ) -> Result<CampaignRun, HubError> {
        if let Admission::Defer { retry_at } = self.rates.admit(integration_id, Utc::now()) {
            tracing::info!(%retry_at, "campaign deferred by quota pre-check");
            return Err(HubError::deferred(retry_at));
        }

        let addresses: Vec<String> = request
            .recipients
            .iter()
            .map(|recipient| recipient.address.clone())
            .collect();
        if !connector.supports(request.channel) {
            tracing::warn!(provider = connector.provider(), "channel not supported");
            return Ok(CampaignRun::unsupported(addresses));
        }

        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut settled = vec![false; request.recipients.len()];
        let mut run = CampaignRun::empty(addresses);
        let mut deadline_hit = false;

        {
            let mut sends = stream::iter(0..request.recipients.len())
                .map(|index| async move {
                    if cancel.is_cancelled() {
                        return (index, None);
                    }
                    let recipient = &request.recipients[index];
                    (index, Some(self.send_one(connector, request, recipient).await))
                })
                .buffer_unordered(self.concurrency);

            loop {
                match tokio::time::timeout_at(deadline, sends.next()).await {
                    Ok(Some((index, Some(outcome)))) => {
                        settled[index] = true;
                        match outcome {
                            Ok(()) => run.sent_count += 1,
                            Err(err) => run.fail(&request.recipients[index].address, err.to_string()),
                        }
                    }
                    Ok(Some((_, None))) => continue,
                    Ok(None) => break,
                    Err(_) => {
                        deadline_hit = true;
                        break;
                    }
                }
            }
        }

        let reason = if deadline_hit {
            "campaign deadline elapsed before send completed"
        } else {
            "campaign cancelled before send"
        };
        for (recipient, _) in request
            .recipients
            .iter()
            .zip(&settled)
            .filter(|(_, settled)| !**settled)
        {
            run.fail(&recipient.address, reason);
        }

        self.rates.observe(integration_id, connector.rate_limits());
        tracing::info!(
            sent = run.sent_count,
            failed = run.failed_count,
            "campaign finished"
        );
        Ok(run)
    }

    async fn send_one(
        &self,
        connector: &dyn CommunicationConnector,
        request: &CampaignRequest,
        recipient: &Recipient,
    ) -> Result<(), ConnectorError> {
        match request.channel {
            Channel::Email => {
                let message = EmailMessage {
                    to: recipient.address.clone(),
                    subject: render(&request.subject, recipient),
                    html: render(&request.html, recipient),
                    text: request.text.as_deref().map(|text| render(text, recipient)),
                };
                self.policy
                    .run("send_email", CallKind::SideEffecting, || {
                        connector.send_email(&message)
                    })
                    .await
            }
            Channel::Sms => {
                let body = render(request.text.as_deref().unwrap_or(&request.html), recipient);
                self.policy
                    .run("send_sms", CallKind::SideEffecting, || {
                        connector.send_sms(&recipient.address, &body)
                    })
                    .await
            }
        }
    }
}

/// Replaces `{{name}}` and `{{<merge field>}}`; unknown placeholders are left as written.
pub fn render(template: &str, recipient: &Recipient) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        rendered.push_str(&rest[..open]);
        let key = rest[open + 2..open + 2 + close].trim();
        let value = match key {
            "name" => recipient.name.as_deref(),
            other => recipient.merge_fields.get(other).map(String::as_str),
        };
        match value {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(&rest[open..open + close + 4]),
        }
        rest = &rest[open + close + 4..];
    }

    rendered.push_str(rest);
    rendered
}
