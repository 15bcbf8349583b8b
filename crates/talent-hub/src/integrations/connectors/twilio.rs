use async_trait::async_trait;

use super::http::HttpSession;
use super::{Channel, CommunicationConnector, Connector, ConnectorContext, EmailMessage};
use crate::integrations::domain::RateLimitState;
use crate::integrations::error::ConnectorError;

const DEFAULT_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

/// Twilio Programmable Messaging. SMS only.
#[derive(Debug)]
pub struct TwilioConnector {
    session: HttpSession,
    base_url: String,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
}

impl TwilioConnector {
    pub fn new(ctx: &ConnectorContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            session: HttpSession::new(ctx.timeout)?,
            base_url: ctx
                .setting("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            account_sid: ctx.credential("account_sid"),
            auth_token: ctx.credential("auth_token"),
            from_number: ctx.setting("from_number").map(str::to_string),
        })
    }

    fn account(&self) -> Result<(&str, &str), ConnectorError> {
        let sid = self
            .account_sid
            .as_deref()
            .ok_or(ConnectorError::MissingCredential("account_sid"))?;
        let token = self
            .auth_token
            .as_deref()
            .ok_or(ConnectorError::MissingCredential("auth_token"))?;
        Ok((sid, token))
    }

    async fn fetch_account(&self) -> Result<(), ConnectorError> {
        let (sid, token) = self.account()?;
        let request = self
            .session
            .client()
            .get(format!("{}/Accounts/{sid}.json", self.base_url))
            .basic_auth(sid, Some(token));
        self.session.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl Connector for TwilioConnector {
    fn provider(&self) -> &'static str {
        "twilio"
    }

    async fn authenticate(&self) -> bool {
        match self.fetch_account().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(provider = "twilio", error = %err, "authentication failed");
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.fetch_account().await.is_ok()
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        self.session.rate_limits()
    }
}

#[async_trait]
impl CommunicationConnector for TwilioConnector {
    fn channels(&self) -> &'static [Channel] {
        &[Channel::Sms]
    }

    async fn send_email(&self, _message: &EmailMessage) -> Result<(), ConnectorError> {
        Err(ConnectorError::Unsupported("email"))
    }

    #[tracing::instrument(skip_all, fields(provider = "twilio"))]
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), ConnectorError> {
        let (sid, token) = self.account()?;
        let from = self.from_number.as_deref().ok_or_else(|| {
            ConnectorError::Misconfigured("settings.from_number is required".to_string())
        })?;
        let request = self
            .session
            .client()
            .post(format!("{}/Accounts/{sid}/Messages.json", self.base_url))
            .basic_auth(sid, Some(token))
            .form(&[("To", to), ("From", from), ("Body", body)]);
        self.session.send(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::domain::Credentials;
    use serde_json::Map;
    use std::time::Duration;

    fn connector(credentials: Credentials) -> TwilioConnector {
        TwilioConnector::new(&ConnectorContext {
            credentials,
            settings: Map::new(),
            timeout: Duration::from_secs(1),
        })
        .expect("builds")
    }

    #[tokio::test]
    async fn email_is_a_deterministic_unsupported_operation() {
        let err = connector(Credentials::default())
            .send_email(&EmailMessage {
                to: "ada@example.com".to_string(),
                subject: "Hi".to_string(),
                html: "<p>Hi</p>".to_string(),
                text: None,
            })
            .await
            .expect_err("unsupported");
        assert_eq!(err, ConnectorError::Unsupported("email"));
    }

    #[tokio::test]
    async fn sms_requires_both_account_fields() {
        let only_sid: Credentials = [("account_sid", "AC123")].into_iter().collect();
        let err = connector(only_sid)
            .send_sms("+15550100", "hi")
            .await
            .expect_err("missing token");
        assert_eq!(err, ConnectorError::MissingCredential("auth_token"));
    }
}
