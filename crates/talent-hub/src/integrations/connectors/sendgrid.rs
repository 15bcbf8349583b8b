use async_trait::async_trait;
use serde_json::json;

use super::http::HttpSession;
use super::{Channel, CommunicationConnector, Connector, ConnectorContext, EmailMessage};
use crate::integrations::domain::RateLimitState;
use crate::integrations::error::ConnectorError;

const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

/// SendGrid v3 mail send. Email only.
#[derive(Debug)]
pub struct SendGridConnector {
    session: HttpSession,
    base_url: String,
    api_key: Option<String>,
    from_email: Option<String>,
    from_name: Option<String>,
}

impl SendGridConnector {
    pub fn new(ctx: &ConnectorContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            session: HttpSession::new(ctx.timeout)?,
            base_url: ctx
                .setting("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: ctx.credential("api_key"),
            from_email: ctx.setting("from_email").map(str::to_string),
            from_name: ctx.setting("from_name").map(str::to_string),
        })
    }

    fn api_key(&self) -> Result<&str, ConnectorError> {
        self.api_key
            .as_deref()
            .ok_or(ConnectorError::MissingCredential("api_key"))
    }

    fn payload(&self, message: &EmailMessage) -> Result<serde_json::Value, ConnectorError> {
        let from_email = self.from_email.as_deref().ok_or_else(|| {
            ConnectorError::Misconfigured("settings.from_email is required".to_string())
        })?;

        // SendGrid requires text/plain to precede text/html.
        let mut content = Vec::with_capacity(2);
        if let Some(text) = message.text.as_deref().filter(|text| !text.is_empty()) {
            content.push(json!({ "type": "text/plain", "value": text }));
        }
        content.push(json!({ "type": "text/html", "value": message.html }));

        let mut from = json!({ "email": from_email });
        if let Some(name) = &self.from_name {
            from["name"] = json!(name);
        }

        Ok(json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": from,
            "subject": message.subject,
            "content": content,
        }))
    }
}

#[async_trait]
impl Connector for SendGridConnector {
    fn provider(&self) -> &'static str {
        "sendgrid"
    }

    async fn authenticate(&self) -> bool {
        let outcome = async {
            let request = self
                .session
                .client()
                .get(format!("{}/v3/scopes", self.base_url))
                .bearer_auth(self.api_key()?);
            self.session.send(request).await.map(|_| ())
        }
        .await;
        match outcome {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(provider = "sendgrid", error = %err, "authentication failed");
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        let Ok(api_key) = self.api_key() else {
            return false;
        };
        let request = self
            .session
            .client()
            .get(format!("{}/v3/user/credits", self.base_url))
            .bearer_auth(api_key);
        self.session.send(request).await.is_ok()
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        self.session.rate_limits()
    }
}

#[async_trait]
impl CommunicationConnector for SendGridConnector {
    fn channels(&self) -> &'static [Channel] {
        &[Channel::Email]
    }

    #[tracing::instrument(skip_all, fields(provider = "sendgrid"))]
    async fn send_email(&self, message: &EmailMessage) -> Result<(), ConnectorError> {
        let request = self
            .session
            .client()
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&self.payload(message)?);
        self.session.send(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::domain::Credentials;
    use serde_json::Value;
    use std::time::Duration;

    fn connector(settings: Value) -> SendGridConnector {
        SendGridConnector::new(&ConnectorContext {
            credentials: [("api_key", "SG.test")].into_iter().collect::<Credentials>(),
            settings: settings.as_object().cloned().unwrap_or_default(),
            timeout: Duration::from_secs(1),
        })
        .expect("builds")
    }

    #[test]
    fn payload_orders_plain_text_before_html() {
        let payload = connector(json!({ "from_email": "talent@acme.test", "from_name": "Acme" }))
            .payload(&EmailMessage {
                to: "ada@example.com".to_string(),
                subject: "Hello".to_string(),
                html: "<p>Hello</p>".to_string(),
                text: Some("Hello".to_string()),
            })
            .expect("payload");
        assert_eq!(payload["content"][0]["type"], json!("text/plain"));
        assert_eq!(payload["content"][1]["type"], json!("text/html"));
        assert_eq!(payload["from"]["name"], json!("Acme"));
        assert_eq!(
            payload["personalizations"][0]["to"][0]["email"],
            json!("ada@example.com")
        );
    }

    #[tokio::test]
    async fn sender_address_is_required() {
        let err = connector(json!({}))
            .send_email(&EmailMessage {
                to: "ada@example.com".to_string(),
                subject: "Hello".to_string(),
                html: "<p>Hello</p>".to_string(),
                text: None,
            })
            .await
            .expect_err("misconfigured");
        assert!(matches!(err, ConnectorError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn sms_is_unsupported() {
        let err = connector(json!({}))
            .send_sms("+15550100", "hi")
            .await
            .expect_err("unsupported");
        assert_eq!(err, ConnectorError::Unsupported("sms"));
    }
}
