use async_trait::async_trait;

use super::http::HttpSession;
use super::{AtsConnector, Connector, ConnectorContext};
use crate::integrations::domain::{NativeRecord, RateLimitState, RecordFilters};
use crate::integrations::error::ConnectorError;

const DEFAULT_BASE_URL: &str = "https://harvest.greenhouse.io/v1";
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 500;

/// Greenhouse Harvest API. Basic auth with the API key as user name.
#[derive(Debug)]
pub struct GreenhouseConnector {
    session: HttpSession,
    base_url: String,
    api_key: Option<String>,
}

impl GreenhouseConnector {
    pub fn new(ctx: &ConnectorContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            session: HttpSession::new(ctx.timeout)?,
            base_url: ctx
                .setting("base_url")
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: ctx.credential("api_key"),
        })
    }

    fn api_key(&self) -> Result<&str, ConnectorError> {
        self.api_key
            .as_deref()
            .ok_or(ConnectorError::MissingCredential("api_key"))
    }

    async fn probe(&self, resource: &str) -> Result<(), ConnectorError> {
        let request = self
            .session
            .client()
            .get(format!("{}/{resource}", self.base_url))
            .basic_auth(self.api_key()?, Some(""))
            .query(&[("per_page", "1")]);
        self.session.send(request).await.map(|_| ())
    }

    async fn fetch_all(
        &self,
        resource: &str,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError> {
        let api_key = self.api_key()?;
        let mut records = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut query = vec![
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(since) = filters.updated_since {
                query.push(("updated_after", since.to_rfc3339()));
            }

            let request = self
                .session
                .client()
                .get(format!("{}/{resource}", self.base_url))
                .basic_auth(api_key, Some(""))
                .query(&query);
            let batch: Vec<NativeRecord> = self.session.json(request).await?;
            let last_page = batch.len() < PAGE_SIZE;
            records.extend(batch);

            if let Some(limit) = filters.limit {
                if records.len() >= limit {
                    records.truncate(limit);
                    break;
                }
            }
            if last_page {
                break;
            }
        }

        tracing::debug!(resource, count = records.len(), "fetched greenhouse records");
        Ok(records)
    }
}

#[async_trait]
impl Connector for GreenhouseConnector {
    fn provider(&self) -> &'static str {
        "greenhouse"
    }

    async fn authenticate(&self) -> bool {
        match self.probe("users").await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(provider = "greenhouse", error = %err, "authentication failed");
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.probe("jobs").await.is_ok()
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        self.session.rate_limits()
    }
}

#[async_trait]
impl AtsConnector for GreenhouseConnector {
    #[tracing::instrument(skip_all, fields(provider = "greenhouse"))]
    async fn get_candidates(
        &self,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError> {
        self.fetch_all("candidates", filters).await
    }

    #[tracing::instrument(skip_all, fields(provider = "greenhouse"))]
    async fn get_jobs(&self, filters: &RecordFilters) -> Result<Vec<NativeRecord>, ConnectorError> {
        self.fetch_all("jobs", filters).await
    }
}
