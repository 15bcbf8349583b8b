use async_trait::async_trait;
use serde::Deserialize;

use super::http::HttpSession;
use super::{AtsConnector, Connector, ConnectorContext};
use crate::integrations::domain::{NativeRecord, RateLimitState, RecordFilters};
use crate::integrations::error::ConnectorError;

const DEFAULT_BASE_URL: &str = "https://api.lever.co/v1";
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 500;

/// Lever API: opportunities are candidates, postings are jobs. Cursor pagination.
#[derive(Debug)]
pub struct LeverConnector {
    session: HttpSession,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<NativeRecord>,
    #[serde(default, rename = "hasNext")]
    has_next: bool,
    #[serde(default)]
    next: Option<String>,
}

impl LeverConnector {
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
            .query(&[("limit", "1")]);
        self.session.send(request).await.map(|_| ())
    }

    async fn fetch_all(
        &self,
        resource: &str,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError> {
        let api_key = self.api_key()?;
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = vec![("limit", PAGE_SIZE.to_string())];
            if let Some(since) = filters.updated_since {
                query.push(("updated_at_start", since.timestamp_millis().to_string()));
            }
            if let Some(offset) = cursor.take() {
                query.push(("offset", offset));
            }

            let request = self
                .session
                .client()
                .get(format!("{}/{resource}", self.base_url))
                .basic_auth(api_key, Some(""))
                .query(&query);
            let page: Page = self.session.json(request).await?;
            records.extend(page.data);

            if let Some(limit) = filters.limit {
                if records.len() >= limit {
                    records.truncate(limit);
                    break;
                }
            }
            match page.next.filter(|next| page.has_next && !next.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(resource, count = records.len(), "fetched lever records");
        Ok(records)
    }
}

#[async_trait]
impl Connector for LeverConnector {
    fn provider(&self) -> &'static str {
        "lever"
    }

    async fn authenticate(&self) -> bool {
        match self.probe("users").await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(provider = "lever", error = %err, "authentication failed");
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.probe("postings").await.is_ok()
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        self.session.rate_limits()
    }
}

#[async_trait]
impl AtsConnector for LeverConnector {
    #[tracing::instrument(skip_all, fields(provider = "lever"))]
    async fn get_candidates(
        &self,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError> {
        self.fetch_all("opportunities", filters).await
    }

    #[tracing::instrument(skip_all, fields(provider = "lever"))]
    async fn get_jobs(&self, filters: &RecordFilters) -> Result<Vec<NativeRecord>, ConnectorError> {
        self.fetch_all("postings", filters).await
    }
}
