use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::integrations::domain::RateLimitState;
use crate::integrations::error::ConnectorError;

const MAX_ERROR_BODY: usize = 200;

/// Shared HTTP plumbing for the REST connectors: one client per connector instance and
/// the last quota the provider reported.
#[derive(Debug)]
pub(crate) struct HttpSession {
    client: Client,
    rate: Mutex<Option<RateLimitState>>,
}

impl HttpSession {
    pub(crate) fn new(timeout: Duration) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("talent-hub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConnectorError::Misconfigured(err.to_string()))?;
        Ok(Self {
            client,
            rate: Mutex::new(None),
        })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn rate_limits(&self) -> Option<RateLimitState> {
        *self.rate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends the request, records quota headers, and classifies non-2xx responses.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, ConnectorError> {
        let response = request.send().await.map_err(transport_error)?;
        if let Some(state) = rate_limit_from_headers(response.headers(), Utc::now()) {
            *self.rate.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, retry_after, &body))
    }

    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ConnectorError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| ConnectorError::InvalidResponse(err.to_string()))
    }
}

pub(crate) fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ConnectorError {
    match status.as_u16() {
        401 | 403 => ConnectorError::Authentication(status.as_u16()),
        429 => ConnectorError::Throttled { retry_after },
        code if code >= 500 => ConnectorError::Unavailable(format!("status {code}")),
        code => ConnectorError::Rejected {
            status: code,
            message: body.trim().chars().take(MAX_ERROR_BODY).collect(),
        },
    }
}

fn transport_error(err: reqwest::Error) -> ConnectorError {
    if err.is_builder() {
        ConnectorError::Misconfigured(err.to_string())
    } else {
        ConnectorError::Unavailable(err.to_string())
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_number(headers, "retry-after")
        .filter(|secs| *secs >= 0)
        .map(|secs| Duration::from_secs(secs.unsigned_abs()))
}

/// Reads `x-ratelimit-*` (and `retry-after`) headers.
///
/// `x-ratelimit-reset` may be an epoch timestamp or a number of seconds from now.
pub(crate) fn rate_limit_from_headers(
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<RateLimitState> {
    let wait = retry_after(headers);
    let reset_time = match header_number(headers, "x-ratelimit-reset") {
        Some(epoch) if epoch >= 1_000_000_000 => Utc.timestamp_opt(epoch, 0).single(),
        Some(secs) if secs >= 0 => Some(now + chrono::Duration::seconds(secs)),
        _ => None,
    }
    .or_else(|| wait.and_then(|wait| chrono::Duration::from_std(wait).ok()).map(|wait| now + wait))
    .unwrap_or(now);

    let remaining = header_number(headers, "x-ratelimit-remaining");
    let limit = header_number(headers, "x-ratelimit-limit");

    match (limit, remaining) {
        (limit, Some(remaining)) => Some(RateLimitState {
            limit: clamp_u32(limit.unwrap_or(remaining)),
            remaining: clamp_u32(remaining),
            reset_time,
        }),
        (limit, None) if wait.is_some() => Some(RateLimitState {
            limit: clamp_u32(limit.unwrap_or(0)),
            remaining: 0,
            reset_time,
        }),
        _ => None,
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, None, ""),
            ConnectorError::Authentication(401)
        );
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3)), ""),
            ConnectorError::Throttled {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert!(classify(StatusCode::BAD_GATEWAY, None, "").is_transient());
        assert_eq!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, None, "  bad email  "),
            ConnectorError::Rejected {
                status: 422,
                message: "bad email".to_string()
            }
        );
    }

    #[test]
    fn rate_limit_headers_with_epoch_reset() {
        let state = rate_limit_from_headers(
            &headers(&[
                ("x-ratelimit-limit", "50"),
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1759320060"),
            ]),
            now(),
        )
        .expect("state");
        assert_eq!(state.limit, 50);
        assert_eq!(state.remaining, 0);
        assert_eq!(state.reset_time, now() + chrono::Duration::seconds(60));
    }

    #[test]
    fn retry_after_alone_marks_quota_exhausted() {
        let state = rate_limit_from_headers(&headers(&[("retry-after", "30")]), now())
            .expect("state");
        assert_eq!(state.remaining, 0);
        assert_eq!(state.reset_time, now() + chrono::Duration::seconds(30));
    }

    #[test]
    fn responses_without_quota_headers_leave_state_unknown() {
        assert!(rate_limit_from_headers(&HeaderMap::new(), now()).is_none());
    }
}
