use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::domain::{IntegrationId, RateLimitState};

/// Outcome of the soft quota pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    Defer { retry_at: DateTime<Utc> },
}

/// Last-known provider quota per integration.
///
/// Refreshed only from connector responses and never polled. Advisory: a real throttling
/// response from the provider is still handled at the call site.
#[derive(Debug, Default)]
pub struct RateTracker {
    states: Mutex<HashMap<IntegrationId, RateLimitState>>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, integration_id: &IntegrationId, state: RateLimitState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(integration_id.clone(), state);
    }

    /// Records `state` when the connector has observed one.
    pub fn observe(&self, integration_id: &IntegrationId, state: Option<RateLimitState>) {
        if let Some(state) = state {
            self.record(integration_id, state);
        }
    }

    pub fn current(&self, integration_id: &IntegrationId) -> Option<RateLimitState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(integration_id)
            .copied()
    }

    /// Defers only when the quota is exhausted and its reset lies in the future.
    pub fn admit(&self, integration_id: &IntegrationId, now: DateTime<Utc>) -> Admission {
        match self.current(integration_id) {
            Some(state) if state.remaining == 0 && now < state.reset_time => Admission::Defer {
                retry_at: state.reset_time,
            },
            _ => Admission::Proceed,
        }
    }
}
