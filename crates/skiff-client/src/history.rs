//! Cursor-based history paginator over the REST boundary.
//!
//! Three fetch modes feed the reconciler: the initial latest page, older
//! pages for infinite scroll up, and newer pages plus symmetric context
//! windows for jump-to-message. All reads are idempotent, so transient
//! failures retry on a small exponential schedule; authorization failures
//! never retry and are routed to the token provider.
//!
//! Cancellation is the caller's concern: the session runs fetches in
//! abortable tasks and re-checks view staleness when a result arrives, so a
//! superseded fetch can never mutate state.

use std::{sync::Arc, time::Duration};

use serde::de::DeserializeOwned;
use skiff_proto::{ContextWindow, Cursor, MessageId, MessagePage, RoomId};

use crate::{
    auth::{TokenProvider, require_success},
    config::ClientConfig,
    error::ClientError,
};

/// First retry delay for transient fetch failures.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Cap on the fetch retry delay.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Exponential retry schedule with a fixed budget.
///
/// Pure so the policy is testable without a server: each call to
/// [`RetrySchedule::next_delay`] spends one attempt and doubles the delay
/// up to the cap.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    remaining: u32,
    delay: Duration,
    cap: Duration,
}

impl RetrySchedule {
    /// A schedule with `budget` retries, starting at `base` and doubling up
    /// to `cap`.
    pub fn new(budget: u32, base: Duration, cap: Duration) -> Self {
        Self { remaining: budget, delay: base.min(cap), cap }
    }

    /// The delay to sleep before the next retry, or `None` when the budget
    /// is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        let current = self.delay;
        self.delay = (current + current).min(self.cap);
        Some(current)
    }
}

/// REST client for room history.
#[derive(Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    tokens: Arc<dyn TokenProvider>,
}

impl HistoryClient {
    /// Create a history client over the configured REST boundary.
    pub fn new(
        http: reqwest::Client,
        config: Arc<ClientConfig>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self { http, config, tokens }
    }

    /// The most recent page for a room, newest-first, plus an older-cursor.
    pub async fn fetch_initial(&self, room_id: RoomId) -> Result<MessagePage, ClientError> {
        let url = format!("{}/rooms/{room_id}/messages", self.config.api_base);
        self.get_json(&url, vec![("limit", self.config.page_size.to_string())]).await
    }

    /// The page strictly before `cursor`.
    pub async fn fetch_older(
        &self,
        room_id: RoomId,
        cursor: &Cursor,
    ) -> Result<MessagePage, ClientError> {
        let url = format!("{}/rooms/{room_id}/messages", self.config.api_base);
        self.get_json(&url, vec![
            ("cursor", cursor.as_str().to_owned()),
            ("limit", self.config.page_size.to_string()),
        ])
        .await
    }

    /// The page strictly after `cursor` (context mode only).
    pub async fn fetch_newer(
        &self,
        room_id: RoomId,
        cursor: &Cursor,
    ) -> Result<MessagePage, ClientError> {
        let url = format!("{}/rooms/{room_id}/messages/newer", self.config.api_base);
        self.get_json(&url, vec![
            ("cursor", cursor.as_str().to_owned()),
            ("limit", self.config.page_size.to_string()),
        ])
        .await
    }

    /// A symmetric window around `target`, with independent cursors for
    /// extending in both directions.
    pub async fn fetch_context(
        &self,
        room_id: RoomId,
        target: MessageId,
        before: u32,
        after: u32,
    ) -> Result<ContextWindow, ClientError> {
        let url = format!("{}/rooms/{room_id}/messages/{target}/context", self.config.api_base);
        self.get_json(&url, vec![
            ("before", before.to_string()),
            ("after", after.to_string()),
        ])
        .await
    }

    /// Issue a GET with the retry policy for idempotent reads.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<T, ClientError> {
        let mut schedule =
            RetrySchedule::new(self.config.fetch_retry_budget, RETRY_BASE_DELAY, RETRY_MAX_DELAY);

        loop {
            match self.attempt(url, &query).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() => match schedule.next_delay() {
                    Some(delay) => {
                        tracing::warn!(%error, ?delay, url, "history fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                    },
                    None => return Err(error),
                },
                Err(error) => return Err(error),
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(self.tokens.token())
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let response = require_success(response, self.tokens.as_ref())?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_doubles_up_to_the_cap() {
        let mut schedule = RetrySchedule::new(4, Duration::from_millis(250), Duration::from_secs(1));

        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(250)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(schedule.next_delay(), None);
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut schedule = RetrySchedule::new(0, RETRY_BASE_DELAY, RETRY_MAX_DELAY);
        assert_eq!(schedule.next_delay(), None);
    }
}
