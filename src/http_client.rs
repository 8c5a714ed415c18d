//! HTTP Retriever (C1): performs one EDR request for one (station, year),
//! classifies the outcome, and applies the retry/backoff policy.
//!
//! One attempt-loop shape (classify, retry-or-return, bounded attempts)
//! drives both a year-range fetch and a minimal preflight probe; the
//! outcome split (success / rate-limited / transient / client error) keeps
//! retryable and terminal failures apart at the classification boundary.

use crate::config::Config;
use crate::error::{AttemptOutcome, RetrieveError};
use crate::events::{self, RunId};
use crate::retry;
use bytes::Bytes;
use reqwest::StatusCode;
use std::time::{Duration, Instant};

pub struct HttpRetriever {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    credential: String,
    attempt_timeout: Duration,
    retry_cap: u32,
}

impl HttpRetriever {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.clone(),
            collection: cfg.collection.clone(),
            credential: cfg.credential.clone(),
            attempt_timeout: cfg.attempt_timeout,
            retry_cap: cfg.retry_cap,
        }
    }

    fn year_range_url(&self, station_id: &str, year: i32) -> String {
        format!(
            "{}/collections/{}/locations/{}?datetime={year:04}-01-01T00:00:00Z/{year:04}-12-31T23:59:59Z",
            self.base_url.trim_end_matches('/'),
            self.collection,
            station_id,
        )
    }

    fn one_day_url(&self, station_id: &str) -> String {
        let today = chrono::Utc::now().date_naive();
        format!(
            "{}/collections/{}/locations/{}?datetime={today}T00:00:00Z/{today}T23:59:59Z",
            self.base_url.trim_end_matches('/'),
            self.collection,
            station_id,
        )
    }

    /// Performs one EDR request for `(station_id, year)`, retrying up to
    /// `retry_cap` attempts with exponential backoff, honoring any
    /// `Retry-After` hint on a 429. Returns the response bytes verbatim on
    /// success.
    pub async fn fetch(
        &self,
        run_id: RunId,
        station_key: &str,
        station_id: &str,
        year: i32,
    ) -> Result<Bytes, RetrieveError> {
        let url = self.year_range_url(station_id, year);
        self.retrieve(run_id, station_key, year, &url).await
    }

    /// Performs a minimal one-day probe GET against `station_id`, used by
    /// the Orchestrator's preflight check to validate the credential and
    /// endpoint before fanning out station pipelines. Carries no chunk
    /// semantics of its own; `year` is a label for error and event fields
    /// only.
    pub async fn probe(
        &self,
        run_id: RunId,
        station_key: &str,
        station_id: &str,
    ) -> Result<(), RetrieveError> {
        let url = self.one_day_url(station_id);
        self.retrieve(run_id, station_key, 0, &url).await.map(drop)
    }

    async fn retrieve(
        &self,
        run_id: RunId,
        station_key: &str,
        year: i32,
        url: &str,
    ) -> Result<Bytes, RetrieveError> {
        let mut last_cause = String::new();

        for attempt in 1..=self.retry_cap {
            let started = Instant::now();
            let outcome = self.attempt(url).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                AttemptOutcome::Success(bytes) => {
                    events::chunk_attempt(
                        run_id,
                        station_key,
                        year,
                        attempt,
                        Some(200),
                        latency_ms,
                        Some(bytes.len() as u64),
                    );
                    return Ok(bytes);
                }
                AttemptOutcome::ClientError(status) => {
                    events::chunk_attempt(
                        run_id,
                        station_key,
                        year,
                        attempt,
                        Some(status),
                        latency_ms,
                        None,
                    );
                    return Err(RetrieveError::ClientError {
                        station_id: station_key.to_string(),
                        year,
                        status,
                    });
                }
                AttemptOutcome::RateLimited { retry_after } => {
                    events::chunk_attempt(
                        run_id,
                        station_key,
                        year,
                        attempt,
                        Some(429),
                        latency_ms,
                        None,
                    );
                    last_cause = "rate limited".to_string();
                    if attempt < self.retry_cap {
                        tokio::time::sleep(retry::backoff_for_attempt(attempt, retry_after)).await;
                    }
                }
                AttemptOutcome::Transient(cause) => {
                    events::chunk_attempt(run_id, station_key, year, attempt, None, latency_ms, None);
                    last_cause = cause;
                    if attempt < self.retry_cap {
                        tokio::time::sleep(retry::backoff_for_attempt(attempt, None)).await;
                    }
                }
            }
        }

        Err(RetrieveError::Exhausted {
            station_id: station_key.to_string(),
            year,
            attempts: self.retry_cap,
            cause: last_cause,
        })
    }

    async fn attempt(&self, url: &str) -> AttemptOutcome {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, &self.credential)
            .timeout(self.attempt_timeout);

        let response = match request.send().await {
            Ok(r) => r,
            Err(err) => return AttemptOutcome::Transient(err.to_string()),
        };

        let status = response.status();

        if status.is_success() {
            return match response.bytes().await {
                Ok(bytes) => AttemptOutcome::Success(bytes),
                Err(err) => AttemptOutcome::Transient(err.to_string()),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(retry::parse_retry_after);
            return AttemptOutcome::RateLimited { retry_after };
        }

        if status.is_server_error() {
            return AttemptOutcome::Transient(format!("server error {status}"));
        }

        AttemptOutcome::ClientError(status.as_u16())
    }
}
