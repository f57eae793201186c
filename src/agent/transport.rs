//! Retrying transport around a single completion call
//!
//! `Idle -> Sending -> {Success, RetryWait -> Sending, Failed}`. Transport failures
//! and responses whose status is listed as retryable are retried with exponential
//! backoff; every other response is returned as-is, even when it is not a success.
//! When retries run out the last attempt's outcome is returned unchanged.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::types::CompletionRequest;

/// Status and body of an HTTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before any HTTP status was received
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("failed to read response: {0}")]
    Body(String),
}

/// The single network call being protected
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(&self, request: &CompletionRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryOptions {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            retryable_statuses: config.retryable_statuses.clone(),
        }
    }
}

impl RetryOptions {
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Saturates at `max_delay`, including for products `Duration` cannot hold
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TransportState {
    Sending,
    RetryWait(Duration),
    Done,
}

/// Outcome of a send together with how it was reached
#[derive(Debug)]
pub struct Delivery {
    pub outcome: Result<HttpResponse, TransportError>,
    pub attempts: u32,
    /// Backoff waits taken between attempts, in order
    pub waits: Vec<Duration>,
}

impl Delivery {
    /// True when the final outcome is still something worth retrying
    pub fn exhausted(&self, options: &RetryOptions) -> bool {
        match &self.outcome {
            Ok(response) => options.is_retryable(response.status),
            Err(_) => true,
        }
    }
}

/// Retrying, backing-off wrapper around a [`RequestSender`]
#[derive(Clone)]
pub struct ResilientTransport {
    sender: Arc<dyn RequestSender>,
    options: RetryOptions,
}

impl ResilientTransport {
    pub fn new(sender: Arc<dyn RequestSender>, options: RetryOptions) -> Self {
        Self { sender, options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    pub async fn send(&self, request: &CompletionRequest) -> Result<HttpResponse, TransportError> {
        self.send_traced(request).await.outcome
    }

    /// Send with retries, reporting attempts and waits alongside the outcome
    pub async fn send_traced(&self, request: &CompletionRequest) -> Delivery {
        let mut state = TransportState::Sending;
        let mut delay = self.options.initial_delay;
        let mut attempts: u32 = 0;
        let mut waits = Vec::new();
        let mut last: Result<HttpResponse, TransportError> =
            Err(TransportError::Connection("no attempt made".to_string()));

        while state != TransportState::Done {
            state = match state {
                TransportState::Sending => {
                    attempts += 1;
                    last = self.sender.send(request).await;
                    let retries_left = attempts <= self.options.max_retries;

                    match &last {
                        Ok(response) if response.is_success() || !self.options.is_retryable(response.status) => {
                            debug!(status = response.status, attempts, "Request finished");
                            TransportState::Done
                        }
                        Ok(response) if retries_left => {
                            warn!(status = response.status, attempt = attempts, ?delay, "Retryable status, backing off");
                            TransportState::RetryWait(delay)
                        }
                        Err(e) if retries_left => {
                            warn!(error = %e, attempt = attempts, ?delay, "Transport failure, backing off");
                            TransportState::RetryWait(delay)
                        }
                        _ => {
                            warn!(attempts, "Retries exhausted");
                            TransportState::Done
                        }
                    }
                }
                TransportState::RetryWait(wait) => {
                    tokio::time::sleep(wait).await;
                    waits.push(wait);
                    delay = self.options.next_delay(delay);
                    TransportState::Sending
                }
                TransportState::Done => TransportState::Done,
            };
        }

        Delivery { outcome: last, attempts, waits }
    }
}
