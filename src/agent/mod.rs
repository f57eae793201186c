//! Agent module - the practice exchange loop and its transport

pub mod client;
pub mod orchestrator;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

pub use client::HttpSender;
pub use orchestrator::{ExchangeOrchestrator, ExchangeOutcome, ExchangeReport};
pub use transport::{
    Delivery, HttpResponse, RequestSender, ResilientTransport, RetryOptions, TransportError,
};

/// Why an exchange produced no reply
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Input rejected locally or by the backend; never retried
    #[error("invalid input: {0}")]
    Validation(String),
    /// The backend's admission gate refused the request
    #[error("rate limited")]
    RateLimited,
    /// Retries exhausted on a retryable status, or the connection failed
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Non-retryable failure status or a malformed reply
    #[error("upstream service error: {0}")]
    Upstream(String),
}

impl ExchangeError {
    /// Message suitable for showing to the learner
    pub fn user_message(&self) -> String {
        match self {
            ExchangeError::Validation(reason) => reason.clone(),
            ExchangeError::RateLimited => {
                "You're sending messages quickly. Please slow down and try again in a minute.".to_string()
            }
            ExchangeError::ServiceUnavailable(_) => {
                "The service is unavailable right now. Please try again.".to_string()
            }
            ExchangeError::Upstream(_) => {
                "Sorry, something went wrong while getting a reply. Please try again later.".to_string()
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::ServiceUnavailable(_))
    }
}
