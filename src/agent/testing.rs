//! Scripted transport for exercising the exchange loop without a network

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::transport::{HttpResponse, RequestSender, TransportError};
use crate::storage::debounce::lock;
use crate::types::CompletionRequest;

/// Sender replaying a fixed sequence of outcomes, repeating the last one
pub struct ScriptedSender {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    fallback: Mutex<Option<Result<HttpResponse, TransportError>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedSender {
    pub fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with status `status` and body `body`, in order
    pub fn statuses(replies: &[(u16, &str)]) -> Self {
        Self::new(replies.iter().map(|(s, b)| Ok(HttpResponse::new(*s, *b))).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl RequestSender for ScriptedSender {
    async fn send(&self, request: &CompletionRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());

        let next = lock(&self.script).pop_front();
        match next {
            Some(outcome) => {
                *lock(&self.fallback) = Some(outcome.clone());
                outcome
            }
            None => lock(&self.fallback)
                .clone()
                .unwrap_or_else(|| Err(TransportError::Connection("script exhausted".to_string()))),
        }
    }
}
