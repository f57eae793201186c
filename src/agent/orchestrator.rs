//! Exchange orchestration
//!
//! One learner utterance at a time: validate, send through the resilient transport,
//! map the reply, then fan out to the assessor, topic tracker, streak and
//! recommendations. Persistence is scheduled through the store's debounced writers.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::transport::{Delivery, RequestSender, ResilientTransport, RetryOptions};
use super::ExchangeError;
use crate::config::Config;
use crate::learning::{
    recommend, LessonRecommendation, OutcomeCounters, ProficiencyAssessor, ProficiencyProfile, Streak,
    TopicTracker,
};
use crate::security::InputValidator;
use crate::storage::debounce::lock;
use crate::storage::{keys, truncate, QuotaSafeStore};
use crate::types::{CompletionReply, CompletionRequest, ErrorReply, Exchange};

/// Result of a send that was not rejected
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    Replied(ExchangeReport),
    /// Another exchange was already in flight
    Ignored,
}

/// State after a successful exchange
#[derive(Debug, Clone)]
pub struct ExchangeReport {
    pub reply: String,
    /// Fresh profile, present once enough interactions were counted
    pub profile: Option<ProficiencyProfile>,
    pub topics: Vec<String>,
    pub recommendations: Vec<LessonRecommendation>,
    pub streak: u32,
}

struct LearnerState {
    history: Vec<Exchange>,
    assessor: ProficiencyAssessor,
    topics: TopicTracker,
    streak: Streak,
    recommendations: Vec<LessonRecommendation>,
}

/// Clears the busy flag when the exchange ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ExchangeOrchestrator {
    transport: ResilientTransport,
    validator: InputValidator,
    store: Arc<QuotaSafeStore>,
    state: Mutex<LearnerState>,
    busy: AtomicBool,
    history_window: usize,
    max_history: usize,
}

impl ExchangeOrchestrator {
    /// Build an orchestrator, restoring learner state from `store`
    pub fn new(config: &Config, sender: Arc<dyn RequestSender>, store: Arc<QuotaSafeStore>) -> Self {
        let max_history = config.storage.max_history;
        let stored: Vec<Exchange> = store.get_safe(keys::HISTORY, Vec::new());
        let history = truncate(&stored, max_history);

        let assessor = ProficiencyAssessor::with_store(config.assessment.clone(), store.clone());
        let recommendations = assessor.profile().map(recommend).unwrap_or_default();
        let topics = TopicTracker::with_store(store.clone());
        let streak = Streak::load(&store);

        info!(
            exchanges = history.len(),
            tier = ?assessor.profile().map(|p| p.tier),
            streak = streak.count,
            "Restored learner state"
        );

        Self {
            transport: ResilientTransport::new(sender, RetryOptions::from(&config.retry)),
            validator: InputValidator::new(config.client.max_input_chars),
            store,
            state: Mutex::new(LearnerState {
                history,
                assessor,
                topics,
                streak,
                recommendations,
            }),
            busy: AtomicBool::new(false),
            history_window: config.upstream.history_window,
            max_history,
        }
    }

    /// Run one exchange.
    ///
    /// Returns `Ignored` without side effects when another exchange is in flight.
    pub async fn send(&self, input: &str) -> Result<ExchangeOutcome, ExchangeError> {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("Exchange already in flight, ignoring send");
            return Ok(ExchangeOutcome::Ignored);
        };

        let message = self
            .validator
            .validate(input)
            .map_err(|e| ExchangeError::Validation(e.to_string()))?;

        let request = {
            let state = lock(&self.state);
            CompletionRequest {
                message: message.clone(),
                history: truncate(&state.history, self.history_window),
            }
        };

        let delivery = self.transport.send_traced(&request).await;
        let reply = self.interpret(delivery)?;
        Ok(ExchangeOutcome::Replied(self.apply(Exchange::new(message, reply))))
    }

    fn interpret(&self, delivery: Delivery) -> Result<String, ExchangeError> {
        let attempts = delivery.attempts;
        let response = match delivery.outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, attempts, "Exchange failed after retries");
                return Err(ExchangeError::ServiceUnavailable(e.to_string()));
            }
        };

        match response.status {
            200..=299 => serde_json::from_str::<CompletionReply>(&response.body)
                .map(|reply| reply.response)
                .map_err(|e| {
                    warn!(error = %e, "Malformed completion reply");
                    ExchangeError::Upstream(format!("malformed reply: {}", e))
                }),
            429 => Err(ExchangeError::RateLimited),
            400 => {
                let reason = serde_json::from_str::<ErrorReply>(&response.body)
                    .map(|body| body.error)
                    .unwrap_or_else(|_| "The message was rejected.".to_string());
                Err(ExchangeError::Validation(reason))
            }
            status if self.transport.options().is_retryable(status) => {
                warn!(status, attempts, "Service unavailable after retries");
                Err(ExchangeError::ServiceUnavailable(format!("status {}", status)))
            }
            status => {
                warn!(status, body = %crate::truncate_safe(&response.body, 200), "Upstream error");
                Err(ExchangeError::Upstream(format!("status {}", status)))
            }
        }
    }

    fn apply(&self, exchange: Exchange) -> ExchangeReport {
        let mut state = lock(&self.state);

        state.history.push(exchange.clone());
        if state.history.len() > self.max_history {
            state.history = truncate(&state.history, self.max_history);
        }
        self.store.set_debounced(keys::HISTORY, &state.history);

        let profile = state.assessor.record(&exchange.user_text, &exchange.ai_text);
        if let Some(profile) = &profile {
            state.recommendations = recommend(profile);
        }

        state.topics.observe(&exchange.user_text);
        state.topics.observe(&exchange.ai_text);

        if state.streak.touch(Utc::now().date_naive()) {
            debug!(streak = state.streak.count, "Practice streak updated");
            state.streak.persist(&self.store);
        }

        ExchangeReport {
            reply: exchange.ai_text,
            profile,
            topics: state.topics.topics().to_vec(),
            recommendations: state.recommendations.clone(),
            streak: state.streak.count,
        }
    }

    /// Clear conversation history; vocabulary, profile and streak are kept
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.history.clear();
        self.store.remove(keys::HISTORY);
        info!("Conversation history cleared");
    }

    /// Write any pending debounced state now
    pub fn flush(&self) {
        self.store.flush();
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn history(&self) -> Vec<Exchange> {
        lock(&self.state).history.clone()
    }

    pub fn profile(&self) -> Option<ProficiencyProfile> {
        lock(&self.state).assessor.profile().cloned()
    }

    pub fn counters(&self) -> OutcomeCounters {
        lock(&self.state).assessor.counters()
    }

    pub fn topics(&self) -> Vec<String> {
        lock(&self.state).topics.topics().to_vec()
    }

    pub fn recommendations(&self) -> Vec<LessonRecommendation> {
        lock(&self.state).recommendations.clone()
    }

    pub fn streak(&self) -> u32 {
        lock(&self.state).streak.count
    }

    pub fn vocabulary_size(&self) -> usize {
        lock(&self.state).assessor.vocabulary().len()
    }
}
