//! Lingo Coach - adaptive language practice library
//!
//! The assessment and resilience layer of a conversational Nepali tutor:
//! - Heuristic proficiency assessment over the ongoing exchange
//! - Lesson recommendations and recent-topic tracking
//! - Retrying, backing-off transport to the completion endpoint
//! - Rate-limited backend in front of the upstream AI service
//! - Quota-safe, debounced local persistence
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lingo_coach::{Config, ExchangeOrchestrator, HttpSender, QuotaSafeStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(QuotaSafeStore::from_config(&config)?);
//!     let sender = Arc::new(HttpSender::new(&config.client.endpoint)?);
//!     let coach = ExchangeOrchestrator::new(&config, sender, store);
//!     coach.send("नमस्ते").await?;
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod config;
pub mod storage;
pub mod learning;
pub mod security;
pub mod agent;
pub mod server;
pub mod cli;

pub use types::{truncate_safe, Exchange};

pub use config::Config;

pub use storage::{Debouncer, QuotaSafeStore, StorageBackend};

pub use learning::{
    recommend,
    LessonRecommendation,
    ProficiencyAssessor,
    ProficiencyProfile,
    Tier,
    TopicTracker,
};

pub use agent::{
    ExchangeError,
    ExchangeOrchestrator,
    ExchangeOutcome,
    HttpSender,
    ResilientTransport,
};

pub use server::{
    RateLimiter,
    ServerState,
    start as start_server,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Adaptive Language Practice Library", NAME, VERSION)
}
