//! Backend completion server
//!
//! A rate-limited JSON endpoint in front of the upstream AI service.

pub mod http;
pub mod rate_limit;
pub mod upstream;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;

pub use rate_limit::{client_key, MemoryRateLimitStore, RateLimitRecord, RateLimitStore, RateLimiter};
pub use upstream::{CompletionBackend, OpenAiCompatible};

/// Request bodies larger than this are refused before parsing
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub backend: Arc<dyn CompletionBackend>,
}

impl ServerState {
    pub fn new(config: Config, backend: Arc<dyn CompletionBackend>) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        Self {
            config: Arc::new(config),
            limiter,
            backend,
        }
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(http::chat_handler))
        .route("/api/status", get(http::status_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .map_response(|res: axum::response::Response<_>| res.map(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// Start the server; fails fast when the upstream credential is missing
pub async fn start(config: Config, host: &str, port: u16) -> Result<()> {
    let api_key = config.require_api_key()?.to_string();
    let backend = OpenAiCompatible::new(&config.upstream, &api_key)?;
    let state = ServerState::new(config, Arc::new(backend));

    let sweeper = rate_limit::spawn_sweeper(state.limiter.clone());

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Lingo Coach Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Model: {}", state.config.upstream.model);
    println!(
        "✓ Rate limit: {} requests per {} ms",
        state.config.rate_limit.max_requests, state.config.rate_limit.window_ms
    );
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    info!(%addr, "Server starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let served = axum::serve(listener, router(state)).await;

    sweeper.abort();
    served.context("Server error")
}
