//! HTTP handlers for the completion endpoint

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::rate_limit::client_key;
use super::ServerState;
use crate::storage::truncate;
use crate::types::{CompletionReply, ErrorReply, Exchange};

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorReply { error: message.into() })).into_response()
}

/// Pull `message` and `history` out of a request body, or explain what is wrong
fn parse_chat_body(body: &Value, max_chars: usize) -> Result<(String, Vec<Exchange>), String> {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| "Message is required".to_string())?;

    if message.chars().count() > max_chars {
        return Err(format!("Message is too long (max {} characters)", max_chars));
    }

    let history = match body.get("history") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => serde_json::from_value::<Vec<Exchange>>(raw.clone())
            .map_err(|_| "History must be an array of exchanges".to_string())?,
    };

    Ok((message.to_string(), history))
}

/// Rate limit, validate, then forward to the AI service with recent history
pub async fn chat_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let client = client_key(&headers);
    if !state.limiter.allow(&client) {
        warn!(%request_id, client = %client, "Rejected request over rate limit");
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please wait a minute and try again.",
        );
    }

    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => {
            debug!(%request_id, error = %e, "Unreadable request body");
            return error_response(StatusCode::BAD_REQUEST, "Request body must be JSON");
        }
    };

    let (message, history) = match parse_chat_body(&body, state.config.server.max_message_chars) {
        Ok(parsed) => parsed,
        Err(reason) => {
            debug!(%request_id, reason = %reason, "Invalid chat request");
            return error_response(StatusCode::BAD_REQUEST, reason);
        }
    };

    let recent = truncate(&history, state.config.upstream.history_window);
    debug!(%request_id, client = %client, history = recent.len(), "Forwarding chat request");

    match state.backend.complete(&message, &recent).await {
        Ok(response) => (StatusCode::OK, Json(CompletionReply { response })).into_response(),
        Err(e) => {
            error!(%request_id, error = %e, "AI service request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get a response from the AI service",
            )
        }
    }
}

/// Status handler
pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        model: state.backend.model().to_string(),
    })
}
