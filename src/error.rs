//! Engine error taxonomy.
//!
//! Anti-cheat rejection is deliberately NOT here — it is a typed verdict
//! (see `anticheat::Verdict`) that clamps the reward while the action still
//! succeeds from the user's perspective.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed action event, rejected before any state mutation.
    #[error("invalid action event: {0}")]
    Validation(String),

    /// Unknown user/achievement reference.
    #[error("not found: {0}")]
    NotFound(String),

    /// Idempotency key replay — the only failure legitimate users ever see.
    #[error("action already processed: {0}")]
    AlreadyProcessed(String),

    /// Lost-update race on per-user state; retried internally, surfaced only
    /// if retries are exhausted.
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    /// Cache and recompute both failed; callers degrade to "rank
    /// unavailable" instead of blocking the rest of the UI.
    #[error("rank unavailable")]
    RankUnavailable,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyProcessed(_) => StatusCode::CONFLICT,
            EngineError::Conflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::RankUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}
