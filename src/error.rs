use serde_json::{json, Map, Value};

use crate::config::Environment;
use crate::protocol::RelayMode;

/// Error type shared by every stage of the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    ServerConfig,
    Upstream,
    ServerError,
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            RelayError::Config(_) => ErrorCategory::ServerConfig,
            RelayError::Upstream { .. } => ErrorCategory::Upstream,
            RelayError::Transport(_) | RelayError::Decode(_) | RelayError::Internal(_) => {
                ErrorCategory::ServerError
            }
        }
    }

    /// The short message a client is allowed to see.
    ///
    /// Client errors carry their own reason; everything else collapses to a
    /// generic per-route message so upstream bodies never leak.
    #[must_use]
    pub fn public_message(&self, mode: RelayMode) -> String {
        match self {
            RelayError::InvalidRequest(reason) => reason.clone(),
            RelayError::Config(_) => {
                "Server configuration error: required upstream settings are missing".to_string()
            }
            _ => match mode {
                RelayMode::Stream => "Streaming relay failed".to_string(),
                RelayMode::NonStream => {
                    "Internal server error, please try again later".to_string()
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::ServerConfig | ErrorCategory::Upstream | ErrorCategory::ServerError => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ---------------------------------------------------------------------------
// Error body
// ---------------------------------------------------------------------------

/// Format an error for a given route, returning (`status_code`, JSON body).
///
/// `details` carries the full error text and is only attached in
/// development mode.
#[must_use]
pub fn format_error(
    err: &RelayError,
    mode: RelayMode,
    environment: Environment,
) -> (http::StatusCode, Value) {
    let status = http_status_for_category(err.category());

    let mut body = Map::new();
    body.insert("error".to_string(), json!(err.public_message(mode)));
    if environment.is_development() {
        body.insert("details".to_string(), json!(err.to_string()));
    }
    if mode == RelayMode::NonStream {
        body.insert("success".to_string(), json!(false));
    }

    (status, Value::Object(body))
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `RelayError` into an axum response for a specific route.
#[must_use]
pub fn into_axum_response(
    err: &RelayError,
    mode: RelayMode,
    environment: Environment,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err, mode, environment);
    (status, axum::Json(body)).into_response()
}

/// Default `IntoResponse` uses the streaming route in production mode.
/// Handlers should call [`into_axum_response`] with the real mode instead.
impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self, RelayMode::Stream, Environment::Production)
    }
}
