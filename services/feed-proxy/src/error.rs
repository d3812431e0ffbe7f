//! Service-specific error types

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Body of the terminal failure response
pub const FEED_UNAVAILABLE_MESSAGE: &str = "Failed to fetch posts";

/// Request-level failures that reach the client.
///
/// Upstream failures are first absorbed by the stale-cache fallback; only
/// when no cached listing exists do they surface as `FeedUnavailable`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("feed unavailable: {0}")]
    FeedUnavailable(#[from] instagram_graph::Error),
}

/// Failures while loading configuration. All are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {var} {value:?}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read client_token_file {}: {source}", path.display())]
    TokenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// JSON error body: `{"error": "..."}`. Upstream details stay in the logs.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::FeedUnavailable(_) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, FEED_UNAVAILABLE_MESSAGE)
            }
        }
    }
}
