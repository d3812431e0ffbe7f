//! Error types for Graph API reads

/// Errors from a Graph API call.
///
/// Messages never contain the request URL, which carries the access token.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-2xx response; `body` is the upstream error payload.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("invalid upstream payload: {0}")]
    Payload(String),
}

impl Error {
    /// Metric label for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Http(_) => "http",
            Error::Upstream { .. } => "status",
            Error::Payload(_) => "payload",
        }
    }
}

/// Result alias for Graph API operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_carries_payload() {
        let err = Error::Upstream {
            status: 400,
            body: r#"{"error":{"type":"OAuthException"}}"#.into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("upstream returned 400"), "got: {msg}");
        assert!(msg.contains("OAuthException"));
        assert_eq!(err.kind(), "status");
    }

    #[test]
    fn kinds_are_distinct() {
        assert_eq!(Error::Http("x".into()).kind(), "http");
        assert_eq!(Error::Payload("x".into()).kind(), "payload");
    }
}
