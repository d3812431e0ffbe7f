//! Error types for token management

/// Errors from credential loading, persistence and token exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No token could be obtained from the persisted record or the fallback.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Metric label for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Http(_) => "http",
            Error::TokenExchange(_) => "exchange",
            Error::InvalidCredentials(_) => "invalid_credentials",
            Error::CredentialParse(_) => "parse",
            Error::Io(_) => "io",
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
