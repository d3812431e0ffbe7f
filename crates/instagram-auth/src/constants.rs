//! Instagram Graph API token constants
//!
//! Long-lived Instagram tokens expire after 60 days. They are renewed by
//! exchanging the current (still valid) token for a new one; no client secret
//! is involved.

/// Base URL of the Instagram Graph API
pub const GRAPH_API_BASE: &str = "https://graph.instagram.com";

/// Path of the long-lived token refresh endpoint, relative to the graph base URL
pub const REFRESH_PATH: &str = "/refresh_access_token";

/// Grant type for exchanging a long-lived token for a new one
pub const REFRESH_GRANT_TYPE: &str = "ig_refresh_token";

/// Days before the configured interval at which a token is considered due.
pub const REFRESH_MARGIN_DAYS: u64 = 5;

/// Default renewal interval in days
pub const DEFAULT_REFRESH_INTERVAL_DAYS: u64 = 30;

/// Longest accepted renewal interval; the token must be renewed before it expires.
pub const MAX_REFRESH_INTERVAL_DAYS: u64 = 59;

/// Default location of the persisted token record, relative to the working directory
pub const DEFAULT_TOKEN_PATH: &str = "token.json";
