//! Long-lived token exchange
//!
//! `GET {graph}/refresh_access_token?grant_type=ig_refresh_token&access_token=...`
//! returns a new long-lived token. The current token must still be valid (and
//! at least 24 hours old) for the exchange to succeed.

use serde::{Deserialize, Serialize};

use crate::constants::{REFRESH_GRANT_TYPE, REFRESH_PATH};
use crate::error::{Error, Result};

/// Response from the refresh endpoint.
///
/// `expires_in` is a delta in seconds. Only `access_token` is relied upon;
/// renewal timing is driven by the configured interval, not by expiry.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchange `token` for a new long-lived token.
///
/// `graph_url` is the Graph API base, e.g. `https://graph.instagram.com`.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    graph_url: &str,
    token: &str,
) -> Result<TokenResponse> {
    let url = format!("{}{REFRESH_PATH}", graph_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .query(&[("grant_type", REFRESH_GRANT_TYPE), ("access_token", token)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {}", e.without_url())))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // Graph API reports expired/revoked tokens as OAuthException with 400
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let token_response = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| {
            Error::TokenExchange(format!("invalid refresh response: {}", e.without_url()))
        })?;

    if token_response.access_token.is_empty() {
        return Err(Error::TokenExchange(
            "refresh response carried an empty access_token".into(),
        ));
    }

    Ok(token_response)
}
