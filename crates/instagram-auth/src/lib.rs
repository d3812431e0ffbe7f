//! Instagram long-lived token management
//!
//! Owns the only persisted state of the feed proxy: the bearer token used for
//! every Graph API call and the time it was last renewed.
//!
//! Token lifecycle:
//! 1. `CredentialStore::load()` resolves the token from `token.json`, falling
//!    back to the configured `CLIENT_TOKEN`
//! 2. `TokenRefresher::refresh()` decides whether the token is due for renewal
//!    and exchanges it via `token::refresh_access_token()`
//! 3. The renewed token is committed with `CredentialStore::save()`
//! 4. `spawn_refresh_task()` repeats step 2 on the configured interval

pub mod constants;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialStore, TokenRecord};
pub use error::{Error, Result};
pub use refresh::{TokenRefresher, needs_refresh, spawn_refresh_task};
pub use token::{TokenResponse, refresh_access_token};
