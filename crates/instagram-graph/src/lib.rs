//! Instagram Graph API read client
//!
//! Lists the most recent media of the account that owns the token and expands
//! carousel albums into their children. The caller supplies the bearer token
//! per call so token renewal stays outside this crate.

pub mod client;
pub mod error;
pub mod media;

pub use client::{CHILD_FIELDS, DEFAULT_POST_LIMIT, GraphClient, MEDIA_FIELDS};
pub use error::{Error, Result};
pub use media::{MediaChild, MediaType, Post, PostMedia};
