//! Shared types for the Instagram feed proxy workspace

mod clock;
mod secret;

pub use clock::{MILLIS_PER_DAY, unix_millis};
pub use secret::Secret;
