//! Secret handling utilities.
//!
//! Re-exports secrecy types so callers can build broker credentials without
//! depending on secrecy directly.

pub use secrecy::{ExposeSecret, SecretString};

/// Render a secret for display: `None`, or a fixed mask.
pub fn redacted(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(_) => "********",
        None => "(none)",
    }
}
