//! Error taxonomy for the relying-party engine
//!
//! Errors fall into four families with very different lifecycles:
//!
//! - **Config** — raised while building or resolving the mechanism
//!   configuration; fatal, prevents the mechanism from starting.
//! - **Protocol** — the provider answered with an OAuth error document
//!   (`error` / `error_description`); the current flow is aborted.
//! - **Validation** — a token failed a cryptographic or semantic check;
//!   always fatal for that token, never downgraded.
//! - **Transport** — an outbound HTTP call failed; surfaced immediately,
//!   no automatic retry.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, OidcError>;

/// Engine error
#[derive(Debug, Error)]
pub enum OidcError {
    /// Fatal configuration problem (missing metadata, malformed option)
    #[error("configuration error: {0}")]
    Config(String),

    /// OAuth error response from the provider
    #[error("provider error '{error}': {description}")]
    Protocol {
        /// The `error` code returned by the provider
        error: String,
        /// The `error_description`, empty when the provider omitted it
        description: String,
    },

    /// Token failed signature or claim verification
    #[error("token validation failed: {0}")]
    Validation(String),

    /// Outbound HTTP failure (discovery, JWKS, token, userinfo)
    #[error("transport failure: {0}")]
    Transport(String),
}

impl OidcError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a protocol error from a provider error document
    pub fn protocol(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Protocol {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether this error is fatal at configuration time
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<reqwest::Error> for OidcError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_formats_code_and_description() {
        let err = OidcError::protocol("invalid_grant", "code expired");
        assert_eq!(
            err.to_string(),
            "provider error 'invalid_grant': code expired"
        );
    }

    #[test]
    fn config_predicate() {
        assert!(OidcError::config("missing issuer").is_config());
        assert!(!OidcError::validation("bad nonce").is_config());
    }
}
