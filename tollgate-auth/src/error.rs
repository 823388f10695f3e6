//! Authentication error types

use thiserror::Error;

/// Result type for token verification
pub type AuthResultT<T> = Result<T, AuthError>;

/// Authentication error
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Malformed Authorization header, expected 'Bearer <token>'")]
    MalformedHeader,

    #[error("Token is not active")]
    Inactive,

    #[error("Token expired")]
    Expired,

    #[error("Audience mismatch")]
    AudienceMismatch,

    #[error("Token verification failed: {0}")]
    Verification(String),

    #[error("Introspection request failed: {0}")]
    Upstream(String),

    #[error("Verifier configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// OAuth error code carried in the WWW-Authenticate challenge
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::MalformedHeader => "invalid_request",
            _ => "invalid_token",
        }
    }
}
