//! OAuth 2.0 error codes and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OAuth 2.0 error codes used by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    /// The request is missing a required parameter or is otherwise malformed
    #[error("invalid_request")]
    InvalidRequest,
    /// Client authentication failed
    #[error("invalid_client")]
    InvalidClient,
    /// The provided authorization grant is invalid, expired, or already used
    #[error("invalid_grant")]
    InvalidGrant,
    /// The requested scope is invalid or exceeds the client's allow-list
    #[error("invalid_scope")]
    InvalidScope,
    /// The authorization server does not support this response type
    #[error("unsupported_response_type")]
    UnsupportedResponseType,
    /// The grant type is not supported
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    /// The authorization server encountered an unexpected error
    #[error("server_error")]
    ServerError,
}

impl OAuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::ServerError => "server_error",
        }
    }
}

/// An OAuth error delivered as a direct JSON response
#[derive(Debug, Clone, Error)]
#[error("{error}: {description}")]
pub struct OAuthError {
    pub error: OAuthErrorCode,
    pub description: String,
}

impl OAuthError {
    pub fn new(error: OAuthErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            description: description.into(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidRequest, description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidClient, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidGrant, description)
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error {
            OAuthErrorCode::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// RFC 6749 §5.2 error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: OAuthErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = OAuthErrorResponse {
            error: self.error,
            error_description: Some(self.description),
        };
        (status, Json(body)).into_response()
    }
}
