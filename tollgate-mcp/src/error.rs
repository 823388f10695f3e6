//! Error types for MCP operations

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::protocol::{JsonRpcError, JsonRpcErrorCode};

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// MCP error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum McpError {
    /// Protocol errors (invalid JSON-RPC, bad params, etc.)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Session errors (unknown id, collision with a live session)
    #[error("Session error: {message}")]
    Session { message: String },

    /// Tool not found
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// Tool execution errors
    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    /// Validation errors (bad tool arguments)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal server errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl McpError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            McpError::Protocol { .. } => StatusCode::BAD_REQUEST,
            McpError::Session { .. } => StatusCode::BAD_REQUEST,
            McpError::Validation { .. } => StatusCode::BAD_REQUEST,
            McpError::Configuration { .. } => StatusCode::BAD_REQUEST,
            McpError::ToolNotFound { .. } => StatusCode::NOT_FOUND,
            McpError::ToolExecution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            McpError::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            McpError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for JSON-RPC responses
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::Protocol { .. } => JsonRpcErrorCode::InvalidRequest as i32,
            McpError::Session { .. } => JsonRpcErrorCode::BadRequest as i32,
            McpError::ToolNotFound { .. } => JsonRpcErrorCode::MethodNotFound as i32,
            McpError::Validation { .. } => JsonRpcErrorCode::InvalidParams as i32,
            _ => JsonRpcErrorCode::InternalError as i32,
        }
    }

    /// Create a sanitized error message for external clients
    pub fn client_message(&self) -> String {
        match self {
            McpError::Protocol { message } => message.clone(),
            McpError::Session { message } => message.clone(),
            McpError::Validation { message } => message.clone(),
            McpError::ToolNotFound { name } => format!("Tool '{}' not found", name),
            McpError::ToolExecution { tool, .. } => format!("Tool '{}' failed", tool),
            _ => "Internal server error".to_string(),
        }
    }

    /// Convert into a JSON-RPC error payload
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(self.error_code(), self.client_message(), None)
    }
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.error_code(),
                "message": self.client_message(),
            },
            "id": null,
        });

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization {
            message: err.to_string(),
        }
    }
}
