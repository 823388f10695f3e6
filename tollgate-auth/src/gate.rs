//! The auth gate: HTTP middleware in front of the protocol endpoints
//!
//! Extracts and verifies a bearer token on every protected request and
//! attaches the normalized principal to the request extensions. Every
//! failure (missing header, malformed header, verification failure,
//! expiry) is a structured 401 with a `WWW-Authenticate` challenge; access
//! is never silently downgraded to anonymous.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    error::AuthError,
    verifier::{AuthResult, TokenVerifier},
};

/// RFC 9728-style challenge header for 401 responses
#[derive(Debug, Clone)]
pub struct WwwAuthenticate {
    /// URL of the protected-resource metadata document
    pub resource_metadata: String,
    /// Scope the resource requires, if any
    pub scope: Option<String>,
    /// OAuth error code
    pub error: Option<&'static str>,
    /// Human-readable error description
    pub error_description: Option<String>,
}

impl WwwAuthenticate {
    pub fn new(resource_metadata: impl Into<String>) -> Self {
        Self {
            resource_metadata: resource_metadata.into(),
            scope: None,
            error: None,
            error_description: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_error(mut self, error: &'static str, description: impl Into<String>) -> Self {
        self.error = Some(error);
        self.error_description = Some(description.into());
        self
    }

    /// Build the header value string
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!(
            "Bearer resource_metadata=\"{}\"",
            self.resource_metadata
        )];
        if let Some(scope) = &self.scope {
            parts.push(format!("scope=\"{}\"", scope));
        }
        if let Some(error) = self.error {
            parts.push(format!("error=\"{}\"", error));
        }
        if let Some(description) = &self.error_description {
            parts.push(format!("error_description=\"{}\"", description));
        }
        parts.join(", ")
    }
}

/// Outcome of the synchronous preparation step, carrying only owned data so
/// the async verification future stays `Send`.
enum Prepared {
    /// Gate disabled: admit with a synthetic principal, no token required.
    Admit(AuthResult),
    /// Gate enabled: verify this token against the expected resource.
    Verify {
        token: String,
        expected_resource: Option<String>,
    },
}

/// Gate configuration and verifier handle
pub struct AuthGate {
    /// `None` disables the gate entirely (local development only)
    verifier: Option<TokenVerifier>,
    /// Configured audience; when unset the request's own canonical URL is
    /// the expected resource
    audience: Option<String>,
    /// Where the challenge header points clients for metadata
    resource_metadata_url: String,
    /// Scope advertised in the challenge header
    required_scope: Option<String>,
}

impl AuthGate {
    pub fn new(verifier: TokenVerifier, resource_metadata_url: impl Into<String>) -> Self {
        Self {
            verifier: Some(verifier),
            audience: None,
            resource_metadata_url: resource_metadata_url.into(),
            required_scope: None,
        }
    }

    /// A gate that admits everything with a synthetic principal
    pub fn disabled(resource_metadata_url: impl Into<String>) -> Self {
        warn!("auth gate is DISABLED; all requests are admitted");
        Self {
            verifier: None,
            audience: None,
            resource_metadata_url: resource_metadata_url.into(),
            required_scope: None,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_required_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scope = Some(scope.into());
        self
    }

    /// Synchronous preparation step: every access to `request` happens here,
    /// before any await. `Request<Body>` is not `Sync`, so a borrow of it
    /// held across an await — including as an async-fn argument — would make
    /// the resulting future `!Send` and the gate unusable as axum middleware.
    /// Extracting owned data up front keeps the async verification `Send`.
    fn prepare(&self, request: &Request) -> Result<Prepared, AuthError> {
        if self.verifier.is_none() {
            return Ok(Prepared::Admit(AuthResult {
                client_id: "dev".to_string(),
                scopes: Vec::new(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            }));
        }

        let token = extract_bearer(request.headers())?.to_string();
        let expected_resource = self
            .audience
            .clone()
            .or_else(|| canonical_url(request));

        Ok(Prepared::Verify {
            token,
            expected_resource,
        })
    }

    async fn authenticate(&self, prepared: Prepared) -> Result<AuthResult, AuthError> {
        let (token, expected_resource) = match prepared {
            Prepared::Admit(principal) => return Ok(principal),
            Prepared::Verify {
                token,
                expected_resource,
            } => (token, expected_resource),
        };

        // `Prepared::Verify` is only produced when a verifier is configured.
        let verifier = self
            .verifier
            .as_ref()
            .expect("verifier present for Prepared::Verify");

        let principal = verifier.verify(&token, expected_resource.as_deref()).await?;

        // expiry is re-checked here on every request, never cached
        if principal.is_expired() {
            return Err(AuthError::Expired);
        }

        debug!(client_id = %principal.client_id, "request authenticated");
        Ok(principal)
    }

    fn challenge_response(&self, err: AuthError) -> Response {
        let mut challenge = WwwAuthenticate::new(&self.resource_metadata_url)
            .with_error(err.oauth_error_code(), err.to_string());
        if let Some(scope) = &self.required_scope {
            challenge = challenge.with_scope(scope.clone());
        }

        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": err.oauth_error_code(),
                "error_description": err.to_string(),
            })),
        )
            .into_response();

        if let Ok(value) = HeaderValue::from_str(&challenge.to_header_value()) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Extract a bearer token; anything other than `Bearer <token>` is rejected
fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Reconstruct the request's own canonical URL as the fallback audience
fn canonical_url(request: &Request) -> Option<String> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())?;
    Some(format!("http://{}{}", host, request.uri().path()))
}

/// Axum middleware wrapping the gate
pub async fn auth_gate_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    // All borrowing of `request` happens in this synchronous step, before the
    // await below, so no `&Request` is held across it.
    let prepared = match gate.prepare(&request) {
        Ok(prepared) => prepared,
        Err(err) => {
            debug!(error = %err, "rejecting unauthenticated request");
            return gate.challenge_response(err);
        }
    };

    match gate.authenticate(prepared).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            debug!(error = %err, "rejecting unauthenticated request");
            gate.challenge_response(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_bearer(&headers),
            Err(AuthError::MissingToken)
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert!(matches!(
            extract_bearer(&headers),
            Err(AuthError::MalformedHeader)
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(matches!(
            extract_bearer(&headers),
            Err(AuthError::MalformedHeader)
        ));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok-123"),
        );
        assert_eq!(extract_bearer(&headers).unwrap(), "tok-123");
    }

    #[test]
    fn test_challenge_header_format() {
        let challenge = WwwAuthenticate::new("http://localhost:3000/.well-known/oauth-protected-resource")
            .with_scope("mcp:invoke")
            .with_error("invalid_token", "Token expired");

        let value = challenge.to_header_value();
        assert!(value.starts_with("Bearer resource_metadata=\""));
        assert!(value.contains("scope=\"mcp:invoke\""));
        assert!(value.contains("error=\"invalid_token\""));
        assert!(value.contains("error_description=\"Token expired\""));
    }

    fn gated_app(gate: AuthGate) -> Router {
        async fn handler(Extension(principal): Extension<AuthResult>) -> String {
            principal.client_id
        }

        Router::new()
            .route("/protected", get(handler))
            .layer(middleware::from_fn_with_state(
                Arc::new(gate),
                auth_gate_middleware,
            ))
    }

    #[tokio::test]
    async fn test_disabled_gate_admits_with_synthetic_principal() {
        let app = gated_app(AuthGate::disabled("http://localhost/.well-known/oauth-protected-resource"));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_401_with_challenge() {
        let verifier = TokenVerifier::Introspection(crate::verifier::IntrospectionVerifier::new(
            "http://127.0.0.1:1/introspect",
        ));
        let app = gated_app(
            AuthGate::new(verifier, "http://localhost/.well-known/oauth-protected-resource")
                .with_required_scope("mcp:invoke"),
        );

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.contains("resource_metadata="));
        assert!(challenge.contains("scope=\"mcp:invoke\""));
        assert!(challenge.contains("error=\"invalid_request\""));
    }
}


