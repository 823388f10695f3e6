//! Token verification strategies
//!
//! Two interchangeable strategies produce the same normalized
//! [`AuthResult`]: remote introspection (RFC 7662) for opaque tokens, and
//! local JWT validation against a JWKS key set. The JWT path requires a
//! numeric `exp` claim and an asymmetric signing algorithm; the
//! introspection path leaves expiry to the issuer's `active` flag plus the
//! gate's own expiry comparison.

use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::AuthError;

/// Signing algorithms accepted on the JWT path. Symmetric algorithms are
/// excluded: a shared secret cannot be published through JWKS.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// How long a fetched JWKS document is reused before re-fetching
const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Normalized outcome of token verification, independent of strategy
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// Client the token was issued to
    pub client_id: String,

    /// Granted scopes
    pub scopes: Vec<String>,

    /// Expiry instant; compared against the clock on every request
    pub expires_at: DateTime<Utc>,
}

impl AuthResult {
    /// Whether the token is past its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Strategy-selecting verifier
pub enum TokenVerifier {
    Introspection(IntrospectionVerifier),
    Jwt(JwtVerifier),
}

impl TokenVerifier {
    pub async fn verify(
        &self,
        token: &str,
        expected_resource: Option<&str>,
    ) -> Result<AuthResult, AuthError> {
        match self {
            TokenVerifier::Introspection(v) => v.verify(token, expected_resource).await,
            TokenVerifier::Jwt(v) => v.verify(token, expected_resource).await,
        }
    }
}

// === Introspection strategy ===

/// RFC 7662 introspection response, reduced to the fields the gate uses
#[derive(Debug, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub aud: Option<Value>,
}

pub struct IntrospectionVerifier {
    endpoint: String,
    http: reqwest::Client,
}

impl IntrospectionVerifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn verify(
        &self,
        token: &str,
        expected_resource: Option<&str>,
    ) -> Result<AuthResult, AuthError> {
        let response = self
            .http
            .post(&self.endpoint)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Upstream(format!(
                "introspection endpoint returned {}",
                response.status()
            )));
        }

        let introspection: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(e.to_string()))?;

        if !introspection.active {
            debug!("introspection reported inactive token");
            return Err(AuthError::Inactive);
        }

        if let (Some(expected), Some(aud)) = (expected_resource, introspection.aud.as_ref()) {
            if !audience_matches(aud, expected) {
                return Err(AuthError::AudienceMismatch);
            }
        }

        Ok(AuthResult {
            client_id: introspection.client_id.unwrap_or_default(),
            scopes: split_scope(introspection.scope.as_deref()),
            expires_at: introspection
                .exp
                .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }
}

// === JWT strategy ===

#[derive(Debug, Deserialize)]
struct JwtClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    exp: i64,
}

struct CachedJwks {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct JwtVerifier {
    issuer: String,
    jwks_url: String,
    http: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
}

impl JwtVerifier {
    pub fn new(issuer: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            jwks_url: jwks_url.into(),
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    async fn key_set(&self) -> Result<JwkSet, AuthError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < JWKS_CACHE_TTL {
                return Ok(cached.set.clone());
            }
        }

        debug!(url = %self.jwks_url, "fetching JWKS");
        let set: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("JWKS fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("JWKS parse failed: {}", e)))?;

        *self.cache.write().await = Some(CachedJwks {
            set: set.clone(),
            fetched_at: Instant::now(),
        });
        Ok(set)
    }

    async fn verify(
        &self,
        token: &str,
        expected_resource: Option<&str>,
    ) -> Result<AuthResult, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::Verification(e.to_string()))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::Verification(format!(
                "algorithm {:?} is not allowed",
                header.alg
            )));
        }

        let key_set = self.key_set().await?;
        let jwk = match header.kid.as_deref() {
            Some(kid) => key_set.find(kid),
            None => key_set.keys.first(),
        }
        .ok_or_else(|| AuthError::Verification("no matching JWKS key".to_string()))?;

        let decoding_key = DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::Verification(format!("unusable JWKS key: {}", e)))?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        // a token without a numeric expiry is rejected outright
        validation.set_required_spec_claims(&["exp"]);
        match expected_resource {
            Some(expected) => validation.set_audience(&[expected]),
            None => validation.validate_aud = false,
        }

        let data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => {
                    warn!(error = %e, "JWT validation failed");
                    AuthError::Verification(e.to_string())
                }
            }
        })?;

        let claims = data.claims;
        let client_id = claims
            .client_id
            .or(claims.sub)
            .ok_or_else(|| AuthError::Verification("token has no subject".to_string()))?;

        Ok(AuthResult {
            client_id,
            scopes: split_scope(claims.scope.as_deref()),
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .ok_or_else(|| AuthError::Verification("invalid exp claim".to_string()))?,
        })
    }
}

/// An `aud` claim may be a single value or a list
fn audience_matches(aud: &Value, expected: &str) -> bool {
    match aud {
        Value::String(s) => s == expected,
        Value::Array(items) => items
            .iter()
            .any(|item| item.as_str() == Some(expected)),
        _ => false,
    }
}

fn split_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
