//! Authorization server endpoints
//!
//! `/register` (dynamic client registration), `/authorize` (code issuance
//! with mandatory S256 PKCE), `/token` (code exchange), `/introspect`
//! (RFC 7662), and the AS metadata document. Grant state moves
//! REGISTERED -> AUTHORIZING -> CODE_ISSUED -> TOKEN_ISSUED; any validation
//! failure terminates the attempt with a direct error or an error-redirect,
//! never both.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{OAuthError, OAuthErrorCode},
    pkce::{random_urlsafe, verify_s256},
    store::{AccessToken, AuthorizationCode, Client, ClientStore, CodeStore, TokenStore},
};

/// Authorization codes live for five minutes
const CODE_LIFETIME_MINUTES: i64 = 5;

/// Access tokens live for one hour
const TOKEN_LIFETIME_SECONDS: i64 = 3600;

/// Scopes granted to clients that register without asking for any
const DEFAULT_SCOPE: &str = "mcp:invoke";

/// Shared state behind the authorization server routes
#[derive(Clone)]
pub struct AuthServerState {
    pub issuer: String,
    pub clients: Arc<dyn ClientStore>,
    pub codes: Arc<dyn CodeStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl AuthServerState {
    pub fn in_memory(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            clients: Arc::new(crate::store::InMemoryClientStore::default()),
            codes: Arc::new(crate::store::InMemoryCodeStore::default()),
            tokens: Arc::new(crate::store::InMemoryTokenStore::default()),
        }
    }
}

/// Create the authorization server routes
pub fn authd_routes(state: AuthServerState) -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/authorize", get(authorize_get).post(authorize_post))
        .route("/token", post(token_handler))
        .route("/introspect", post(introspect_handler))
        .route(
            "/.well-known/oauth-authorization-server",
            get(metadata_handler),
        )
        .with_state(state)
}

// === Dynamic client registration (RFC 7591) ===

#[derive(Debug, Deserialize)]
pub struct ClientRegistrationRequest {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub client_id_issued_at: i64,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub token_endpoint_auth_method: String,
}

async fn register_handler(
    State(state): State<AuthServerState>,
    Json(request): Json<ClientRegistrationRequest>,
) -> Result<Response, OAuthError> {
    if request.redirect_uris.is_empty() {
        return Err(OAuthError::invalid_request(
            "at least one redirect_uri is required",
        ));
    }

    let auth_method = request
        .token_endpoint_auth_method
        .unwrap_or_else(|| "client_secret_post".to_string());
    let client_secret = if auth_method == "none" {
        None
    } else {
        Some(random_urlsafe(32))
    };

    let scope = request.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string());
    let client = Client {
        client_id: Uuid::new_v4().to_string(),
        client_secret: client_secret.clone(),
        redirect_uris: request.redirect_uris.clone(),
        scopes: scope.split_whitespace().map(str::to_string).collect(),
        token_endpoint_auth_method: auth_method.clone(),
        registered_at: Utc::now(),
    };

    info!(
        client_id = %client.client_id,
        name = ?request.client_name,
        "registered client"
    );

    let response = ClientRegistrationResponse {
        client_id: client.client_id.clone(),
        client_secret,
        client_id_issued_at: client.registered_at.timestamp(),
        redirect_uris: request.redirect_uris,
        scope,
        token_endpoint_auth_method: auth_method,
    };
    state.clients.put(client).await;

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

// === Authorization endpoint ===

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub response_type: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

async fn authorize_get(
    State(state): State<AuthServerState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    authorize(state, params).await
}

async fn authorize_post(
    State(state): State<AuthServerState>,
    Form(params): Form<AuthorizeParams>,
) -> Response {
    authorize(state, params).await
}

/// Append error parameters to the confirmed redirect URI
fn error_redirect(
    redirect_uri: &str,
    error: OAuthErrorCode,
    description: &str,
    state_param: Option<&str>,
) -> Response {
    let mut url = match url::Url::parse(redirect_uri) {
        Ok(url) => url,
        // the URI was validated against the registered set already; a
        // parse failure here means the client registered garbage
        Err(_) => return OAuthError::invalid_request("redirect_uri is not a valid URL").into_response(),
    };

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", error.as_str());
        query.append_pair("error_description", description);
        if let Some(state_param) = state_param {
            query.append_pair("state", state_param);
        }
    }

    Redirect::to(url.as_str()).into_response()
}

async fn authorize(state: AuthServerState, params: AuthorizeParams) -> Response {
    // Failures before the redirect URI is confirmed must not redirect:
    // sending a user agent to an unverified URI is how codes get stolen.
    let client = match state.clients.get(&params.client_id).await {
        Some(client) => client,
        None => return OAuthError::invalid_client("unknown client").into_response(),
    };

    let redirect_uri = match params.redirect_uri.as_deref() {
        Some(uri) if client.allows_redirect_uri(uri) => uri.to_string(),
        Some(_) => {
            warn!(client_id = %client.client_id, "redirect_uri not in registered set");
            return OAuthError::invalid_request("redirect_uri is not registered for this client")
                .into_response();
        }
        None => return OAuthError::invalid_request("redirect_uri is required").into_response(),
    };

    // From here on, errors travel back via the confirmed redirect URI
    let state_param = params.state.as_deref();

    if params.response_type.as_deref() != Some("code") {
        return error_redirect(
            &redirect_uri,
            OAuthErrorCode::UnsupportedResponseType,
            "only response_type=code is supported",
            state_param,
        );
    }

    let code_challenge = match (
        params.code_challenge.as_deref(),
        params.code_challenge_method.as_deref(),
    ) {
        (Some(challenge), Some("S256")) if !challenge.is_empty() => challenge.to_string(),
        _ => {
            return error_redirect(
                &redirect_uri,
                OAuthErrorCode::InvalidRequest,
                "code_challenge with method S256 is required",
                state_param,
            )
        }
    };

    let scopes: Vec<String> = params
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if !client.allows_scopes(&scopes) {
        return error_redirect(
            &redirect_uri,
            OAuthErrorCode::InvalidScope,
            "requested scope exceeds the client's allow-list",
            state_param,
        );
    }

    let code = AuthorizationCode {
        code: random_urlsafe(32),
        client_id: client.client_id.clone(),
        code_challenge,
        redirect_uri: redirect_uri.clone(),
        scopes,
        resource: params.resource,
        expires_at: Utc::now() + Duration::minutes(CODE_LIFETIME_MINUTES),
    };

    debug!(client_id = %client.client_id, "issuing authorization code");

    let mut url = match url::Url::parse(&redirect_uri) {
        Ok(url) => url,
        Err(_) => {
            return OAuthError::invalid_request("redirect_uri is not a valid URL").into_response()
        }
    };
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("code", &code.code);
        if let Some(state_param) = state_param {
            query.append_pair("state", state_param);
        }
    }
    state.codes.put(code).await;

    Redirect::to(url.as_str()).into_response()
}

// === Token endpoint ===

#[derive(Debug, Deserialize)]
pub struct TokenRequestForm {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

async fn token_handler(
    State(state): State<AuthServerState>,
    Form(form): Form<TokenRequestForm>,
) -> Result<Json<TokenResponse>, OAuthError> {
    if form.grant_type != "authorization_code" {
        return Err(OAuthError::new(
            OAuthErrorCode::UnsupportedGrantType,
            "only grant_type=authorization_code is supported",
        ));
    }

    let client_id = form
        .client_id
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
    let client = state
        .clients
        .get(client_id)
        .await
        .ok_or_else(|| OAuthError::invalid_client("unknown client"))?;

    if !client.authenticate(form.client_secret.as_deref()) {
        return Err(OAuthError::invalid_client("client authentication failed"));
    }

    let code_value = form
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("code is required"))?;

    // Consumed here, before any further validation: whatever happens next,
    // this code can never be redeemed again.
    let code = state
        .codes
        .take(code_value)
        .await
        .ok_or_else(|| OAuthError::invalid_grant("unknown or already redeemed code"))?;

    if code.is_expired() {
        return Err(OAuthError::invalid_grant("code has expired"));
    }
    if code.client_id != client.client_id {
        return Err(OAuthError::invalid_grant("code was issued to another client"));
    }
    if let Some(redirect_uri) = form.redirect_uri.as_deref() {
        if redirect_uri != code.redirect_uri {
            return Err(OAuthError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }
    }
    if let (Some(requested), Some(issued)) = (form.resource.as_deref(), code.resource.as_deref()) {
        if requested != issued {
            return Err(OAuthError::invalid_grant(
                "resource does not match the authorization request",
            ));
        }
    }

    let verifier = form
        .code_verifier
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;
    if !verify_s256(verifier, &code.code_challenge) {
        return Err(OAuthError::invalid_grant("PKCE verification failed"));
    }

    let token = AccessToken {
        token: random_urlsafe(32),
        client_id: client.client_id.clone(),
        scopes: code.scopes.clone(),
        resource: code.resource.clone(),
        expires_at: Utc::now() + Duration::seconds(TOKEN_LIFETIME_SECONDS),
    };

    info!(client_id = %client.client_id, "issued access token");

    let response = TokenResponse {
        access_token: token.token.clone(),
        token_type: "Bearer".to_string(),
        expires_in: TOKEN_LIFETIME_SECONDS,
        scope: if token.scopes.is_empty() {
            None
        } else {
            Some(token.scopes.join(" "))
        },
    };
    state.tokens.put(token).await;

    Ok(Json(response))
}

// === Introspection endpoint (RFC 7662) ===

#[derive(Debug, Deserialize)]
pub struct IntrospectForm {
    pub token: String,
}

async fn introspect_handler(
    State(state): State<AuthServerState>,
    Form(form): Form<IntrospectForm>,
) -> Json<serde_json::Value> {
    // Unknown, expired, and malformed tokens all answer the same way so
    // callers cannot tell them apart.
    let inactive = Json(serde_json::json!({ "active": false }));

    let token = match state.tokens.get(&form.token).await {
        Some(token) => token,
        None => return inactive,
    };
    if token.is_expired() {
        return inactive;
    }

    let mut body = serde_json::json!({
        "active": true,
        "client_id": token.client_id,
        "scope": token.scopes.join(" "),
        "exp": token.expires_at.timestamp(),
        "token_type": "Bearer",
    });
    if let Some(resource) = token.resource {
        body["aud"] = serde_json::Value::String(resource);
    }
    Json(body)
}

// === Authorization server metadata (RFC 8414) ===

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub introspection_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    pub fn from_issuer(issuer: &str) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: base.to_string(),
            authorization_endpoint: format!("{}/authorize", base),
            token_endpoint: format!("{}/token", base),
            registration_endpoint: format!("{}/register", base),
            introspection_endpoint: format!("{}/introspect", base),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec!["authorization_code".to_string()],
            code_challenge_methods_supported: vec!["S256".to_string()],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_post".to_string(),
                "none".to_string(),
            ],
        }
    }
}

async fn metadata_handler(
    State(state): State<AuthServerState>,
) -> Json<AuthorizationServerMetadata> {
    Json(AuthorizationServerMetadata::from_issuer(&state.issuer))
}
