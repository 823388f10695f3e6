//! End-to-end tests for the authorization-code + PKCE flow

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tollgate_authd::{authd_routes, pkce, AccessToken, AuthServerState, TokenStore};

const ISSUER: &str = "http://localhost:9000";
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

fn test_state() -> AuthServerState {
    AuthServerState::in_memory(ISSUER)
}

fn app(state: &AuthServerState) -> Router {
    authd_routes(state.clone())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register_client(app: &Router, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// Drive /authorize and pull the code out of the redirect
async fn obtain_code(app: &Router, client_id: &str, redirect_uri: &str) -> String {
    let challenge = pkce::s256_challenge(VERIFIER);
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", "mcp:invoke")
        .append_pair("state", "af0ifjsldkj")
        .append_pair("code_challenge", &challenge)
        .append_pair("code_challenge_method", "S256")
        .finish();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/authorize?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection(), "expected a redirect");

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    let url = url::Url::parse(location).unwrap();
    assert!(
        url.query_pairs().any(|(k, v)| k == "state" && v == "af0ifjsldkj"),
        "state must be echoed back"
    );
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .expect("redirect must carry a code")
}

fn token_form(client: &Value, code: &str, verifier: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", code)
        .append_pair("client_id", client["client_id"].as_str().unwrap())
        .append_pair("client_secret", client["client_secret"].as_str().unwrap())
        .append_pair("code_verifier", verifier)
        .finish()
}

async fn post_form(app: &Router, uri: &str, form: String) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn registration_yields_unique_client_ids() {
    let state = test_state();
    let app = app(&state);

    let metadata = json!({"redirect_uris": ["https://a/cb"], "client_name": "demo"});
    let first = register_client(&app, metadata.clone()).await;
    let second = register_client(&app, metadata).await;

    assert_ne!(first["client_id"], second["client_id"]);
    assert!(first["client_secret"].is_string());
}

#[tokio::test]
async fn public_client_gets_no_secret() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(
        &app,
        json!({"redirect_uris": ["https://a/cb"], "token_endpoint_auth_method": "none"}),
    )
    .await;
    assert!(client.get("client_secret").is_none() || client["client_secret"].is_null());
}

#[tokio::test]
async fn registration_without_redirect_uris_fails() {
    let state = test_state();
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"client_name": "demo"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn full_code_flow_issues_a_working_token() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(&app, json!({"redirect_uris": ["https://a/cb"]})).await;
    let code = obtain_code(&app, client["client_id"].as_str().unwrap(), "https://a/cb").await;

    let response = post_form(&app, "/token", token_form(&client, &code, VERIFIER)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await;
    assert_eq!(token["token_type"], "Bearer");
    assert_eq!(token["expires_in"], 3600);
    assert_eq!(token["scope"], "mcp:invoke");

    // the freshly minted token introspects as active
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("token", token["access_token"].as_str().unwrap())
        .finish();
    let response = post_form(&app, "/introspect", form).await;
    assert_eq!(response.status(), StatusCode::OK);
    let introspection = body_json(response).await;
    assert_eq!(introspection["active"], true);
    assert_eq!(introspection["client_id"], client["client_id"]);
    assert_eq!(introspection["scope"], "mcp:invoke");
    assert!(introspection["exp"].as_i64().unwrap() > Utc::now().timestamp());
}

#[tokio::test]
async fn mutated_verifier_fails_pkce() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(&app, json!({"redirect_uris": ["https://a/cb"]})).await;
    let code = obtain_code(&app, client["client_id"].as_str().unwrap(), "https://a/cb").await;

    let mutated = format!("e{}", &VERIFIER[1..]);
    let response = post_form(&app, "/token", token_form(&client, &code, &mutated)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn codes_are_single_use_even_after_a_failed_redemption() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(&app, json!({"redirect_uris": ["https://a/cb"]})).await;
    let code = obtain_code(&app, client["client_id"].as_str().unwrap(), "https://a/cb").await;

    // first attempt fails PKCE after the code has been consumed
    let mutated = format!("e{}", &VERIFIER[1..]);
    let response = post_form(&app, "/token", token_form(&client, &code, &mutated)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // the correct verifier cannot resurrect it
    let response = post_form(&app, "/token", token_form(&client, &code, VERIFIER)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn successful_redemption_consumes_the_code() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(&app, json!({"redirect_uris": ["https://a/cb"]})).await;
    let code = obtain_code(&app, client["client_id"].as_str().unwrap(), "https://a/cb").await;

    let response = post_form(&app, "/token", token_form(&client, &code, VERIFIER)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_form(&app, "/token", token_form(&client, &code, VERIFIER)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn unregistered_redirect_uri_fails_directly_without_redirect() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(&app, json!({"redirect_uris": ["https://a/cb"]})).await;

    let challenge = pkce::s256_challenge(VERIFIER);
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client["client_id"].as_str().unwrap())
        .append_pair("redirect_uri", "https://b/cb")
        .append_pair("code_challenge", &challenge)
        .append_pair("code_challenge_method", "S256")
        .finish();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/authorize?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // must not leak the code (or anything) to an unregistered URI
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn validation_failures_after_uri_check_redirect_with_error() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(&app, json!({"redirect_uris": ["https://a/cb"]})).await;

    // plain PKCE is rejected via error-redirect
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client["client_id"].as_str().unwrap())
        .append_pair("redirect_uri", "https://a/cb")
        .append_pair("state", "s1")
        .append_pair("code_challenge", "plain-challenge")
        .append_pair("code_challenge_method", "plain")
        .finish();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/authorize?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection());

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://a/cb?"));
    assert!(location.contains("error=invalid_request"));
    assert!(location.contains("state=s1"));
}

#[tokio::test]
async fn scope_outside_allow_list_redirects_with_invalid_scope() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(
        &app,
        json!({"redirect_uris": ["https://a/cb"], "scope": "mcp:invoke"}),
    )
    .await;

    let challenge = pkce::s256_challenge(VERIFIER);
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", client["client_id"].as_str().unwrap())
        .append_pair("redirect_uri", "https://a/cb")
        .append_pair("scope", "mcp:invoke admin")
        .append_pair("code_challenge", &challenge)
        .append_pair("code_challenge_method", "S256")
        .finish();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/authorize?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.contains("error=invalid_scope"));
}

#[tokio::test]
async fn wrong_client_secret_is_rejected() {
    let state = test_state();
    let app = app(&state);

    let client = register_client(&app, json!({"redirect_uris": ["https://a/cb"]})).await;
    let code = obtain_code(&app, client["client_id"].as_str().unwrap(), "https://a/cb").await;

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", &code)
        .append_pair("client_id", client["client_id"].as_str().unwrap())
        .append_pair("client_secret", "not-the-secret")
        .append_pair("code_verifier", VERIFIER)
        .finish();
    let response = post_form(&app, "/token", form).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn unsupported_grant_type_is_rejected() {
    let state = test_state();
    let app = app(&state);

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "client_credentials")
        .append_pair("client_id", "whatever")
        .finish();
    let response = post_form(&app, "/token", form).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn introspection_never_errors_on_unknown_or_expired_tokens() {
    let state = test_state();
    let app = app(&state);

    // unknown token
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("token", "no-such-token")
        .finish();
    let response = post_form(&app, "/introspect", form).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"active": false}));

    // expired token: same answer, indistinguishable from unknown
    state
        .tokens
        .put(AccessToken {
            token: "stale-token".to_string(),
            client_id: "client-1".to_string(),
            scopes: vec!["mcp:invoke".to_string()],
            resource: None,
            expires_at: Utc::now() - Duration::minutes(1),
        })
        .await;

    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("token", "stale-token")
        .finish();
    let response = post_form(&app, "/introspect", form).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"active": false}));
}

#[tokio::test]
async fn metadata_document_lists_endpoints() {
    let state = test_state();
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/.well-known/oauth-authorization-server")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let metadata = body_json(response).await;
    assert_eq!(metadata["issuer"], ISSUER);
    assert_eq!(metadata["token_endpoint"], format!("{}/token", ISSUER));
    assert_eq!(metadata["code_challenge_methods_supported"], json!(["S256"]));
}
