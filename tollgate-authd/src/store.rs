//! Stores for registered clients, authorization codes, and access tokens
//!
//! The stores are injected abstractions so they could be backed by an
//! external database without touching the handlers. The single-use
//! invariant for authorization codes is preserved by [`CodeStore::take`],
//! an atomic remove-and-return: of any number of concurrent redemption
//! attempts for the same code, exactly one observes it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// A registered OAuth client. Immutable after registration; never deleted.
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    /// Absent when `token_endpoint_auth_method == "none"`
    pub client_secret: Option<String>,
    /// Exact-match allow-list; never prefix or wildcard matched
    pub redirect_uris: Vec<String>,
    /// Scope allow-list
    pub scopes: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub registered_at: DateTime<Utc>,
}

impl Client {
    /// Strict equality against the registered set
    pub fn allows_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Every requested scope must be in the allow-list
    pub fn allows_scopes(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }

    /// Compare the presented secret, if this client has one
    pub fn authenticate(&self, presented: Option<&str>) -> bool {
        match (&self.client_secret, presented) {
            (Some(expected), Some(presented)) => expected == presented,
            (None, _) => self.token_endpoint_auth_method == "none",
            (Some(_), None) => false,
        }
    }
}

/// A short-lived authorization grant, redeemable at most once
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    /// S256 digest of the client-held verifier
    pub code_challenge: String,
    /// Must equal the URI used at issuance
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Intended audience, when the request named one
    pub resource: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// An opaque bearer credential
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub resource: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn put(&self, client: Client);
    async fn get(&self, client_id: &str) -> Option<Client>;
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn put(&self, code: AuthorizationCode);

    /// Atomically remove and return the code. Exactly one concurrent
    /// caller succeeds; everyone else sees `None`.
    async fn take(&self, code: &str) -> Option<AuthorizationCode>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn put(&self, token: AccessToken);
    async fn get(&self, token: &str) -> Option<AccessToken>;
}

/// In-memory client store
#[derive(Default)]
pub struct InMemoryClientStore {
    clients: RwLock<HashMap<String, Client>>,
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn put(&self, client: Client) {
        self.clients
            .write()
            .await
            .insert(client.client_id.clone(), client);
    }

    async fn get(&self, client_id: &str) -> Option<Client> {
        self.clients.read().await.get(client_id).cloned()
    }
}

/// In-memory code store
#[derive(Default)]
pub struct InMemoryCodeStore {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn put(&self, code: AuthorizationCode) {
        self.codes.write().await.insert(code.code.clone(), code);
    }

    async fn take(&self, code: &str) -> Option<AuthorizationCode> {
        // lookup + delete under one write lock: the single-use invariant
        self.codes.write().await.remove(code)
    }
}

/// In-memory token store
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, AccessToken>>,
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(&self, token: AccessToken) {
        self.tokens.write().await.insert(token.token.clone(), token);
    }

    async fn get(&self, token: &str) -> Option<AccessToken> {
        self.tokens.read().await.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_client() -> Client {
        Client {
            client_id: "client-1".to_string(),
            client_secret: Some("secret".to_string()),
            redirect_uris: vec!["https://a/cb".to_string()],
            scopes: vec!["mcp:invoke".to_string(), "mcp:read".to_string()],
            token_endpoint_auth_method: "client_secret_post".to_string(),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_redirect_uri_is_exact_match_only() {
        let client = test_client();

        assert!(client.allows_redirect_uri("https://a/cb"));
        assert!(!client.allows_redirect_uri("https://a/cb/"));
        assert!(!client.allows_redirect_uri("https://a/cb?x=1"));
        assert!(!client.allows_redirect_uri("https://b/cb"));
    }

    #[test]
    fn test_scope_subset_check() {
        let client = test_client();

        assert!(client.allows_scopes(&["mcp:invoke".to_string()]));
        assert!(client.allows_scopes(&[]));
        assert!(!client.allows_scopes(&["mcp:invoke".to_string(), "admin".to_string()]));
    }

    #[test]
    fn test_client_authentication() {
        let confidential = test_client();
        assert!(confidential.authenticate(Some("secret")));
        assert!(!confidential.authenticate(Some("wrong")));
        assert!(!confidential.authenticate(None));

        let public = Client {
            client_secret: None,
            token_endpoint_auth_method: "none".to_string(),
            ..test_client()
        };
        assert!(public.authenticate(None));
    }

    #[tokio::test]
    async fn test_code_take_is_single_use() {
        let store = InMemoryCodeStore::default();
        store
            .put(AuthorizationCode {
                code: "abc".to_string(),
                client_id: "client-1".to_string(),
                code_challenge: "challenge".to_string(),
                redirect_uri: "https://a/cb".to_string(),
                scopes: vec![],
                resource: None,
                expires_at: Utc::now() + chrono::Duration::minutes(5),
            })
            .await;

        assert!(store.take("abc").await.is_some());
        assert!(store.take("abc").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_code_take_only_one_wins() {
        let store = Arc::new(InMemoryCodeStore::default());
        store
            .put(AuthorizationCode {
                code: "race".to_string(),
                client_id: "client-1".to_string(),
                code_challenge: "challenge".to_string(),
                redirect_uri: "https://a/cb".to_string(),
                scopes: vec![],
                resource: None,
                expires_at: Utc::now() + chrono::Duration::minutes(5),
            })
            .await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.take("race").await.is_some() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
