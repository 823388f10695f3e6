//! # tollgate-authd: demo OAuth 2.0 authorization server
//!
//! Implements the authorization-code grant with mandatory S256 PKCE,
//! dynamic client registration, opaque bearer tokens with a one-hour
//! lifetime, and RFC 7662 introspection. State lives in injected stores
//! (in-memory by default); the single-use invariant on authorization codes
//! is enforced by an atomic take on the code store, so it holds under
//! genuinely concurrent redemption attempts, not just cooperative
//! scheduling.
//!
//! Nothing here persists across restarts and tokens are never refreshed or
//! revoked; this is the demo companion to the `tollgate-mcp` resource
//! server.

pub mod config;
pub mod error;
pub mod pkce;
pub mod routes;
pub mod store;

pub use config::AuthdConfig;
pub use error::{OAuthError, OAuthErrorCode};
pub use routes::{authd_routes, AuthServerState, AuthorizationServerMetadata};
pub use store::{
    AccessToken, AuthorizationCode, Client, ClientStore, CodeStore, InMemoryClientStore,
    InMemoryCodeStore, InMemoryTokenStore, TokenStore,
};
