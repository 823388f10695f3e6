//! Protected-resource metadata (RFC 9728)

use serde::{Deserialize, Serialize};

/// Metadata document served at `/.well-known/oauth-protected-resource`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The protected resource identifier (URL of the MCP endpoint)
    pub resource: String,

    /// Authorization servers that can issue tokens for this resource
    pub authorization_servers: Vec<String>,

    /// Scopes this resource understands
    pub scopes_supported: Vec<String>,

    /// How bearer tokens may be presented
    pub bearer_methods_supported: Vec<String>,

    /// Where opaque tokens can be introspected
    pub introspection_endpoint: String,
}

impl ProtectedResourceMetadata {
    pub fn new(
        resource: impl Into<String>,
        authorization_server: impl Into<String>,
        introspection_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![authorization_server.into()],
            scopes_supported: vec!["mcp:invoke".to_string()],
            bearer_methods_supported: vec!["header".to_string()],
            introspection_endpoint: introspection_endpoint.into(),
        }
    }

    /// The well-known path this document is served under
    pub fn well_known_path() -> &'static str {
        "/.well-known/oauth-protected-resource"
    }
}
