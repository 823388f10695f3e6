//! Environment-sourced server configuration

use std::env;

use thiserror::Error;

/// Token validation strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    Introspection,
    Jwt,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port for the MCP server
    pub port: u16,
    /// Base URL of the companion authorization server
    pub auth_server_url: String,
    /// Disable the auth gate entirely (local development only)
    pub disable_auth: bool,
    /// How bearer tokens are validated
    pub token_mode: TokenMode,
    /// Introspection endpoint, defaults to `<auth server>/introspect`
    pub introspection_url: String,
    /// Expected JWT issuer (jwt mode)
    pub jwt_issuer: Option<String>,
    /// Expected JWT audience (jwt mode)
    pub jwt_audience: Option<String>,
    /// JWKS URL, defaults to `<issuer>/.well-known/jwks.json`
    pub jwks_url: Option<String>,
    /// Tool pack registered into every new session's dispatcher
    pub tool_pack: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOLLGATE_PORT must be a valid u16")]
    InvalidPort,
    #[error("TOLLGATE_TOKEN_MODE must be 'introspection' or 'jwt'")]
    InvalidTokenMode,
    #[error("TOLLGATE_JWT_ISSUER is required when TOLLGATE_TOKEN_MODE=jwt")]
    MissingJwtIssuer,
    #[error("unknown tool pack '{0}'")]
    UnknownToolPack(String),
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_nonempty("TOLLGATE_PORT")
            .map(|v| v.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(3000);

        let auth_server_url = env_nonempty("TOLLGATE_AUTH_SERVER_URL")
            .unwrap_or_else(|| "http://localhost:9000".to_string());

        let token_mode = match env_nonempty("TOLLGATE_TOKEN_MODE").as_deref() {
            None | Some("introspection") => TokenMode::Introspection,
            Some("jwt") => TokenMode::Jwt,
            Some(_) => return Err(ConfigError::InvalidTokenMode),
        };

        let introspection_url = env_nonempty("TOLLGATE_INTROSPECTION_URL")
            .unwrap_or_else(|| format!("{}/introspect", auth_server_url.trim_end_matches('/')));

        let jwt_issuer = env_nonempty("TOLLGATE_JWT_ISSUER");
        let jwt_audience = env_nonempty("TOLLGATE_JWT_AUDIENCE");
        let jwks_url = env_nonempty("TOLLGATE_JWKS_URL").or_else(|| {
            jwt_issuer
                .as_ref()
                .map(|iss| format!("{}/.well-known/jwks.json", iss.trim_end_matches('/')))
        });

        if token_mode == TokenMode::Jwt && jwt_issuer.is_none() {
            return Err(ConfigError::MissingJwtIssuer);
        }

        let tool_pack = env_nonempty("TOOL_PACK").unwrap_or_else(|| "demo".to_string());
        if crate::tools::pack_by_name(&tool_pack).is_none() {
            return Err(ConfigError::UnknownToolPack(tool_pack));
        }

        Ok(Self {
            port,
            auth_server_url,
            disable_auth: env_flag("TOLLGATE_DISABLE_AUTH"),
            token_mode,
            introspection_url,
            jwt_issuer,
            jwt_audience,
            jwks_url,
            tool_pack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // process-wide env mutation; tests must not interleave
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "TOLLGATE_PORT",
            "TOLLGATE_AUTH_SERVER_URL",
            "TOLLGATE_DISABLE_AUTH",
            "TOLLGATE_TOKEN_MODE",
            "TOLLGATE_INTROSPECTION_URL",
            "TOLLGATE_JWT_ISSUER",
            "TOLLGATE_JWT_AUDIENCE",
            "TOLLGATE_JWKS_URL",
            "TOOL_PACK",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn parse_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = ServerConfig::from_env().expect("config should parse");
        assert_eq!(config.port, 3000);
        assert_eq!(config.auth_server_url, "http://localhost:9000");
        assert_eq!(config.token_mode, TokenMode::Introspection);
        assert_eq!(config.introspection_url, "http://localhost:9000/introspect");
        assert!(!config.disable_auth);
        assert_eq!(config.tool_pack, "demo");
    }

    #[test]
    fn jwt_mode_requires_issuer() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("TOLLGATE_TOKEN_MODE", "jwt");

        let err = ServerConfig::from_env().expect_err("expected missing issuer error");
        assert!(matches!(err, ConfigError::MissingJwtIssuer));

        env::set_var("TOLLGATE_JWT_ISSUER", "https://issuer.example.com");
        let config = ServerConfig::from_env().expect("config should parse");
        assert_eq!(
            config.jwks_url.as_deref(),
            Some("https://issuer.example.com/.well-known/jwks.json")
        );
        clear_env();
    }

    #[test]
    fn unknown_tool_pack_fails() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("TOOL_PACK", "bundled-ui");

        let err = ServerConfig::from_env().expect_err("expected unknown pack error");
        assert!(matches!(err, ConfigError::UnknownToolPack(_)));
        clear_env();
    }
}
