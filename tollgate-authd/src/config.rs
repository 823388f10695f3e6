//! Environment-sourced authorization server configuration

use std::env;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AuthdConfig {
    /// Listen port
    pub port: u16,
    /// Issuer identifier; also the base of the advertised endpoints
    pub issuer: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOLLGATE_AUTHD_PORT must be a valid u16")]
    InvalidPort,
}

impl AuthdConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("TOLLGATE_AUTHD_PORT")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(9000);

        let issuer = env::var("TOLLGATE_AUTHD_ISSUER")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self { port, issuer })
    }
}
