//! Authorization server binary

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate_authd::{authd_routes, AuthServerState, AuthdConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AuthdConfig::from_env().context("invalid configuration")?;

    let state = AuthServerState::in_memory(config.issuer.clone());
    let app = authd_routes(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, issuer = %config.issuer, "tollgate-authd listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
