//! MCP server binary: wires the auth gate in front of the session router

use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Extension, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate_auth::{
    auth_gate_middleware, AuthGate, IntrospectionVerifier, JwtVerifier, ProtectedResourceMetadata,
    TokenVerifier,
};
use tollgate_mcp::{config::TokenMode, mcp_routes, pack_by_name, McpState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let pack = pack_by_name(&config.tool_pack)
        .with_context(|| format!("unknown tool pack '{}'", config.tool_pack))?;
    info!(pack = pack.name(), "registering tool pack");

    let resource = format!("http://localhost:{}/mcp", config.port);
    let metadata = ProtectedResourceMetadata::new(
        resource.clone(),
        config.auth_server_url.clone(),
        config.introspection_url.clone(),
    );
    let metadata_url = format!(
        "http://localhost:{}{}",
        config.port,
        ProtectedResourceMetadata::well_known_path()
    );

    let gate = if config.disable_auth {
        AuthGate::disabled(metadata_url)
    } else {
        let verifier = match config.token_mode {
            TokenMode::Introspection => TokenVerifier::Introspection(IntrospectionVerifier::new(
                config.introspection_url.clone(),
            )),
            TokenMode::Jwt => {
                let issuer = config
                    .jwt_issuer
                    .clone()
                    .context("jwt mode requires TOLLGATE_JWT_ISSUER")?;
                let jwks_url = config
                    .jwks_url
                    .clone()
                    .context("jwt mode requires a JWKS URL")?;
                TokenVerifier::Jwt(JwtVerifier::new(issuer, jwks_url))
            }
        };

        let mut gate = AuthGate::new(verifier, metadata_url).with_required_scope("mcp:invoke");
        if let Some(audience) = config.jwt_audience.clone() {
            gate = gate.with_audience(audience);
        }
        gate
    };

    let state = McpState::new(pack.as_ref());
    let protected = mcp_routes(state).layer(middleware::from_fn_with_state(
        Arc::new(gate),
        auth_gate_middleware,
    ));

    let app = Router::new()
        .route(
            ProtectedResourceMetadata::well_known_path(),
            get(|Extension(metadata): Extension<Arc<ProtectedResourceMetadata>>| async move {
                Json(metadata.as_ref().clone())
            }),
        )
        .layer(Extension(Arc::new(metadata)))
        .merge(protected)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, resource = %resource, "tollgate-mcp listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
