// Recovery engine admin server
//
// Serves the dashboard API for an engine built from RECOVERY_* environment
// variables (components file, default retry, escalation webhook).

use std::sync::Arc;

use anyhow::{Context, Result};
use recovery_admin::{app, AdminConfig};
use recovery_engine::RecoveryEngine;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recovery_engine=info,recovery_admin=info,tower_http=info")),
        )
        .init();

    tracing::info!("recovery-admin starting...");

    let engine = RecoveryEngine::from_env().context("Failed to build recovery engine")?;
    let engine = Arc::new(engine);
    tracing::info!(components = ?engine.component_names(), "Recovery engine ready");

    let config = AdminConfig::from_env();
    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS origins configured");
    }

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.addr);

    axum::serve(listener, app(engine, &config))
        .await
        .context("Server error")?;

    Ok(())
}
