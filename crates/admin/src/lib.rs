// Recovery engine admin API
// Decision: Read-mostly dashboard; the only mutation is a manual circuit reset

pub mod api;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use recovery_engine::RecoveryEngine;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Admin server configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Listen address (default: 0.0.0.0:9100)
    pub addr: String,

    /// Prefix for the /v1 routes, e.g. "/api"
    pub api_prefix: String,

    /// Origins allowed for cross-origin dashboards
    pub cors_origins: Vec<HeaderValue>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:9100".to_string(),
            api_prefix: String::new(),
            cors_origins: Vec::new(),
        }
    }
}

impl AdminConfig {
    /// Create configuration from environment variables
    ///
    /// - `RECOVERY_ADMIN_ADDR`: listen address
    /// - `API_PREFIX`: route prefix (default: empty)
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated origins
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("RECOVERY_ADMIN_ADDR")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.addr),
            api_prefix: std::env::var("API_PREFIX").unwrap_or_default(),
            cors_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.split(',').filter_map(|s| s.trim().parse().ok()).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    components: usize,
}

async fn health(State(engine): State<Arc<RecoveryEngine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        components: engine.component_names().len(),
    })
}

/// Build the full admin application
pub fn app(engine: Arc<RecoveryEngine>, config: &AdminConfig) -> Router {
    let api_routes = api::components::routes(api::components::AppState::new(engine.clone()));

    let app = Router::new()
        .route("/health", get(health).with_state(engine))
        .merge(build_router_with_prefix(api_routes, &config.api_prefix));

    let app = if config.cors_origins.is_empty() {
        app
    } else {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.cors_origins.clone()))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN]),
        )
    };

    app.layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
