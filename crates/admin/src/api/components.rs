// Component dashboard routes
//
// Read-only views over the engine's registry plus a manual circuit reset
// for operators.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use recovery_engine::{ComponentSnapshot, HistoryEntry, RecoveryEngine};
use serde::Deserialize;

use super::common::{ErrorResponse, ListResponse};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// App state for component routes
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecoveryEngine>,
}

impl AppState {
    pub fn new(engine: Arc<RecoveryEngine>) -> Self {
        Self { engine }
    }
}

/// Query for the error history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorsQuery {
    #[serde(default = "default_errors_limit")]
    pub limit: usize,
}

fn default_errors_limit() -> usize {
    20
}

/// Create component routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/components", get(list_components))
        .route("/v1/components/:name", get(get_component))
        .route("/v1/components/:name/errors", get(list_errors))
        .route("/v1/components/:name/reset", post(reset_circuit))
        .with_state(state)
}

fn not_found(name: &str) -> ApiError {
    ErrorResponse::new(format!("component not found: {name}")).into_response(StatusCode::NOT_FOUND)
}

/// GET /v1/components - Snapshot of every registered component
pub async fn list_components(
    State(state): State<AppState>,
) -> Json<ListResponse<ComponentSnapshot>> {
    let snapshots = state
        .engine
        .component_names()
        .iter()
        .filter_map(|name| state.engine.snapshot(name))
        .collect();

    Json(ListResponse::new(snapshots))
}

/// GET /v1/components/{name} - Snapshot of one component
pub async fn get_component(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ComponentSnapshot>, ApiError> {
    state
        .engine
        .snapshot(&name)
        .map(Json)
        .ok_or_else(|| not_found(&name))
}

/// GET /v1/components/{name}/errors - Recent errors, newest first
pub async fn list_errors(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ErrorsQuery>,
) -> Result<Json<ListResponse<HistoryEntry>>, ApiError> {
    state
        .engine
        .recent_errors(&name, query.limit)
        .map(|errors| Json(ListResponse::new(errors)))
        .ok_or_else(|| not_found(&name))
}

/// POST /v1/components/{name}/reset - Force the circuit closed
pub async fn reset_circuit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ComponentSnapshot>, ApiError> {
    state.engine.reset_circuit(&name).map_err(|e| {
        tracing::warn!(component = %name, "Circuit reset rejected: {}", e);
        not_found(&name)
    })?;

    tracing::info!(component = %name, "Circuit reset by operator");
    state
        .engine
        .snapshot(&name)
        .map(Json)
        .ok_or_else(|| not_found(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use recovery_engine::{CircuitBreakerConfig, ComponentConfig, OperationError};
    use serde_json::Value;
    use tower::ServiceExt;

    fn engine() -> Arc<RecoveryEngine> {
        let engine = Arc::new(RecoveryEngine::default());
        engine
            .register(
                "telegram_bot",
                ComponentConfig::new()
                    .with_circuit(CircuitBreakerConfig::new().with_failure_threshold(2)),
            )
            .unwrap();
        engine.register("trading", ComponentConfig::new()).unwrap();
        engine
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_list_components() {
        let app = routes(AppState::new(engine()));

        let (status, body) = send(app, "GET", "/v1/components").await;

        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["telegram_bot", "trading"]);
    }

    #[tokio::test]
    async fn test_get_component_shows_open_circuit() {
        let engine = engine();
        engine.record_failure("telegram_bot", "send_message", OperationError::timeout("slow"));
        engine.record_failure("telegram_bot", "send_message", OperationError::timeout("slow"));
        let app = routes(AppState::new(engine));

        let (status, body) = send(app, "GET", "/v1/components/telegram_bot").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["circuit"]["state"], "open");
        assert_eq!(body["circuit"]["consecutive_failures"], 2);
        assert_eq!(body["stats"]["failures"], 2);
    }

    #[tokio::test]
    async fn test_unknown_component_is_404() {
        let app = routes(AppState::new(engine()));

        let (status, body) = send(app.clone(), "GET", "/v1/components/nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "component not found: nobody");

        let (status, _) = send(app.clone(), "GET", "/v1/components/nobody/errors").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(app, "POST", "/v1/components/nobody/reset").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_errors_respect_limit() {
        let engine = engine();
        for i in 0..5 {
            engine.record_failure("trading", "execute_trade", OperationError::timeout(format!("t{i}")));
        }
        let app = routes(AppState::new(engine));

        let (status, body) = send(app, "GET", "/v1/components/trading/errors?limit=2").await;

        assert_eq!(status, StatusCode::OK);
        let errors = body["data"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["operation"], "execute_trade");
        assert_eq!(errors[0]["error"]["message"], "t4");
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let engine = engine();
        engine.record_failure("telegram_bot", "send_message", OperationError::timeout("slow"));
        engine.record_failure("telegram_bot", "send_message", OperationError::timeout("slow"));
        assert!(!engine.can_execute("telegram_bot"));
        let app = routes(AppState::new(engine.clone()));

        let (status, body) = send(app, "POST", "/v1/components/telegram_bot/reset").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["circuit"]["state"], "closed");
        assert_eq!(body["circuit"]["consecutive_failures"], 0);
        assert!(engine.can_execute("telegram_bot"));
    }
}
