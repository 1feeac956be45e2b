//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::game::level::LevelDefinition;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/levels", get(levels_handler))
        .route("/levels/:index", get(level_handler))
        .route("/ws", get(ws_handler));

    // Browser client assets, when configured
    if let Some(dir) = &state.config.static_dir {
        info!(dir = %dir.display(), "Serving static client files");
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(10)))
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// CORS for the configured origins (comma-separated, `*` for any)
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
    levels: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.rooms.active_rooms(),
        active_players: state.rooms.total_players(),
        levels: state.catalog.len(),
    })
}

// ============================================================================
// Level endpoints
// ============================================================================

#[derive(Serialize)]
struct LevelSummary {
    index: usize,
    name: String,
    description: String,
}

async fn levels_handler(State(state): State<AppState>) -> Json<Vec<LevelSummary>> {
    let levels = state
        .catalog
        .iter()
        .enumerate()
        .map(|(index, level)| LevelSummary {
            index,
            name: level.name.clone(),
            description: level.description.clone(),
        })
        .collect();

    Json(levels)
}

async fn level_handler(
    State(state): State<AppState>,
    index: Result<Path<usize>, PathRejection>,
) -> Result<Json<LevelDefinition>, AppError> {
    let Path(index) = index.map_err(|e| AppError::BadRequest(e.body_text()))?;

    state
        .catalog
        .get(index)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No level with index {}", index)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::level::LevelCatalog;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let catalog = Arc::new(LevelCatalog::builtin().unwrap());
        build_router(AppState::new(Config::default(), catalog))
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_rooms_and_levels() {
        let (status, body) = get_json("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_rooms"], 0);
        assert_eq!(body["active_players"], 0);
        assert_eq!(body["levels"], 5);
    }

    #[tokio::test]
    async fn levels_lists_catalog_in_order() {
        let (status, body) = get_json("/levels").await;

        assert_eq!(status, StatusCode::OK);
        let levels = body.as_array().unwrap();
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[0]["index"], 0);
        assert_eq!(levels[0]["name"], "The Basics");
        assert_eq!(levels[4]["name"], "The Exam");
    }

    #[tokio::test]
    async fn level_detail_and_missing_level() {
        let (status, body) = get_json("/levels/3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["moveable_blocks"][0]["weight"], 2);

        let (status, body) = get_json("/levels/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("99"));

        let (status, body) = get_json("/levels/first").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
