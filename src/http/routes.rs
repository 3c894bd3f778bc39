//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::loadout::{self, CatalogEntry, Category, LoadoutError};
use crate::util::time::{unix_millis, uptime_secs};
use crate::ws::handler::ws_handler;
use crate::ws::protocol::{MatchInfo, Team};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/matches", get(list_matches_handler))
        .route("/api/matches/:match_id", get(match_info_handler))
        .route("/api/create-match", post(create_match_handler))
        .route("/api/loadouts/:team", get(loadouts_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma-separated list
fn cors_layer(client_origin: &str) -> CorsLayer {
    let origin = if client_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let allowed_origins: Vec<HeaderValue> = client_origin
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        AllowOrigin::list(allowed_origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    server_time: u64,
    matches: usize,
    clients: usize,
    players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        server_time: unix_millis(),
        matches: state.match_registry.active_matches(),
        clients: state.connections(),
        players: state.match_registry.total_players(),
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Serialize)]
struct MatchListResponse {
    matches: Vec<MatchInfo>,
}

async fn list_matches_handler(State(state): State<AppState>) -> Json<MatchListResponse> {
    Json(MatchListResponse {
        matches: state.match_registry.list(),
    })
}

async fn match_info_handler(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchInfo>, AppError> {
    Uuid::parse_str(&match_id)
        .ok()
        .and_then(|id| state.match_registry.get(&id))
        .map(|handle| Json(handle.info()))
        .ok_or(AppError::NotFound(format!("match {}", match_id)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMatchResponse {
    success: bool,
    match_id: Uuid,
}

async fn create_match_handler(
    State(state): State<AppState>,
) -> Result<Json<CreateMatchResponse>, AppError> {
    if state.create_match_limiter.check().is_err() {
        return Err(AppError::RateLimited);
    }

    let handle = state.match_registry.create_match();
    info!(match_id = %handle.id, "Match created over HTTP");

    Ok(Json(CreateMatchResponse {
        success: true,
        match_id: handle.id,
    }))
}

// ============================================================================
// Loadout catalog
// ============================================================================

#[derive(Serialize)]
struct LoadoutCatalogResponse {
    team: Team,
    primary: Vec<CatalogEntry>,
    secondary: Vec<CatalogEntry>,
    equipment: Vec<CatalogEntry>,
}

async fn loadouts_handler(Path(team): Path<String>) -> Result<Json<LoadoutCatalogResponse>, AppError> {
    let team = loadout::parse_role(&team)?;

    Ok(Json(LoadoutCatalogResponse {
        team,
        primary: loadout::available(team, Category::Primary),
        secondary: loadout::available(team, Category::Secondary),
        equipment: loadout::available(team, Category::Equipment),
    }))
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

    #[error("Too many requests")]
    RateLimited,
}

impl From<LoadoutError> for AppError {
    fn from(e: LoadoutError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
