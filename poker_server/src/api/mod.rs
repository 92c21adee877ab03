//! HTTP/WebSocket API surface.
//!
//! REST endpoints are thin glue over the core registries; the real-time
//! path is the table socket in [`websocket`]. Responses use FastAPI-style
//! `{"detail": ...}` error bodies so existing clients keep working.

pub mod lobbies;
pub mod tournaments;
pub mod users;
pub mod websocket;

use crate::config::ServerConfig;
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use poker_core::lobby::{LobbyError, LobbyRegistry};
use poker_core::profile::ProfileRegistry;
use poker_core::table::TableManager;
use poker_core::tournament::{TournamentError, TournamentManager};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use websocket::LobbyRooms;

/// Shared application state; cheap to clone into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub tables: Arc<TableManager>,
    pub tournaments: Arc<TournamentManager>,
    pub lobbies: Arc<LobbyRegistry>,
    pub profiles: Arc<ProfileRegistry>,
    pub lobby_rooms: Arc<LobbyRooms>,
}

/// Error type all REST handlers return; maps onto the status codes the
/// clients expect.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, detail),
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            Self::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<LobbyError> for ApiError {
    fn from(err: LobbyError) -> Self {
        match err {
            LobbyError::NotFound => Self::NotFound(err.to_string()),
            LobbyError::CodeSpaceExhausted => Self::Internal(err.to_string()),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<TournamentError> for ApiError {
    fn from(err: TournamentError) -> Self {
        match err {
            TournamentError::NotFound(_) => Self::NotFound(err.to_string()),
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

/// Assemble the router: health, REST glue, and the socket upgrades.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/me", post(users::me))
        .route("/top", get(users::top))
        .route("/lobby/create", post(lobbies::create_lobby))
        .route("/lobby/{code}", get(lobbies::get_lobby))
        .route("/lobby/{code}/join", post(lobbies::join_lobby))
        .route("/lobby/{code}/leave", post(lobbies::leave_lobby))
        .route("/lobby/{code}/start", post(lobbies::start_lobby))
        .route("/my-lobbies", get(lobbies::my_lobbies))
        .route("/tournaments", get(tournaments::list_tournaments))
        .route("/tournaments/{id}", get(tournaments::get_tournament))
        .route("/tournaments/{id}/register", post(tournaments::register))
        .route("/tournaments/{id}/unregister", post(tournaments::unregister));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws/tables/{table_id}", get(websocket::table_socket))
        .route("/ws/lobby/{code}", get(websocket::lobby_socket))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "app": "Poker Mini App API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "lobby": "/api/lobby",
            "user": "/api/me",
            "websocket": "/ws/tables/{table_id}"
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    let tables = state.tables.table_count().await;
    let tournaments = state.tournaments.tournament_count().await;
    Json(json!({
        "status": "healthy",
        "tables": tables,
        "tournaments": tournaments,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
