//! Tournament glue endpoints over the core controller.

use super::users::resolve_identity;
use super::{ApiError, AppState};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use poker_core::tournament::models::{TournamentMode, TournamentSummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// `tournament`, `bounty`, or `sitgo`.
    #[serde(default)]
    pub mode: Option<String>,
    /// `registering` narrows to open tournaments; anything else lists all
    /// that are not finished.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TournamentListResponse {
    pub tournaments: Vec<TournamentSummary>,
}

fn parse_mode(raw: Option<&str>) -> Option<TournamentMode> {
    match raw {
        Some("tournament") => Some(TournamentMode::Tournament),
        Some("bounty") => Some(TournamentMode::BountyHunter),
        Some("sitgo") => Some(TournamentMode::SitAndGo),
        _ => None,
    }
}

/// `GET /api/tournaments`
pub async fn list_tournaments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<TournamentListResponse> {
    let mode = parse_mode(query.mode.as_deref());
    let tournaments = if query.status.as_deref() == Some("registering") {
        state.tournaments.list_registering(mode).await
    } else {
        state.tournaments.list_active(mode).await
    };
    Json(TournamentListResponse { tournaments })
}

#[derive(Debug, Serialize)]
pub struct TournamentResponse {
    pub tournament: TournamentSummary,
}

/// `GET /api/tournaments/{id}`
pub async fn get_tournament(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TournamentResponse>, ApiError> {
    let tournament = state
        .tournaments
        .summary(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("tournament not found: {id}")))?;
    Ok(Json(TournamentResponse { tournament }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, rename = "initData")]
    pub init_data: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub registered: bool,
}

/// `POST /api/tournaments/{id}/register`
pub async fn register(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let user = resolve_identity(&state, &request.init_data)?;
    state
        .tournaments
        .register_player(
            &id,
            &user.id.to_string(),
            user.username.clone(),
            &user.first_name,
        )
        .await?;
    Ok(Json(RegisterResponse { registered: true }))
}

/// `POST /api/tournaments/{id}/unregister`
pub async fn unregister(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let user = resolve_identity(&state, &request.init_data)?;
    state
        .tournaments
        .unregister_player(&id, &user.id.to_string())
        .await?;
    Ok(Json(RegisterResponse { registered: false }))
}
