//! Lobby CRUD endpoints. Changes are mirrored into the lobby socket room
//! so connected clients see joins, leaves, and the game start live.

use super::users::resolve_identity;
use super::{ApiError, AppState};
use super::websocket::LobbyServerMessage;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use poker_core::lobby::{GameMode, LeaveOutcome, LobbySummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateLobbyRequest {
    #[serde(default, rename = "initData")]
    pub init_data: String,
    #[serde(default, rename = "lobbyName")]
    pub lobby_name: Option<String>,
    #[serde(default = "default_buy_in", rename = "buyIn")]
    pub buy_in: u32,
    #[serde(default = "default_max_players", rename = "maxPlayers")]
    pub max_players: u32,
    #[serde(default = "default_game_mode", rename = "gameMode")]
    pub game_mode: String,
}

fn default_buy_in() -> u32 {
    100
}

fn default_max_players() -> u32 {
    6
}

fn default_game_mode() -> String {
    "cash".to_string()
}

#[derive(Debug, Deserialize)]
pub struct IdentifiedRequest {
    #[serde(default, rename = "initData")]
    pub init_data: String,
}

#[derive(Debug, Serialize)]
pub struct LobbyResponse {
    pub lobby: LobbySummary,
}

/// `POST /api/lobby/create`
pub async fn create_lobby(
    State(state): State<AppState>,
    Json(request): Json<CreateLobbyRequest>,
) -> Result<Json<LobbyResponse>, ApiError> {
    let user = resolve_identity(&state, &request.init_data)?;
    let game_mode = match request.game_mode.as_str() {
        "tournament" => GameMode::Tournament,
        _ => GameMode::Cash,
    };
    let lobby = state
        .lobbies
        .create(
            &user.id.to_string(),
            user.username.clone(),
            &user.first_name,
            request.lobby_name,
            request.buy_in,
            request.max_players,
            game_mode,
        )
        .await?;
    Ok(Json(LobbyResponse { lobby }))
}

/// `GET /api/lobby/{code}`
pub async fn get_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LobbyResponse>, ApiError> {
    let lobby = state.lobbies.get_by_code(&code).await?;
    Ok(Json(LobbyResponse { lobby }))
}

/// `POST /api/lobby/{code}/join`
pub async fn join_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<IdentifiedRequest>,
) -> Result<Json<LobbyResponse>, ApiError> {
    let user = resolve_identity(&state, &request.init_data)?;
    let lobby = state
        .lobbies
        .join(
            &code,
            &user.id.to_string(),
            user.username.clone(),
            &user.first_name,
        )
        .await?;
    state
        .lobby_rooms
        .broadcast(
            &code,
            &LobbyServerMessage::PlayerJoined {
                user_id: user.id.to_string(),
                display_name: user.first_name.clone(),
            },
        )
        .await;
    state
        .lobby_rooms
        .broadcast(&code, &LobbyServerMessage::LobbyState { payload: lobby.clone() })
        .await;
    Ok(Json(LobbyResponse { lobby }))
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub deleted: bool,
}

/// `POST /api/lobby/{code}/leave`
pub async fn leave_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<IdentifiedRequest>,
) -> Result<Json<LeaveResponse>, ApiError> {
    let user = resolve_identity(&state, &request.init_data)?;
    let outcome = state.lobbies.leave(&code, &user.id.to_string()).await?;
    state
        .lobby_rooms
        .broadcast(
            &code,
            &LobbyServerMessage::PlayerLeft {
                user_id: user.id.to_string(),
            },
        )
        .await;
    if outcome == LeaveOutcome::Left
        && let Ok(lobby) = state.lobbies.get_by_code(&code).await
    {
        state
            .lobby_rooms
            .broadcast(&code, &LobbyServerMessage::LobbyState { payload: lobby })
            .await;
    }
    Ok(Json(LeaveResponse {
        deleted: outcome == LeaveOutcome::Deleted,
    }))
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    #[serde(rename = "gameSessionId")]
    pub game_session_id: String,
}

/// `POST /api/lobby/{code}/start` — host only.
pub async fn start_lobby(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<IdentifiedRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let user = resolve_identity(&state, &request.init_data)?;
    let game_session_id = state.lobbies.start(&code, &user.id.to_string()).await?;
    state
        .lobby_rooms
        .broadcast(
            &code,
            &LobbyServerMessage::GameStarted {
                game_session_id: game_session_id.clone(),
            },
        )
        .await;
    Ok(Json(StartResponse { game_session_id }))
}

#[derive(Debug, Deserialize)]
pub struct MyLobbiesQuery {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MyLobbiesResponse {
    pub lobbies: Vec<LobbySummary>,
}

/// `GET /api/my-lobbies?user_id=`
pub async fn my_lobbies(
    State(state): State<AppState>,
    Query(query): Query<MyLobbiesQuery>,
) -> Json<MyLobbiesResponse> {
    Json(MyLobbiesResponse {
        lobbies: state.lobbies.player_lobbies(&query.user_id.to_string()).await,
    })
}
