//! In-memory lobby store keyed by id with an invite-code index.

use chrono::Utc;
use log::info;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Invite-code alphabet: no 0, O, 1, I, or L.
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;
const LOBBY_TTL_MS: i64 = 24 * 60 * 60 * 1000;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("lobby not found")]
    NotFound,

    #[error("lobby has expired")]
    Expired,

    #[error("game has already started")]
    AlreadyStarted,

    #[error("lobby is full")]
    Full,

    #[error("not in lobby")]
    NotInLobby,

    #[error("only the host can do that")]
    NotHost,

    #[error("need at least 2 players")]
    NotEnoughPlayers,

    #[error("max players must be between 2 and 9")]
    InvalidMaxPlayers,

    #[error("buy-in must be at least 10")]
    InvalidBuyIn,

    #[error("could not allocate a lobby code")]
    CodeSpaceExhausted,
}

pub type LobbyResult<T> = Result<T, LobbyError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum GameMode {
    #[serde(rename = "cash")]
    Cash,
    #[serde(rename = "tournament")]
    Tournament,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum LobbyStatus {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "playing")]
    Playing,
    #[serde(rename = "finished")]
    Finished,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: String,
    pub seat_number: u32,
    pub joined_at_ms: i64,
    pub is_ready: bool,
}

#[derive(Clone, Debug)]
pub struct Lobby {
    pub id: String,
    pub code: String,
    pub host_user_id: String,
    pub name: String,
    pub max_players: u32,
    pub buy_in: u32,
    pub game_mode: GameMode,
    pub status: LobbyStatus,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
    pub players: BTreeMap<String, LobbyPlayer>,
    pub game_session_id: Option<String>,
}

impl Lobby {
    pub fn is_expired(&self) -> bool {
        now_ms() > self.expires_at_ms
    }

    pub fn is_full(&self) -> bool {
        self.players.len() as u32 >= self.max_players
    }

    fn next_seat(&self) -> Option<u32> {
        let occupied: Vec<u32> = self.players.values().map(|p| p.seat_number).collect();
        (1..=self.max_players).find(|seat| !occupied.contains(seat))
    }

    pub fn summary(&self, include_players: bool) -> LobbySummary {
        let players = include_players.then(|| {
            let mut players: Vec<LobbyPlayer> = self.players.values().cloned().collect();
            players.sort_by_key(|p| p.seat_number);
            players
        });
        LobbySummary {
            id: self.id.clone(),
            lobby_code: self.code.clone(),
            host_user_id: self.host_user_id.clone(),
            lobby_name: self.name.clone(),
            max_players: self.max_players,
            buy_in: self.buy_in,
            game_mode: self.game_mode,
            status: self.status,
            created_at_ms: self.created_at_ms,
            expires_at_ms: self.expires_at_ms,
            started_at_ms: self.started_at_ms,
            finished_at_ms: self.finished_at_ms,
            player_count: self.players.len(),
            available_seats: self.max_players.saturating_sub(self.players.len() as u32),
            game_session_id: self.game_session_id.clone(),
            players,
        }
    }
}

/// Serializable lobby projection.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: String,
    pub lobby_code: String,
    pub host_user_id: String,
    pub lobby_name: String,
    pub max_players: u32,
    pub buy_in: u32,
    pub game_mode: GameMode,
    pub status: LobbyStatus,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
    pub player_count: usize,
    pub available_seats: u32,
    pub game_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<LobbyPlayer>>,
}

/// What happened when a player left.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LeaveOutcome {
    /// An ordinary player left.
    Left,
    /// The host left, so the whole lobby is gone.
    Deleted,
}

#[derive(Default)]
struct Store {
    lobbies: HashMap<String, Lobby>,
    codes: HashMap<String, String>,
}

/// Registry of private lobbies. Lobbies live for 24 hours; the host leaving
/// deletes the lobby outright.
#[derive(Default)]
pub struct LobbyRegistry {
    store: RwLock<Store>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_code(store: &Store) -> LobbyResult<String> {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let code: String = (0..CODE_LEN)
                .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
                .collect();
            if !store.codes.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(LobbyError::CodeSpaceExhausted)
    }

    /// Create a lobby with the host seated first and marked ready.
    pub async fn create(
        &self,
        host_user_id: &str,
        host_username: Option<String>,
        host_display_name: &str,
        name: Option<String>,
        buy_in: u32,
        max_players: u32,
        game_mode: GameMode,
    ) -> LobbyResult<LobbySummary> {
        if !(2..=9).contains(&max_players) {
            return Err(LobbyError::InvalidMaxPlayers);
        }
        if buy_in < 10 {
            return Err(LobbyError::InvalidBuyIn);
        }

        let mut store = self.store.write().await;
        let code = Self::generate_code(&store)?;
        let id = Uuid::new_v4().to_string();
        let now = now_ms();
        let mut lobby = Lobby {
            id: id.clone(),
            code: code.clone(),
            host_user_id: host_user_id.to_string(),
            name: name.unwrap_or_else(|| format!("{host_display_name}'s Game")),
            max_players,
            buy_in,
            game_mode,
            status: LobbyStatus::Waiting,
            created_at_ms: now,
            expires_at_ms: now + LOBBY_TTL_MS,
            started_at_ms: None,
            finished_at_ms: None,
            players: BTreeMap::new(),
            game_session_id: None,
        };
        lobby.players.insert(
            host_user_id.to_string(),
            LobbyPlayer {
                user_id: host_user_id.to_string(),
                username: host_username,
                display_name: host_display_name.to_string(),
                seat_number: 1,
                joined_at_ms: now,
                is_ready: true,
            },
        );
        let summary = lobby.summary(true);
        store.codes.insert(code.clone(), id.clone());
        store.lobbies.insert(id, lobby);
        info!("created lobby {code} for host {host_user_id}");
        Ok(summary)
    }

    pub async fn get_by_code(&self, code: &str) -> LobbyResult<LobbySummary> {
        let store = self.store.read().await;
        let lobby = Self::lookup(&store, code)?;
        Ok(lobby.summary(true))
    }

    fn lookup<'a>(store: &'a Store, code: &str) -> LobbyResult<&'a Lobby> {
        let code = code.to_uppercase();
        let id = store.codes.get(&code).ok_or(LobbyError::NotFound)?;
        store.lobbies.get(id).ok_or(LobbyError::NotFound)
    }

    /// Join by code. Re-joining is a no-op that returns the lobby.
    pub async fn join(
        &self,
        code: &str,
        user_id: &str,
        username: Option<String>,
        display_name: &str,
    ) -> LobbyResult<LobbySummary> {
        let mut store = self.store.write().await;
        let code = code.to_uppercase();
        let id = store.codes.get(&code).ok_or(LobbyError::NotFound)?.clone();
        let lobby = store.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        if lobby.is_expired() {
            return Err(LobbyError::Expired);
        }
        if lobby.status != LobbyStatus::Waiting {
            return Err(LobbyError::AlreadyStarted);
        }
        if lobby.players.contains_key(user_id) {
            return Ok(lobby.summary(true));
        }
        if lobby.is_full() {
            return Err(LobbyError::Full);
        }
        let seat = lobby.next_seat().ok_or(LobbyError::Full)?;
        lobby.players.insert(
            user_id.to_string(),
            LobbyPlayer {
                user_id: user_id.to_string(),
                username,
                display_name: display_name.to_string(),
                seat_number: seat,
                joined_at_ms: now_ms(),
                is_ready: false,
            },
        );
        info!("{user_id} joined lobby {code} at seat {seat}");
        Ok(lobby.summary(true))
    }

    /// Leave a lobby. The host leaving deletes the lobby.
    pub async fn leave(&self, code: &str, user_id: &str) -> LobbyResult<LeaveOutcome> {
        let mut store = self.store.write().await;
        let code = code.to_uppercase();
        let id = store.codes.get(&code).ok_or(LobbyError::NotFound)?.clone();
        let is_host = {
            let lobby = store.lobbies.get(&id).ok_or(LobbyError::NotFound)?;
            if !lobby.players.contains_key(user_id) {
                return Err(LobbyError::NotInLobby);
            }
            lobby.host_user_id == user_id
        };
        if is_host {
            store.lobbies.remove(&id);
            store.codes.remove(&code);
            info!("lobby {code} deleted (host left)");
            return Ok(LeaveOutcome::Deleted);
        }
        if let Some(lobby) = store.lobbies.get_mut(&id) {
            lobby.players.remove(user_id);
        }
        info!("{user_id} left lobby {code}");
        Ok(LeaveOutcome::Left)
    }

    /// Toggle a player's ready flag.
    pub async fn set_ready(&self, code: &str, user_id: &str, ready: bool) -> LobbyResult<LobbySummary> {
        let mut store = self.store.write().await;
        let code = code.to_uppercase();
        let id = store.codes.get(&code).ok_or(LobbyError::NotFound)?.clone();
        let lobby = store.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        let player = lobby.players.get_mut(user_id).ok_or(LobbyError::NotInLobby)?;
        player.is_ready = ready;
        Ok(lobby.summary(true))
    }

    /// Host-only: flip to playing and stamp a game session id.
    pub async fn start(&self, code: &str, host_user_id: &str) -> LobbyResult<String> {
        let mut store = self.store.write().await;
        let code = code.to_uppercase();
        let id = store.codes.get(&code).ok_or(LobbyError::NotFound)?.clone();
        let lobby = store.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        if lobby.host_user_id != host_user_id {
            return Err(LobbyError::NotHost);
        }
        if lobby.players.len() < 2 {
            return Err(LobbyError::NotEnoughPlayers);
        }
        if lobby.status != LobbyStatus::Waiting {
            return Err(LobbyError::AlreadyStarted);
        }
        let session_id = format!("game_{}_{}", lobby.code, Utc::now().timestamp());
        lobby.status = LobbyStatus::Playing;
        lobby.started_at_ms = Some(now_ms());
        lobby.game_session_id = Some(session_id.clone());
        info!("lobby {code} started game session {session_id}");
        Ok(session_id)
    }

    pub async fn finish(&self, code: &str) -> LobbyResult<()> {
        let mut store = self.store.write().await;
        let code = code.to_uppercase();
        let id = store.codes.get(&code).ok_or(LobbyError::NotFound)?.clone();
        let lobby = store.lobbies.get_mut(&id).ok_or(LobbyError::NotFound)?;
        lobby.status = LobbyStatus::Finished;
        lobby.finished_at_ms = Some(now_ms());
        Ok(())
    }

    /// Unexpired lobbies this player sits in.
    pub async fn player_lobbies(&self, user_id: &str) -> Vec<LobbySummary> {
        let store = self.store.read().await;
        store
            .lobbies
            .values()
            .filter(|l| l.players.contains_key(user_id) && !l.is_expired())
            .map(|l| l.summary(true))
            .collect()
    }

    /// Sweep expired and finished lobbies. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut store = self.store.write().await;
        let stale: Vec<(String, String)> = store
            .lobbies
            .values()
            .filter(|l| l.is_expired() || l.status == LobbyStatus::Finished)
            .map(|l| (l.id.clone(), l.code.clone()))
            .collect();
        for (id, code) in &stale {
            store.lobbies.remove(id);
            store.codes.remove(code);
        }
        if !stale.is_empty() {
            info!("cleaned up {} expired lobbies", stale.len());
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry_with_lobby() -> (LobbyRegistry, String) {
        let registry = LobbyRegistry::new();
        let lobby = registry
            .create("host", Some("hosty".to_string()), "Host", None, 100, 4, GameMode::Cash)
            .await
            .unwrap();
        let code = lobby.lobby_code.clone();
        (registry, code)
    }

    #[tokio::test]
    async fn create_seats_host_first_and_ready() {
        let (registry, code) = registry_with_lobby().await;
        let lobby = registry.get_by_code(&code).await.unwrap();
        assert_eq!(lobby.player_count, 1);
        assert_eq!(lobby.lobby_name, "Host's Game");
        let players = lobby.players.unwrap();
        assert_eq!(players[0].seat_number, 1);
        assert!(players[0].is_ready);
    }

    #[tokio::test]
    async fn codes_avoid_ambiguous_characters() {
        let (_, code) = registry_with_lobby().await;
        assert_eq!(code.len(), 6);
        for c in code.chars() {
            assert!(!"0O1IL".contains(c), "ambiguous char {c} in code {code}");
        }
    }

    #[tokio::test]
    async fn join_is_idempotent_and_capacity_checked() {
        let (registry, code) = registry_with_lobby().await;
        registry.join(&code, "u2", None, "Two").await.unwrap();
        // Re-join is a no-op.
        let again = registry.join(&code, "u2", None, "Two").await.unwrap();
        assert_eq!(again.player_count, 2);

        registry.join(&code, "u3", None, "Three").await.unwrap();
        registry.join(&code, "u4", None, "Four").await.unwrap();
        let err = registry.join(&code, "u5", None, "Five").await.unwrap_err();
        assert!(matches!(err, LobbyError::Full));
    }

    #[tokio::test]
    async fn join_is_case_insensitive() {
        let (registry, code) = registry_with_lobby().await;
        let lower = code.to_lowercase();
        let lobby = registry.join(&lower, "u2", None, "Two").await.unwrap();
        assert_eq!(lobby.player_count, 2);
    }

    #[tokio::test]
    async fn host_leaving_deletes_the_lobby() {
        let (registry, code) = registry_with_lobby().await;
        registry.join(&code, "u2", None, "Two").await.unwrap();
        let outcome = registry.leave(&code, "host").await.unwrap();
        assert_eq!(outcome, LeaveOutcome::Deleted);
        assert!(matches!(
            registry.get_by_code(&code).await.unwrap_err(),
            LobbyError::NotFound
        ));
    }

    #[tokio::test]
    async fn only_host_starts_with_two_plus_players() {
        let (registry, code) = registry_with_lobby().await;
        assert!(matches!(
            registry.start(&code, "host").await.unwrap_err(),
            LobbyError::NotEnoughPlayers
        ));
        registry.join(&code, "u2", None, "Two").await.unwrap();
        assert!(matches!(
            registry.start(&code, "u2").await.unwrap_err(),
            LobbyError::NotHost
        ));
        let session = registry.start(&code, "host").await.unwrap();
        assert!(session.starts_with(&format!("game_{code}_")));
        // Starting twice fails, and joins are closed.
        assert!(matches!(
            registry.start(&code, "host").await.unwrap_err(),
            LobbyError::AlreadyStarted
        ));
        assert!(matches!(
            registry.join(&code, "u3", None, "Three").await.unwrap_err(),
            LobbyError::AlreadyStarted
        ));
    }

    #[tokio::test]
    async fn cleanup_removes_finished_lobbies() {
        let (registry, code) = registry_with_lobby().await;
        registry.finish(&code).await.unwrap();
        assert_eq!(registry.cleanup_expired().await, 1);
        assert!(registry.player_lobbies("host").await.is_empty());
    }
}
