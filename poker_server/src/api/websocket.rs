//! WebSocket upgrade handlers: the table duplex socket and the lobby room.
//!
//! Each connection splits into a receive loop (this task) and a send pump
//! fed by an unbounded channel. Broadcasts push onto the channel under the
//! table mutex; a closed channel evicts the connection at the next push.

use super::AppState;
use crate::metrics;
use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use poker_core::lobby::LobbySummary;
use poker_core::table::messages::{ClientMessage, ServerMessage, WelcomePayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};

/// Application close code for missing/invalid connection parameters.
const CLOSE_BAD_PARAMS: u16 = 4000;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// `GET /ws/tables/{table_id}?user_id=&display_name=`
pub async fn table_socket(
    ws: WebSocketUpgrade,
    Path(table_id): Path<String>,
    Query(query): Query<SocketQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_table_socket(socket, table_id, query, state))
}

async fn handle_table_socket(
    socket: WebSocket,
    table_id: String,
    query: SocketQuery,
    state: AppState,
) {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        close_with_code(socket, "missing user_id").await;
        return;
    };
    let display_name = query.display_name.unwrap_or_else(|| "Guest".to_string());

    metrics::websocket_connections_total();
    info!("table socket connected: table={table_id}, user={user_id}");

    let table = state.tables.get_or_create(&table_id).await;
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    table.connect(&user_id, &display_name, tx.clone()).await;
    send_json(
        &tx,
        &ServerMessage::Welcome {
            payload: WelcomePayload {
                table_id: table_id.clone(),
            },
        },
    );

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                debug!("table socket error: table={table_id}, user={user_id}: {e}");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                metrics::websocket_messages_received();
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping) => send_json(&tx, &ServerMessage::Pong),
                    Ok(ClientMessage::Action { payload }) => {
                        table.handle_action(&user_id, payload).await;
                    }
                    Err(e) => {
                        warn!("unparseable frame from {user_id}: {e}");
                        send_json(
                            &tx,
                            &ServerMessage::Error {
                                message: format!("invalid message: {e}"),
                            },
                        );
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    table.disconnect(&user_id).await;
    send_task.abort();
    info!("table socket disconnected: table={table_id}, user={user_id}");
}

fn send_json<T: Serialize>(tx: &mpsc::UnboundedSender<String>, message: &T) {
    if let Ok(frame) = serde_json::to_string(message) {
        let _ = tx.send(frame);
    }
}

async fn close_with_code(mut socket: WebSocket, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_BAD_PARAMS,
            reason: reason.into(),
        })))
        .await;
}

// --- lobby room ---

/// Frames sent over the lobby room socket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LobbyServerMessage {
    Pong,
    LobbyState { payload: LobbySummary },
    PlayerJoined { user_id: String, display_name: String },
    PlayerLeft { user_id: String },
    PlayerReady { user_id: String, ready: bool },
    GameStarted { game_session_id: String },
    Error { message: String },
}

/// Frames clients send to the lobby room.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum LobbyClientMessage {
    Ping,
    Ready {
        #[serde(default)]
        ready: bool,
    },
}

/// Connection sets per lobby code. REST handlers broadcast into these
/// rooms so lobby pages stay live without polling.
#[derive(Default)]
pub struct LobbyRooms {
    rooms: Mutex<HashMap<String, HashMap<String, mpsc::UnboundedSender<String>>>>,
}

impl LobbyRooms {
    pub fn new() -> Self {
        Self::default()
    }

    async fn join(&self, code: &str, user_id: &str, tx: mpsc::UnboundedSender<String>) {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(code.to_uppercase())
            .or_default()
            .insert(user_id.to_string(), tx);
    }

    async fn leave(&self, code: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().await;
        let code = code.to_uppercase();
        if let Some(room) = rooms.get_mut(&code) {
            room.remove(user_id);
            if room.is_empty() {
                rooms.remove(&code);
            }
        }
    }

    /// Fan a frame out to everyone in the room, pruning dead connections.
    pub async fn broadcast(&self, code: &str, message: &LobbyServerMessage) {
        let Ok(frame) = serde_json::to_string(message) else {
            return;
        };
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&code.to_uppercase()) {
            room.retain(|_, tx| tx.send(frame.clone()).is_ok());
        }
    }
}

/// `GET /ws/lobby/{code}?user_id=&display_name=`
pub async fn lobby_socket(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    Query(query): Query<SocketQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, code, query, state))
}

async fn handle_lobby_socket(
    socket: WebSocket,
    code: String,
    query: SocketQuery,
    state: AppState,
) {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        close_with_code(socket, "missing user_id").await;
        return;
    };

    metrics::websocket_connections_total();
    info!("lobby socket connected: lobby={code}, user={user_id}");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    state.lobby_rooms.join(&code, &user_id, tx.clone()).await;

    // The joining client gets the current lobby state straight away.
    match state.lobbies.get_by_code(&code).await {
        Ok(lobby) => send_json(&tx, &LobbyServerMessage::LobbyState { payload: lobby }),
        Err(e) => send_json(
            &tx,
            &LobbyServerMessage::Error {
                message: e.to_string(),
            },
        ),
    }

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                metrics::websocket_messages_received();
                match serde_json::from_str::<LobbyClientMessage>(&text) {
                    Ok(LobbyClientMessage::Ping) => send_json(&tx, &LobbyServerMessage::Pong),
                    Ok(LobbyClientMessage::Ready { ready }) => {
                        if state.lobbies.set_ready(&code, &user_id, ready).await.is_ok() {
                            state
                                .lobby_rooms
                                .broadcast(
                                    &code,
                                    &LobbyServerMessage::PlayerReady {
                                        user_id: user_id.clone(),
                                        ready,
                                    },
                                )
                                .await;
                        }
                    }
                    Err(_) => {}
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.lobby_rooms.leave(&code, &user_id).await;
    send_task.abort();
    info!("lobby socket disconnected: lobby={code}, user={user_id}");
}
