//! Wire types for the table socket: inbound commands, outbound envelopes,
//! and the per-viewer snapshot.

use crate::game::entities::Card;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Betting street. Wire names are fixed strings, independent of the
/// variant identifiers.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Stage {
    #[serde(rename = "preflop")]
    Preflop,
    #[serde(rename = "flop")]
    Flop,
    #[serde(rename = "turn")]
    Turn,
    #[serde(rename = "river")]
    River,
    #[serde(rename = "showdown")]
    Showdown,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Self::Preflop => Self::Flop,
            Self::Flop => Self::Turn,
            Self::Turn => Self::River,
            Self::River | Self::Showdown => Self::Showdown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Commands a seated player can issue inside an `action` frame.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCommand {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
    Rebuy,
    LeaveTable,
    ShowCards,
    Chat,
    StartHand,
    AdvanceStage,
}

impl ActionCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fold => "fold",
            Self::Check => "check",
            Self::Call => "call",
            Self::Bet => "bet",
            Self::Raise => "raise",
            Self::AllIn => "all_in",
            Self::Rebuy => "rebuy",
            Self::LeaveTable => "leave_table",
            Self::ShowCards => "show_cards",
            Self::Chat => "chat",
            Self::StartHand => "start_hand",
            Self::AdvanceStage => "advance_stage",
        }
    }
}

/// Payload of an inbound `action` frame.
#[derive(Clone, Debug, Deserialize)]
pub struct ActionPayload {
    pub command: ActionCommand,
    #[serde(default)]
    pub amount: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub show: Option<bool>,
}

impl ActionPayload {
    pub fn command(command: ActionCommand) -> Self {
        Self {
            command,
            amount: None,
            message: None,
            show: None,
        }
    }

    pub fn with_amount(command: ActionCommand, amount: u32) -> Self {
        Self {
            command,
            amount: Some(amount),
            message: None,
            show: None,
        }
    }
}

/// Frames clients send over the table socket.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Ping,
    Action { payload: ActionPayload },
}

/// One entry of the append-only table event log.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Action,
    System,
    Chat,
}

impl TableEvent {
    pub fn action(user_id: &str, action: &str, amount: Option<u32>, timestamp: i64) -> Self {
        Self {
            kind: EventKind::Action,
            user_id: Some(user_id.to_string()),
            action: Some(action.to_string()),
            amount,
            message: None,
            timestamp,
        }
    }

    pub fn system(message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: EventKind::System,
            user_id: None,
            action: None,
            amount: None,
            message: Some(message.into()),
            timestamp,
        }
    }

    pub fn chat(user_id: &str, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: EventKind::Chat,
            user_id: Some(user_id.to_string()),
            action: None,
            amount: None,
            message: Some(message.into()),
            timestamp,
        }
    }
}

/// One player row of a snapshot. `cards` is populated only for the viewer
/// themselves, or for everyone once the hand reaches showdown.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub user_id: String,
    pub display_name: String,
    pub seat: u32,
    pub stack: u32,
    pub has_folded: bool,
    pub cards: Vec<Card>,
    pub card_count: usize,
    pub has_acted: bool,
    pub is_small_blind: bool,
    pub is_big_blind: bool,
    pub blind_amount: u32,
    pub is_busted: bool,
    pub bust_deadline_ms: Option<i64>,
}

/// Summary of one side-pot level: its size and who can win it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidePotSummary {
    pub amount: u32,
    pub eligible: Vec<String>,
}

/// The per-viewer table projection sent in every `state` frame.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table_id: String,
    pub players: Vec<PlayerSnapshot>,
    pub community_cards: Vec<Card>,
    /// Central pot plus everything currently in front of players.
    pub pot: u32,
    pub stage: Stage,
    pub button_user_id: Option<String>,
    pub active_user_id: Option<String>,
    pub events: Vec<TableEvent>,
    pub current_bet: u32,
    pub player_bets: HashMap<String, u32>,
    pub turn_deadline_ms: Option<i64>,
    pub action_timeout_ms: u64,
    pub small_blind: u32,
    pub big_blind: u32,
    pub side_pot_summary: Vec<SidePotSummary>,
    pub min_raise_increment: u32,
    pub min_raise_total: u32,
}

/// How the hand ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WinType {
    Fold,
    Showdown,
}

/// A loser's row in `showdownComplete`, carrying their saved cards so the
/// client can offer show/muck.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoserReveal {
    pub player_id: String,
    pub nickname: String,
    pub cards: Vec<Card>,
    pub show_cards: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub table_id: String,
}

/// Frames the server sends over the table socket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Pong,
    Welcome {
        payload: WelcomePayload,
    },
    State {
        payload: TableSnapshot,
    },
    HandComplete {
        winners: Vec<String>,
        pot_amount: u32,
        pot_per_winner: u32,
        win_type: WinType,
    },
    ShowdownComplete {
        winner_id: Option<String>,
        winners: Vec<String>,
        losers: Vec<LoserReveal>,
    },
    PlayerCardsVisibility {
        player_id: String,
        nickname: String,
        show: bool,
        cards: Option<Vec<Card>>,
    },
    Error {
        message: String,
    },
}
