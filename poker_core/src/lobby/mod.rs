//! Private lobbies: invite codes, seating, and game-start handoff.

pub mod registry;

pub use registry::{
    GameMode, LeaveOutcome, Lobby, LobbyError, LobbyPlayer, LobbyRegistry, LobbyResult,
    LobbyStatus, LobbySummary,
};
