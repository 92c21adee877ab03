//! # Poker Core
//!
//! The authoritative game library for a multiplayer Texas Hold'em service.
//!
//! This crate holds everything the server needs that is not HTTP: the deck
//! and hand evaluator, the per-table engine that runs No-Limit Hold'em hands
//! under a mutex, the table directory, the tournament controller (MTT,
//! progressive-knockout bounty, and sit-and-go modes), the private-lobby
//! registry, the in-memory profile store, and the Telegram init-data
//! identity hook.
//!
//! ## Architecture
//!
//! Each [`table::TableSession`] owns its state behind a `tokio::sync::Mutex`.
//! Every external mutation happens under that lock and ends with a fan-out
//! of per-viewer snapshots to the connected sockets. Timers (action timeout,
//! street transition, new-hand delay, bustout) are spawned tasks that sleep,
//! re-acquire the lock, and check a guard captured at arm time; a stale
//! guard means the state moved on and the task exits without touching it.
//!
//! The [`tournament::TournamentManager`] owns tournaments and their blind
//! clocks; registries are plain values meant to be wrapped in `Arc` by the
//! server rather than globals.

pub mod auth;
pub mod game;
pub mod lobby;
pub mod profile;
pub mod table;
pub mod tournament;

pub use game::{
    constants::{self, BIG_BLIND, MAX_PLAYERS, SMALL_BLIND, START_BALANCE},
    entities::{Card, Deck, Suit},
    eval,
};
pub use table::{TableManager, TableSession};
pub use tournament::TournamentManager;
