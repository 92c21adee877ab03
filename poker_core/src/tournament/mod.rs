//! Tournaments: MTT, progressive-knockout bounty, and sit-and-go formats.

pub mod manager;
pub mod models;

pub use manager::{
    BountyAward, TournamentError, TournamentManager, TournamentResult, TournamentSpec,
};
pub use models::{
    BlindLevel, BlindStructure, SnGFormat, Tournament, TournamentMode, TournamentPlayer,
    TournamentStatus, TournamentSummary, TournamentTable,
};
