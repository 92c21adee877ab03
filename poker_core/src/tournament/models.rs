//! Tournament data model: modes, blind structures, players, tables, and
//! the payout math.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type TournamentId = String;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Tournament format. Wire names are fixed strings.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TournamentMode {
    /// Multi-table tournament.
    #[serde(rename = "tournament")]
    Tournament,
    /// Progressive knockout: part of each buy-in rides on the player's head.
    #[serde(rename = "bounty")]
    BountyHunter,
    /// Single-table tournament that starts when full.
    #[serde(rename = "sitgo")]
    SitAndGo,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TournamentStatus {
    #[serde(rename = "registering")]
    Registering,
    #[serde(rename = "late_reg")]
    LateReg,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "final_table")]
    FinalTable,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl TournamentStatus {
    pub fn is_open_for_registration(self) -> bool {
        matches!(self, Self::Registering | Self::LateReg)
    }

    pub fn is_over(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// Payout shape for small sit-and-gos.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SnGFormat {
    #[serde(rename = "winner_takes_all")]
    WinnerTakesAll,
    #[serde(rename = "top_2")]
    Top2Paid,
    #[serde(rename = "top_3")]
    Top3Paid,
    #[serde(rename = "double_or_nothing")]
    DoubleOrNothing,
}

/// One level of a blind structure.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindLevel {
    pub small_blind: u32,
    pub big_blind: u32,
    pub ante: u32,
    pub duration_secs: u64,
}

const fn level(small_blind: u32, big_blind: u32, ante: u32, duration_secs: u64) -> BlindLevel {
    BlindLevel {
        small_blind,
        big_blind,
        ante,
        duration_secs,
    }
}

/// 15-minute levels.
const STANDARD_LEVELS: &[BlindLevel] = &[
    level(25, 50, 0, 900),
    level(50, 100, 0, 900),
    level(75, 150, 0, 900),
    level(100, 200, 0, 900),
    level(150, 300, 25, 900),
    level(200, 400, 50, 900),
    level(300, 600, 75, 900),
    level(400, 800, 100, 900),
    level(600, 1200, 150, 900),
    level(800, 1600, 200, 900),
    level(1000, 2000, 250, 900),
    level(1500, 3000, 400, 900),
    level(2000, 4000, 500, 900),
    level(3000, 6000, 750, 900),
    level(4000, 8000, 1000, 900),
];

/// 5-minute levels.
const TURBO_LEVELS: &[BlindLevel] = &[
    level(10, 20, 0, 300),
    level(15, 30, 0, 300),
    level(25, 50, 0, 300),
    level(50, 100, 0, 300),
    level(75, 150, 15, 300),
    level(100, 200, 20, 300),
    level(150, 300, 30, 300),
    level(200, 400, 40, 300),
    level(300, 600, 60, 300),
    level(400, 800, 80, 300),
    level(600, 1200, 120, 300),
    level(800, 1600, 160, 300),
];

/// 3-minute levels.
const HYPER_TURBO_LEVELS: &[BlindLevel] = &[
    level(10, 20, 0, 180),
    level(20, 40, 0, 180),
    level(30, 60, 0, 180),
    level(50, 100, 10, 180),
    level(75, 150, 15, 180),
    level(100, 200, 20, 180),
    level(150, 300, 30, 180),
    level(200, 400, 40, 180),
    level(300, 600, 60, 180),
    level(500, 1000, 100, 180),
];

/// Named blind structure.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BlindStructure {
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "turbo")]
    Turbo,
    #[serde(rename = "hyper_turbo")]
    HyperTurbo,
}

impl BlindStructure {
    pub fn levels(self) -> &'static [BlindLevel] {
        match self {
            Self::Standard => STANDARD_LEVELS,
            Self::Turbo => TURBO_LEVELS,
            Self::HyperTurbo => HYPER_TURBO_LEVELS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Turbo => "turbo",
            Self::HyperTurbo => "hyper_turbo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::Standard),
            "turbo" => Some(Self::Turbo),
            "hyper_turbo" => Some(Self::HyperTurbo),
            _ => None,
        }
    }
}

/// A player registered in a tournament.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentPlayer {
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: String,
    pub chips: u32,
    /// Current bounty riding on this player (PKO only).
    pub bounty: f64,
    pub starting_bounty: f64,
    pub table_id: Option<String>,
    pub seat: u32,
    /// Finishing position; 0 while still in.
    pub position: u32,
    pub eliminated_at_ms: Option<i64>,
    pub eliminated_by: Option<String>,
    pub total_bounty_won: f64,
    pub registered_at_ms: i64,
}

impl TournamentPlayer {
    pub fn new(
        user_id: &str,
        username: Option<String>,
        display_name: &str,
        chips: u32,
        starting_bounty: f64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            username,
            display_name: display_name.to_string(),
            chips,
            bounty: starting_bounty,
            starting_bounty,
            table_id: None,
            seat: 0,
            position: 0,
            eliminated_at_ms: None,
            eliminated_by: None,
            total_bounty_won: 0.0,
            registered_at_ms: now_ms(),
        }
    }

    pub fn is_eliminated(&self) -> bool {
        self.eliminated_at_ms.is_some()
    }
}

/// A seat map within a tournament.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentTable {
    pub table_id: String,
    pub tournament_id: String,
    pub seats: BTreeMap<u32, Option<String>>,
    pub max_seats: u32,
    pub game_session_id: Option<String>,
    pub is_active: bool,
}

impl TournamentTable {
    pub fn new(table_id: &str, tournament_id: &str, max_seats: u32) -> Self {
        let seats = (1..=max_seats).map(|s| (s, None)).collect();
        Self {
            table_id: table_id.to_string(),
            tournament_id: tournament_id.to_string(),
            seats,
            max_seats,
            game_session_id: None,
            is_active: true,
        }
    }

    pub fn player_count(&self) -> usize {
        self.seats.values().filter(|s| s.is_some()).count()
    }

    pub fn empty_seats(&self) -> Vec<u32> {
        self.seats
            .iter()
            .filter_map(|(seat, occupant)| occupant.is_none().then_some(*seat))
            .collect()
    }

    pub fn occupants(&self) -> Vec<String> {
        self.seats.values().flatten().cloned().collect()
    }

    /// Seat a player at a random free seat. Returns the seat, or `None`
    /// when the table is full.
    pub fn add_player(&mut self, user_id: &str) -> Option<u32> {
        let empty = self.empty_seats();
        if empty.is_empty() {
            return None;
        }
        let seat = empty[rand::rng().random_range(0..empty.len())];
        self.seats.insert(seat, Some(user_id.to_string()));
        Some(seat)
    }

    pub fn remove_player(&mut self, user_id: &str) -> bool {
        for occupant in self.seats.values_mut() {
            if occupant.as_deref() == Some(user_id) {
                *occupant = None;
                return true;
            }
        }
        false
    }
}

/// A tournament instance. All mutation goes through the
/// [`crate::tournament::TournamentManager`].
#[derive(Clone, Debug)]
pub struct Tournament {
    pub tournament_id: TournamentId,
    pub name: String,
    pub mode: TournamentMode,
    /// Entry fee in currency units.
    pub buy_in: f64,
    pub starting_chips: u32,
    pub min_players: usize,
    pub max_players: usize,
    pub status: TournamentStatus,
    pub blind_structure: BlindStructure,
    pub current_level: usize,
    pub level_started_at_ms: i64,
    pub prize_pool: f64,
    /// Platform commission, percent of the pool.
    pub rake_percent: f64,
    /// Share of each buy-in that becomes the starting bounty (PKO).
    pub bounty_percent: f64,
    pub sng_format: SnGFormat,
    pub players_per_table: u32,
    pub created_at_ms: i64,
    pub late_reg_levels: usize,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
    pub players: HashMap<String, TournamentPlayer>,
    pub tables: HashMap<String, TournamentTable>,
    pub payouts: BTreeMap<u32, f64>,
    pub final_positions: HashMap<String, u32>,
}

impl Tournament {
    pub fn players_remaining(&self) -> usize {
        self.players.values().filter(|p| !p.is_eliminated()).count()
    }

    pub fn average_stack(&self) -> u32 {
        let active: Vec<&TournamentPlayer> =
            self.players.values().filter(|p| !p.is_eliminated()).collect();
        if active.is_empty() {
            return 0;
        }
        active.iter().map(|p| p.chips).sum::<u32>() / active.len() as u32
    }

    pub fn total_chips(&self) -> u64 {
        self.players.values().map(|p| p.chips as u64).sum()
    }

    pub fn current_blinds(&self) -> BlindLevel {
        let levels = self.blind_structure.levels();
        let idx = self.current_level.min(levels.len() - 1);
        levels[idx]
    }

    /// Seconds until the next blind level.
    pub fn time_to_next_level(&self) -> u64 {
        if self.level_started_at_ms == 0 {
            return 0;
        }
        let elapsed = (now_ms() - self.level_started_at_ms) / 1000;
        self.current_blinds()
            .duration_secs
            .saturating_sub(elapsed.max(0) as u64)
    }

    /// Payout per finishing position. The net pool is the prize pool after
    /// rake, and for PKO after carving out the bounty share.
    pub fn calculate_prize_structure(&mut self) -> BTreeMap<u32, f64> {
        let total_players = self.players.len();
        let mut net_pool = self.prize_pool * (1.0 - self.rake_percent / 100.0);
        if self.mode == TournamentMode::BountyHunter {
            net_pool *= 1.0 - self.bounty_percent / 100.0;
        }

        let itm_count = (total_players * 15 / 100).max(1);

        let mut payouts: BTreeMap<u32, f64> = BTreeMap::new();
        if total_players <= 6 {
            match self.sng_format {
                SnGFormat::WinnerTakesAll => {
                    payouts.insert(1, net_pool);
                }
                SnGFormat::Top2Paid => {
                    payouts.insert(1, net_pool * 0.65);
                    payouts.insert(2, net_pool * 0.35);
                }
                SnGFormat::Top3Paid => {
                    payouts.insert(1, net_pool * 0.50);
                    payouts.insert(2, net_pool * 0.30);
                    payouts.insert(3, net_pool * 0.20);
                }
                SnGFormat::DoubleOrNothing => {
                    let half = (total_players / 2).max(1);
                    let each = net_pool / half as f64;
                    for position in 1..=half as u32 {
                        payouts.insert(position, each);
                    }
                }
            }
            self.payouts = payouts.clone();
            return payouts;
        }

        if itm_count >= 15 {
            payouts.insert(1, net_pool * 0.30);
            payouts.insert(2, net_pool * 0.20);
            payouts.insert(3, net_pool * 0.15);
            for position in 4..7 {
                payouts.insert(position, net_pool * 0.08);
            }
            for position in 7..10 {
                payouts.insert(position, net_pool * 0.05);
            }
            let remaining = net_pool * (1.0 - 0.30 - 0.20 - 0.15 - 0.08 * 3.0 - 0.05 * 3.0);
            let tail = (itm_count - 9) as f64;
            for position in 10..=itm_count as u32 {
                payouts.insert(position, remaining / tail);
            }
        } else if itm_count >= 9 {
            payouts.insert(1, net_pool * 0.35);
            payouts.insert(2, net_pool * 0.22);
            payouts.insert(3, net_pool * 0.15);
            for position in 4..7 {
                payouts.insert(position, net_pool * 0.06);
            }
            for position in 7..=itm_count as u32 {
                payouts.insert(position, net_pool * 0.04);
            }
        } else if itm_count >= 3 {
            payouts.insert(1, net_pool * 0.50);
            payouts.insert(2, net_pool * 0.30);
            payouts.insert(3, net_pool * 0.20);
        } else {
            payouts.insert(1, net_pool);
        }

        self.payouts = payouts.clone();
        payouts
    }

    pub fn summary(&self, include_players: bool) -> TournamentSummary {
        let blinds = self.current_blinds();
        let mut players = None;
        if include_players {
            let mut sorted: Vec<&TournamentPlayer> = self.players.values().collect();
            // Leaderboard order: survivors first, big stacks on top.
            sorted.sort_by(|a, b| {
                (!b.is_eliminated(), b.chips).cmp(&(!a.is_eliminated(), a.chips))
            });
            players = Some(sorted.into_iter().cloned().collect());
        }
        TournamentSummary {
            tournament_id: self.tournament_id.clone(),
            name: self.name.clone(),
            mode: self.mode,
            buy_in: self.buy_in,
            starting_chips: self.starting_chips,
            min_players: self.min_players,
            max_players: self.max_players,
            status: self.status,
            blind_structure: self.blind_structure,
            current_level: self.current_level,
            current_blinds: blinds,
            time_to_next_level: self.time_to_next_level(),
            prize_pool: self.prize_pool,
            rake_percent: self.rake_percent,
            bounty_percent: if self.mode == TournamentMode::BountyHunter {
                self.bounty_percent
            } else {
                0.0
            },
            sng_format: (self.mode == TournamentMode::SitAndGo).then_some(self.sng_format),
            players_per_table: self.players_per_table,
            registered_count: self.players.len(),
            players_remaining: self.players_remaining(),
            average_stack: self.average_stack(),
            total_chips: self.total_chips(),
            created_at_ms: self.created_at_ms,
            started_at_ms: self.started_at_ms,
            finished_at_ms: self.finished_at_ms,
            late_reg_levels: self.late_reg_levels,
            tables_count: self.tables.len(),
            players,
            payouts: include_players.then(|| self.payouts.clone()),
        }
    }
}

/// Serializable projection of a tournament for clients.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSummary {
    pub tournament_id: TournamentId,
    pub name: String,
    pub mode: TournamentMode,
    pub buy_in: f64,
    pub starting_chips: u32,
    pub min_players: usize,
    pub max_players: usize,
    pub status: TournamentStatus,
    pub blind_structure: BlindStructure,
    pub current_level: usize,
    pub current_blinds: BlindLevel,
    pub time_to_next_level: u64,
    pub prize_pool: f64,
    pub rake_percent: f64,
    pub bounty_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sng_format: Option<SnGFormat>,
    pub players_per_table: u32,
    pub registered_count: usize,
    pub players_remaining: usize,
    pub average_stack: u32,
    pub total_chips: u64,
    pub created_at_ms: i64,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
    pub late_reg_levels: usize,
    pub tables_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<TournamentPlayer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payouts: Option<BTreeMap<u32, f64>>,
}
