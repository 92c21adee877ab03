//! The tournament controller: registration, seating, the blind clock,
//! eliminations, rebalancing, and payouts.

use super::models::{
    BlindStructure, SnGFormat, Tournament, TournamentId, TournamentMode, TournamentPlayer,
    TournamentStatus, TournamentSummary, TournamentTable,
};
use chrono::Utc;
use log::{debug, info};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("tournament not found: {0}")]
    NotFound(TournamentId),

    #[error("tournament is full")]
    TournamentFull,

    #[error("registration is closed")]
    RegistrationClosed,

    #[error("tournament already started")]
    AlreadyStarted,

    #[error("not registered")]
    NotRegistered,

    #[error("player not found")]
    PlayerNotFound,

    #[error("player already eliminated")]
    AlreadyEliminated,

    #[error("need at least {needed} players, have {current}")]
    InsufficientPlayers { needed: usize, current: usize },
}

pub type TournamentResult<T> = Result<T, TournamentError>;

/// What an elimination paid the eliminator in a bounty tournament.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BountyAward {
    pub cash_bounty: f64,
    pub added_bounty: f64,
    pub new_bounty: f64,
    pub eliminated_player: String,
    pub eliminator_player: String,
}

/// Parameters for [`TournamentManager::create_tournament`].
#[derive(Clone, Debug)]
pub struct TournamentSpec {
    pub name: String,
    pub mode: TournamentMode,
    pub buy_in: f64,
    pub starting_chips: u32,
    pub min_players: usize,
    pub max_players: usize,
    pub blind_structure: BlindStructure,
    pub late_reg_levels: usize,
    pub rake_percent: f64,
    pub bounty_percent: f64,
    pub sng_format: SnGFormat,
    pub players_per_table: u32,
}

impl Default for TournamentSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: TournamentMode::Tournament,
            buy_in: 10.0,
            starting_chips: 10_000,
            min_players: 18,
            max_players: 180,
            blind_structure: BlindStructure::Standard,
            late_reg_levels: 3,
            rake_percent: 10.0,
            bounty_percent: 50.0,
            sng_format: SnGFormat::Top3Paid,
            players_per_table: 9,
        }
    }
}

#[derive(Default)]
struct Registry {
    tournaments: HashMap<TournamentId, Tournament>,
    player_index: HashMap<String, Vec<TournamentId>>,
}

/// Owns every tournament and its blind clock. Construct with
/// [`TournamentManager::new`]; the returned `Arc` is the shared handle.
pub struct TournamentManager {
    weak: Weak<Self>,
    inner: RwLock<Registry>,
    clocks: Mutex<HashMap<TournamentId, JoinHandle<()>>>,
}

impl TournamentManager {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            inner: RwLock::new(Registry::default()),
            clocks: Mutex::new(HashMap::new()),
        })
    }

    // --- creation ---

    pub async fn create_tournament(&self, mut spec: TournamentSpec) -> TournamentId {
        if spec.mode == TournamentMode::SitAndGo {
            // A sit-and-go is a single table that fires when full.
            spec.min_players = spec.players_per_table as usize;
            spec.max_players = spec.players_per_table as usize;
            spec.late_reg_levels = 0;
        }
        let mode_name = match spec.mode {
            TournamentMode::Tournament => "tournament",
            TournamentMode::BountyHunter => "bounty",
            TournamentMode::SitAndGo => "sitgo",
        };
        let tournament_id = format!(
            "t_{}_{}_{}",
            mode_name,
            Utc::now().timestamp(),
            rand::rng().random_range(1000..10000)
        );
        let tournament = Tournament {
            tournament_id: tournament_id.clone(),
            name: spec.name,
            mode: spec.mode,
            buy_in: spec.buy_in,
            starting_chips: spec.starting_chips,
            min_players: spec.min_players,
            max_players: spec.max_players,
            status: TournamentStatus::Registering,
            blind_structure: spec.blind_structure,
            current_level: 0,
            level_started_at_ms: 0,
            prize_pool: 0.0,
            rake_percent: spec.rake_percent,
            bounty_percent: spec.bounty_percent,
            sng_format: spec.sng_format,
            players_per_table: spec.players_per_table,
            created_at_ms: now_ms(),
            late_reg_levels: spec.late_reg_levels,
            started_at_ms: None,
            finished_at_ms: None,
            players: HashMap::new(),
            tables: HashMap::new(),
            payouts: BTreeMap::new(),
            final_positions: HashMap::new(),
        };
        info!(
            "created {} tournament '{}' ({})",
            mode_name, tournament.name, tournament_id
        );
        let mut registry = self.inner.write().await;
        registry.tournaments.insert(tournament_id.clone(), tournament);
        tournament_id
    }

    pub async fn create_sit_and_go(
        &self,
        buy_in: f64,
        players_per_table: u32,
        sng_format: SnGFormat,
        blind_structure: BlindStructure,
        starting_chips: u32,
    ) -> TournamentId {
        self.create_tournament(TournamentSpec {
            name: format!("Sit & Go ${buy_in} ({players_per_table}-max)"),
            mode: TournamentMode::SitAndGo,
            buy_in,
            starting_chips,
            blind_structure,
            sng_format,
            players_per_table,
            ..TournamentSpec::default()
        })
        .await
    }

    pub async fn create_bounty_tournament(
        &self,
        name: String,
        buy_in: f64,
        bounty_percent: f64,
        min_players: usize,
        max_players: usize,
    ) -> TournamentId {
        self.create_tournament(TournamentSpec {
            name,
            mode: TournamentMode::BountyHunter,
            buy_in,
            bounty_percent,
            min_players,
            max_players,
            late_reg_levels: 4,
            ..TournamentSpec::default()
        })
        .await
    }

    // --- registration ---

    /// Register a player. Re-registering is a no-op; a sit-and-go starts
    /// automatically once it fills.
    pub async fn register_player(
        &self,
        tournament_id: &str,
        user_id: &str,
        username: Option<String>,
        display_name: &str,
    ) -> TournamentResult<()> {
        let should_start = {
            let mut registry = self.inner.write().await;
            let tournament = registry
                .tournaments
                .get_mut(tournament_id)
                .ok_or_else(|| TournamentError::NotFound(tournament_id.to_string()))?;

            if !tournament.status.is_open_for_registration() {
                return Err(TournamentError::RegistrationClosed);
            }
            if tournament.players.len() >= tournament.max_players {
                return Err(TournamentError::TournamentFull);
            }
            if tournament.players.contains_key(user_id) {
                return Ok(());
            }

            let starting_bounty = if tournament.mode == TournamentMode::BountyHunter {
                tournament.buy_in * (tournament.bounty_percent / 100.0)
            } else {
                0.0
            };
            tournament.players.insert(
                user_id.to_string(),
                TournamentPlayer::new(
                    user_id,
                    username,
                    display_name,
                    tournament.starting_chips,
                    starting_bounty,
                ),
            );
            tournament.prize_pool += tournament.buy_in;
            info!("tournament {}: {} registered", tournament_id, user_id);

            let should_start = tournament.mode == TournamentMode::SitAndGo
                && tournament.players.len() >= tournament.max_players;

            registry
                .player_index
                .entry(user_id.to_string())
                .or_default()
                .push(tournament_id.to_string());
            should_start
        };

        if should_start {
            self.start_tournament(tournament_id).await?;
        }
        Ok(())
    }

    /// Remove a registration and refund the buy-in. Only possible before
    /// the tournament starts.
    pub async fn unregister_player(
        &self,
        tournament_id: &str,
        user_id: &str,
    ) -> TournamentResult<()> {
        let mut registry = self.inner.write().await;
        let tournament = registry
            .tournaments
            .get_mut(tournament_id)
            .ok_or_else(|| TournamentError::NotFound(tournament_id.to_string()))?;
        if tournament.status != TournamentStatus::Registering {
            return Err(TournamentError::AlreadyStarted);
        }
        if tournament.players.remove(user_id).is_none() {
            return Err(TournamentError::NotRegistered);
        }
        tournament.prize_pool -= tournament.buy_in;
        if let Some(entries) = registry.player_index.get_mut(user_id) {
            entries.retain(|id| id != tournament_id);
        }
        info!("tournament {}: {} unregistered", tournament_id, user_id);
        Ok(())
    }

    // --- lifecycle ---

    /// Start: compute the payout schedule, create tables, seat everyone,
    /// and kick off the blind clock.
    pub async fn start_tournament(&self, tournament_id: &str) -> TournamentResult<()> {
        {
            let mut registry = self.inner.write().await;
            let tournament = registry
                .tournaments
                .get_mut(tournament_id)
                .ok_or_else(|| TournamentError::NotFound(tournament_id.to_string()))?;
            if tournament.status != TournamentStatus::Registering {
                return Err(TournamentError::AlreadyStarted);
            }
            if tournament.players.len() < tournament.min_players {
                return Err(TournamentError::InsufficientPlayers {
                    needed: tournament.min_players,
                    current: tournament.players.len(),
                });
            }
            tournament.status = if tournament.late_reg_levels > 0 {
                TournamentStatus::LateReg
            } else {
                TournamentStatus::Running
            };
            let now = now_ms();
            tournament.started_at_ms = Some(now);
            tournament.level_started_at_ms = now;
            tournament.current_level = 0;
            tournament.calculate_prize_structure();
            seat_players(tournament);
            info!(
                "tournament {}: started with {} players on {} tables",
                tournament_id,
                tournament.players.len(),
                tournament.tables.len()
            );
        }
        self.start_blind_clock(tournament_id).await;
        Ok(())
    }

    async fn start_blind_clock(&self, tournament_id: &str) {
        let Some(manager) = self.weak.upgrade() else {
            return;
        };
        let tid = tournament_id.to_string();
        let handle = tokio::spawn(async move {
            loop {
                let duration = {
                    let registry = manager.inner.read().await;
                    let Some(tournament) = registry.tournaments.get(&tid) else {
                        break;
                    };
                    if tournament.status.is_over() {
                        break;
                    }
                    tournament.current_blinds().duration_secs
                };
                tokio::time::sleep(Duration::from_secs(duration)).await;

                let mut registry = manager.inner.write().await;
                let Some(tournament) = registry.tournaments.get_mut(&tid) else {
                    break;
                };
                if tournament.status.is_over() {
                    break;
                }
                tournament.current_level += 1;
                tournament.level_started_at_ms = now_ms();
                if tournament.current_level > tournament.late_reg_levels
                    && tournament.status == TournamentStatus::LateReg
                {
                    tournament.status = TournamentStatus::Running;
                }
                let blinds = tournament.current_blinds();
                info!(
                    "tournament {}: level {} - blinds {}/{} (ante {})",
                    tid,
                    tournament.current_level,
                    blinds.small_blind,
                    blinds.big_blind,
                    blinds.ante
                );
            }
        });
        let mut clocks = self.clocks.lock().await;
        clocks.insert(tournament_id.to_string(), handle);
    }

    /// Record an elimination. Returns the bounty award when the tournament
    /// is a progressive knockout: half the eliminated player's bounty is
    /// paid out in cash and half lands on the eliminator's own head.
    pub async fn eliminate_player(
        &self,
        tournament_id: &str,
        eliminated_id: &str,
        eliminator_id: &str,
    ) -> TournamentResult<Option<BountyAward>> {
        let (award, should_finish) = {
            let mut registry = self.inner.write().await;
            let tournament = registry
                .tournaments
                .get_mut(tournament_id)
                .ok_or_else(|| TournamentError::NotFound(tournament_id.to_string()))?;

            if !tournament.players.contains_key(eliminated_id)
                || !tournament.players.contains_key(eliminator_id)
            {
                return Err(TournamentError::PlayerNotFound);
            }
            if tournament.players[eliminated_id].is_eliminated() {
                return Err(TournamentError::AlreadyEliminated);
            }

            let remaining = tournament.players_remaining() as u32;
            let eliminated_bounty = tournament.players[eliminated_id].bounty;
            let eliminated_name = tournament.players[eliminated_id].display_name.clone();
            let eliminated_table = tournament.players[eliminated_id].table_id.clone();

            let mut award = None;
            if tournament.mode == TournamentMode::BountyHunter && eliminated_bounty > 0.0 {
                let cash_bounty = eliminated_bounty / 2.0;
                let added_bounty = eliminated_bounty / 2.0;
                let eliminator = tournament
                    .players
                    .get_mut(eliminator_id)
                    .ok_or(TournamentError::PlayerNotFound)?;
                eliminator.total_bounty_won += cash_bounty;
                eliminator.bounty += added_bounty;
                award = Some(BountyAward {
                    cash_bounty,
                    added_bounty,
                    new_bounty: eliminator.bounty,
                    eliminated_player: eliminated_name.clone(),
                    eliminator_player: eliminator.display_name.clone(),
                });
            }

            {
                let eliminated = tournament
                    .players
                    .get_mut(eliminated_id)
                    .ok_or(TournamentError::PlayerNotFound)?;
                eliminated.eliminated_at_ms = Some(now_ms());
                eliminated.eliminated_by = Some(eliminator_id.to_string());
                eliminated.position = remaining;
                eliminated.table_id = None;
                eliminated.seat = 0;
            }
            tournament
                .final_positions
                .insert(eliminated_id.to_string(), remaining);
            if let Some(table_id) = eliminated_table
                && let Some(table) = tournament.tables.get_mut(&table_id)
            {
                table.remove_player(eliminated_id);
            }

            if let Some(payout) = tournament.payouts.get(&remaining) {
                info!(
                    "tournament {}: {} finished #{}, wins {}",
                    tournament_id, eliminated_name, remaining, payout
                );
            }

            let remaining_now = tournament.players_remaining();
            let should_finish = remaining_now == 1;
            if !should_finish {
                if remaining_now <= tournament.players_per_table as usize {
                    tournament.status = TournamentStatus::FinalTable;
                    consolidate_final_table(tournament);
                } else {
                    balance_tables(tournament);
                }
            }
            info!(
                "tournament {}: {} eliminated by {}, position #{}",
                tournament_id, eliminated_id, eliminator_id, remaining
            );
            (award, should_finish)
        };

        if should_finish {
            self.finish_tournament(tournament_id).await?;
        }
        Ok(award)
    }

    /// Mark the tournament finished, record position 1 for the survivor,
    /// and cancel the blind clock.
    pub async fn finish_tournament(&self, tournament_id: &str) -> TournamentResult<()> {
        {
            let mut registry = self.inner.write().await;
            let tournament = registry
                .tournaments
                .get_mut(tournament_id)
                .ok_or_else(|| TournamentError::NotFound(tournament_id.to_string()))?;
            tournament.status = TournamentStatus::Finished;
            tournament.finished_at_ms = Some(now_ms());
            let winner = tournament
                .players
                .values()
                .find(|p| !p.is_eliminated())
                .map(|p| p.user_id.clone());
            if let Some(winner_id) = winner {
                if let Some(player) = tournament.players.get_mut(&winner_id) {
                    player.position = 1;
                }
                tournament.final_positions.insert(winner_id.clone(), 1);
                info!("tournament {}: finished, winner {}", tournament_id, winner_id);
            }
        }
        self.cancel_clock(tournament_id).await;
        Ok(())
    }

    pub async fn cancel_tournament(&self, tournament_id: &str) -> TournamentResult<()> {
        {
            let mut registry = self.inner.write().await;
            let tournament = registry
                .tournaments
                .get_mut(tournament_id)
                .ok_or_else(|| TournamentError::NotFound(tournament_id.to_string()))?;
            if tournament.status == TournamentStatus::Finished {
                return Err(TournamentError::AlreadyStarted);
            }
            tournament.status = TournamentStatus::Cancelled;
            tournament.finished_at_ms = Some(now_ms());
        }
        self.cancel_clock(tournament_id).await;
        Ok(())
    }

    async fn cancel_clock(&self, tournament_id: &str) {
        let mut clocks = self.clocks.lock().await;
        if let Some(handle) = clocks.remove(tournament_id) {
            handle.abort();
            debug!("tournament {}: blind clock cancelled", tournament_id);
        }
    }

    // --- queries ---

    pub async fn summary(&self, tournament_id: &str) -> Option<TournamentSummary> {
        let registry = self.inner.read().await;
        registry
            .tournaments
            .get(tournament_id)
            .map(|t| t.summary(true))
    }

    pub async fn list_active(&self, mode: Option<TournamentMode>) -> Vec<TournamentSummary> {
        let registry = self.inner.read().await;
        let mut tournaments: Vec<&Tournament> = registry
            .tournaments
            .values()
            .filter(|t| !t.status.is_over())
            .filter(|t| mode.is_none_or(|m| t.mode == m))
            .collect();
        tournaments.sort_by_key(|t| std::cmp::Reverse(t.created_at_ms));
        tournaments.into_iter().map(|t| t.summary(false)).collect()
    }

    pub async fn list_registering(&self, mode: Option<TournamentMode>) -> Vec<TournamentSummary> {
        let registry = self.inner.read().await;
        let mut tournaments: Vec<&Tournament> = registry
            .tournaments
            .values()
            .filter(|t| t.status.is_open_for_registration())
            .filter(|t| mode.is_none_or(|m| t.mode == m))
            .collect();
        tournaments.sort_by_key(|t| std::cmp::Reverse(t.created_at_ms));
        tournaments.into_iter().map(|t| t.summary(false)).collect()
    }

    pub async fn player_tournaments(&self, user_id: &str) -> Vec<TournamentSummary> {
        let registry = self.inner.read().await;
        registry
            .player_index
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| registry.tournaments.get(id))
                    .map(|t| t.summary(false))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Top stacks still in the tournament.
    pub async fn leaderboard(&self, tournament_id: &str, limit: usize) -> Vec<TournamentPlayer> {
        let registry = self.inner.read().await;
        let Some(tournament) = registry.tournaments.get(tournament_id) else {
            return Vec::new();
        };
        let mut active: Vec<&TournamentPlayer> = tournament
            .players
            .values()
            .filter(|p| !p.is_eliminated())
            .collect();
        active.sort_by_key(|p| std::cmp::Reverse(p.chips));
        active.into_iter().take(limit).cloned().collect()
    }

    pub async fn tournament_count(&self) -> usize {
        self.inner.read().await.tournaments.len()
    }

    /// Read a full tournament value, mainly for tests and diagnostics.
    pub async fn inspect(&self, tournament_id: &str) -> Option<Tournament> {
        self.inner.read().await.tournaments.get(tournament_id).cloned()
    }
}

/// Shuffle registrants and deal them round-robin onto `ceil(N / seats)`
/// tables, each landing on a random free seat.
fn seat_players(tournament: &mut Tournament) {
    let mut ids: Vec<String> = tournament.players.keys().cloned().collect();
    ids.shuffle(&mut rand::rng());

    let seats_per_table = tournament.players_per_table as usize;
    let num_tables = ids.len().div_ceil(seats_per_table);
    let table_ids: Vec<String> = (1..=num_tables)
        .map(|i| format!("{}_table_{}", tournament.tournament_id, i))
        .collect();
    for table_id in &table_ids {
        tournament.tables.insert(
            table_id.clone(),
            TournamentTable::new(table_id, &tournament.tournament_id, tournament.players_per_table),
        );
    }

    for (i, user_id) in ids.iter().enumerate() {
        let table_id = &table_ids[i % table_ids.len()];
        let seat = tournament
            .tables
            .get_mut(table_id)
            .and_then(|t| t.add_player(user_id));
        if let (Some(seat), Some(player)) = (seat, tournament.players.get_mut(user_id)) {
            player.table_id = Some(table_id.clone());
            player.seat = seat;
        }
    }
}

fn active_table_ids(tournament: &Tournament) -> Vec<String> {
    tournament
        .tables
        .values()
        .filter(|t| t.is_active)
        .map(|t| t.table_id.clone())
        .collect()
}

/// Move one player onto the emptiest active table that still has a seat.
fn move_player_to_other_table(tournament: &mut Tournament, user_id: &str) {
    let Some(player_table) = tournament
        .players
        .get(user_id)
        .and_then(|p| p.table_id.clone())
    else {
        return;
    };
    let target = tournament
        .tables
        .values()
        .filter(|t| {
            t.is_active
                && t.table_id != player_table
                && t.player_count() < t.max_seats as usize
        })
        .min_by_key(|t| t.player_count())
        .map(|t| t.table_id.clone());
    let Some(target_id) = target else {
        return;
    };
    if let Some(table) = tournament.tables.get_mut(&player_table) {
        table.remove_player(user_id);
    }
    let seat = tournament
        .tables
        .get_mut(&target_id)
        .and_then(|t| t.add_player(user_id));
    if let (Some(seat), Some(player)) = (seat, tournament.players.get_mut(user_id)) {
        player.table_id = Some(target_id.clone());
        player.seat = seat;
        debug!("moved {} to {}", user_id, target_id);
    }
}

/// Close short-handed tables and level the rest until the player spread
/// across active tables is at most one.
fn balance_tables(tournament: &mut Tournament) {
    let mut active = active_table_ids(tournament);
    if active.len() <= 1 {
        return;
    }

    // Break tables that fell under three players, provided the rest of
    // the field has the seats to absorb them.
    for table_id in active.clone() {
        if active.len() <= 1 {
            break;
        }
        let count = tournament
            .tables
            .get(&table_id)
            .map_or(0, |t| t.player_count());
        let free_elsewhere: usize = tournament
            .tables
            .values()
            .filter(|t| t.is_active && t.table_id != table_id)
            .map(|t| (t.max_seats as usize).saturating_sub(t.player_count()))
            .sum();
        if count < 3 && free_elsewhere >= count {
            let occupants = tournament
                .tables
                .get(&table_id)
                .map(|t| t.occupants())
                .unwrap_or_default();
            if let Some(table) = tournament.tables.get_mut(&table_id) {
                table.is_active = false;
            }
            active.retain(|id| id != &table_id);
            for user_id in occupants {
                move_player_to_other_table(tournament, &user_id);
            }
        }
    }

    let active = active_table_ids(tournament);
    if active.len() <= 1 {
        return;
    }
    let total = tournament.players_remaining();
    let target = total / active.len();
    for table_id in active {
        loop {
            let count = tournament
                .tables
                .get(&table_id)
                .map_or(0, |t| t.player_count());
            if count <= target + 1 {
                break;
            }
            let Some(user_id) = tournament
                .tables
                .get(&table_id)
                .and_then(|t| t.occupants().into_iter().next())
            else {
                break;
            };
            move_player_to_other_table(tournament, &user_id);
            let after = tournament
                .tables
                .get(&table_id)
                .map_or(0, |t| t.player_count());
            if after == count {
                // No seat anywhere else; leave the table as-is.
                break;
            }
        }
    }
}

/// Collapse the remaining field onto a single table.
fn consolidate_final_table(tournament: &mut Tournament) {
    let active = active_table_ids(tournament);
    if active.len() <= 1 {
        return;
    }
    let Some(final_id) = active
        .iter()
        .max_by_key(|id| tournament.tables.get(*id).map_or(0, |t| t.player_count()))
        .cloned()
    else {
        return;
    };
    for table_id in active {
        if table_id == final_id {
            continue;
        }
        let occupants = tournament
            .tables
            .get(&table_id)
            .map(|t| t.occupants())
            .unwrap_or_default();
        if let Some(table) = tournament.tables.get_mut(&table_id) {
            table.is_active = false;
        }
        for user_id in occupants {
            if let Some(table) = tournament.tables.get_mut(&table_id) {
                table.remove_player(&user_id);
            }
            let seat = tournament
                .tables
                .get_mut(&final_id)
                .and_then(|t| t.add_player(&user_id));
            if let (Some(seat), Some(player)) = (seat, tournament.players.get_mut(&user_id)) {
                player.table_id = Some(final_id.clone());
                player.seat = seat;
            }
        }
    }
    info!(
        "tournament {}: final table is {}",
        tournament.tournament_id, final_id
    );
}
