//! The per-table No-Limit Hold'em engine.
//!
//! A [`TableSession`] owns all table state behind a `tokio::sync::Mutex`.
//! Every external mutation runs under that lock and ends with a fan-out of
//! per-viewer snapshots to the connected sockets; a failed send evicts the
//! connection. Timers are spawned tasks that sleep, re-acquire the lock,
//! and check a guard captured when they were armed — if the guard no longer
//! matches, the state has moved on and the task exits without mutating.

use super::messages::{
    ActionCommand, ActionPayload, LoserReveal, PlayerSnapshot, ServerMessage, SidePotSummary,
    Stage, TableEvent, TableSnapshot, WinType,
};
use crate::game::constants::{
    ACTION_TIMEOUT, BETTING_ROUND_DELAY, BIG_BLIND, BUSTOUT_TIMEOUT, EVENT_LOG_WINDOW,
    MAX_PLAYERS, SHOWDOWN_DELAY, SMALL_BLIND, START_BALANCE,
};
use crate::game::entities::{Card, Deck};
use crate::game::eval::{self, HandValue};
use chrono::Utc;
use log::{debug, info, warn};
use std::cmp::max;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, mpsc};

/// Outbound half of a table connection: pre-serialized JSON frames.
pub type ConnectionSender = mpsc::UnboundedSender<String>;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Static table parameters.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub max_players: usize,
    pub small_blind: u32,
    pub big_blind: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            small_blind: SMALL_BLIND,
            big_blind: BIG_BLIND,
        }
    }
}

/// One seat at the table.
#[derive(Clone, Debug)]
pub struct TablePlayer {
    pub user_id: String,
    pub display_name: String,
    pub seat: u32,
    pub stack: u32,
    pub cards: Vec<Card>,
    pub has_folded: bool,
    pub has_acted: bool,
    pub is_small_blind: bool,
    pub is_big_blind: bool,
    pub blind_amount: u32,
    pub is_all_in: bool,
    pub is_busted: bool,
    pub bust_deadline_ms: Option<i64>,
}

impl TablePlayer {
    fn new(user_id: &str, display_name: &str, seat: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            seat,
            stack: START_BALANCE,
            cards: Vec::with_capacity(2),
            has_folded: false,
            has_acted: false,
            is_small_blind: false,
            is_big_blind: false,
            blind_amount: 0,
            is_all_in: false,
            is_busted: false,
            bust_deadline_ms: None,
        }
    }
}

/// Input row for side-pot construction: what a player put into the hand
/// and whether they can still win.
#[derive(Clone, Debug)]
pub struct PotContribution {
    pub user_id: String,
    pub contributed: u32,
    pub eligible: bool,
}

/// Partition cumulative hand contributions into pot levels.
///
/// Each level takes the smallest outstanding contribution among eligible
/// players from everyone still funding, and is winnable only by the
/// eligible players at that depth. Ineligible (folded or departed)
/// contributors fund levels without ever appearing in an eligibility set.
pub fn build_side_pots(rows: &[PotContribution]) -> Vec<SidePotSummary> {
    let mut remaining: Vec<(usize, u32)> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| (row.contributed > 0).then_some((i, row.contributed)))
        .collect();
    let mut pots = Vec::new();
    loop {
        let eligible: Vec<usize> = remaining
            .iter()
            .filter(|(i, amount)| *amount > 0 && rows[*i].eligible)
            .map(|(i, _)| *i)
            .collect();
        if eligible.is_empty() {
            break;
        }
        let Some(min_contribution) = remaining
            .iter()
            .filter(|(i, amount)| *amount > 0 && eligible.contains(i))
            .map(|(_, amount)| *amount)
            .min()
        else {
            break;
        };
        // Every outstanding contributor funds the level, each capped at
        // the level size so a short folded stack cannot inflate the pot.
        let amount: u32 = remaining
            .iter()
            .map(|(_, a)| (*a).min(min_contribution))
            .sum();
        pots.push(SidePotSummary {
            amount,
            eligible: eligible.iter().map(|i| rows[*i].user_id.clone()).collect(),
        });
        for (_, amount) in remaining.iter_mut() {
            *amount = amount.saturating_sub(min_contribution);
        }
        if remaining.iter().all(|(_, a)| *a == 0) {
            break;
        }
    }
    pots
}

/// Deferred timer arms collected during a mutation and spawned once the
/// mutation is done. Each carries the guard its task checks on wake-up.
#[derive(Debug)]
enum TimerEffect {
    ActionTimer { user_id: String, deadline_ms: i64 },
    RoundTransition { stage: Stage, seq: u64 },
    NewHand { seq: u64 },
    Bustout { user_id: String, deadline_ms: i64 },
}

struct TableInner {
    table_id: String,
    config: TableConfig,
    players: HashMap<String, TablePlayer>,
    connections: HashMap<String, ConnectionSender>,
    community_cards: Vec<Card>,
    /// Chips already swept from completed streets.
    pot: u32,
    stage: Stage,
    button_user_id: Option<String>,
    active_user_id: Option<String>,
    deck: Deck,
    event_log: Vec<TableEvent>,
    current_bet: u32,
    /// Per-player contribution on the current street.
    player_bets: HashMap<String, u32>,
    /// Per-player cumulative contribution for the whole hand.
    hand_contributions: HashMap<String, u32>,
    pots: Vec<SidePotSummary>,
    last_raise_amount: u32,
    pending_auto_showdown: bool,
    turn_deadline_ms: Option<i64>,
    transition_seq: u64,
    transition_armed: bool,
    new_hand_seq: u64,
    new_hand_armed: bool,
    showdown_card_decisions: HashMap<String, bool>,
    showdown_saved_cards: HashMap<String, Vec<Card>>,
    timers: Vec<TimerEffect>,
    outbox: Vec<ServerMessage>,
}

/// A table with its connections. Construct with [`TableSession::new`];
/// the returned `Arc` is the handle everything else clones.
pub struct TableSession {
    id: String,
    weak: Weak<TableSession>,
    inner: Mutex<TableInner>,
}

impl TableSession {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Self::with_config(id, TableConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: TableConfig) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|weak| Self {
            id: id.clone(),
            weak: weak.clone(),
            inner: Mutex::new(TableInner::new(id, config)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach a viewer. A returning user gets their socket swapped in place;
    /// a new user takes the lowest free seat with the starting stack, and
    /// the hand auto-starts once two non-busted players are seated while the
    /// table is quiescent.
    pub async fn connect(&self, user_id: &str, display_name: &str, sender: ConnectionSender) {
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        if inner.players.contains_key(user_id) {
            inner.connections.insert(user_id.to_string(), sender);
        } else {
            let Some(seat) = inner.next_free_seat() else {
                if let Ok(frame) = serde_json::to_string(&ServerMessage::Error {
                    message: "table is full".to_string(),
                }) {
                    let _ = sender.send(frame);
                }
                return;
            };
            info!(
                "table {}: {} ({}) seated at {}",
                inner.table_id, user_id, display_name, seat
            );
            let mut player = TablePlayer::new(user_id, display_name, seat);
            // Joining mid-hand means sitting this one out.
            if inner.players.values().any(|p| !p.cards.is_empty()) {
                player.has_folded = true;
            }
            inner.players.insert(user_id.to_string(), player);
            inner.connections.insert(user_id.to_string(), sender);
            if inner.players.len() == 1 {
                inner.button_user_id = Some(user_id.to_string());
                inner.active_user_id = Some(user_id.to_string());
            }
            inner.maybe_auto_start(now);
            inner.maybe_trigger_round_completion();
        }
        self.finish(&mut inner);
    }

    /// Detach a viewer and remove their seat. Button and active player are
    /// re-derived; any timer armed for them dies on its guard check.
    pub async fn disconnect(&self, user_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.connections.remove(user_id);
        if inner.players.remove(user_id).is_some() {
            info!("table {}: {} left", inner.table_id, user_id);
            if inner.button_user_id.as_deref() == Some(user_id) {
                inner.rotate_button();
            }
            if inner.active_user_id.as_deref() == Some(user_id) {
                let fallback = inner
                    .button_user_id
                    .clone()
                    .filter(|b| inner.players.contains_key(b));
                inner.set_active_user(fallback);
            } else {
                let current = inner.active_user_id.clone();
                inner.set_active_user(current);
            }
            inner.maybe_trigger_round_completion();
        }
        self.finish(&mut inner);
    }

    /// Dispatch one inbound action. Invalid actions (wrong turn, wrong
    /// stage, illegal amount) change nothing; the client recovers from the
    /// next snapshot.
    pub async fn handle_action(&self, user_id: &str, payload: ActionPayload) {
        let mut removal = false;
        {
            let mut inner = self.inner.lock().await;
            let now = now_ms();
            match payload.command {
                ActionCommand::StartHand => {
                    inner.start_hand();
                    inner.push_event(TableEvent::system("New hand started", now));
                }
                ActionCommand::AdvanceStage => {
                    inner.advance_stage();
                    let stage = inner.stage;
                    inner.push_event(TableEvent::system(format!("Stage -> {stage}"), now));
                }
                ActionCommand::Chat => {
                    let Some(message) = payload.message.as_deref().filter(|m| !m.is_empty())
                    else {
                        return;
                    };
                    inner.push_event(TableEvent::chat(user_id, message, now));
                }
                ActionCommand::ShowCards => {
                    let Some(player) = inner.players.get(user_id) else {
                        return;
                    };
                    let nickname = player.display_name.clone();
                    let show = payload.show.unwrap_or(false);
                    let previous = inner
                        .showdown_card_decisions
                        .insert(user_id.to_string(), show);
                    if previous == Some(show) {
                        return;
                    }
                    let cards = if show {
                        inner
                            .showdown_saved_cards
                            .get(user_id)
                            .cloned()
                            .filter(|c| !c.is_empty())
                    } else {
                        None
                    };
                    inner.outbox.push(ServerMessage::PlayerCardsVisibility {
                        player_id: user_id.to_string(),
                        nickname,
                        show,
                        cards,
                    });
                }
                ActionCommand::Rebuy => {
                    let Some(player) = inner.players.get_mut(user_id) else {
                        return;
                    };
                    if !player.is_busted {
                        return;
                    }
                    player.stack = START_BALANCE;
                    player.is_busted = false;
                    player.bust_deadline_ms = None;
                    let name = player.display_name.clone();
                    inner.push_event(TableEvent::system(format!("{name} re-bought"), now));
                    inner.maybe_auto_start(now);
                }
                ActionCommand::LeaveTable => {
                    removal = true;
                }
                ActionCommand::Fold
                | ActionCommand::Check
                | ActionCommand::Call
                | ActionCommand::Bet
                | ActionCommand::Raise
                | ActionCommand::AllIn => {
                    let Some(player) = inner.players.get(user_id) else {
                        return;
                    };
                    if player.has_folded
                        || player.is_busted
                        || player.is_all_in
                        || inner.stage == Stage::Showdown
                    {
                        return;
                    }
                    if inner.active_user_id.as_deref() != Some(user_id) {
                        return;
                    }
                    match payload.command {
                        ActionCommand::Fold => inner.process_fold(user_id, "fold", now),
                        ActionCommand::Check => inner.process_check(user_id, now),
                        ActionCommand::Call => inner.process_call(user_id, now),
                        ActionCommand::Bet | ActionCommand::Raise => {
                            let target = payload.amount.unwrap_or(0);
                            inner.process_bet_or_raise(user_id, target, payload.command, now);
                        }
                        ActionCommand::AllIn => {
                            let stack = inner.players.get(user_id).map_or(0, |p| p.stack);
                            let target = inner.contribution(user_id) + stack;
                            inner.process_bet_or_raise(user_id, target, payload.command, now);
                        }
                        _ => {}
                    }
                    inner.maybe_trigger_round_completion();
                }
            }
            if !removal {
                self.finish(&mut inner);
            }
        }
        if removal {
            self.disconnect(user_id).await;
        }
    }

    /// Pure projection of the table for one viewer.
    pub async fn snapshot(&self, viewer_id: &str) -> TableSnapshot {
        let inner = self.inner.lock().await;
        inner.state_for_viewer(viewer_id)
    }

    /// Overwrite a seated player's stack between hands. Used when seating
    /// tournament players who carry chips over from another table.
    pub async fn set_stack(&self, user_id: &str, stack: u32) {
        let mut inner = self.inner.lock().await;
        if let Some(player) = inner.players.get_mut(user_id) {
            player.stack = stack;
        }
    }

    pub async fn player_count(&self) -> usize {
        self.inner.lock().await.players.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }

    /// True when nobody is seated and nobody is connected.
    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.players.is_empty() && inner.connections.is_empty()
    }

    /// Broadcast snapshots and queued frames, then spawn any timers the
    /// mutation armed.
    fn finish(&self, inner: &mut TableInner) {
        inner.broadcast_state();
        let outbox = std::mem::take(&mut inner.outbox);
        for msg in &outbox {
            inner.broadcast_message(msg);
        }
        let timers = std::mem::take(&mut inner.timers);
        self.spawn_timers(timers);
    }

    fn spawn_timers(&self, timers: Vec<TimerEffect>) {
        if timers.is_empty() {
            return;
        }
        let Some(table) = self.weak.upgrade() else {
            return;
        };
        for timer in timers {
            let table = Arc::clone(&table);
            match timer {
                TimerEffect::ActionTimer { user_id, deadline_ms } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(ACTION_TIMEOUT).await;
                        table.auto_fold(user_id, deadline_ms).await;
                    });
                }
                TimerEffect::RoundTransition { stage, seq } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(BETTING_ROUND_DELAY).await;
                        table.auto_advance(stage, seq).await;
                    });
                }
                TimerEffect::NewHand { seq } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(SHOWDOWN_DELAY).await;
                        table.auto_new_hand(seq).await;
                    });
                }
                TimerEffect::Bustout { user_id, deadline_ms } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(BUSTOUT_TIMEOUT).await;
                        table.auto_remove_busted(user_id, deadline_ms).await;
                    });
                }
            }
        }
    }

    async fn auto_fold(self: Arc<Self>, user_id: String, deadline_ms: i64) {
        let mut inner = self.inner.lock().await;
        if inner.active_user_id.as_deref() != Some(user_id.as_str())
            || inner.turn_deadline_ms != Some(deadline_ms)
        {
            return;
        }
        let Some(player) = inner.players.get(&user_id) else {
            return;
        };
        if player.has_folded {
            return;
        }
        debug!("table {}: auto-folding {}", inner.table_id, user_id);
        inner.process_fold(&user_id, "auto_fold", now_ms());
        inner.maybe_trigger_round_completion();
        self.finish(&mut inner);
    }

    async fn auto_advance(self: Arc<Self>, stage: Stage, seq: u64) {
        let mut inner = self.inner.lock().await;
        if !inner.transition_armed || inner.transition_seq != seq || inner.stage != stage {
            return;
        }
        inner.transition_armed = false;
        inner.advance_stage();
        let now_stage = inner.stage;
        inner.push_event(TableEvent::system(format!("Stage -> {now_stage}"), now_ms()));
        inner.maybe_trigger_round_completion();
        self.finish(&mut inner);
    }

    async fn auto_new_hand(self: Arc<Self>, seq: u64) {
        let mut inner = self.inner.lock().await;
        if !inner.new_hand_armed || inner.new_hand_seq != seq {
            return;
        }
        inner.new_hand_armed = false;
        if inner.stage != Stage::Showdown || inner.players.len() < 2 {
            return;
        }
        inner.start_hand();
        inner.push_event(TableEvent::system("New hand started", now_ms()));
        self.finish(&mut inner);
    }

    async fn auto_remove_busted(self: Arc<Self>, user_id: String, deadline_ms: i64) {
        let should_remove = {
            let inner = self.inner.lock().await;
            inner
                .players
                .get(&user_id)
                .is_some_and(|p| p.is_busted && p.bust_deadline_ms == Some(deadline_ms))
        };
        if should_remove {
            self.disconnect(&user_id).await;
        }
    }
}

impl TableInner {
    fn new(table_id: String, config: TableConfig) -> Self {
        let big_blind = config.big_blind;
        Self {
            table_id,
            config,
            players: HashMap::new(),
            connections: HashMap::new(),
            community_cards: Vec::with_capacity(5),
            pot: 0,
            stage: Stage::Preflop,
            button_user_id: None,
            active_user_id: None,
            deck: Deck::shuffled(),
            event_log: Vec::new(),
            current_bet: 0,
            player_bets: HashMap::new(),
            hand_contributions: HashMap::new(),
            pots: Vec::new(),
            last_raise_amount: big_blind,
            pending_auto_showdown: false,
            turn_deadline_ms: None,
            transition_seq: 0,
            transition_armed: false,
            new_hand_seq: 0,
            new_hand_armed: false,
            showdown_card_decisions: HashMap::new(),
            showdown_saved_cards: HashMap::new(),
            timers: Vec::new(),
            outbox: Vec::new(),
        }
    }

    // --- seating and ordering ---

    fn seat_order(&self) -> Vec<String> {
        let mut ids: Vec<&TablePlayer> = self.players.values().collect();
        ids.sort_by_key(|p| p.seat);
        ids.into_iter().map(|p| p.user_id.clone()).collect()
    }

    /// Seat order restricted to players who can take part in a hand.
    fn eligible_order(&self) -> Vec<String> {
        let mut ids: Vec<&TablePlayer> = self.players.values().filter(|p| !p.is_busted).collect();
        ids.sort_by_key(|p| p.seat);
        ids.into_iter().map(|p| p.user_id.clone()).collect()
    }

    fn next_free_seat(&self) -> Option<u32> {
        let occupied: Vec<u32> = self.players.values().map(|p| p.seat).collect();
        (1..=self.config.max_players as u32).find(|seat| !occupied.contains(seat))
    }

    fn rotate_button(&mut self) {
        let order = self.eligible_order();
        if order.is_empty() {
            self.button_user_id = None;
            return;
        }
        let Some(current) = self
            .button_user_id
            .as_ref()
            .and_then(|b| order.iter().position(|u| u == b))
        else {
            self.button_user_id = Some(order[0].clone());
            return;
        };
        self.button_user_id = Some(order[(current + 1) % order.len()].clone());
    }

    /// Position of a seat in clockwise order starting just after the button.
    fn clockwise_rank(&self, user_id: &str) -> usize {
        let order = self.seat_order();
        if order.is_empty() {
            return 0;
        }
        let button = self
            .button_user_id
            .as_ref()
            .and_then(|b| order.iter().position(|u| u == b))
            .unwrap_or(0);
        let pos = order.iter().position(|u| u == user_id).unwrap_or(0);
        (pos + order.len() - (button + 1) % order.len()) % order.len()
    }

    // --- dealing ---

    fn deal_hole_cards(&mut self) {
        for uid in self.eligible_order() {
            while self.players.get(&uid).is_some_and(|p| p.cards.len() < 2) {
                let Some(card) = self.deck.deal() else {
                    warn!("table {}: deck ran dry while dealing", self.table_id);
                    return;
                };
                if let Some(p) = self.players.get_mut(&uid) {
                    p.cards.push(card);
                }
            }
        }
    }

    fn deal_community(&mut self, count: usize) {
        for _ in 0..count {
            match self.deck.deal() {
                Some(card) => self.community_cards.push(card),
                None => {
                    warn!("table {}: deck ran dry on the board", self.table_id);
                    return;
                }
            }
        }
    }

    // --- hand lifecycle ---

    /// Reset everything for a fresh hand: new shuffled deck, cleared board
    /// and pots, rotated button, blinds posted, hole cards dealt. With
    /// fewer than two eligible players the table is left quiescent.
    fn start_hand(&mut self) {
        self.cancel_round_transition();
        self.cancel_new_hand();
        self.cancel_action_timer();
        self.deck = Deck::shuffled();
        self.community_cards.clear();
        self.pot = 0;
        self.stage = Stage::Preflop;
        self.current_bet = 0;
        self.player_bets.clear();
        self.hand_contributions.clear();
        self.pots.clear();
        self.last_raise_amount = self.config.big_blind;
        self.pending_auto_showdown = false;
        self.showdown_card_decisions.clear();
        self.showdown_saved_cards.clear();
        let mut newly_busted = Vec::new();
        for player in self.players.values_mut() {
            player.cards.clear();
            player.has_folded = false;
            player.has_acted = false;
            player.is_small_blind = false;
            player.is_big_blind = false;
            player.blind_amount = 0;
            player.is_all_in = false;
            if player.stack == 0 {
                if !player.is_busted {
                    player.is_busted = true;
                    newly_busted.push(player.user_id.clone());
                }
            } else {
                player.is_busted = false;
                player.bust_deadline_ms = None;
            }
        }
        for uid in newly_busted {
            self.arm_bustout(&uid);
        }
        self.rotate_button();
        self.post_blinds();
        self.deal_hole_cards();
    }

    fn post_blinds(&mut self) {
        let order = self.eligible_order();
        if order.len() < 2 {
            self.set_active_user(None);
            return;
        }
        let button_idx = self
            .button_user_id
            .as_ref()
            .and_then(|b| order.iter().position(|u| u == b))
            .unwrap_or(0);
        let total = order.len();
        // Heads-up the button posts the small blind and acts first preflop;
        // three-handed and up the blinds sit left of the button and the
        // player after the big blind opens.
        let (small_idx, big_idx, first_idx) = if total == 2 {
            (button_idx, (button_idx + 1) % total, button_idx)
        } else {
            let small = (button_idx + 1) % total;
            let big = (small + 1) % total;
            (small, big, (big + 1) % total)
        };

        for player in self.players.values_mut() {
            player.is_small_blind = false;
            player.is_big_blind = false;
            player.blind_amount = 0;
        }

        let now = now_ms();
        let small_id = order[small_idx].clone();
        let big_id = order[big_idx].clone();
        let sb_amount = self.deduct_stack(&small_id, self.config.small_blind);
        let bb_amount = self.deduct_stack(&big_id, self.config.big_blind);
        if let Some(p) = self.players.get_mut(&small_id) {
            p.is_small_blind = true;
            p.blind_amount = sb_amount;
        }
        if let Some(p) = self.players.get_mut(&big_id) {
            p.is_big_blind = true;
            p.blind_amount = bb_amount;
        }
        if sb_amount > 0 {
            self.push_event(TableEvent::action(&small_id, "post_small_blind", Some(sb_amount), now));
        }
        if bb_amount > 0 {
            self.push_event(TableEvent::action(&big_id, "post_big_blind", Some(bb_amount), now));
        }

        // A short big blind caps the call at what was actually posted.
        self.current_bet = self.contribution(&big_id);
        self.last_raise_amount = self.config.big_blind;

        for offset in 0..order.len() {
            let candidate = &order[(first_idx + offset) % order.len()];
            let Some(p) = self.players.get(candidate) else {
                continue;
            };
            if p.has_folded || p.is_all_in || p.stack == 0 {
                continue;
            }
            let candidate = candidate.clone();
            self.set_active_user(Some(candidate));
            return;
        }
        self.set_active_user(None);
    }

    /// Start a hand immediately when two players are ready and the table is
    /// between hands with nothing dealt.
    fn maybe_auto_start(&mut self, now: i64) {
        let quiescent = self.stage == Stage::Preflop
            && self.community_cards.is_empty()
            && self.players.values().all(|p| p.cards.is_empty());
        if quiescent && self.eligible_order().len() >= 2 {
            self.start_hand();
            self.push_event(TableEvent::system("New hand started", now));
        }
    }

    // --- betting ---

    fn contribution(&self, user_id: &str) -> u32 {
        *self.player_bets.get(user_id).unwrap_or(&0)
    }

    fn required_to_call(&self, user_id: &str) -> u32 {
        self.current_bet.saturating_sub(self.contribution(user_id))
    }

    fn min_raise_increment(&self) -> u32 {
        max(self.last_raise_amount, self.config.big_blind)
    }

    fn min_raise_total(&self) -> u32 {
        let increment = self.min_raise_increment();
        if self.current_bet == 0 {
            increment
        } else {
            self.current_bet + increment
        }
    }

    /// Take chips from the stack into the player's street bet. Chips stay
    /// in front of the player until the street is swept.
    fn deduct_stack(&mut self, user_id: &str, amount: u32) -> u32 {
        if amount == 0 {
            return 0;
        }
        let Some(player) = self.players.get_mut(user_id) else {
            return 0;
        };
        let actual = amount.min(player.stack);
        if actual == 0 {
            return 0;
        }
        player.stack -= actual;
        if player.stack == 0 {
            player.is_all_in = true;
        }
        *self.player_bets.entry(user_id.to_string()).or_default() += actual;
        *self.hand_contributions.entry(user_id.to_string()).or_default() += actual;
        actual
    }

    fn record_action(&mut self, actor: &str, resets_others: bool) {
        if let Some(p) = self.players.get_mut(actor) {
            p.has_acted = true;
        }
        if resets_others {
            for uid in self.hand_players() {
                if uid != actor
                    && let Some(p) = self.players.get_mut(&uid)
                {
                    p.has_acted = false;
                }
            }
        }
    }

    fn process_fold(&mut self, user_id: &str, label: &str, now: i64) {
        if let Some(p) = self.players.get_mut(user_id) {
            p.has_folded = true;
        }
        self.record_action(user_id, false);
        self.push_event(TableEvent::action(user_id, label, None, now));
        self.advance_active();
        self.maybe_auto_showdown();
    }

    fn process_check(&mut self, user_id: &str, now: i64) {
        if self.contribution(user_id) < self.current_bet {
            return;
        }
        self.record_action(user_id, false);
        self.push_event(TableEvent::action(user_id, "check", None, now));
        self.advance_active();
    }

    fn process_call(&mut self, user_id: &str, now: i64) {
        let to_call = self.required_to_call(user_id);
        let paid = self.deduct_stack(user_id, to_call);
        self.record_action(user_id, false);
        self.push_event(TableEvent::action(user_id, "call", Some(paid), now));
        self.advance_active();
        self.maybe_auto_showdown();
    }

    /// Bet or raise where `target` is the desired total contribution on the
    /// current street. Legal iff the target reaches the min-raise total or
    /// puts the player all-in. A full-sized raise re-opens betting; a short
    /// all-in does not.
    fn process_bet_or_raise(&mut self, user_id: &str, target: u32, command: ActionCommand, now: i64) {
        let contribution = self.contribution(user_id);
        let stack = self.players.get(user_id).map_or(0, |p| p.stack);
        let max_total = contribution + stack;
        let target = target.min(max_total);
        if target <= contribution {
            return;
        }
        let goes_all_in = target == max_total;
        let min_increment = self.min_raise_increment();
        let min_total = if self.current_bet == 0 {
            self.config.big_blind
        } else {
            self.current_bet + min_increment
        };
        if !goes_all_in && target < min_total {
            return;
        }
        let paid = self.deduct_stack(user_id, target - contribution);
        if paid == 0 {
            return;
        }
        let total = contribution + paid;
        let mut reopened = false;
        if total > self.current_bet {
            let delta = total - self.current_bet;
            reopened = delta >= min_increment;
            self.current_bet = total;
            if reopened {
                self.last_raise_amount = delta;
            }
        }
        self.push_event(TableEvent::action(user_id, command.as_str(), Some(paid), now));
        self.record_action(user_id, reopened);
        self.advance_active();
        self.maybe_auto_showdown();
    }

    // --- turn order ---

    fn hand_players(&self) -> Vec<String> {
        self.seat_order()
            .into_iter()
            .filter(|uid| {
                self.players
                    .get(uid)
                    .is_some_and(|p| !p.is_busted && !p.has_folded)
            })
            .collect()
    }

    fn actionable_players(&self) -> Vec<String> {
        self.hand_players()
            .into_iter()
            .filter(|uid| {
                self.players
                    .get(uid)
                    .is_some_and(|p| !p.is_all_in && p.stack > 0)
            })
            .collect()
    }

    fn find_next_actionable(&self, start_idx: usize, order: &[String]) -> Option<String> {
        if order.is_empty() {
            return None;
        }
        for offset in 0..order.len() {
            let candidate = &order[(start_idx + offset) % order.len()];
            let Some(p) = self.players.get(candidate) else {
                continue;
            };
            if p.has_folded || p.is_all_in || p.stack == 0 {
                continue;
            }
            return Some(candidate.clone());
        }
        None
    }

    fn first_to_act_postflop(&self) -> Option<String> {
        let order = self.eligible_order();
        if order.is_empty() {
            return None;
        }
        let button_idx = self
            .button_user_id
            .as_ref()
            .and_then(|b| order.iter().position(|u| u == b))
            .unwrap_or(0);
        self.find_next_actionable((button_idx + 1) % order.len(), &order)
    }

    fn advance_active(&mut self) {
        let order = self.eligible_order();
        if order.is_empty() {
            self.set_active_user(None);
            return;
        }
        let Some(active) = self.active_user_id.clone() else {
            let first = order[0].clone();
            self.set_active_user(Some(first));
            return;
        };
        if !self.players.contains_key(&active) {
            let first = order[0].clone();
            self.set_active_user(Some(first));
            return;
        }
        let start = order.iter().position(|u| *u == active).unwrap_or(0);
        for offset in 1..=order.len() {
            let candidate = &order[(start + offset) % order.len()];
            let Some(p) = self.players.get(candidate) else {
                continue;
            };
            if p.has_folded || p.stack == 0 || p.is_all_in {
                continue;
            }
            let candidate = candidate.clone();
            self.set_active_user(Some(candidate));
            return;
        }
        // Nobody else can act; keep the pointer but arm no timer.
        self.active_user_id = Some(order[start].clone());
        self.turn_deadline_ms = None;
    }

    /// Assign the active player and re-arm the action timer. The previous
    /// timer's guard (deadline) no longer matches, so it dies on wake-up.
    fn set_active_user(&mut self, user_id: Option<String>) {
        self.active_user_id = user_id.clone();
        self.turn_deadline_ms = None;
        let Some(uid) = user_id else {
            return;
        };
        if self.stage == Stage::Showdown {
            return;
        }
        let Some(player) = self.players.get(&uid) else {
            return;
        };
        if player.has_folded || player.is_busted {
            return;
        }
        let deadline = now_ms() + ACTION_TIMEOUT.as_millis() as i64;
        self.turn_deadline_ms = Some(deadline);
        self.timers.push(TimerEffect::ActionTimer {
            user_id: uid,
            deadline_ms: deadline,
        });
    }

    fn cancel_action_timer(&mut self) {
        self.turn_deadline_ms = None;
    }

    fn cancel_round_transition(&mut self) {
        self.transition_armed = false;
    }

    fn cancel_new_hand(&mut self) {
        self.new_hand_armed = false;
    }

    fn schedule_round_transition(&mut self) {
        if self.transition_armed || self.stage == Stage::Showdown {
            return;
        }
        self.transition_seq += 1;
        self.transition_armed = true;
        self.timers.push(TimerEffect::RoundTransition {
            stage: self.stage,
            seq: self.transition_seq,
        });
    }

    fn schedule_new_hand(&mut self) {
        if self.new_hand_armed || self.stage != Stage::Showdown || self.players.len() < 2 {
            return;
        }
        self.new_hand_seq += 1;
        self.new_hand_armed = true;
        self.timers.push(TimerEffect::NewHand {
            seq: self.new_hand_seq,
        });
    }

    fn arm_bustout(&mut self, user_id: &str) {
        let deadline = now_ms() + BUSTOUT_TIMEOUT.as_millis() as i64;
        if let Some(p) = self.players.get_mut(user_id) {
            p.bust_deadline_ms = Some(deadline);
        }
        self.timers.push(TimerEffect::Bustout {
            user_id: user_id.to_string(),
            deadline_ms: deadline,
        });
    }

    // --- round completion ---

    fn all_bets_settled(&self, active: &[String]) -> bool {
        if active.is_empty() {
            return false;
        }
        for uid in active {
            let Some(p) = self.players.get(uid) else {
                continue;
            };
            if p.is_all_in || p.stack == 0 {
                continue;
            }
            if self.contribution(uid) < self.current_bet {
                return false;
            }
        }
        true
    }

    /// A betting round is complete when every non-folded player has acted
    /// and matched the bet (or is all-in), with the pre-flop exception that
    /// an unraised big blind keeps the option until it explicitly acts.
    fn is_betting_round_complete(&self, active: &[String]) -> bool {
        if active.is_empty() {
            return true;
        }
        if !self.all_bets_settled(active) {
            return false;
        }
        let everybody_acted = active
            .iter()
            .all(|uid| self.players.get(uid).is_some_and(|p| p.has_acted));
        if !everybody_acted {
            return false;
        }
        if self.stage == Stage::Preflop
            && let Some(bb) = self.players.values().find(|p| p.is_big_blind)
            && !bb.has_folded
            && !bb.is_all_in
        {
            let posted_full = bb.blind_amount >= self.config.big_blind;
            let no_raises = self.current_bet <= self.config.big_blind;
            if posted_full && no_raises && !bb.has_acted {
                return false;
            }
        }
        true
    }

    fn maybe_trigger_round_completion(&mut self) {
        let active = self.hand_players();
        if active.len() <= 1 {
            if self.stage != Stage::Showdown {
                let hand_in_progress = !self.hand_contributions.is_empty()
                    || self.players.values().any(|p| !p.cards.is_empty());
                if !hand_in_progress {
                    return;
                }
                self.collect_bets_to_pot();
                let winner = active.first().cloned();
                let pot_amount = self.pot;
                let now = now_ms();
                if let Some(uid) = &winner {
                    let mut winner_name = None;
                    if let Some(p) = self.players.get_mut(uid) {
                        p.stack += pot_amount;
                        winner_name = Some(p.display_name.clone());
                    }
                    if let Some(name) = winner_name {
                        self.push_event(TableEvent::system(format!("{name} wins the pot"), now));
                    }
                    self.outbox.push(ServerMessage::HandComplete {
                        winners: vec![uid.clone()],
                        pot_amount,
                        pot_per_winner: pot_amount,
                        win_type: WinType::Fold,
                    });
                } else {
                    self.push_event(TableEvent::system("Hand ended", now));
                }
                self.pot = 0;
                self.hand_contributions.clear();
                self.player_bets.clear();
                self.pots.clear();
                self.stage = Stage::Showdown;
                self.set_active_user(None);
                self.cancel_action_timer();
            }
            self.schedule_new_hand();
            return;
        }

        if self.stage == Stage::Showdown {
            self.schedule_new_hand();
            return;
        }

        if self.is_betting_round_complete(&active) {
            self.schedule_round_transition();
        } else {
            self.cancel_round_transition();
        }
    }

    // --- streets ---

    fn collect_bets_to_pot(&mut self) {
        self.pot += self.player_bets.values().sum::<u32>();
    }

    fn advance_stage(&mut self) {
        let next = self.stage.next();
        self.stage = next;
        match next {
            Stage::Flop => self.deal_community(3),
            Stage::Turn | Stage::River => self.deal_community(1),
            _ => {}
        }
        self.collect_bets_to_pot();
        self.current_bet = 0;
        self.last_raise_amount = self.config.big_blind;
        self.player_bets.clear();
        for player in self.players.values_mut() {
            if player.has_folded {
                continue;
            }
            player.has_acted = player.is_all_in;
        }

        if next == Stage::Showdown {
            self.set_active_user(None);
            self.cancel_action_timer();
            self.resolve_showdown();
            self.schedule_new_hand();
            return;
        }

        let next_actor = self.first_to_act_postflop();
        self.set_active_user(next_actor);
    }

    /// Deal out the remaining board without betting and settle the hand.
    fn run_out_board(&mut self) {
        while self.stage != Stage::Showdown {
            self.advance_stage();
        }
    }

    fn maybe_auto_showdown(&mut self) {
        if self.stage == Stage::Showdown || self.pending_auto_showdown {
            return;
        }
        if self.actionable_players().is_empty() {
            self.pending_auto_showdown = true;
            self.run_out_board();
        }
    }

    // --- showdown ---

    /// Partition cumulative contributions into pot levels. Folded (and
    /// departed) contributors fund levels but are never eligible.
    fn build_pots(&mut self) {
        let mut rows: Vec<PotContribution> = Vec::new();
        for uid in self.seat_order() {
            let contributed = *self.hand_contributions.get(&uid).unwrap_or(&0);
            if contributed > 0 {
                let eligible = self.players.get(&uid).is_some_and(|p| !p.has_folded);
                rows.push(PotContribution {
                    user_id: uid,
                    contributed,
                    eligible,
                });
            }
        }
        for (uid, &contributed) in &self.hand_contributions {
            if contributed > 0 && !self.players.contains_key(uid) {
                rows.push(PotContribution {
                    user_id: uid.clone(),
                    contributed,
                    eligible: false,
                });
            }
        }
        self.pots = build_side_pots(&rows);
    }

    fn resolve_showdown(&mut self) {
        if self.stage != Stage::Showdown {
            return;
        }
        self.build_pots();

        let contenders: Vec<String> = self
            .hand_players()
            .into_iter()
            .filter(|uid| self.players.get(uid).is_some_and(|p| p.cards.len() == 2))
            .collect();
        let mut evaluations: HashMap<String, HandValue> = HashMap::new();
        for uid in &contenders {
            let Some(player) = self.players.get(uid) else {
                continue;
            };
            let mut cards = player.cards.clone();
            cards.extend(self.community_cards.iter().copied());
            if let Some(value) = eval::evaluate_best(&cards) {
                evaluations.insert(uid.clone(), value);
            }
        }

        let total_pot: u32 = self.pots.iter().map(|p| p.amount).sum();
        let mut winnings: HashMap<String, u32> = HashMap::new();
        let mut winner_ids: Vec<String> = Vec::new();
        let pots = self.pots.clone();
        for pot in &pots {
            let mut eligible: Vec<String> = pot
                .eligible
                .iter()
                .filter(|uid| evaluations.contains_key(*uid))
                .cloned()
                .collect();
            if eligible.is_empty() {
                continue;
            }
            eligible.sort_by_key(|uid| self.clockwise_rank(uid));
            let best = eligible
                .iter()
                .map(|uid| evaluations[uid].clone())
                .max()
                .unwrap_or(HandValue {
                    rank: eval::HandRank::HighCard,
                    tiebreakers: vec![],
                });
            // Still in clockwise order, so the odd chip lands on the winner
            // seated earliest after the button.
            let winners: Vec<String> = eligible
                .into_iter()
                .filter(|uid| evaluations[uid] == best)
                .collect();
            for uid in &winners {
                if !winner_ids.contains(uid) {
                    winner_ids.push(uid.clone());
                }
            }
            let share = pot.amount / winners.len() as u32;
            let remainder = pot.amount - share * winners.len() as u32;
            for (i, uid) in winners.iter().enumerate() {
                let extra = if i == 0 { remainder } else { 0 };
                *winnings.entry(uid.clone()).or_default() += share + extra;
            }
        }

        for (uid, amount) in &winnings {
            if let Some(p) = self.players.get_mut(uid) {
                p.stack += amount;
            }
        }
        self.pot = 0;

        // Save hole cards before clearing so show/muck can reveal them later.
        self.showdown_saved_cards = self
            .players
            .values()
            .filter(|p| !p.cards.is_empty())
            .map(|p| (p.user_id.clone(), p.cards.clone()))
            .collect();
        for player in self.players.values_mut() {
            player.cards.clear();
        }

        let newly_busted: Vec<String> = self
            .players
            .values()
            .filter(|p| p.stack == 0 && !p.is_busted)
            .map(|p| p.user_id.clone())
            .collect();
        self.hand_contributions.clear();
        self.player_bets.clear();
        let now = now_ms();
        for uid in &newly_busted {
            let Some(player) = self.players.get_mut(uid) else {
                continue;
            };
            player.is_busted = true;
            let name = player.display_name.clone();
            self.event_log.push(TableEvent {
                kind: super::messages::EventKind::System,
                user_id: Some(uid.clone()),
                action: None,
                amount: None,
                message: Some(format!("{name} busted out")),
                timestamp: now,
            });
            self.arm_bustout(uid);
        }

        if !winner_ids.is_empty() && total_pot > 0 {
            self.outbox.push(ServerMessage::HandComplete {
                winners: winner_ids.clone(),
                pot_amount: total_pot,
                pot_per_winner: total_pot / winner_ids.len() as u32,
                win_type: WinType::Showdown,
            });
        }

        let mut losers: Vec<String> = evaluations
            .keys()
            .filter(|uid| !winner_ids.contains(uid))
            .cloned()
            .collect();
        if !losers.is_empty() {
            losers.sort_by_key(|uid| self.players.get(uid).map_or(u32::MAX, |p| p.seat));
            let losers_data: Vec<LoserReveal> = losers
                .iter()
                .filter_map(|uid| {
                    let player = self.players.get(uid)?;
                    Some(LoserReveal {
                        player_id: uid.clone(),
                        nickname: player.display_name.clone(),
                        cards: self.showdown_saved_cards.get(uid).cloned().unwrap_or_default(),
                        show_cards: false,
                    })
                })
                .collect();
            self.outbox.push(ServerMessage::ShowdownComplete {
                winner_id: winner_ids.first().cloned(),
                winners: winner_ids,
                losers: losers_data,
            });
        }
    }

    // --- projection and fan-out ---

    fn push_event(&mut self, event: TableEvent) {
        self.event_log.push(event);
        // Only the tail is ever projected; keep memory bounded.
        if self.event_log.len() > 10 * EVENT_LOG_WINDOW {
            let excess = self.event_log.len() - 5 * EVENT_LOG_WINDOW;
            self.event_log.drain(..excess);
        }
    }

    fn player_snapshot(&self, player: &TablePlayer, viewer_id: &str) -> PlayerSnapshot {
        let can_see = viewer_id == player.user_id || self.stage == Stage::Showdown;
        PlayerSnapshot {
            user_id: player.user_id.clone(),
            display_name: player.display_name.clone(),
            seat: player.seat,
            stack: player.stack,
            has_folded: player.has_folded,
            cards: if can_see { player.cards.clone() } else { Vec::new() },
            card_count: player.cards.len(),
            has_acted: player.has_acted,
            is_small_blind: player.is_small_blind,
            is_big_blind: player.is_big_blind,
            blind_amount: player.blind_amount,
            is_busted: player.is_busted,
            bust_deadline_ms: player.bust_deadline_ms,
        }
    }

    fn state_for_viewer(&self, viewer_id: &str) -> TableSnapshot {
        let players: Vec<PlayerSnapshot> = self
            .seat_order()
            .iter()
            .filter_map(|uid| self.players.get(uid))
            .map(|p| self.player_snapshot(p, viewer_id))
            .collect();
        let street_total: u32 = self.player_bets.values().sum();
        let skip = self.event_log.len().saturating_sub(EVENT_LOG_WINDOW);
        TableSnapshot {
            table_id: self.table_id.clone(),
            players,
            community_cards: self.community_cards.clone(),
            pot: self.pot + street_total,
            stage: self.stage,
            button_user_id: self.button_user_id.clone(),
            active_user_id: self.active_user_id.clone(),
            events: self.event_log[skip..].to_vec(),
            current_bet: self.current_bet,
            player_bets: self.player_bets.clone(),
            turn_deadline_ms: self.turn_deadline_ms,
            action_timeout_ms: ACTION_TIMEOUT.as_millis() as u64,
            small_blind: self.config.small_blind,
            big_blind: self.config.big_blind,
            side_pot_summary: self.pots.clone(),
            min_raise_increment: self.min_raise_increment(),
            min_raise_total: self.min_raise_total(),
        }
    }

    fn broadcast_state(&mut self) {
        let viewer_ids: Vec<String> = self.connections.keys().cloned().collect();
        let mut stale = Vec::new();
        for uid in viewer_ids {
            let msg = ServerMessage::State {
                payload: self.state_for_viewer(&uid),
            };
            let Ok(frame) = serde_json::to_string(&msg) else {
                continue;
            };
            if let Some(tx) = self.connections.get(&uid)
                && tx.send(frame).is_err()
            {
                stale.push(uid);
            }
        }
        for uid in stale {
            self.connections.remove(&uid);
        }
    }

    fn broadcast_message(&mut self, msg: &ServerMessage) {
        let Ok(frame) = serde_json::to_string(msg) else {
            return;
        };
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, tx)| tx.send(frame.clone()).is_err())
            .map(|(uid, _)| uid.clone())
            .collect();
        for uid in stale {
            self.connections.remove(&uid);
        }
    }
}
