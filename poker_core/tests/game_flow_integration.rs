//! End-to-end hand scenarios against the real table engine with virtual
//! time, driven over the same connect/action/snapshot surface the server
//! uses.

use poker_core::table::messages::{ActionCommand, ActionPayload, Stage, TableSnapshot};
use poker_core::table::session::TableSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

type Frames = UnboundedReceiver<String>;

async fn connect(table: &Arc<TableSession>, user_id: &str, name: &str) -> Frames {
    let (tx, rx) = unbounded_channel();
    table.connect(user_id, name, tx).await;
    rx
}

async fn act(table: &Arc<TableSession>, user_id: &str, command: ActionCommand) {
    table
        .handle_action(user_id, ActionPayload::command(command))
        .await;
}

async fn act_amount(table: &Arc<TableSession>, user_id: &str, command: ActionCommand, amount: u32) {
    table
        .handle_action(user_id, ActionPayload::with_amount(command, amount))
        .await;
}

fn stack_of(snapshot: &TableSnapshot, user_id: &str) -> u32 {
    snapshot
        .players
        .iter()
        .find(|p| p.user_id == user_id)
        .map(|p| p.stack)
        .unwrap_or_else(|| panic!("no player {user_id} in snapshot"))
}

fn total_stacks(snapshot: &TableSnapshot) -> u32 {
    snapshot.players.iter().map(|p| p.stack).sum()
}

/// Sum of stacks plus everything committed to the hand, as seen by a viewer.
fn total_chips(snapshot: &TableSnapshot) -> u32 {
    total_stacks(snapshot) + snapshot.pot
}

/// Drain all buffered frames, returning the parsed JSON values.
fn drain(frames: &mut Frames) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(frame) = frames.try_recv() {
        if let Ok(value) = serde_json::from_str(&frame) {
            out.push(value);
        }
    }
    out
}

fn find_message<'a>(messages: &'a [serde_json::Value], kind: &str) -> Option<&'a serde_json::Value> {
    messages.iter().find(|m| m["type"] == kind)
}

#[tokio::test(start_paused = true)]
async fn heads_up_preflop_fold() {
    let table = TableSession::new("t-headsup");
    let mut rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    // Two seats filled: a hand starts with the button posting the small
    // blind and acting first.
    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Preflop);
    let button = snapshot.button_user_id.clone().expect("button assigned");
    assert_eq!(snapshot.active_user_id.as_ref(), Some(&button));
    assert_eq!(snapshot.pot, 30);
    assert_eq!(snapshot.current_bet, 20);
    assert_eq!(total_chips(&snapshot), 2000);

    let other = if button == "p1" { "p2" } else { "p1" };
    drain(&mut rx1);
    act(&table, &button, ActionCommand::Fold).await;

    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Showdown);
    assert_eq!(snapshot.pot, 0);
    assert_eq!(stack_of(&snapshot, &button), 990);
    assert_eq!(stack_of(&snapshot, other), 1010);
    assert_eq!(total_stacks(&snapshot), 2000);

    let messages = drain(&mut rx1);
    let complete = find_message(&messages, "handComplete").expect("handComplete broadcast");
    assert_eq!(complete["winType"], "fold");
    assert_eq!(complete["potAmount"], 30);
    assert_eq!(complete["winners"][0], other);

    // A fresh hand deals itself after the showdown delay.
    tokio::time::sleep(Duration::from_millis(5500)).await;
    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Preflop);
    assert_eq!(snapshot.pot, 30);
    assert_eq!(total_chips(&snapshot), 2000);
    // Button rotated to the other player.
    assert_eq!(snapshot.button_user_id.as_ref(), Some(&other.to_string()));
}

#[tokio::test(start_paused = true)]
async fn big_blind_keeps_the_option_preflop() {
    let table = TableSession::new("t-bboption");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();
    let bb = if button == "p1" { "p2" } else { "p1" };

    // Button limps; the unraised big blind must still get its turn.
    act(&table, &button, ActionCommand::Call).await;
    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Preflop);
    assert_eq!(snapshot.active_user_id.as_deref(), Some(bb));

    // Big blind checks its option; the street closes and the flop comes
    // after the transition delay.
    act(&table, bb, ActionCommand::Check).await;
    tokio::time::sleep(Duration::from_millis(2000)).await;
    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Flop);
    assert_eq!(snapshot.community_cards.len(), 3);
    assert_eq!(snapshot.pot, 40);
}

/// Drive the current street: every actionable player calls (a call with
/// nothing owed behaves like a check).
async fn check_down(table: &Arc<TableSession>) {
    for _ in 0..32 {
        let snapshot = table.snapshot("observer").await;
        if snapshot.stage == Stage::Showdown {
            return;
        }
        match snapshot.active_user_id {
            Some(active) => act(table, &active, ActionCommand::Call).await,
            None => tokio::time::sleep(Duration::from_millis(400)).await,
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn checked_down_hand_reaches_showdown_and_conserves_chips() {
    let table = TableSession::new("t-checkdown");
    let mut rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    check_down(&table).await;

    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Showdown);
    assert_eq!(snapshot.community_cards.len(), 5);
    assert_eq!(snapshot.pot, 0);
    assert_eq!(total_stacks(&snapshot), 2000);
    // One player holds both blinds, or the pot was chopped evenly.
    let stacks: Vec<u32> = snapshot.players.iter().map(|p| p.stack).collect();
    assert!(stacks == vec![1020, 980] || stacks == vec![980, 1020] || stacks == vec![1000, 1000]);

    let messages = drain(&mut rx1);
    let complete = find_message(&messages, "handComplete").expect("handComplete broadcast");
    assert_eq!(complete["winType"], "showdown");
    assert_eq!(complete["potAmount"], 40);
}

#[tokio::test(start_paused = true)]
async fn community_card_counts_per_street() {
    let table = TableSession::new("t-streets");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let mut seen = vec![table.snapshot("p1").await.community_cards.len()];
    for _ in 0..24 {
        let snapshot = table.snapshot("observer").await;
        if snapshot.stage == Stage::Showdown {
            break;
        }
        if let Some(active) = snapshot.active_user_id {
            act(&table, &active, ActionCommand::Call).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        let count = table.snapshot("observer").await.community_cards.len();
        if seen.last() != Some(&count) {
            seen.push(count);
        }
    }
    assert_eq!(seen, vec![0, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn full_raise_reopens_betting_but_short_all_in_does_not() {
    let table = TableSession::new("t-reopen");
    let _rx1 = connect(&table, "a", "Ann").await;
    let _rx2 = connect(&table, "b", "Bob").await;
    // First hand runs heads-up between a and b; c sits in for the next one.
    let _rx3 = connect(&table, "c", "Cal").await;

    // End the heads-up hand immediately.
    let snapshot = table.snapshot("a").await;
    let button = snapshot.button_user_id.clone().unwrap();
    act(&table, &button, ActionCommand::Fold).await;

    // Seats are a=1, b=2, c=3; the finished hand had button b, so the next
    // one puts the button on c with a/b in the blinds and c first to act.
    table.set_stack("a", 100).await;
    table.set_stack("b", 1000).await;
    table.set_stack("c", 1000).await;
    act(&table, "a", ActionCommand::StartHand).await;

    let snapshot = table.snapshot("a").await;
    assert_eq!(snapshot.button_user_id.as_deref(), Some("c"));
    assert_eq!(snapshot.active_user_id.as_deref(), Some("c"));

    // c opens to 60: a raise of 40 over the big blind.
    act_amount(&table, "c", ActionCommand::Raise, 60).await;
    let snapshot = table.snapshot("a").await;
    assert_eq!(snapshot.current_bet, 60);
    assert_eq!(snapshot.min_raise_increment, 40);
    assert_eq!(snapshot.min_raise_total, 100);

    // a shoves 100 total: the extra 40 meets the min-raise, so betting
    // re-opens for everyone.
    act(&table, "a", ActionCommand::AllIn).await;
    let snapshot = table.snapshot("a").await;
    assert_eq!(snapshot.current_bet, 100);
    assert_eq!(snapshot.min_raise_increment, 40);
    let c_row = snapshot.players.iter().find(|p| p.user_id == "c").unwrap();
    assert!(!c_row.has_acted, "a full-sized all-in re-opens the raiser");

    // Replay with a shorter stack: the shove only adds 10 over the bet.
    act(&table, "b", ActionCommand::Fold).await;
    act(&table, "c", ActionCommand::Fold).await;
    table.set_stack("a", 70).await;
    table.set_stack("b", 1000).await;
    table.set_stack("c", 1000).await;
    act(&table, "a", ActionCommand::StartHand).await;

    // Button moved to a, so a opens, b raises, c folds, and a faces the
    // raise with 50 behind.
    let snapshot = table.snapshot("a").await;
    assert_eq!(snapshot.active_user_id.as_deref(), Some("a"));
    act(&table, "a", ActionCommand::Call).await;
    act_amount(&table, "b", ActionCommand::Raise, 60).await;
    act(&table, "c", ActionCommand::Fold).await;
    act(&table, "a", ActionCommand::AllIn).await;

    let snapshot = table.snapshot("a").await;
    assert_eq!(snapshot.current_bet, 70);
    // The short shove does not grow the minimum raise nor re-open the
    // raiser.
    assert_eq!(snapshot.min_raise_increment, 40);
    assert_eq!(snapshot.min_raise_total, 110);
    let raiser_row = snapshot.players.iter().find(|p| p.user_id == "b").unwrap();
    assert!(raiser_row.has_acted, "short all-in must not re-open betting");
}

#[tokio::test(start_paused = true)]
async fn undersized_raise_is_silently_ignored() {
    let table = TableSession::new("t-minraise");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();

    // Raising to 30 when the minimum total is 40 changes nothing.
    act_amount(&table, &button, ActionCommand::Raise, 30).await;
    let after = table.snapshot("p1").await;
    assert_eq!(after.current_bet, 20);
    assert_eq!(after.active_user_id.as_ref(), Some(&button));
    assert_eq!(after.min_raise_total, 40);

    // A legal min-raise is accepted.
    act_amount(&table, &button, ActionCommand::Raise, 40).await;
    let after = table.snapshot("p1").await;
    assert_eq!(after.current_bet, 40);
    assert_eq!(after.min_raise_increment, 20);
}

#[tokio::test(start_paused = true)]
async fn acting_out_of_turn_changes_nothing() {
    let table = TableSession::new("t-outofturn");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();
    let other = if button == "p1" { "p2" } else { "p1" };

    act(&table, other, ActionCommand::Fold).await;
    let after = table.snapshot("p1").await;
    assert_eq!(after.stage, Stage::Preflop);
    assert_eq!(after.active_user_id.as_ref(), Some(&button));
    assert!(after.players.iter().all(|p| !p.has_folded));
}

#[tokio::test(start_paused = true)]
async fn three_way_all_in_builds_layered_side_pots() {
    let table = TableSession::new("t-sidepots");
    let _rx1 = connect(&table, "a", "Ann").await;
    let _rx2 = connect(&table, "b", "Bob").await;
    let _rx3 = connect(&table, "c", "Cal").await;

    let snapshot = table.snapshot("a").await;
    let button = snapshot.button_user_id.clone().unwrap();
    act(&table, &button, ActionCommand::Fold).await;

    table.set_stack("a", 100).await;
    table.set_stack("b", 200).await;
    table.set_stack("c", 300).await;
    act(&table, "a", ActionCommand::StartHand).await;

    // Everyone in, in turn order, for their whole stack.
    for _ in 0..3 {
        let snapshot = table.snapshot("observer").await;
        let Some(active) = snapshot.active_user_id else {
            break;
        };
        act(&table, &active, ActionCommand::AllIn).await;
    }

    let snapshot = table.snapshot("observer").await;
    assert_eq!(snapshot.stage, Stage::Showdown);
    assert_eq!(snapshot.community_cards.len(), 5);

    // Main pot 300 (three-way), side pot 200 (b and c), side pot 100
    // uncontested back to c.
    let amounts: Vec<u32> = snapshot.side_pot_summary.iter().map(|p| p.amount).collect();
    assert_eq!(amounts, vec![300, 200, 100]);
    let eligibility: Vec<usize> = snapshot
        .side_pot_summary
        .iter()
        .map(|p| p.eligible.len())
        .collect();
    assert_eq!(eligibility, vec![3, 2, 1]);
    assert_eq!(snapshot.side_pot_summary[2].eligible, vec!["c".to_string()]);

    assert_eq!(total_stacks(&snapshot), 600);
    assert!(stack_of(&snapshot, "c") >= 100, "c's overage is uncontested");
}

#[tokio::test(start_paused = true)]
async fn idle_player_is_auto_folded_after_the_timeout() {
    let table = TableSession::new("t-autofold");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();
    let other = if button == "p1" { "p2" } else { "p1" };
    assert!(snapshot.turn_deadline_ms.is_some());
    assert_eq!(snapshot.action_timeout_ms, 30_000);

    tokio::time::sleep(Duration::from_millis(30_500)).await;

    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Showdown);
    assert_eq!(stack_of(&snapshot, &button), 990);
    assert_eq!(stack_of(&snapshot, other), 1010);
}

#[tokio::test(start_paused = true)]
async fn acting_in_time_cancels_the_auto_fold() {
    let table = TableSession::new("t-timerguard");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    act(&table, &button, ActionCommand::Call).await;

    // The stale timer wakes at +30s but its deadline guard no longer
    // matches, so nothing folds.
    tokio::time::sleep(Duration::from_millis(15_000)).await;
    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Preflop);
    assert!(snapshot.players.iter().all(|p| !p.has_folded));
}

#[tokio::test(start_paused = true)]
async fn busted_player_is_removed_unless_they_rebuy() {
    let table = TableSession::new("t-bustout");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();
    act(&table, &button, ActionCommand::Fold).await;

    // p1 comes back broke; starting the next hand marks the bust and arms
    // the removal timer.
    table.set_stack("p1", 0).await;
    act(&table, "p2", ActionCommand::StartHand).await;
    let snapshot = table.snapshot("p2").await;
    let p1 = snapshot.players.iter().find(|p| p.user_id == "p1").unwrap();
    assert!(p1.is_busted);
    assert!(p1.bust_deadline_ms.is_some());

    tokio::time::sleep(Duration::from_millis(31_000)).await;
    let snapshot = table.snapshot("p2").await;
    assert!(
        !snapshot.players.iter().any(|p| p.user_id == "p1"),
        "busted player is removed after the timeout"
    );
}

#[tokio::test(start_paused = true)]
async fn rebuy_cancels_the_bustout_timer() {
    let table = TableSession::new("t-rebuy");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();
    act(&table, &button, ActionCommand::Fold).await;

    table.set_stack("p1", 0).await;
    act(&table, "p2", ActionCommand::StartHand).await;
    act(&table, "p1", ActionCommand::Rebuy).await;

    let snapshot = table.snapshot("p2").await;
    let p1 = snapshot.players.iter().find(|p| p.user_id == "p1").unwrap();
    assert!(!p1.is_busted);
    assert_eq!(p1.bust_deadline_ms, None);
    // The rebuy re-armed the table and a fresh hand posted blinds from the
    // restored stack.
    assert!(p1.stack >= 1000 - 20);

    tokio::time::sleep(Duration::from_millis(31_000)).await;
    let snapshot = table.snapshot("p2").await;
    assert!(
        snapshot.players.iter().any(|p| p.user_id == "p1"),
        "rebuy keeps the seat"
    );
}

#[tokio::test(start_paused = true)]
async fn hole_cards_are_hidden_from_other_viewers_until_showdown() {
    let table = TableSession::new("t-projection");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let mine = table.snapshot("p1").await;
    let p1_row = mine.players.iter().find(|p| p.user_id == "p1").unwrap();
    let p2_row = mine.players.iter().find(|p| p.user_id == "p2").unwrap();
    assert_eq!(p1_row.cards.len(), 2, "viewer sees their own cards");
    assert_eq!(p2_row.cards.len(), 0, "opponent cards are hidden");
    assert_eq!(p2_row.card_count, 2, "only the count leaks");

    check_down(&table).await;

    let snapshot = table.snapshot("p1").await;
    assert_eq!(snapshot.stage, Stage::Showdown);
    // Contender cards were saved for show/muck and cleared from the seats.
    for player in &snapshot.players {
        assert_eq!(player.cards.len(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn show_cards_broadcasts_the_saved_hand() {
    let table = TableSession::new("t-showcards");
    let _rx1 = connect(&table, "p1", "One").await;
    let mut rx2 = connect(&table, "p2", "Two").await;

    check_down(&table).await;
    drain(&mut rx2);

    let payload = ActionPayload {
        command: ActionCommand::ShowCards,
        amount: None,
        message: None,
        show: Some(true),
    };
    table.handle_action("p1", payload).await;

    let messages = drain(&mut rx2);
    let visibility =
        find_message(&messages, "playerCardsVisibility").expect("visibility broadcast");
    assert_eq!(visibility["playerId"], "p1");
    assert_eq!(visibility["show"], true);
    assert_eq!(visibility["cards"].as_array().map(|c| c.len()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn leaving_mid_hand_hands_the_pot_to_the_survivor() {
    let table = TableSession::new("t-leave");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let snapshot = table.snapshot("p1").await;
    let button = snapshot.button_user_id.clone().unwrap();
    let other = if button == "p1" { "p2" } else { "p1" };

    act(&table, &button, ActionCommand::LeaveTable).await;

    let snapshot = table.snapshot(other).await;
    assert_eq!(snapshot.players.len(), 1);
    assert_eq!(snapshot.stage, Stage::Showdown);
    assert_eq!(stack_of(&snapshot, other), 1010);
}

#[tokio::test(start_paused = true)]
async fn chat_lands_in_the_event_log() {
    let table = TableSession::new("t-chat");
    let _rx1 = connect(&table, "p1", "One").await;
    let _rx2 = connect(&table, "p2", "Two").await;

    let payload = ActionPayload {
        command: ActionCommand::Chat,
        amount: None,
        message: Some("nice hand".to_string()),
        show: None,
    };
    table.handle_action("p1", payload).await;

    let snapshot = table.snapshot("p2").await;
    let chat = snapshot
        .events
        .iter()
        .rev()
        .find(|e| e.message.as_deref() == Some("nice hand"))
        .expect("chat event recorded");
    assert_eq!(chat.user_id.as_deref(), Some("p1"));
}
