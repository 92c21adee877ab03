//! Property-based tests for the hand evaluator: determinism, a total and
//! antisymmetric ordering, and invariance under card order.

use poker_core::game::entities::{Card, Suit};
use poker_core::game::eval::{HandRank, evaluate_best, evaluate_five};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;

fn arbitrary_card() -> impl Strategy<Value = Card> {
    (2u8..=14, 0usize..4).prop_map(|(rank, suit)| Card::new(rank, Suit::ALL[suit]))
}

/// A set of n distinct cards, as dealt from one deck.
fn distinct_cards(n: usize) -> impl Strategy<Value = Vec<Card>> {
    prop::collection::vec(arbitrary_card(), n * 3).prop_filter_map(
        "needs enough distinct cards",
        move |cards| {
            let mut seen = HashSet::new();
            let distinct: Vec<Card> = cards.into_iter().filter(|c| seen.insert(*c)).collect();
            (distinct.len() >= n).then(|| distinct.into_iter().take(n).collect())
        },
    )
}

proptest! {
    /// Same cards, same result.
    #[test]
    fn evaluation_is_deterministic(cards in distinct_cards(7)) {
        let first = evaluate_best(&cards).unwrap();
        let second = evaluate_best(&cards).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Shuffling the input never changes the value of the hand.
    #[test]
    fn evaluation_ignores_card_order(cards in distinct_cards(7), seed in any::<u64>()) {
        let baseline = evaluate_best(&cards).unwrap();
        let mut shuffled = cards.clone();
        // Cheap deterministic permutation derived from the seed.
        let len = shuffled.len();
        for i in 0..len {
            let j = ((seed as usize).wrapping_mul(31).wrapping_add(i * 7)) % len;
            shuffled.swap(i, j);
        }
        prop_assert_eq!(evaluate_best(&shuffled).unwrap(), baseline);
    }

    /// compare(x, y) == -compare(y, x).
    #[test]
    fn comparison_is_antisymmetric(cards in distinct_cards(14)) {
        let x = evaluate_best(&cards[..7]).unwrap();
        let y = evaluate_best(&cards[7..]).unwrap();
        prop_assert_eq!(x.cmp(&y), y.cmp(&x).reverse());
    }

    /// Pairwise comparisons agree with a sort (transitivity spot check).
    #[test]
    fn comparison_is_transitive(cards in distinct_cards(21)) {
        let x = evaluate_best(&cards[..7]).unwrap();
        let y = evaluate_best(&cards[7..14]).unwrap();
        let z = evaluate_best(&cards[14..]).unwrap();
        if x <= y && y <= z {
            prop_assert!(x <= z);
        }
        if x >= y && y >= z {
            prop_assert!(x >= z);
        }
    }

    /// The best of seven is never worse than any single five-card subset.
    #[test]
    fn best_of_seven_dominates_subsets(cards in distinct_cards(7)) {
        let best = evaluate_best(&cards).unwrap();
        // Check a handful of arbitrary subsets including the first five.
        let five = &cards[..5];
        prop_assert!(best >= evaluate_five(five));
        let last_five = &cards[2..7];
        prop_assert!(best >= evaluate_five(last_five));
    }

    /// Adding cards can only improve (or keep) the hand.
    #[test]
    fn extra_cards_never_hurt(cards in distinct_cards(7)) {
        let with_five = evaluate_best(&cards[..5]).unwrap();
        let with_six = evaluate_best(&cards[..6]).unwrap();
        let with_seven = evaluate_best(&cards).unwrap();
        prop_assert!(with_six >= with_five);
        prop_assert!(with_seven >= with_six);
    }

    /// Five equal-suited cards always make at least a flush.
    #[test]
    fn monochrome_hands_are_flushes(mut ranks in prop::collection::hash_set(2u8..=14, 5)) {
        let cards: Vec<Card> = ranks.drain().map(|r| Card::new(r, Suit::Spades)).collect();
        let value = evaluate_five(&cards);
        prop_assert!(matches!(
            value.rank,
            HandRank::Flush | HandRank::StraightFlush | HandRank::RoyalFlush
        ));
    }
}

#[test]
fn category_order_matches_poker_rules() {
    assert!(HandRank::HighCard < HandRank::OnePair);
    assert!(HandRank::OnePair < HandRank::TwoPair);
    assert!(HandRank::TwoPair < HandRank::ThreeOfAKind);
    assert!(HandRank::ThreeOfAKind < HandRank::Straight);
    assert!(HandRank::Straight < HandRank::Flush);
    assert!(HandRank::Flush < HandRank::FullHouse);
    assert!(HandRank::FullHouse < HandRank::FourOfAKind);
    assert!(HandRank::FourOfAKind < HandRank::StraightFlush);
    assert!(HandRank::StraightFlush < HandRank::RoyalFlush);
}

#[test]
fn equal_hands_compare_equal_across_suits() {
    let hearts = [
        Card::new(14, Suit::Hearts),
        Card::new(13, Suit::Hearts),
        Card::new(9, Suit::Clubs),
        Card::new(7, Suit::Diamonds),
        Card::new(3, Suit::Spades),
    ];
    let spades = [
        Card::new(14, Suit::Spades),
        Card::new(13, Suit::Spades),
        Card::new(9, Suit::Diamonds),
        Card::new(7, Suit::Clubs),
        Card::new(3, Suit::Hearts),
    ];
    assert_eq!(
        evaluate_five(&hearts).cmp(&evaluate_five(&spades)),
        Ordering::Equal
    );
}
