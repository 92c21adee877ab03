//! Hand evaluation: best five of up to seven cards.

use super::entities::Card;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Hand categories, weakest first so derived ordering matches hand strength.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum HandRank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl HandRank {
    pub fn label(self) -> &'static str {
        match self {
            Self::HighCard => "High Card",
            Self::OnePair => "Pair",
            Self::TwoPair => "Two Pair",
            Self::ThreeOfAKind => "Three of a Kind",
            Self::Straight => "Straight",
            Self::Flush => "Flush",
            Self::FullHouse => "Full House",
            Self::FourOfAKind => "Four of a Kind",
            Self::StraightFlush => "Straight Flush",
            Self::RoyalFlush => "Royal Flush",
        }
    }
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A ranked hand: category plus the tiebreak vector compared
/// lexicographically within a category.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct HandValue {
    pub rank: HandRank,
    pub tiebreakers: Vec<u8>,
}

impl HandValue {
    pub fn name(&self) -> &'static str {
        self.rank.label()
    }
}

impl Ord for HandValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.tiebreakers.cmp(&other.tiebreakers))
    }
}

impl PartialOrd for HandValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest card of a 5-long run among `values`, treating the ace as both
/// high and low. The wheel (A-2-3-4-5) reports 5.
fn straight_high(values: &[u8]) -> Option<u8> {
    let mut unique: Vec<u8> = values.to_vec();
    unique.sort_unstable_by(|a, b| b.cmp(a));
    unique.dedup();
    if unique.contains(&14) {
        unique.push(1);
    }
    if unique.len() < 5 {
        return None;
    }
    for window in unique.windows(5) {
        if window.iter().zip(window.iter().skip(1)).all(|(a, b)| a - 1 == *b) {
            return Some(if window[0] == 5 { 5 } else { window[0] });
        }
    }
    None
}

/// Rank exactly five cards.
pub fn evaluate_five(cards: &[Card]) -> HandValue {
    debug_assert_eq!(cards.len(), 5);
    let mut values: Vec<u8> = cards.iter().map(|c| c.rank).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.iter().all(|c| c.suit == cards[0].suit);
    let straight = straight_high(&values);

    let mut counts: HashMap<u8, u8> = HashMap::new();
    for &v in &values {
        *counts.entry(v).or_default() += 1;
    }
    // (count, value) descending: quads before trips before pairs, high first.
    let mut grouped: Vec<(u8, u8)> = counts.into_iter().map(|(v, c)| (c, v)).collect();
    grouped.sort_unstable_by(|a, b| b.cmp(a));

    if is_flush && straight.is_some() {
        let high = straight.unwrap_or(0);
        let rank = if high == 14 {
            HandRank::RoyalFlush
        } else {
            HandRank::StraightFlush
        };
        return HandValue { rank, tiebreakers: vec![high] };
    }

    if grouped[0].0 == 4 {
        let quad = grouped[0].1;
        let kicker = values.iter().copied().find(|&v| v != quad).unwrap_or(0);
        return HandValue {
            rank: HandRank::FourOfAKind,
            tiebreakers: vec![quad, kicker],
        };
    }

    if grouped[0].0 == 3 && grouped[1].0 == 2 {
        return HandValue {
            rank: HandRank::FullHouse,
            tiebreakers: vec![grouped[0].1, grouped[1].1],
        };
    }

    if is_flush {
        return HandValue {
            rank: HandRank::Flush,
            tiebreakers: values,
        };
    }

    if let Some(high) = straight {
        return HandValue {
            rank: HandRank::Straight,
            tiebreakers: vec![high],
        };
    }

    if grouped[0].0 == 3 {
        let trips = grouped[0].1;
        let kickers: Vec<u8> = values.iter().copied().filter(|&v| v != trips).take(2).collect();
        let mut tiebreakers = vec![trips];
        tiebreakers.extend(kickers);
        return HandValue {
            rank: HandRank::ThreeOfAKind,
            tiebreakers,
        };
    }

    if grouped[0].0 == 2 && grouped[1].0 == 2 {
        let top = grouped[0].1;
        let second = grouped[1].1;
        let kicker = values
            .iter()
            .copied()
            .find(|&v| v != top && v != second)
            .unwrap_or(0);
        return HandValue {
            rank: HandRank::TwoPair,
            tiebreakers: vec![top, second, kicker],
        };
    }

    if grouped[0].0 == 2 {
        let pair = grouped[0].1;
        let kickers: Vec<u8> = values.iter().copied().filter(|&v| v != pair).take(3).collect();
        let mut tiebreakers = vec![pair];
        tiebreakers.extend(kickers);
        return HandValue {
            rank: HandRank::OnePair,
            tiebreakers,
        };
    }

    HandValue {
        rank: HandRank::HighCard,
        tiebreakers: values,
    }
}

/// Rank the best five-card hand among 5..=7 cards by scanning every
/// five-card subset. Returns `None` with fewer than five cards.
pub fn evaluate_best(cards: &[Card]) -> Option<HandValue> {
    let n = cards.len();
    if n < 5 {
        return None;
    }
    let mut best: Option<HandValue> = None;
    for mask in 0u32..(1 << n) {
        if mask.count_ones() != 5 {
            continue;
        }
        let five: Vec<Card> = (0..n).filter(|i| mask & (1 << i) != 0).map(|i| cards[i]).collect();
        let value = evaluate_five(&five);
        if best.as_ref().is_none_or(|b| value > *b) {
            best = Some(value);
        }
    }
    best
}
