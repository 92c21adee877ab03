//! Cards and the deck.

use rand::seq::SliceRandom;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Hearts => "♥",
            Self::Diamonds => "♦",
            Self::Clubs => "♣",
            Self::Spades => "♠",
        };
        write!(f, "{repr}")
    }
}

/// A playing card. Ranks run 2..=14 with 11=J, 12=Q, 13=K, 14=A.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: u8, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Wire label for the rank: `"2".."10"`, `"J"`, `"Q"`, `"K"`, `"A"`.
    pub fn rank_label(&self) -> String {
        match self.rank {
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            14 => "A".to_string(),
            r => r.to_string(),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank_label(), self.suit)
    }
}

// Cards cross the wire as {"rank": "A", "suit": "spades"} so the wire shape
// stays stable regardless of the internal numeric representation.
impl Serialize for Card {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Card", 2)?;
        state.serialize_field("rank", &self.rank_label())?;
        state.serialize_field("suit", &self.suit)?;
        state.end()
    }
}

/// An ordered 52-card deck. Cards are dealt from the top; a fresh shuffle is
/// taken at the start of every hand.
#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
    idx: usize,
}

impl Deck {
    /// Build a full deck shuffled with the thread-local CSPRNG.
    pub fn shuffled() -> Self {
        let mut cards = Vec::with_capacity(52);
        for suit in Suit::ALL {
            for rank in 2..=14u8 {
                cards.push(Card::new(rank, suit));
            }
        }
        cards.shuffle(&mut rand::rng());
        Self { cards, idx: 0 }
    }

    /// Deal the next card, or `None` when the deck is exhausted.
    pub fn deal(&mut self) -> Option<Card> {
        let card = self.cards.get(self.idx).copied();
        if card.is_some() {
            self.idx += 1;
        }
        card
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.idx
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::shuffled()
    }
}
