use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use rand::Rng;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, FromRepr};

use crate::poker::cardset::CardSet;
use crate::poker::error::{Error, Result};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIter, FromRepr)]
#[repr(u8)]
pub enum Suit {
    Spades = 0,
    Clubs = 1,
    Hearts = 2,
    Diamonds = 3,
}

impl Suit {
    pub const COUNT: usize = 4;

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            's' => Some(Self::Spades),
            'c' => Some(Self::Clubs),
            'h' => Some(Self::Hearts),
            'd' => Some(Self::Diamonds),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::Spades => 's',
            Self::Clubs => 'c',
            Self::Hearts => 'h',
            Self::Diamonds => 'd',
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIter, FromRepr)]
#[repr(u8)]
pub enum Rank {
    Deuce = 0,
    Three = 1,
    Four = 2,
    Five = 3,
    Six = 4,
    Seven = 5,
    Eight = 6,
    Nine = 7,
    Ten = 8,
    Jack = 9,
    Queen = 10,
    King = 11,
    Ace = 12,
}

impl Rank {
    pub const COUNT: usize = 13;

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            '2' => Some(Self::Deuce),
            '3' => Some(Self::Three),
            '4' => Some(Self::Four),
            '5' => Some(Self::Five),
            '6' => Some(Self::Six),
            '7' => Some(Self::Seven),
            '8' => Some(Self::Eight),
            '9' => Some(Self::Nine),
            'T' => Some(Self::Ten),
            'J' => Some(Self::Jack),
            'Q' => Some(Self::Queen),
            'K' => Some(Self::King),
            'A' => Some(Self::Ace),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        b"23456789TJQKA"[self as usize] as char
    }

    /// The rank directly above this one, if any.
    pub fn next(self) -> Option<Self> {
        Self::from_repr(self as u8 + 1)
    }

    /// The rank directly below this one, if any.
    pub fn prev(self) -> Option<Self> {
        (self as u8).checked_sub(1).and_then(Self::from_repr)
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const COUNT: usize = 52;

    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    pub fn all() -> impl Iterator<Item = Self> + Clone {
        BASE_DECK_CARDS.iter().copied()
    }

    /// Bit position of this card inside a [`CardSet`]: one 16-bit lane per
    /// suit, rank in the low 13 bits of the lane.
    #[inline]
    pub fn index(self) -> usize {
        ((self.suit as usize) << 4) | (self.rank as usize)
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        let rank = Rank::from_repr(u8::try_from(index & 0xf).ok()?)?;
        let suit = Suit::from_repr(u8::try_from(index >> 4).ok()?)?;
        Some(Self { rank, suit })
    }

    /// Convert a shorthand identifier into a card. Panics if the identifier
    /// is incorrect. This exists only for test-writing.
    ///
    /// ```
    /// # use equity_core::prelude::{Card, Suit, Rank};
    /// let a = Card::from_ident("Kh");
    /// let b = Card {
    ///     rank: Rank::King,
    ///     suit: Suit::Hearts,
    /// };
    /// assert_eq!(a, b);
    /// ```
    pub fn from_ident(ident: &str) -> Self {
        ident.parse().unwrap()
    }
}

impl FromStr for Card {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let (Some(rank), Some(suit), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(Error::InvalidCard(s.to_owned()));
        };

        match (Rank::from_char(rank), Suit::from_char(suit)) {
            (Some(rank), Some(suit)) => Ok(Self { rank, suit }),
            _ => Err(Error::InvalidCard(s.to_owned())),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.to_char(), self.suit.to_char())
    }
}

#[macro_export]
macro_rules! card {
    ($ident:literal) => {
        $crate::poker::cards::Card::from_ident($ident)
    };
}

#[macro_export]
macro_rules! cards {
    ($idents:literal) => {
        $crate::poker::cardset::CardSet::from_idents($idents)
    };
}

lazy_static! {
    static ref BASE_DECK_CARDS: Vec<Card> = {
        let mut cards = Vec::with_capacity(Card::COUNT);
        for suit in Suit::iter() {
            for rank in Rank::iter() {
                cards.push(Card { rank, suit });
            }
        }
        cards
    };
}

/// The cards still available once a set of known cards has been removed,
/// in a fixed order so that board completions can be addressed by index.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    pub fn base_deck() -> Self {
        Self {
            cards: BASE_DECK_CARDS.clone(),
        }
    }

    pub fn without(excluded: CardSet) -> Self {
        Self {
            cards: BASE_DECK_CARDS
                .iter()
                .copied()
                .filter(|card| !excluded.contains(*card))
                .collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.cards.len()
    }

    pub fn nth(&self, n: usize) -> Option<Card> {
        self.cards.get(n).copied()
    }

    /// Draw `n` distinct cards uniformly at random without disturbing the
    /// deck's order.
    pub fn sample(&self, rng: &mut impl Rng, n: usize) -> Option<CardSet> {
        if self.count() < n {
            return None;
        }

        let mut drawn = CardSet::empty();
        while drawn.count() < n {
            drawn.insert(self.cards[rng.gen_range(0..self.count())]);
        }
        Some(drawn)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}
