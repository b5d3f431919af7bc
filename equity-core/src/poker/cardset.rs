use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use itertools::Itertools;
use static_assertions::const_assert;

use super::cards::{Card, Rank, Suit};
use super::error::{Error, Result};

/// A set of cards as a 52-bit mask, one 16-bit lane per suit with the rank
/// in the low 13 bits of each lane. The 3 spare bits of every lane are
/// always zero.
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CardSet(u64);

#[rustfmt::skip]
impl CardSet {
    const SPADES_MASK:   u64 = 0x0000_0000_0000_1fff;
    const CLUBS_MASK:    u64 = 0x0000_0000_1fff_0000;
    const HEARTS_MASK:   u64 = 0x0000_1fff_0000_0000;
    const DIAMONDS_MASK: u64 = 0x1fff_0000_0000_0000;

    const ALL_CARDS_MASK: u64 = Self::SPADES_MASK | Self::CLUBS_MASK | Self::HEARTS_MASK | Self::DIAMONDS_MASK;

    const MASK_TABLE: [u64; 4] = [
        Self::SPADES_MASK,
        Self::CLUBS_MASK,
        Self::HEARTS_MASK,
        Self::DIAMONDS_MASK,
    ];
}

const_assert!(CardSet::SPADES_MASK.count_ones() == 13);
const_assert!(CardSet::CLUBS_MASK.count_ones() == 13);
const_assert!(CardSet::HEARTS_MASK.count_ones() == 13);
const_assert!(CardSet::DIAMONDS_MASK.count_ones() == 13);
const_assert!(CardSet::ALL_CARDS_MASK.count_ones() == 52);

#[allow(clippy::multiple_inherent_impl)]
impl CardSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn full() -> Self {
        Self(Self::ALL_CARDS_MASK)
    }

    /// Build a set from raw bits, discarding anything outside the 52 card
    /// positions.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits & Self::ALL_CARDS_MASK)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn of(card: Card) -> Self {
        Self(Self::get_mask(card))
    }

    pub fn pair(first: Card, second: Card) -> Self {
        Self(Self::get_mask(first) | Self::get_mask(second))
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn count_in_suit(self, suit: Suit) -> usize {
        (self.0 & Self::MASK_TABLE[suit as usize]).count_ones() as usize
    }

    /// The 13-bit rank mask of the cards held in one suit.
    #[inline]
    pub fn suit_ranks(self, suit: Suit) -> u16 {
        self.lane(suit as usize)
    }

    #[inline]
    pub(crate) fn lane(self, suit: usize) -> u16 {
        ((self.0 >> (suit << 4)) & Self::SPADES_MASK) as u16
    }

    pub fn insert(&mut self, card: Card) {
        self.0 |= Self::get_mask(card);
    }

    pub fn remove(&mut self, card: Card) {
        self.0 &= Self::ALL_CARDS_MASK & !Self::get_mask(card);
    }

    pub fn contains(self, card: Card) -> bool {
        (self.0 & Self::get_mask(card)) > 0
    }

    #[inline]
    pub const fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        !self.is_disjoint(other)
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Card> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Card::from_index(index)
        })
    }

    /// Parse a run of cards such as `"AhKs2c"`. Whitespace and commas
    /// between cards are ignored; a repeated card is an error.
    ///
    /// ```
    /// # use equity_core::prelude::CardSet;
    /// let board = CardSet::parse("Ah Ks, 2c").unwrap();
    /// assert_eq!(board.count(), 3);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let compact: Vec<char> = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .collect();
        if compact.len() % 2 != 0 {
            return Err(Error::InvalidCard(s.trim().to_owned()));
        }

        let mut cardset = Self::empty();
        for chunk in compact.chunks(2) {
            let ident: String = chunk.iter().collect();
            let card: Card = ident.parse()?;
            if cardset.contains(card) {
                return Err(Error::DuplicateCard(card));
            }
            cardset.insert(card);
        }
        Ok(cardset)
    }

    /// Convert a series of shorthand identifiers into a `CardSet`.
    /// Panics if the input is incorrect. This exists only for test-writing.
    pub fn from_idents(idents: &str) -> Self {
        idents
            .split_ascii_whitespace()
            .map(Card::from_ident)
            .collect()
    }

    #[inline]
    fn get_index(card: Card) -> usize {
        ((card.suit as u8 as usize) << 4) | (card.rank as u8 as usize)
    }

    #[inline]
    fn get_mask(card: Card) -> u64 {
        1_u64 << Self::get_index(card)
    }
}

/// Parse the community cards a calculation starts from: 0, 3, 4 or 5 cards.
pub fn parse_board(s: &str) -> Result<CardSet> {
    let board = CardSet::parse(s).map_err(|_| Error::InvalidBoardSpecification(s.to_owned()))?;
    match board.count() {
        0 | 3 | 4 | 5 => Ok(board),
        _ => Err(Error::InvalidBoardSpecification(s.to_owned())),
    }
}

/// Parse the cards removed from the deck for a calculation.
pub fn parse_dead(s: &str) -> Result<CardSet> {
    CardSet::parse(s).map_err(|_| Error::InvalidDeadSpecification(s.to_owned()))
}

impl FromIterator<Card> for CardSet {
    fn from_iter<T: IntoIterator<Item = Card>>(iter: T) -> Self {
        let mut cardset = Self::empty();
        for card in iter {
            cardset.insert(card);
        }
        cardset
    }
}

impl From<Card> for CardSet {
    fn from(card: Card) -> Self {
        Self::of(card)
    }
}

impl BitOr for CardSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CardSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for CardSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for CardSet {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for CardSet {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL_CARDS_MASK)
    }
}

impl fmt::Display for CardSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Highest rank first reads the way players write hands.
        let cards = self
            .iter()
            .sorted_by(|a, b| b.rank.cmp(&a.rank).then(a.suit.cmp(&b.suit)));
        write!(f, "{}", cards.format(""))
    }
}

impl fmt::Debug for CardSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardSet({self})")
    }
}

/// Ranks present in a set regardless of suit.
pub(crate) fn rank_mask(cards: CardSet) -> u16 {
    cards.lane(0) | cards.lane(1) | cards.lane(2) | cards.lane(3)
}

pub(crate) fn rank_bit(rank: Rank) -> u16 {
    1 << (rank as u16)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::{card, cards};

    #[test]
    fn counting_test() {
        let mut cardset = CardSet::full();

        assert_eq!(cardset.count(), 52);
        assert_eq!(cardset.count_in_suit(Suit::Spades), 13);
        assert_eq!(cardset.count_in_suit(Suit::Clubs), 13);
        assert_eq!(cardset.count_in_suit(Suit::Hearts), 13);
        assert_eq!(cardset.count_in_suit(Suit::Diamonds), 13);

        assert!(cardset.contains(card!("Kh")));
        cardset.remove(card!("Kh"));
        assert!(!cardset.contains(card!("Kh")));
        assert_eq!(cardset.count(), 51);
        assert_eq!(cardset.count_in_suit(Suit::Hearts), 12);
    }

    #[test]
    fn from_idents_test() {
        let cardset = CardSet::from_idents("Kh Ts 9d 8c 8c 8c Ts Ks Kd");
        assert_eq!(cardset.count(), 6);
    }

    #[test]
    fn set_operations_test() {
        let a = cards!("Ah Kh");
        let b = cards!("Kh Qd");
        assert_eq!((a | b).count(), 3);
        assert_eq!(a & b, cards!("Kh"));
        assert!(a.intersects(b));
        assert!(a.is_disjoint(cards!("2c 3c")));
        assert_eq!((!a).count(), 50);
        assert_eq!(!CardSet::full(), CardSet::empty());
        assert_eq!(CardSet::from_bits(u64::MAX), CardSet::full());
    }

    #[test]
    fn iter_test() {
        let cardset = cards!("2s Ad Th");
        let cards: Vec<_> = cardset.iter().collect();
        assert_eq!(cards.len(), 3);
        assert!(cards.contains(&card!("Ad")));
        assert_eq!(cardset.iter().collect::<CardSet>(), cardset);
    }

    #[test]
    fn suit_ranks_test() {
        let cardset = cards!("As Ks 2s 2h");
        assert_eq!(cardset.suit_ranks(Suit::Spades), 0b1_1000_0000_0001);
        assert_eq!(cardset.suit_ranks(Suit::Hearts), 0b1);
        assert_eq!(cardset.suit_ranks(Suit::Diamonds), 0);
        assert_eq!(rank_mask(cardset), 0b1_1000_0000_0001);
    }

    #[test]
    fn parse_test() {
        assert_eq!(CardSet::parse("AhKs2c").unwrap(), cards!("Ah Ks 2c"));
        assert_eq!(CardSet::parse("").unwrap(), CardSet::empty());
        assert!(matches!(
            CardSet::parse("AhAh"),
            Err(Error::DuplicateCard(_))
        ));
        assert!(CardSet::parse("AhK").is_err());
        assert!(CardSet::parse("AhKz").is_err());
    }

    #[test]
    fn parse_board_test() {
        assert_eq!(parse_board("").unwrap().count(), 0);
        assert_eq!(parse_board("AhKs2c").unwrap().count(), 3);
        assert_eq!(parse_board("AhKs2c3d4d").unwrap().count(), 5);
        assert!(matches!(
            parse_board("AhKs"),
            Err(Error::InvalidBoardSpecification(_))
        ));
        assert!(matches!(
            parse_board("AhKs2c3d4d5d"),
            Err(Error::InvalidBoardSpecification(_))
        ));
        assert!(matches!(
            parse_board("Zz"),
            Err(Error::InvalidBoardSpecification(_))
        ));
    }

    #[test]
    fn parse_dead_test() {
        assert_eq!(parse_dead("2c 2d").unwrap().count(), 2);
        assert!(matches!(
            parse_dead("2c2"),
            Err(Error::InvalidDeadSpecification(_))
        ));
    }

    #[test]
    fn display_test() {
        assert_eq!(cards!("2c Ah").to_string(), "Ah2c");
    }
}
