//! Hand range parsing.
//!
//! A range is a comma-separated list of tokens:
//! - `AhKs` - one specific combination; a suit may be `x` for any suit
//! - `AA`, `AK`, `AKs`, `AKo` - a pair, or an unpaired class (suited,
//!   offsuit, or both)
//! - `22+`, `A2s+`, `KTo+` - a class and everything above it
//! - `22-55`, `A2s-A5s`, `T9s-65s` - every class between two ends
//! - `Ax`, `Axs`, `Axo` - every class with the given top rank
//! - `random` (or `full`, `*`, `XX`) - all 1326 combinations

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::poker::cards::{Card, Rank, Suit};
use crate::poker::cardset::CardSet;
use crate::poker::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Suitedness {
    Any,
    Suited,
    Offsuit,
}

impl Suitedness {
    fn admits(self, first: Suit, second: Suit) -> bool {
        match self {
            Self::Any => true,
            Self::Suited => first == second,
            Self::Offsuit => first != second,
        }
    }
}

/// A starting hand class such as `AKs` or `77`, high rank first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct HandClass {
    high: Rank,
    low: Rank,
    suitedness: Suitedness,
}

impl HandClass {
    fn is_pair(self) -> bool {
        self.high == self.low
    }

    fn gap(self) -> u8 {
        self.high as u8 - self.low as u8
    }

    fn with_ranks(self, high: Rank, low: Rank) -> Self {
        Self { high, low, ..self }
    }

    fn combos(self, out: &mut BTreeSet<CardSet>) {
        for first in Suit::iter() {
            for second in Suit::iter() {
                if self.is_pair() && first >= second {
                    continue;
                }
                if !self.is_pair() && !self.suitedness.admits(first, second) {
                    continue;
                }
                out.insert(CardSet::pair(
                    Card::new(self.high, first),
                    Card::new(self.low, second),
                ));
            }
        }
    }
}

/// One card of an explicit combination; `None` stands for any suit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct CardPattern {
    rank: Rank,
    suit: Option<Suit>,
}

impl CardPattern {
    fn cards(self) -> impl Iterator<Item = Card> {
        Suit::iter()
            .filter(move |suit| self.suit.map_or(true, |wanted| wanted == *suit))
            .map(move |suit| Card::new(self.rank, suit))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Token {
    Random,
    Explicit(CardPattern, CardPattern),
    Class(HandClass),
    AndAbove(HandClass),
    Span(HandClass, HandClass),
    TopRank(Rank, Suitedness),
}

impl Token {
    fn parse(text: &str) -> Option<Self> {
        if matches!(text.to_ascii_lowercase().as_str(), "random" | "full" | "*" | "xx") {
            return Some(Self::Random);
        }

        if let Some((from, to)) = text.split_once('-') {
            return Some(Self::Span(parse_class(from)?, parse_class(to)?));
        }

        if let Some(class) = text.strip_suffix('+') {
            return Some(Self::AndAbove(parse_class(class)?));
        }

        let chars: Vec<char> = text.chars().collect();
        if chars.len() == 4 {
            return Some(Self::Explicit(
                parse_pattern(chars[0], chars[1])?,
                parse_pattern(chars[2], chars[3])?,
            ));
        }

        if chars.len() >= 2 && is_wildcard(chars[1]) {
            let suitedness = parse_suitedness(&chars[2..])?;
            return Some(Self::TopRank(Rank::from_char(chars[0])?, suitedness));
        }

        parse_class(text).map(Self::Class)
    }

    fn expand(self, out: &mut BTreeSet<CardSet>) -> Option<()> {
        match self {
            Self::Random => {
                for (first, second) in Card::all().tuple_combinations() {
                    out.insert(CardSet::pair(first, second));
                }
            }
            Self::Explicit(first, second) => {
                for a in first.cards() {
                    for b in second.cards() {
                        if a != b {
                            out.insert(CardSet::pair(a, b));
                        }
                    }
                }
            }
            Self::Class(class) => class.combos(out),
            Self::AndAbove(class) => expand_and_above(class, out),
            Self::Span(from, to) => expand_span(from, to, out)?,
            Self::TopRank(rank, suitedness) => {
                for low in Rank::iter().filter(|low| *low < rank) {
                    HandClass {
                        high: rank,
                        low,
                        suitedness,
                    }
                    .combos(out);
                }
                if suitedness == Suitedness::Any {
                    HandClass {
                        high: rank,
                        low: rank,
                        suitedness,
                    }
                    .combos(out);
                }
            }
        }
        Some(())
    }
}

fn is_wildcard(c: char) -> bool {
    matches!(c, 'x' | 'X' | '*')
}

fn parse_pattern(rank: char, suit: char) -> Option<CardPattern> {
    let rank = Rank::from_char(rank)?;
    let suit = if is_wildcard(suit) {
        None
    } else {
        Some(Suit::from_char(suit)?)
    };
    Some(CardPattern { rank, suit })
}

fn parse_suitedness(suffix: &[char]) -> Option<Suitedness> {
    match suffix {
        [] => Some(Suitedness::Any),
        ['s' | 'S'] => Some(Suitedness::Suited),
        ['o' | 'O'] => Some(Suitedness::Offsuit),
        _ => None,
    }
}

fn parse_class(text: &str) -> Option<HandClass> {
    let chars: Vec<char> = text.trim().chars().collect();
    if !(2..=3).contains(&chars.len()) {
        return None;
    }

    let first = Rank::from_char(chars[0])?;
    let second = Rank::from_char(chars[1])?;
    let suitedness = parse_suitedness(&chars[2..])?;
    if first == second && suitedness != Suitedness::Any {
        return None;
    }

    Some(HandClass {
        high: first.max(second),
        low: first.min(second),
        suitedness,
    })
}

fn expand_and_above(class: HandClass, out: &mut BTreeSet<CardSet>) {
    if class.is_pair() {
        for rank in Rank::iter().filter(|rank| *rank >= class.low) {
            class.with_ranks(rank, rank).combos(out);
        }
    } else {
        for low in Rank::iter().filter(|low| *low >= class.low && *low < class.high) {
            class.with_ranks(class.high, low).combos(out);
        }
    }
}

fn expand_span(from: HandClass, to: HandClass, out: &mut BTreeSet<CardSet>) -> Option<()> {
    if from.suitedness != to.suitedness || from.is_pair() != to.is_pair() {
        return None;
    }

    let (bottom, top) = if from.low <= to.low { (from, to) } else { (to, from) };

    if bottom.is_pair() {
        for rank in Rank::iter().filter(|rank| *rank >= bottom.low && *rank <= top.low) {
            bottom.with_ranks(rank, rank).combos(out);
        }
    } else if bottom.high == top.high {
        for low in Rank::iter().filter(|low| *low >= bottom.low && *low <= top.low) {
            bottom.with_ranks(bottom.high, low).combos(out);
        }
    } else if bottom.gap() == top.gap() {
        let mut class = bottom;
        loop {
            class.combos(out);
            if class == top {
                break;
            }
            class = class.with_ranks(class.high.next()?, class.low.next()?);
        }
    } else {
        return None;
    }
    Some(())
}

/// The hole-card combinations one player may hold.
///
/// Combinations are kept sorted so that parsing the same string twice
/// always produces the same range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range {
    combos: Vec<CardSet>,
}

impl Range {
    /// Parse a range, dropping every combination that uses one of the
    /// `excluded` cards (the board and dead cards of a calculation).
    ///
    /// ```
    /// # use equity_core::prelude::{CardSet, Range};
    /// let range = Range::parse("AA,AKs", CardSet::empty()).unwrap();
    /// assert_eq!(range.len(), 10);
    ///
    /// let board = CardSet::parse("Ah2c7d").unwrap();
    /// let range = Range::parse("AA,AKs", board).unwrap();
    /// assert_eq!(range.len(), 6);
    /// ```
    pub fn parse(text: &str, excluded: CardSet) -> Result<Self> {
        let mut combos = BTreeSet::new();
        for token in text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
        {
            let syntax_error = || Error::InvalidRangeSyntax {
                range: text.to_owned(),
                token: token.to_owned(),
            };
            Token::parse(token)
                .ok_or_else(syntax_error)?
                .expand(&mut combos)
                .ok_or_else(syntax_error)?;
        }

        let parsed = combos.len();
        combos.retain(|combo| combo.is_disjoint(excluded));
        debug!(range = text, parsed, playable = combos.len(), "expanded range");

        if combos.is_empty() {
            return Err(Error::EmptyRange(text.to_owned()));
        }

        Ok(Self {
            combos: combos.into_iter().collect(),
        })
    }

    pub fn combos(&self) -> &[CardSet] {
        &self.combos
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    /// Every card that appears in at least one combination.
    pub fn cards(&self) -> CardSet {
        self.combos
            .iter()
            .fold(CardSet::empty(), |cards, combo| cards | *combo)
    }
}

impl FromStr for Range {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, CardSet::empty())
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.combos.iter().format(","))
    }
}
