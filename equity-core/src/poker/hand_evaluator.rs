use std::fmt;

use lazy_static::lazy_static;
use strum_macros::{EnumIter, FromRepr};

use crate::poker::cards::Suit;
use crate::poker::cardset::{rank_mask, CardSet};

#[derive(Copy, Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq, EnumIter, FromRepr)]
#[repr(u8)]
pub enum HandCategory {
    HighCard = 0,
    Pair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
}

/// Strength of the best five-card hand inside a set of cards.
///
/// The category sits above bit 20 and below it five 4-bit rank slots
/// hold the tiebreakers, most significant first: the made ranks in the
/// order they are compared (trips before pair, top pair before second
/// pair) followed by the kickers. Comparing two strengths as integers
/// therefore compares the hands.
#[derive(Copy, Clone, Debug, Default, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct HandStrength(u32);

impl HandStrength {
    const CATEGORY_SHIFT: u32 = 20;

    fn new(category: HandCategory, tiebreak: u32) -> Self {
        debug_assert!(tiebreak < 1 << Self::CATEGORY_SHIFT);
        Self(((category as u32) << Self::CATEGORY_SHIFT) | tiebreak)
    }

    pub fn category(self) -> HandCategory {
        HandCategory::from_repr((self.0 >> Self::CATEGORY_SHIFT) as u8)
            .unwrap_or(HandCategory::HighCard)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#07x})", self.category(), self.0)
    }
}

const RANK_MASKS: usize = 1 << 13;
const WHEEL: u16 = 0b1_0000_0000_1111;

fn highest_straight(ranks: u16) -> Option<u8> {
    (4..13_u8)
        .rev()
        .find(|top| {
            let window = 0b1_1111 << (top - 4);
            ranks & window == window
        })
        .or_else(|| (ranks & WHEEL == WHEEL).then_some(3))
}

fn top_five(ranks: u16) -> u32 {
    let mut slots = 0;
    let mut filled = 0;
    for rank in (0..13_u32).rev() {
        if filled == 5 {
            break;
        }
        if ranks & (1 << rank) != 0 {
            slots |= rank << (4 * (4 - filled));
            filled += 1;
        }
    }
    slots
}

lazy_static! {
    /// Highest rank of a straight inside a rank mask, plus one; 0 for none.
    static ref STRAIGHT_HIGH: Vec<u8> = (0..RANK_MASKS)
        .map(|ranks| highest_straight(ranks as u16).map_or(0, |top| top + 1))
        .collect();

    /// The five highest ranks of a mask packed into tiebreak slots.
    static ref TOP_FIVE: Vec<u32> = (0..RANK_MASKS)
        .map(|ranks| top_five(ranks as u16))
        .collect();

    /// Strength of a suit holding these ranks, for masks of five or more.
    static ref FLUSHES: Vec<HandStrength> = (0..RANK_MASKS)
        .map(|ranks| match STRAIGHT_HIGH[ranks] {
            0 => HandStrength::new(HandCategory::Flush, TOP_FIVE[ranks]),
            high => HandStrength::new(HandCategory::StraightFlush, u32::from(high - 1) << 16),
        })
        .collect();

    /// Strength of cards that share no rank: a straight or a high card.
    static ref UNPAIRED: Vec<HandStrength> = (0..RANK_MASKS)
        .map(|ranks| match STRAIGHT_HIGH[ranks] {
            0 => HandStrength::new(HandCategory::HighCard, TOP_FIVE[ranks]),
            high => HandStrength::new(HandCategory::Straight, u32::from(high - 1) << 16),
        })
        .collect();
}

#[derive(Debug)]
pub struct HandEvaluator {
    len: usize,
    suits: [u16; Suit::COUNT],
    ranks: u16,
}

impl HandEvaluator {
    fn new(cards: CardSet) -> Self {
        let len = cards.count();

        // Below five cards there is no hand to rank; above seven a flush no
        // longer rules out quads or a full house.
        debug_assert!((5..=7).contains(&len), "evaluating {len} cards");

        Self {
            len,
            suits: [cards.lane(0), cards.lane(1), cards.lane(2), cards.lane(3)],
            ranks: rank_mask(cards),
        }
    }

    /// Build the lookup tables up front so the first evaluation does not
    /// pay for them.
    pub fn init() {
        lazy_static::initialize(&FLUSHES);
        lazy_static::initialize(&UNPAIRED);
    }

    #[inline]
    fn highest(mask: u16) -> u32 {
        debug_assert!(mask != 0);
        15 - mask.leading_zeros()
    }

    /// The `count` highest ranks of `mask`, placed starting at tiebreak
    /// slot `slot`.
    #[inline]
    fn kickers(mask: u16, count: u32, slot: u32) -> u32 {
        let top = TOP_FIVE[mask as usize] >> (4 * (5 - count));
        top << (4 * (5 - slot - count))
    }

    #[inline]
    fn evaluate_flush(&self) -> Option<HandStrength> {
        self.suits
            .iter()
            .find(|suit| suit.count_ones() >= 5)
            .map(|suit| FLUSHES[*suit as usize])
    }

    #[inline]
    fn evaluate_rank_matches(&self) -> HandStrength {
        let [h0, h1, h2, h3] = self.suits;
        let ranks = self.ranks;

        let quads = h0 & h1 & h2 & h3;
        let trips = ((h0 & h1 & h2) | (h0 & h1 & h3) | (h0 & h2 & h3) | (h1 & h2 & h3)) & !quads;
        let pairs = ((h0 & h1) | (h0 & h2) | (h0 & h3) | (h1 & h2) | (h1 & h3) | (h2 & h3))
            & !quads
            & !trips;

        if quads != 0 {
            let quad = Self::highest(quads);
            let tiebreak = (quad << 16) | Self::kickers(ranks & !(1 << quad), 1, 1);
            return HandStrength::new(HandCategory::FourOfAKind, tiebreak);
        }

        if trips != 0 {
            let trip = Self::highest(trips);
            // A second set of trips plays as the pair.
            let rest = (trips | pairs) & !(1 << trip);
            if rest != 0 {
                let pair = Self::highest(rest);
                return HandStrength::new(HandCategory::FullHouse, (trip << 16) | (pair << 12));
            }
        }

        let straight = STRAIGHT_HIGH[ranks as usize];
        if straight != 0 {
            return HandStrength::new(HandCategory::Straight, u32::from(straight - 1) << 16);
        }

        if trips != 0 {
            let trip = Self::highest(trips);
            let tiebreak = (trip << 16) | Self::kickers(ranks & !(1 << trip), 2, 1);
            return HandStrength::new(HandCategory::ThreeOfAKind, tiebreak);
        }

        if pairs.count_ones() >= 2 {
            let high = Self::highest(pairs);
            let low = Self::highest(pairs & !(1 << high));
            let kicker = Self::kickers(ranks & !(1 << high) & !(1 << low), 1, 2);
            return HandStrength::new(
                HandCategory::TwoPair,
                (high << 16) | (low << 12) | kicker,
            );
        }

        let pair = Self::highest(pairs);
        let tiebreak = (pair << 16) | Self::kickers(ranks & !(1 << pair), 3, 1);
        HandStrength::new(HandCategory::Pair, tiebreak)
    }

    fn evaluate(&self) -> HandStrength {
        // With at most seven cards a flush leaves too few cards for quads or
        // a full house, so it settles the hand.
        if let Some(flush) = self.evaluate_flush() {
            return flush;
        }

        if self.ranks.count_ones() as usize == self.len {
            return UNPAIRED[self.ranks as usize];
        }

        self.evaluate_rank_matches()
    }

    /// Rank the best five-card poker hand among 5 to 7 cards.
    pub fn evaluate_poker_hand(cards: CardSet) -> HandStrength {
        let evaluator = Self::new(cards);
        evaluator.evaluate()
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use itertools::Itertools;
    use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

    use super::*;
    use crate::poker::cards::{Card, Deck};

    fn eval(idents: &str) -> HandStrength {
        HandEvaluator::evaluate_poker_hand(CardSet::from_idents(idents))
    }

    fn expect(idents: &str, category: HandCategory) {
        assert_eq!(eval(idents).category(), category, "{idents}");
    }

    fn expect_order(better: &str, worse: &str) {
        assert_eq!(
            eval(better).cmp(&eval(worse)),
            Ordering::Greater,
            "{better} should beat {worse}"
        );
    }

    fn expect_tie(a: &str, b: &str) {
        assert_eq!(eval(a), eval(b), "{a} should tie {b}");
    }

    /// Straightforward five-card ranking: group ranks by multiplicity and
    /// read the groups off largest first.
    fn reference_five(cards: &[Card]) -> u32 {
        let mut counts = [0_u32; 13];
        for card in cards {
            counts[card.rank as usize] += 1;
        }
        let groups: Vec<(u32, u32)> = (0..13_u32)
            .filter(|rank| counts[*rank as usize] > 0)
            .map(|rank| (counts[rank as usize], rank))
            .sorted_by(|a, b| b.cmp(a))
            .collect();

        let flush = cards.iter().all(|card| card.suit == cards[0].suit);
        let straight = if groups.len() == 5 {
            if groups[0].1 - groups[4].1 == 4 {
                Some(groups[0].1)
            } else if groups.iter().map(|(_, rank)| *rank).collect_vec() == [12, 3, 2, 1, 0] {
                Some(3)
            } else {
                None
            }
        } else {
            None
        };

        let category = match (straight, flush, groups[0].0, groups.get(1).map(|g| g.0)) {
            (Some(_), true, _, _) => HandCategory::StraightFlush,
            (_, _, 4, _) => HandCategory::FourOfAKind,
            (_, _, 3, Some(2)) => HandCategory::FullHouse,
            (_, true, _, _) => HandCategory::Flush,
            (Some(_), _, _, _) => HandCategory::Straight,
            (_, _, 3, _) => HandCategory::ThreeOfAKind,
            (_, _, 2, Some(2)) => HandCategory::TwoPair,
            (_, _, 2, _) => HandCategory::Pair,
            _ => HandCategory::HighCard,
        };

        let slots: Vec<u32> = match straight {
            Some(top) => vec![top],
            None => groups.iter().map(|(_, rank)| *rank).collect(),
        };
        let tiebreak = slots
            .iter()
            .enumerate()
            .fold(0, |acc, (i, rank)| acc | (rank << (4 * (4 - i))));

        ((category as u32) << 20) | tiebreak
    }

    fn reference_best(cards: &[Card]) -> u32 {
        cards
            .iter()
            .copied()
            .combinations(5)
            .map(|five| reference_five(&five))
            .max()
            .unwrap()
    }

    #[test]
    fn category_test() {
        expect("As 9c 6c Kh Ts", HandCategory::HighCard);
        expect("9s 2s 3c 9d As", HandCategory::Pair);
        expect("9s 2s 3c 9d 2h", HandCategory::TwoPair);
        expect("9s 2s 3c 9d 9h", HandCategory::ThreeOfAKind);
        expect("5s 8d 7s 6c 9s", HandCategory::Straight);
        expect("As Ts 9s 2s 5s", HandCategory::Flush);
        expect("9s 2d 2s 9d 9c", HandCategory::FullHouse);
        expect("9s 9d 2s 9h 9c", HandCategory::FourOfAKind);
        expect("5s 8s 7s 6s 9s", HandCategory::StraightFlush);
    }

    #[test]
    fn wheel_test() {
        expect("As 2d 3c 4h 5s", HandCategory::Straight);
        expect("As 2s 3s 4s 5s", HandCategory::StraightFlush);
        expect_order("2d 3c 4h 5s 6s", "As 2d 3c 4h 5s");
        expect_order("2s 3s 4s 5s 6s", "As 2s 3s 4s 5s");
        // No wrapping around the ace.
        expect("Qs Kd Ac 2h 3s", HandCategory::HighCard);
    }

    #[test]
    fn category_order_test() {
        let ladder = [
            "As Kd 9c 7h 2s",
            "2s 2d 3c 4h 6s",
            "2s 2d 3c 3h 4s",
            "2s 2d 2c 3h 4s",
            "As 2d 3c 4h 5s",
            "2s 3s 4s 5s 7s",
            "2s 2d 2c 3h 3s",
            "2s 2d 2c 2h 3s",
            "As 2s 3s 4s 5s",
        ];
        for (worse, better) in ladder.iter().tuple_windows() {
            expect_order(better, worse);
        }
    }

    #[test]
    fn kicker_test() {
        // Flushes compare card by card.
        expect_order("Ah Jh 9h 4h 2h", "Ah Jh 9h 3h 2h");
        expect_order("Kh Qh Jh 9h 7h As", "Kd Qd Jd 9d 6d");
        // Full houses compare trips first, then the pair.
        expect_order("3s 3d 3c 2h 2s", "2s 2d 2c Ah As");
        expect_order("As Ad Ac 3h 3s", "As Ad Ac 2h 2s");
        // Two pair: top pair, then second pair, then kicker.
        expect_order("Ks Kd 2c 2h 3s", "Qs Qd Jc Jh As");
        expect_order("Ks Kd 3c 3h 2s", "Ks Kd 2c 2h As");
        expect_order("Ks Kd 3c 3h 5s", "Ks Kd 3c 3h 4s");
        // Pairs and trips through their kickers.
        expect_order("9s 9d Ac 4h 2s", "9s 9d Kc Qh Js");
        expect_order("9s 9d Ac 4h 3s", "9s 9d Ac 4h 2s");
        expect_order("7s 7d 7c Ah 2s", "7s 7d 7c Kh Qs");
        // Quads by kicker.
        expect_order("7s 7d 7c 7h As", "7s 7d 7c 7h Ks");
        // High cards all the way down.
        expect_order("As Kd 9c 7h 3s", "As Kd 9c 7h 2s");
    }

    #[test]
    fn tie_test() {
        expect_tie("Ah Kd Qc Js 9h", "As Kc Qd Jh 9d");
        expect_tie("Ts Jd Qc Kh As", "Th Jc Qd Ks Ad");
        // Board plays for both.
        expect_tie("2c 3d As Ks Qs Js Ts", "4h 5h As Ks Qs Js Ts");
        expect_tie("2c 3d Ah Ad Kc Kh Qs", "2h 4d Ah Ad Kc Kh Qs");
    }

    #[test]
    fn seven_card_test() {
        // Best five of seven, ignoring the two lowest cards.
        expect_order("Ah Ad Kc Kh Qs 3d 2c", "Ah Ad Kc Kh Js 3d 2c");
        // Two sets of trips make a full house with the lower set as the pair.
        assert_eq!(
            eval("9s 9d 9c 4h 4s 4d Ac"),
            eval("9s 9d 9c 4h 4s 2d 3c")
        );
        assert_eq!(eval("9s 9d 9c 4h 4s 4d Ac").category(), HandCategory::FullHouse);
        // Three pairs count the best two and the highest remaining card.
        expect_tie("As Ad Ks Kd Qs Qd 2c", "As Ad Ks Kd Qs 3d 2c");
        // A straight beats trips hiding in the same seven cards.
        expect("5s 5d 5c 6h 7s 8d 9c", HandCategory::Straight);
        // Six consecutive ranks play the higher straight.
        expect_order("4s 5d 6c 7h 8s 9d 2c", "3s 4s 5d 6c 7h 8s 2c");
        // Quads with trips: the kicker is the highest remaining rank.
        expect_tie("8s 8d 8c 8h Ks Kd Kc", "8s 8d 8c 8h Ks 2d 3c");
        // Six suited cards play the best five.
        expect_order("Ah Th 8h 6h 4h 2h Kc", "Ah Th 8h 6h 3h 2h Kc");
    }

    #[test]
    fn reference_random_hands_test() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let deck = Deck::base_deck();
        let mut cards = deck.cards().to_vec();
        for len in [5, 6, 7] {
            for _ in 0..4_000 {
                cards.shuffle(&mut rng);
                let hand = &cards[..len];
                let fast = HandEvaluator::evaluate_poker_hand(hand.iter().copied().collect());
                assert_eq!(
                    fast.value(),
                    reference_best(hand),
                    "{}",
                    hand.iter().join(" ")
                );
            }
        }
    }

    #[test]
    fn reference_every_category_test() {
        // Random deals rarely reach the top categories, so check
        // constructed seven-card hands for each of them as well.
        for idents in [
            "As Ks Qs Js Ts 9s 8s",
            "9h 8h 7h 6h 5h 9d 9c",
            "Jc Jd Jh Js 2c 2d 2h",
            "Tc Td Th 5s 5d 5h 2c",
            "Ac Qc 9c 7c 3c Ad Ah",
            "Ac Kd Qh Js Tc Ad Ah",
            "6c 6d 6h Ks 2c 9d 4h",
            "Kc Kd 5h 5s 3c 3d 2h",
        ] {
            let cards = CardSet::from_idents(idents);
            let hand: Vec<Card> = cards.iter().collect();
            assert_eq!(
                HandEvaluator::evaluate_poker_hand(cards).value(),
                reference_best(&hand),
                "{idents}"
            );
        }
    }

    #[test]
    fn lookup_table_test() {
        assert_eq!(STRAIGHT_HIGH[0b1_1111_0000_0000], 13);
        assert_eq!(STRAIGHT_HIGH[usize::from(WHEEL)], 4);
        assert_eq!(STRAIGHT_HIGH[0b1_1110_0000_0000], 0);
        assert_eq!(TOP_FIVE[0b1_0000_0000_0001], 0xc0000);
        assert_eq!(TOP_FIVE[0b1_1111_1100_0000], 0xcba98);
    }
}
