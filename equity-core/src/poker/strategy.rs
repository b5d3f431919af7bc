//! Choosing between exhaustive enumeration and random sampling, and the
//! deal generators behind each.

use std::collections::HashSet;
use std::fmt;

use rand::{seq::SliceRandom, Rng};
use tracing::{debug, warn};

use crate::poker::cards::{Card, Deck};
use crate::poker::cardset::CardSet;
use crate::poker::error::{Error, Result};
use crate::poker::range::Range;

pub const MAX_PLAYERS: usize = 10;

/// Default ceiling on the number of completions evaluated exhaustively.
pub const DEFAULT_ENUMERATION_THRESHOLD: u64 = 2_500_000_000;

/// Ceiling on the hole cards stored for enumeration (assignments times
/// players), which bounds its memory use.
const MAX_ENUMERATED_HOLE_CARDS: usize = 1 << 23;

/// Combinations the assignment searches may try before giving up.
const SEARCH_BUDGET: usize = 1 << 22;

/// Fresh starts `Sampler::deal` makes before reporting failure.
const MAX_RESTARTS: usize = 64;

/// Random draws for one player before scanning for the combinations that
/// are still available.
const QUICK_DRAWS: usize = 8;

pub type Hands = heapless::Vec<CardSet, MAX_PLAYERS>;

/// One collision-free assignment of hole cards to every player plus a
/// complete five-card board.
#[derive(Clone, Debug, Default)]
pub struct Deal {
    pub hands: Hands,
    pub board: CardSet,
}

impl Deal {
    pub fn cards(&self) -> CardSet {
        self.hands
            .iter()
            .fold(self.board, |cards, hand| cards | *hand)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    Exhaustive,
    Sampling,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhaustive => write!(f, "exhaustive enumeration"),
            Self::Sampling => write!(f, "monte-carlo sampling"),
        }
    }
}

#[derive(Debug)]
pub enum Strategy {
    Exhaustive(Enumeration),
    Sampling(Sampler),
}

impl Strategy {
    /// Pick how a calculation will run.
    ///
    /// Every range must already have had the board and dead cards removed.
    /// Enumeration is used when it was not ruled out by `monte_carlo` and
    /// the exact number of completions is at most `threshold`.
    pub fn select(
        ranges: &[Range],
        board: CardSet,
        dead: CardSet,
        monte_carlo: bool,
        threshold: u64,
    ) -> Result<Self> {
        let missing = 5 - board.count();
        let known = board | dead;
        let remaining = CardSet::full().count() - known.count();
        if remaining < missing + 2 * ranges.len() {
            return Err(Error::InvalidDeadSpecification(dead.to_string()));
        }

        let combos: Vec<&[CardSet]> = ranges.iter().map(Range::combos).collect();
        match find_assignment(&combos, known) {
            Some(true) => {}
            Some(false) => return Err(Error::ConflictingRanges),
            None => {
                warn!("could not confirm that the ranges can be dealt together");
                return Ok(Self::Sampling(Sampler::unverified(ranges, board, dead)));
            }
        }

        let per_assignment = binomial(remaining - 2 * ranges.len(), missing);
        debug!(missing, per_assignment, "counting completions");

        if monte_carlo {
            return Ok(Self::Sampling(Sampler::new(ranges, board, dead)));
        }

        let limit = usize::try_from(threshold / per_assignment)
            .unwrap_or(usize::MAX)
            .min(MAX_ENUMERATED_HOLE_CARDS / ranges.len());
        let mut assigner = Assigner::new(&combos, limit);
        if !assigner.collect(known) {
            debug!(limit, "too many hole card assignments to enumerate");
            return Ok(Self::Sampling(Sampler::new(ranges, board, dead)));
        }

        Ok(Self::Exhaustive(Enumeration {
            players: ranges.len(),
            hole_cards: assigner.found,
            board,
            known,
            missing,
            per_assignment,
        }))
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Exhaustive(_) => StrategyKind::Exhaustive,
            Self::Sampling(_) => StrategyKind::Sampling,
        }
    }

    pub fn players(&self) -> usize {
        match self {
            Self::Exhaustive(enumeration) => enumeration.players,
            Self::Sampling(sampler) => sampler.ranges.len(),
        }
    }
}

/// Whether at least one collision-free assignment of one combination per
/// player exists, or `None` when the search ran out of budget first.
fn find_assignment(ranges: &[&[CardSet]], used: CardSet) -> Option<bool> {
    let mut ranges = ranges.to_vec();
    ranges.sort_by_key(|combos| combos.len());
    FeasibilitySearch {
        ranges,
        dead_ends: HashSet::new(),
        budget: SEARCH_BUDGET,
    }
    .search(0, used)
}

/// Depth-first search for a single assignment, most constrained player
/// first. The cards in use determine the depth, so the masks that led
/// nowhere are remembered on their own.
struct FeasibilitySearch<'a> {
    ranges: Vec<&'a [CardSet]>,
    dead_ends: HashSet<CardSet>,
    budget: usize,
}

impl FeasibilitySearch<'_> {
    fn search(&mut self, depth: usize, used: CardSet) -> Option<bool> {
        let Some(combos) = self.ranges.get(depth).copied() else {
            return Some(true);
        };
        if self.dead_ends.contains(&used) || !self.enough_cards(depth, used)? {
            return Some(false);
        }

        for combo in combos.iter().copied().filter(|combo| combo.is_disjoint(used)) {
            self.budget = self.budget.checked_sub(1)?;
            if self.search(depth + 1, used | combo)? {
                return Some(true);
            }
        }
        self.dead_ends.insert(used);
        Some(false)
    }

    /// Every remaining player still has a combination, and together their
    /// combinations touch at least two cards per player.
    fn enough_cards(&mut self, depth: usize, used: CardSet) -> Option<bool> {
        let mut available = CardSet::empty();
        for combos in &self.ranges[depth..] {
            self.budget = self.budget.checked_sub(combos.len())?;
            let mut found = false;
            for combo in combos.iter().filter(|combo| combo.is_disjoint(used)) {
                available |= *combo;
                found = true;
            }
            if !found {
                return Some(false);
            }
        }
        Some(available.count() >= 2 * (self.ranges.len() - depth))
    }
}

/// Depth-first search over one combination per player, skipping any that
/// collide with cards already taken.
struct Assigner<'a> {
    ranges: &'a [&'a [CardSet]],
    limit: usize,
    budget: usize,
    current: Hands,
    found: Vec<CardSet>,
    count: usize,
}

impl<'a> Assigner<'a> {
    fn new(ranges: &'a [&'a [CardSet]], limit: usize) -> Self {
        Self {
            ranges,
            limit,
            budget: SEARCH_BUDGET,
            current: Hands::new(),
            found: Vec::new(),
            count: 0,
        }
    }

    /// Collect every assignment into `found`, giving up with false as soon
    /// as there are more than `limit` of them or the search budget runs out.
    fn collect(&mut self, used: CardSet) -> bool {
        let Some(combos) = self.ranges.get(self.current.len()) else {
            self.count += 1;
            if self.count > self.limit {
                return false;
            }
            self.found.extend_from_slice(&self.current);
            return true;
        };

        for combo in combos.iter().copied() {
            if combo.intersects(used) {
                continue;
            }
            let Some(budget) = self.budget.checked_sub(1) else {
                return false;
            };
            self.budget = budget;
            let pushed = self.current.push(combo);
            debug_assert!(pushed.is_ok(), "more than {MAX_PLAYERS} players");
            let complete = self.collect(used | combo);
            self.current.pop();
            if !complete {
                return false;
            }
        }
        true
    }
}

/// Every board completion for every collision-free hole card assignment,
/// addressed by a single index so that workers can claim disjoint blocks.
///
/// Each assignment leaves the same number of unseen cards, so completion
/// `i` is completion `i % per_assignment` of assignment `i / per_assignment`.
#[derive(Debug)]
pub struct Enumeration {
    players: usize,
    hole_cards: Vec<CardSet>,
    board: CardSet,
    known: CardSet,
    missing: usize,
    per_assignment: u64,
}

impl Enumeration {
    pub fn total(&self) -> u64 {
        self.assignments() as u64 * self.per_assignment
    }

    pub fn assignments(&self) -> usize {
        self.hole_cards.len() / self.players
    }

    pub fn per_assignment(&self) -> u64 {
        self.per_assignment
    }

    fn hands(&self, assignment: usize) -> &[CardSet] {
        &self.hole_cards[assignment * self.players..(assignment + 1) * self.players]
    }

    /// Visit completions `start..end` in order, passing the hole cards and
    /// the full board of each.
    pub fn for_each_in(&self, start: u64, end: u64, mut visit: impl FnMut(&[CardSet], CardSet)) {
        let end = end.min(self.total());
        let mut index = start;
        while index < end {
            let assignment = (index / self.per_assignment) as usize;
            let hands = self.hands(assignment);
            let stop = end.min((assignment as u64 + 1) * self.per_assignment);

            if self.missing == 0 {
                visit(hands, self.board);
                index = stop;
                continue;
            }

            let used = hands.iter().fold(self.known, |used, hand| used | *hand);
            let deck = Deck::without(used);
            let mut combination =
                Combination::unrank(index % self.per_assignment, deck.count(), self.missing);
            while index < stop {
                visit(hands, self.board | combination.cards(&deck));
                combination.advance(deck.count());
                index += 1;
            }
        }
    }
}

/// A k-subset of `0..n` in lexicographic order, k at most 5.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Combination {
    indices: heapless::Vec<usize, 5>,
}

impl Combination {
    /// The `rank`-th k-subset of `0..n` in lexicographic order.
    fn unrank(mut rank: u64, n: usize, k: usize) -> Self {
        debug_assert!(rank < binomial(n, k));
        let mut indices = heapless::Vec::new();
        let mut next = 0;
        for slot in 0..k {
            loop {
                let starting_here = binomial(n - next - 1, k - slot - 1);
                if rank < starting_here {
                    break;
                }
                rank -= starting_here;
                next += 1;
            }
            let pushed = indices.push(next);
            debug_assert!(pushed.is_ok(), "more than five board cards");
            next += 1;
        }
        Self { indices }
    }

    /// Step to the following subset. Past the last one the state is
    /// unspecified.
    fn advance(&mut self, n: usize) {
        let k = self.indices.len();
        let Some(slot) = (0..k).rev().find(|slot| self.indices[*slot] < n - k + slot) else {
            return;
        };
        self.indices[slot] += 1;
        for later in slot + 1..k {
            self.indices[later] = self.indices[later - 1] + 1;
        }
    }

    fn cards(&self, deck: &Deck) -> CardSet {
        self.indices
            .iter()
            .filter_map(|index| deck.nth(*index))
            .collect()
    }
}

pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    (0..k as u64).fold(1, |acc, i| acc * (n as u64 - i) / (i + 1))
}

/// Draws random collision-free deals.
#[derive(Debug)]
pub struct Sampler {
    ranges: Vec<Vec<CardSet>>,
    board: CardSet,
    known: CardSet,
    missing: usize,
    verified: bool,
}

impl Sampler {
    pub fn new(ranges: &[Range], board: CardSet, dead: CardSet) -> Self {
        Self {
            ranges: ranges.iter().map(|range| range.combos().to_vec()).collect(),
            board,
            known: board | dead,
            missing: 5 - board.count(),
            verified: true,
        }
    }

    /// A sampler for ranges not yet known to admit a single deal.
    fn unverified(ranges: &[Range], board: CardSet, dead: CardSet) -> Self {
        Self {
            verified: false,
            ..Self::new(ranges, board, dead)
        }
    }

    /// Whether at least one deal is known to exist.
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Fill `deal` with a fresh random deal. Returns false, leaving `deal`
    /// untouched, when every attempt ran into a dead end.
    ///
    /// Players draw in a random order. Each picks uniformly among its
    /// combinations that avoid the cards already dealt, and the deal starts
    /// over only when some player has none left. Board cards are drawn from
    /// the 52 cards and redrawn while they hit a card already in play.
    pub fn deal(&self, rng: &mut impl Rng, deal: &mut Deal) -> bool {
        let players = self.ranges.len();
        let mut order: [usize; MAX_PLAYERS] = std::array::from_fn(|player| player);
        let order = &mut order[..players];

        'restart: for _ in 0..MAX_RESTARTS {
            order.shuffle(rng);
            let mut used = self.known;
            let mut hands = [CardSet::empty(); MAX_PLAYERS];
            for &player in order.iter() {
                let Some(combo) = self.draw(player, used, rng) else {
                    continue 'restart;
                };
                used |= combo;
                hands[player] = combo;
            }

            deal.hands.clear();
            let extended = deal.hands.extend_from_slice(&hands[..players]);
            debug_assert!(extended.is_ok(), "more than {MAX_PLAYERS} players");
            deal.board = self.complete_board(rng, used);
            return true;
        }
        false
    }

    fn draw(&self, player: usize, used: CardSet, rng: &mut impl Rng) -> Option<CardSet> {
        let combos = &self.ranges[player];
        for _ in 0..QUICK_DRAWS {
            let combo = combos[rng.gen_range(0..combos.len())];
            if combo.is_disjoint(used) {
                return Some(combo);
            }
        }

        let available = combos.iter().filter(|combo| combo.is_disjoint(used));
        let count = available.clone().count();
        if count == 0 {
            return None;
        }
        available.copied().nth(rng.gen_range(0..count))
    }

    fn complete_board(&self, rng: &mut impl Rng, mut used: CardSet) -> CardSet {
        let mut board = self.board;
        for _ in 0..self.missing {
            loop {
                let index = rng.gen_range(0..Card::COUNT);
                let card = CardSet::from_bits(1 << (((index / 13) << 4) | (index % 13)));
                if card.is_disjoint(used) {
                    used |= card;
                    board |= card;
                    break;
                }
            }
        }
        board
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::cards;

    fn ranges(texts: &[&str], excluded: CardSet) -> Vec<Range> {
        texts
            .iter()
            .map(|text| Range::parse(text, excluded).unwrap())
            .collect()
    }

    fn select(texts: &[&str], board: CardSet, monte_carlo: bool) -> Result<Strategy> {
        Strategy::select(
            &ranges(texts, board),
            board,
            CardSet::empty(),
            monte_carlo,
            DEFAULT_ENUMERATION_THRESHOLD,
        )
    }

    #[test]
    fn binomial_test() {
        assert_eq!(binomial(52, 5), 2_598_960);
        assert_eq!(binomial(48, 5), 1_712_304);
        assert_eq!(binomial(5, 0), 1);
        assert_eq!(binomial(3, 5), 0);
    }

    #[test]
    fn combination_order_test() {
        let n = 7;
        let k = 3;
        let mut combination = Combination::unrank(0, n, k);
        let mut seen = HashSet::new();
        for rank in 0..binomial(n, k) {
            assert_eq!(combination, Combination::unrank(rank, n, k));
            assert!(combination.indices.windows(2).all(|w| w[0] < w[1]));
            seen.insert(combination.indices.clone());
            combination.advance(n);
        }
        assert_eq!(seen.len(), 35);
    }

    #[test]
    fn exhaustive_selection_test() {
        let strategy = select(&["AhAs", "KdKc"], CardSet::empty(), false).unwrap();
        let Strategy::Exhaustive(enumeration) = strategy else {
            panic!("expected enumeration");
        };
        assert_eq!(enumeration.assignments(), 1);
        assert_eq!(enumeration.total(), 1_712_304);
    }

    #[test]
    fn conflicts_are_excluded_from_count_test() {
        // Every AA combo against every KK combo, then AA against AA where
        // each combo leaves exactly one disjoint partner.
        let board = cards!("2c 7d 9h Js");
        let Strategy::Exhaustive(enumeration) = select(&["AA", "KK"], board, false).unwrap() else {
            panic!("expected enumeration");
        };
        assert_eq!(enumeration.assignments(), 36);
        assert_eq!(enumeration.total(), 36 * 44);

        let Strategy::Exhaustive(enumeration) = select(&["AA", "AA"], board, false).unwrap() else {
            panic!("expected enumeration");
        };
        assert_eq!(enumeration.assignments(), 6);
    }

    #[test]
    fn sampling_selection_test() {
        let strategy = select(&["AhAs", "KdKc"], CardSet::empty(), true).unwrap();
        assert_eq!(strategy.kind(), StrategyKind::Sampling);

        let strategy = select(&["random", "random"], CardSet::empty(), false).unwrap();
        assert_eq!(strategy.kind(), StrategyKind::Sampling);
        assert_eq!(strategy.players(), 2);
    }

    #[test]
    fn conflicting_ranges_test() {
        assert_eq!(
            select(&["AhAs", "AhAs"], CardSet::empty(), false).unwrap_err(),
            Error::ConflictingRanges
        );
        assert_eq!(
            select(&["AhAs", "AsKs"], CardSet::empty(), true).unwrap_err(),
            Error::ConflictingRanges
        );
    }

    #[test]
    fn enumeration_covers_every_completion_once_test() {
        let board = cards!("2c 7d 9h");
        let Strategy::Exhaustive(enumeration) =
            select(&["AhAs", "KdKc,QdQc"], board, false).unwrap()
        else {
            panic!("expected enumeration");
        };
        assert_eq!(enumeration.total(), 2 * binomial(45, 2));

        // Claiming the space in uneven blocks still visits each deal once.
        let mut seen = HashSet::new();
        let mut start = 0;
        while start < enumeration.total() {
            let end = start + 37;
            enumeration.for_each_in(start, end, |hands, full_board| {
                assert_eq!(full_board.count(), 5);
                assert_eq!(full_board & board, board);
                let deal_cards = hands.iter().fold(full_board, |cards, hand| cards | *hand);
                assert_eq!(deal_cards.count(), 9);
                assert!(seen.insert((hands.to_vec(), full_board)));
            });
            start = end;
        }
        assert_eq!(seen.len() as u64, enumeration.total());
    }

    #[test]
    fn river_enumeration_test() {
        let board = cards!("2c 7d 9h Js Qs");
        let Strategy::Exhaustive(enumeration) = select(&["AA", "KK"], board, false).unwrap() else {
            panic!("expected enumeration");
        };
        let mut visits = 0;
        enumeration.for_each_in(0, enumeration.total(), |_, full_board| {
            assert_eq!(full_board, board);
            visits += 1;
        });
        assert_eq!(visits, 36);
    }

    #[test]
    fn sampled_deals_are_disjoint_test() {
        let board = cards!("2c 7d 9h");
        let dead = cards!("Ts");
        let ranges = ranges(&["AA,KK", "random", "QQ+,AK"], board | dead);
        let sampler = Sampler::new(&ranges, board, dead);
        let mut rng = SmallRng::seed_from_u64(11);
        let mut deal = Deal::default();
        for _ in 0..2_000 {
            assert!(sampler.deal(&mut rng, &mut deal));
            assert_eq!(deal.hands.len(), 3);
            assert_eq!(deal.board.count(), 5);
            assert_eq!(deal.board & board, board);
            assert!(deal.cards().is_disjoint(dead));
            assert_eq!(deal.cards().count(), 11);
            for (hand, range) in deal.hands.iter().zip(&ranges) {
                assert!(range.combos().contains(hand));
            }
        }
    }

    #[test]
    fn sampler_redraws_colliding_player_test() {
        // AhAs would leave the second player nothing, so only KhKs fits.
        let ranges = ranges(&["AhAs,KhKs", "AhKd"], CardSet::empty());
        let sampler = Sampler::new(&ranges, CardSet::empty(), CardSet::empty());
        let mut rng = SmallRng::seed_from_u64(3);
        let mut deal = Deal::default();
        for _ in 0..200 {
            assert!(sampler.deal(&mut rng, &mut deal));
            assert_eq!(deal.hands[0], cards!("Kh Ks"));
            assert_eq!(deal.hands[1], cards!("Ah Kd"));
        }
    }

    #[test]
    fn tight_multiway_ranges_test() {
        let texts = ["AA,KK,QQ,JJ,TT"; 10];

        // Ten players need twenty cards but Th dead leaves only nineteen.
        let dead = cards!("Th");
        let started = std::time::Instant::now();
        assert_eq!(
            Strategy::select(
                &ranges(&texts, dead),
                CardSet::empty(),
                dead,
                false,
                DEFAULT_ENUMERATION_THRESHOLD
            )
            .unwrap_err(),
            Error::ConflictingRanges
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        // Without it every deal uses all twenty cards.
        let ranges = ranges(&texts, CardSet::empty());
        let sampler = Sampler::new(&ranges, CardSet::empty(), CardSet::empty());
        let mut rng = SmallRng::seed_from_u64(5);
        let mut deal = Deal::default();
        for _ in 0..500 {
            assert!(sampler.deal(&mut rng, &mut deal));
            assert_eq!(deal.hands.len(), 10);
            assert_eq!(deal.cards().count(), 25);
        }
    }

    #[test]
    fn feasibility_search_test() {
        let aces = ranges(&["AA"], CardSet::empty());
        let combos: Vec<&[CardSet]> = vec![aces[0].combos(); 3];
        assert_eq!(find_assignment(&combos[..2], CardSet::empty()), Some(true));
        assert_eq!(find_assignment(&combos, CardSet::empty()), Some(false));
        assert_eq!(find_assignment(&combos[..2], cards!("Ah")), Some(false));
    }

    #[test]
    fn dead_cards_exhaust_deck_test() {
        let dead = CardSet::full() & !cards!("Ah As Kd Kc 2c 3c 4c");
        let ranges = ranges(&["AhAs", "KdKc"], dead);
        assert!(matches!(
            Strategy::select(&ranges, CardSet::empty(), dead, false, DEFAULT_ENUMERATION_THRESHOLD),
            Err(Error::InvalidDeadSpecification(_))
        ));
    }
}
