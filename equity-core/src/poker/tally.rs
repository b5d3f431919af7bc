use std::time::Duration;

use crate::poker::cardset::CardSet;
use crate::poker::hand_evaluator::{HandEvaluator, HandStrength};
use crate::poker::strategy::{StrategyKind, MAX_PLAYERS};

/// Deals a sampling run must see before its error estimate is trusted.
pub const MIN_SAMPLES: u64 = 1_000;

/// Running showdown counters for every player.
///
/// A deal won outright adds a whole win to its winner; a deal whose best
/// hand is shared by `k` players adds `1/k` to each of their ties. Along
/// with the shares, their squares are summed so that the variance of a
/// player's per-deal share can be recovered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tally {
    hands: u64,
    wins: Vec<u64>,
    ties: Vec<f64>,
    share_squares: Vec<f64>,
}

impl Tally {
    pub fn new(players: usize) -> Self {
        Self {
            hands: 0,
            wins: vec![0; players],
            ties: vec![0.0; players],
            share_squares: vec![0.0; players],
        }
    }

    pub fn players(&self) -> usize {
        self.wins.len()
    }

    pub fn hands(&self) -> u64 {
        self.hands
    }

    /// Evaluate every player's hole cards against `board` and record who
    /// takes the pot.
    pub fn showdown(&mut self, hole_cards: &[CardSet], board: CardSet) {
        let mut strengths = heapless::Vec::<HandStrength, MAX_PLAYERS>::new();
        for hand in hole_cards {
            let pushed = strengths.push(HandEvaluator::evaluate_poker_hand(*hand | board));
            debug_assert!(pushed.is_ok(), "more than {MAX_PLAYERS} players");
        }
        self.record(&strengths);
    }

    pub fn record(&mut self, strengths: &[HandStrength]) {
        debug_assert_eq!(strengths.len(), self.players());
        let Some(best) = strengths.iter().copied().max() else {
            return;
        };
        self.hands += 1;

        let winners = strengths.iter().filter(|strength| **strength == best).count();
        if winners == 1 {
            if let Some(winner) = strengths.iter().position(|strength| *strength == best) {
                self.wins[winner] += 1;
                self.share_squares[winner] += 1.0;
            }
            return;
        }

        #[allow(clippy::cast_precision_loss)]
        let share = 1.0 / winners as f64;
        for (player, strength) in strengths.iter().enumerate() {
            if *strength == best {
                self.ties[player] += share;
                self.share_squares[player] += share * share;
            }
        }
    }

    /// Add `other` into this tally and reset it to zero.
    pub fn absorb(&mut self, other: &mut Self) {
        debug_assert_eq!(self.players(), other.players());
        self.hands += other.hands;
        for player in 0..self.players() {
            self.wins[player] += other.wins[player];
            self.ties[player] += other.ties[player];
            self.share_squares[player] += other.share_squares[player];
        }
        other.clear();
    }

    pub fn clear(&mut self) {
        self.hands = 0;
        self.wins.fill(0);
        self.ties.fill(0.0);
        self.share_squares.fill(0.0);
    }

    #[allow(clippy::cast_precision_loss)]
    fn per_hand(&self, value: f64) -> f64 {
        if self.hands == 0 {
            0.0
        } else {
            value / self.hands as f64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn win_rate(&self, player: usize) -> f64 {
        self.per_hand(self.wins[player] as f64)
    }

    pub fn tie_rate(&self, player: usize) -> f64 {
        self.per_hand(self.ties[player])
    }

    pub fn equity(&self, player: usize) -> f64 {
        self.win_rate(player) + self.tie_rate(player)
    }

    /// Standard error of one player's equity estimate.
    #[allow(clippy::cast_precision_loss)]
    pub fn standard_error(&self, player: usize) -> f64 {
        if self.hands == 0 {
            return 0.0;
        }
        let mean = self.equity(player);
        let mean_square = self.per_hand(self.share_squares[player]);
        ((mean_square - mean * mean).max(0.0) / self.hands as f64).sqrt()
    }

    /// The largest standard error across players.
    pub fn stdev(&self) -> f64 {
        (0..self.players())
            .map(|player| self.standard_error(player))
            .fold(0.0, f64::max)
    }
}

/// How a run reached its end.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every completion was enumerated.
    Exhausted,
    /// The sampling error fell to the requested margin.
    Converged,
    /// The time limit ran out first.
    TimedOut,
}

/// A consistent snapshot of a calculation.
///
/// Before any deal has been tallied nothing distinguishes the players, so
/// each is given an equal share of equity with zero wins and ties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunResult {
    pub players: usize,
    pub equity: Vec<f64>,
    pub wins: Vec<f64>,
    pub ties: Vec<f64>,
    /// Fraction of the work done: completions enumerated, or for sampling
    /// how close the error estimate is to the requested margin.
    pub progress: f64,
    pub stdev: f64,
    pub hands: u64,
    pub elapsed: Duration,
    pub enumerate_all: bool,
    pub strategy: Option<StrategyKind>,
    pub outcome: Option<Outcome>,
}

impl RunResult {
    pub(crate) fn summarize(
        tally: &Tally,
        strategy: StrategyKind,
        progress: f64,
        stdev: f64,
        elapsed: Duration,
        outcome: Option<Outcome>,
    ) -> Self {
        let players = tally.players();
        let equity = if tally.hands() == 0 {
            #[allow(clippy::cast_precision_loss)]
            let share = 1.0 / players as f64;
            vec![share; players]
        } else {
            (0..players).map(|player| tally.equity(player)).collect()
        };
        Self {
            players,
            equity,
            wins: (0..players).map(|player| tally.win_rate(player)).collect(),
            ties: (0..players).map(|player| tally.tie_rate(player)).collect(),
            progress,
            stdev,
            hands: tally.hands(),
            elapsed,
            enumerate_all: strategy == StrategyKind::Exhaustive,
            strategy: Some(strategy),
            outcome,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}
