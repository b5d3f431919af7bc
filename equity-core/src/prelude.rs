pub use crate::poker::cards::{Card, Deck, Rank, Suit};
pub use crate::poker::cardset::{parse_board, parse_dead, CardSet};
pub use crate::poker::engine::{Config, EquityCalculator, State};
pub use crate::poker::error::{Error, Result};
pub use crate::poker::hand_evaluator::{HandCategory, HandEvaluator, HandStrength};
pub use crate::poker::range::Range;
pub use crate::poker::strategy::{Deal, Strategy, StrategyKind, MAX_PLAYERS};
pub use crate::poker::tally::{Outcome, RunResult, Tally};
