use thiserror::Error;

use super::cards::Card;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid card {0:?}")]
    InvalidCard(String),
    #[error("card {0} appears more than once")]
    DuplicateCard(Card),
    #[error("range {range:?} could not be parsed at {token:?}")]
    InvalidRangeSyntax { range: String, token: String },
    #[error("range {0:?} contains no playable combinations")]
    EmptyRange(String),
    #[error("between 2 and 10 ranges are required, got {0}")]
    RangeCountOutOfBounds(usize),
    #[error("invalid board {0:?}: a board holds 0, 3, 4 or 5 distinct cards")]
    InvalidBoardSpecification(String),
    #[error("invalid dead cards {0:?}")]
    InvalidDeadSpecification(String),
    #[error("the ranges admit no deal where every player holds distinct cards")]
    ConflictingRanges,
    #[error("sampling without a time limit or a margin of error would never stop")]
    UnboundedRun,
    #[error("a calculation is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;
