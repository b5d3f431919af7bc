pub mod cards;
pub mod cardset;
pub mod engine;
pub mod error;
pub mod hand_evaluator;
pub mod range;
pub mod strategy;
pub mod tally;
