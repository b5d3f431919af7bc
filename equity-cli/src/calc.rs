use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use itertools::Itertools;
use tracing::debug;

use equity_core::prelude::{
    self as equity, parse_board, parse_dead, CardSet, Config, EquityCalculator, RunResult, State,
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Args)]
pub struct CalcArgs {
    /// One hand range per player, e.g. "AA,KK" "QQ+,AKs" "random"
    #[arg(required = true)]
    ranges: Vec<String>,

    /// Board cards: none, a flop, a turn, or a river, e.g. "2c7d9h"
    #[arg(short = 'b', long = "board")]
    board: Option<String>,

    /// Cards known to be out of play
    #[arg(short = 'd', long = "dead")]
    dead: Option<String>,

    /// Sample random deals instead of enumerating every one
    #[arg(long = "mc", visible_alias = "monte-carlo", default_value = "false")]
    monte_carlo: bool,

    /// Standard error at which sampling stops
    #[arg(
        short = 'e',
        long = "margin",
        visible_alias = "stderr",
        default_value = "0.001"
    )]
    margin: f64,

    /// Time limit in seconds (use -t 0 for no time limit)
    #[arg(short = 't', long = "time", default_value = "30")]
    time: f64,

    /// Worker threads (0 for one per core)
    #[arg(long = "threads", default_value = "0")]
    threads: usize,

    /// Seed for reproducible sampling
    #[arg(long = "seed")]
    seed: Option<u64>,
}

fn parse_cards(
    text: Option<&str>,
    parse: fn(&str) -> equity::Result<CardSet>,
) -> Result<CardSet> {
    Ok(match text {
        Some(text) => parse(text)?,
        None => CardSet::empty(),
    })
}

fn print_result(ranges: &[String], result: &RunResult) {
    println!("Equity between {} players:", result.players);
    for (range, equity) in ranges.iter().zip_eq(&result.equity) {
        println!("{range}: {equity:.6}");
    }

    let seconds = result.elapsed.as_secs_f64();
    if result.is_complete() {
        println!("Calculation completed in {seconds:.1} seconds.");
    } else {
        println!(
            "Calculation timed out after {seconds:.1} seconds: target margin of error not reached."
        );
        if result.enumerate_all {
            println!("Consider using monte-carlo with --mc");
        }
    }
}

pub fn run(args: &CalcArgs) -> Result<()> {
    let board = parse_cards(args.board.as_deref(), parse_board)?;
    let dead = parse_cards(args.dead.as_deref(), parse_dead)?;

    if !args.margin.is_finite() || args.margin < 0.0 {
        bail!("invalid error margin {}", args.margin);
    }
    let time_limit = Duration::try_from_secs_f64(args.time).with_context(|| {
        format!(
            "invalid time limit {} (use -t 0 for no time limit)",
            args.time
        )
    })?;

    let mut calculator = EquityCalculator::with_config(Config {
        time_limit,
        threads: args.threads,
        seed: args.seed,
        ..Config::default()
    });
    debug!(%board, %dead, monte_carlo = args.monte_carlo, margin = args.margin, "starting");
    calculator
        .start(&args.ranges, board, dead, args.monte_carlo, args.margin)
        .context("could not start the calculation")?;

    while calculator.state() == State::Running {
        thread::sleep(POLL_INTERVAL);
        let snapshot = calculator.result();
        debug!(
            progress = snapshot.progress,
            stdev = snapshot.stdev,
            hands = snapshot.hands,
            "running"
        );
    }
    calculator.wait();

    let result = calculator.result();
    debug!(
        outcome = ?result.outcome,
        strategy = ?result.strategy,
        progress = result.progress,
        stdev = result.stdev,
        hands = result.hands,
        wins = ?result.wins,
        ties = ?result.ties,
        "finished"
    );
    print_result(&args.ranges, &result);

    Ok(())
}
