//! The equity calculator: validates a request, picks a strategy, and runs
//! workers until the completions run out, the error estimate converges, or
//! time is up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::{rngs::SmallRng, SeedableRng};
use rayon::prelude::*;
use tracing::{info, trace, warn};

use crate::poker::cardset::CardSet;
use crate::poker::error::{Error, Result};
use crate::poker::hand_evaluator::HandEvaluator;
use crate::poker::range::Range;
use crate::poker::strategy::{
    Deal, Strategy, StrategyKind, DEFAULT_ENUMERATION_THRESHOLD, MAX_PLAYERS,
};
use crate::poker::tally::{Outcome, RunResult, Tally, MIN_SAMPLES};

pub const MIN_PLAYERS: usize = 2;

/// Longest a sampling worker keeps its counts to itself.
const MERGE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct Config {
    /// Wall-clock budget for a run; zero means no limit.
    pub time_limit: Duration,
    /// Worker count; zero uses rayon's global pool.
    pub threads: usize,
    /// Seed for reproducible sampling; each worker derives its own stream.
    pub seed: Option<u64>,
    /// Largest number of completions still enumerated exhaustively.
    pub enumeration_threshold: u64,
    /// Deals or completions a worker evaluates between merges.
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_limit: Duration::ZERO,
            threads: 0,
            seed: None,
            enumeration_threshold: DEFAULT_ENUMERATION_THRESHOLD,
            batch_size: 4_096,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    /// A stopping condition was met; workers may still be winding down.
    Finished(Outcome),
    /// Workers have been joined.
    Stopped(Outcome),
}

struct Progress {
    tally: Tally,
    outcome: Option<Outcome>,
    elapsed: Duration,
    workers_done: bool,
}

struct Shared {
    strategy: Strategy,
    target_margin: f64,
    time_limit: Duration,
    started: Instant,
    batch_size: usize,
    seed: Option<u64>,
    cursor: AtomicU64,
    stop: AtomicBool,
    progress: Mutex<Progress>,
    finished: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Progress> {
        // A worker that panicked mid-merge leaves counters that are still
        // individually valid.
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[allow(clippy::cast_precision_loss)]
    fn progress_fraction(&self, tally: &Tally, stdev: f64) -> f64 {
        match &self.strategy {
            Strategy::Exhaustive(enumeration) => tally.hands() as f64 / enumeration.total() as f64,
            Strategy::Sampling(_) => {
                if self.target_margin <= 0.0 || tally.hands() == 0 {
                    return 0.0;
                }
                let samples = (tally.hands() as f64 / MIN_SAMPLES as f64).min(1.0);
                let precision = if stdev > 0.0 {
                    (self.target_margin / stdev).powi(2)
                } else {
                    1.0
                };
                samples.min(precision).min(1.0)
            }
        }
    }

    fn stopping_condition(&self, tally: &Tally, elapsed: Duration) -> Option<Outcome> {
        if let Strategy::Exhaustive(enumeration) = &self.strategy {
            if tally.hands() >= enumeration.total() {
                return Some(Outcome::Exhausted);
            }
        } else if self.target_margin > 0.0
            && tally.hands() >= MIN_SAMPLES
            && tally.stdev() <= self.target_margin
        {
            return Some(Outcome::Converged);
        }

        if !self.time_limit.is_zero() && elapsed >= self.time_limit {
            return Some(Outcome::TimedOut);
        }
        None
    }

    fn finish(&self, progress: &mut Progress, outcome: Outcome, elapsed: Duration) {
        progress.outcome = Some(outcome);
        progress.elapsed = elapsed;
        self.stop.store(true, Ordering::Release);
        self.finished.notify_all();
        info!(
            ?outcome,
            hands = progress.tally.hands(),
            elapsed = ?elapsed,
            stdev = progress.tally.stdev(),
            "equity calculation finished"
        );
    }

    /// Move a worker's local counts into the shared tally. Returns false
    /// once the run is over; counts arriving after that are dropped.
    fn merge(&self, local: &mut Tally) -> bool {
        let mut progress = self.lock();
        if progress.outcome.is_some() {
            return false;
        }

        progress.tally.absorb(local);
        let elapsed = self.started.elapsed();
        trace!(hands = progress.tally.hands(), "merged worker tally");
        if let Some(outcome) = self.stopping_condition(&progress.tally, elapsed) {
            self.finish(&mut progress, outcome, elapsed);
            return false;
        }
        true
    }

    fn snapshot(&self) -> RunResult {
        let progress = self.lock();
        let elapsed = if progress.outcome.is_some() {
            progress.elapsed
        } else {
            self.started.elapsed()
        };
        let stdev = if progress.outcome == Some(Outcome::Exhausted) {
            0.0
        } else {
            progress.tally.stdev()
        };
        let fraction = if progress.outcome == Some(Outcome::Exhausted) {
            1.0
        } else {
            self.progress_fraction(&progress.tally, stdev)
        };
        RunResult::summarize(
            &progress.tally,
            self.strategy.kind(),
            fraction,
            stdev,
            elapsed,
            progress.outcome,
        )
    }

    fn work(&self, worker: usize) {
        let mut local = Tally::new(self.strategy.players());
        match &self.strategy {
            Strategy::Exhaustive(enumeration) => {
                let block = self.batch_size as u64;
                while !self.stop.load(Ordering::Acquire) {
                    let start = self.cursor.fetch_add(block, Ordering::Relaxed);
                    if start >= enumeration.total() {
                        break;
                    }
                    enumeration.for_each_in(start, start + block, |hands, board| {
                        local.showdown(hands, board);
                    });
                    if !self.merge(&mut local) {
                        break;
                    }
                }
            }
            Strategy::Sampling(sampler) => {
                let mut rng = match self.seed {
                    Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(worker as u64)),
                    None => SmallRng::from_entropy(),
                };
                let mut deal = Deal::default();
                while !self.stop.load(Ordering::Acquire) {
                    let batch_started = Instant::now();
                    for attempt in 0..self.batch_size {
                        if attempt % 64 == 0
                            && (self.stop.load(Ordering::Relaxed)
                                || batch_started.elapsed() >= MERGE_INTERVAL)
                        {
                            break;
                        }
                        if sampler.deal(&mut rng, &mut deal) {
                            local.showdown(&deal.hands, deal.board);
                        }
                    }
                    if !self.merge(&mut local) {
                        break;
                    }
                }
            }
        }
    }
}

/// Wakes `wait` when the workers are gone, including when one panicked.
struct WorkersDone<'a>(&'a Shared);

impl Drop for WorkersDone<'_> {
    fn drop(&mut self) {
        self.0.lock().workers_done = true;
        self.0.finished.notify_all();
    }
}

struct Run {
    shared: Arc<Shared>,
    workers: Option<JoinHandle<()>>,
}

/// Computes showdown equity between 2 to 10 hand ranges.
///
/// ```no_run
/// # use equity_core::prelude::*;
/// let mut calculator = EquityCalculator::new();
/// calculator.set_time_limit(std::time::Duration::from_secs(10));
/// calculator
///     .start(&["AhAs", "KdKc"], CardSet::empty(), CardSet::empty(), false, 0.0)
///     .unwrap();
/// calculator.wait();
/// let result = calculator.result();
/// assert!(result.equity[0] > result.equity[1]);
/// ```
#[derive(Default)]
pub struct EquityCalculator {
    config: Config,
    run: Option<Run>,
}

impl EquityCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self { config, run: None }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Limit the wall-clock time of the following runs; zero removes the
    /// limit.
    pub fn set_time_limit(&mut self, time_limit: Duration) {
        self.config.time_limit = time_limit;
    }

    pub fn state(&self) -> State {
        let Some(run) = &self.run else {
            return State::Idle;
        };
        match (run.shared.lock().outcome, &run.workers) {
            (None, _) => State::Running,
            (Some(outcome), Some(_)) => State::Finished(outcome),
            (Some(outcome), None) => State::Stopped(outcome),
        }
    }

    /// Validate a calculation and launch its workers without waiting for
    /// them.
    ///
    /// `ranges` holds one range string per player; `target_margin` is the
    /// standard error at which sampling stops, zero to sample until the
    /// time limit.
    pub fn start(
        &mut self,
        ranges: &[impl AsRef<str>],
        board: CardSet,
        dead: CardSet,
        monte_carlo: bool,
        target_margin: f64,
    ) -> Result<()> {
        if matches!(self.state(), State::Running | State::Finished(_)) {
            return Err(Error::AlreadyRunning);
        }

        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&ranges.len()) {
            return Err(Error::RangeCountOutOfBounds(ranges.len()));
        }
        if !matches!(board.count(), 0 | 3 | 4 | 5) {
            return Err(Error::InvalidBoardSpecification(board.to_string()));
        }
        if board.intersects(dead) {
            return Err(Error::InvalidDeadSpecification(dead.to_string()));
        }

        let target_margin = target_margin.max(0.0);
        let unbounded = self.config.time_limit.is_zero() && target_margin == 0.0;
        if monte_carlo && unbounded {
            return Err(Error::UnboundedRun);
        }

        let ranges = ranges
            .iter()
            .map(|range| Range::parse(range.as_ref(), board | dead))
            .collect::<Result<Vec<_>>>()?;

        let strategy = Strategy::select(
            &ranges,
            board,
            dead,
            monte_carlo,
            self.config.enumeration_threshold,
        )?;
        if strategy.kind() == StrategyKind::Sampling && unbounded {
            return Err(Error::UnboundedRun);
        }
        // Sampling ranges that may admit no deal at all only stops on time.
        if let Strategy::Sampling(sampler) = &strategy {
            if !sampler.is_verified() && self.config.time_limit.is_zero() {
                return Err(Error::UnboundedRun);
            }
        }

        HandEvaluator::init();
        let pool = self.build_pool();
        let workers = pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, rayon::ThreadPool::current_num_threads);

        let completions = match &strategy {
            Strategy::Exhaustive(enumeration) => enumeration.total(),
            Strategy::Sampling(_) => 0,
        };
        info!(
            players = ranges.len(),
            strategy = %strategy.kind(),
            combos = ?ranges.iter().map(Range::len).collect::<Vec<_>>(),
            completions,
            workers,
            "starting equity calculation"
        );

        let shared = Arc::new(Shared {
            strategy,
            target_margin,
            time_limit: self.config.time_limit,
            started: Instant::now(),
            batch_size: self.config.batch_size.max(1),
            seed: self.config.seed,
            cursor: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            progress: Mutex::new(Progress {
                tally: Tally::new(ranges.len()),
                outcome: None,
                elapsed: Duration::ZERO,
                workers_done: false,
            }),
            finished: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            let shared = worker_shared.as_ref();
            let _done = WorkersDone(shared);
            let run_workers = || {
                (0..workers)
                    .into_par_iter()
                    .for_each(|worker| shared.work(worker));
            };
            match pool {
                Some(pool) => pool.install(run_workers),
                None => run_workers(),
            }
        });

        self.run = Some(Run {
            shared,
            workers: Some(handle),
        });
        Ok(())
    }

    fn build_pool(&self) -> Option<rayon::ThreadPool> {
        if self.config.threads == 0 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|index| format!("equity-worker-{index}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(err) => {
                warn!(%err, "falling back to the global thread pool");
                None
            }
        }
    }

    /// Block until the run stops and join its workers. Does nothing when
    /// no run was started.
    pub fn wait(&mut self) {
        let Some(run) = &mut self.run else {
            return;
        };
        let Some(workers) = run.workers.take() else {
            return;
        };
        let shared = run.shared.as_ref();

        {
            let mut progress = shared.lock();
            while progress.outcome.is_none() && !progress.workers_done {
                if shared.time_limit.is_zero() {
                    progress = shared
                        .finished
                        .wait(progress)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    continue;
                }

                let elapsed = shared.started.elapsed();
                if elapsed >= shared.time_limit {
                    // Workers stuck in a long batch have not noticed yet.
                    shared.finish(&mut progress, Outcome::TimedOut, elapsed);
                    break;
                }
                progress = shared
                    .finished
                    .wait_timeout(progress, shared.time_limit - elapsed)
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .0;
            }
        }

        shared.stop.store(true, Ordering::Release);
        if let Err(panic) = workers.join() {
            std::panic::resume_unwind(panic);
        }
    }

    /// A snapshot of the current or last run. Safe to call while workers
    /// are still running.
    pub fn result(&self) -> RunResult {
        self.run
            .as_ref()
            .map(|run| run.shared.snapshot())
            .unwrap_or_default()
    }
}

impl Drop for EquityCalculator {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            run.shared.stop.store(true, Ordering::Release);
        }
    }
}
