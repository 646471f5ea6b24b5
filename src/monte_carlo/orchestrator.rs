//! Chunked Monte Carlo sessions with progress reporting and cancellation

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::aggregate::{Aggregator, MonteCarloResult, RunSample};
use super::cache::IrrCache;
use super::run::{perturb, SimulationRun};
use crate::error::EngineResult;
use crate::params::SimulationParameters;
use crate::projection::ProjectionConfig;
use crate::rng::SimRng;

/// Runs per chunk unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: u32 = 1000;

/// Configuration for a Monte Carlo session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonteCarloConfig {
    /// Runs between progress reports and cancellation checks
    pub chunk_size: u32,

    /// Seed overriding the one in the parameters
    pub seed: Option<u64>,

    /// Entry limit for a cache created by the session
    pub cache_limit: Option<usize>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            seed: None,
            cache_limit: None,
        }
    }
}

/// Progress after a committed chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
    pub percent: f64,
    /// 1-based index of the chunk just committed
    pub chunk: u32,
    pub total_chunks: u32,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(Box<MonteCarloResult>),
    /// Stopped at a chunk boundary; nothing is reported for the committed runs
    Cancelled { processed: u32, chunks: u32 },
}

/// Hooks a caller can attach to a running session
pub trait SessionObserver {
    /// Called after each committed chunk
    fn on_progress(&mut self, _progress: &Progress) {}

    /// Checked before each chunk
    fn should_cancel(&mut self) -> bool {
        false
    }

    /// Checked before each chunk; true drops the session's IRR cache
    fn should_clear_cache(&mut self) -> bool {
        false
    }
}

/// Observer that never interrupts
impl SessionObserver for () {}

/// One Monte Carlo study over a validated parameter set
pub struct MonteCarloSession {
    params: SimulationParameters,
    config: MonteCarloConfig,
    rng: SimRng,
    cache: IrrCache,
    aggregator: Aggregator,
    completed: u32,
    chunks_done: u32,
}

impl MonteCarloSession {
    /// Validate parameters and seed the session
    pub fn new(params: SimulationParameters, config: MonteCarloConfig) -> EngineResult<Self> {
        params.validate()?;
        let rng = SimRng::new(config.seed.or(params.seed));
        let cache = match config.cache_limit {
            Some(limit) => IrrCache::with_limit(limit),
            None => IrrCache::new(),
        };

        Ok(Self {
            params,
            config,
            rng,
            cache,
            aggregator: Aggregator::new(),
            completed: 0,
            chunks_done: 0,
        })
    }

    /// Use an existing cache, e.g. from a previous session
    pub fn with_cache(mut self, cache: IrrCache) -> Self {
        self.cache = cache;
        self
    }

    /// Hand the cache on
    pub fn into_cache(self) -> IrrCache {
        self.cache
    }

    pub fn cache(&self) -> &IrrCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        debug!("clearing IRR cache ({} entries)", self.cache.len());
        self.cache.clear();
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn total(&self) -> u32 {
        self.params.num_simulations
    }

    fn chunk_size(&self) -> u32 {
        self.config.chunk_size.max(1)
    }

    pub fn total_chunks(&self) -> u32 {
        self.total().div_ceil(self.chunk_size())
    }

    pub fn completed(&self) -> u32 {
        self.completed
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.total()
    }

    /// Run and commit the next chunk
    ///
    /// If any run fails the whole chunk is discarded and the error returned.
    pub fn run_chunk(&mut self) -> EngineResult<Progress> {
        let size = self.chunk_size().min(self.total() - self.completed);
        let mut chunk = Vec::with_capacity(size as usize);

        for _ in 0..size {
            let params = perturb(&self.params, &mut self.rng);
            let run = SimulationRun::execute(
                params,
                ProjectionConfig { detailed_output: false },
                &mut self.rng,
                &mut self.cache,
            )?;
            chunk.push(RunSample::from(run));
        }

        self.aggregator.commit(chunk);
        self.completed += size;
        self.chunks_done += 1;

        let progress = Progress {
            completed: self.completed,
            total: self.total(),
            percent: self.completed as f64 / self.total() as f64 * 100.0,
            chunk: self.chunks_done,
            total_chunks: self.total_chunks(),
        };
        debug!(
            "chunk {}/{} committed ({} runs); cache {} entries, hit rate {:.1}%",
            progress.chunk,
            progress.total_chunks,
            progress.completed,
            self.cache.len(),
            self.cache.hit_rate() * 100.0
        );
        Ok(progress)
    }

    /// Outcome for a session stopped before completion
    pub fn cancelled(&self) -> SessionOutcome {
        warn!(
            "Monte Carlo session cancelled after {} of {} runs",
            self.completed,
            self.total()
        );
        SessionOutcome::Cancelled {
            processed: self.completed,
            chunks: self.chunks_done,
        }
    }

    /// Build the result from the committed runs
    pub fn finish(&self) -> MonteCarloResult {
        let result = self.aggregator.finish(self.rng.seed(), self.cache.stats());
        info!(
            "Monte Carlo session finished: {} runs, {} without IRR",
            result.num_simulations, result.statistics.non_convergent_irr
        );
        result
    }

    /// Run every chunk, consulting the observer at each boundary
    pub fn run<O: SessionObserver + ?Sized>(&mut self, observer: &mut O) -> EngineResult<SessionOutcome> {
        info!(
            "starting Monte Carlo session: {} runs in {} chunks (seed {:?})",
            self.total(),
            self.total_chunks(),
            self.rng.seed()
        );

        while !self.is_finished() {
            if observer.should_cancel() {
                return Ok(self.cancelled());
            }
            if observer.should_clear_cache() {
                self.clear_cache();
            }
            let progress = self.run_chunk()?;
            observer.on_progress(&progress);
        }

        Ok(SessionOutcome::Completed(Box::new(self.finish())))
    }

    /// Run to completion without an observer
    pub fn run_to_completion(&mut self) -> EngineResult<MonteCarloResult> {
        while !self.is_finished() {
            self.run_chunk()?;
        }
        Ok(self.finish())
    }
}
