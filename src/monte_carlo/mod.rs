//! Monte Carlo orchestration: repeated perturbed runs, IRR memoization and
//! aggregation of the results

pub mod aggregate;
mod cache;
mod orchestrator;
mod run;

pub use aggregate::{Aggregator, MeanLoanOutcomes, MonteCarloResult, RiskMetrics, RunSample, Statistics, TimeSeries};
pub use cache::{CacheStats, CashFlowSignature, IrrCache};
pub use orchestrator::{MonteCarloConfig, MonteCarloSession, Progress, SessionObserver, SessionOutcome, DEFAULT_CHUNK_SIZE};
pub use run::{perturb, RunMetrics, SimulationRun};
