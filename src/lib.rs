//! Portfolio Simulation - cash-flow and Monte Carlo risk engine for private credit funds
//!
//! This library provides:
//! - Parameter defaults, normalization and validation
//! - Synthetic loan book generation from zone and geography targets
//! - Monthly loan life-cycle projection into yearly fund cash flows
//! - European, American and hybrid carried-interest waterfalls
//! - IRR, equity multiple, Sharpe ratio, drawdown and Value-at-Risk
//! - Chunked Monte Carlo sessions with progress, cancellation and IRR memoization
//! - Sensitivity analysis and scenario comparison
//! - An async request/response service for front ends

pub mod error;
pub mod params;
pub mod rng;
pub mod portfolio;
pub mod projection;
pub mod waterfall;
pub mod metrics;
pub mod monte_carlo;
pub mod scenario;
pub mod service;

// Re-export commonly used types
pub use error::{EngineError, EngineResult, ValidationError};
pub use params::{load_parameters, SimulationParameters, WaterfallType};
pub use rng::{RandomSource, SimRng};
pub use portfolio::{Loan, PortfolioGenerator};
pub use projection::{CashFlowSeries, ProjectionConfig, ProjectionEngine, ProjectionResult};
pub use waterfall::{Distribution, Distributor};
pub use monte_carlo::{IrrCache, MonteCarloConfig, MonteCarloResult, MonteCarloSession};
pub use scenario::ScenarioRunner;
pub use service::{Engine, EngineConfig, Request, Response, TaskHandle};
