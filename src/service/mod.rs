//! Message service: typed requests in, progress and terminal events out
//!
//! ```ignore
//! let engine = Engine::new(EngineConfig::default());
//! let handle = engine.submit(Request::new(TaskKind::MonteCarlo, data, "run-1"));
//! let terminal = handle.wait().await;
//! ```

mod engine;
pub mod messages;

pub use engine::{CancelToken, Engine, EngineConfig, TaskHandle};
pub use messages::{
    CancelledEvent, CompareRequest, ComparisonReport, ErrorEvent, MonteCarloRequest, ProgressEvent, Request, RequestId,
    Response, ResponseKind, SensitivityRequest, Task, TaskKind,
};
