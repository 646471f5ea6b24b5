//! Request and response envelopes of the message protocol
//!
//! Requests look like `{"type": "monteCarlo", "data": {...}, "id": "r1"}`;
//! every response echoes the request id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::monte_carlo::{MonteCarloResult, Progress};
use crate::params::SimulationParameters;
use crate::scenario::{
    NamedScenario, PortfolioProjection, ScenarioSummary, SensitivityParameter, SensitivityReport, DEFAULT_VARIATIONS,
};

/// Correlation id chosen by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::Text(s.to_string())
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

/// Kind of work a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    MonteCarlo,
    PortfolioProjections,
    SensitivityAnalysis,
    CompareScenarios,
    ClearCache,
    Cancel,
}

/// Incoming request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: TaskKind,

    /// Payload; missing or null means all defaults
    #[serde(default)]
    pub data: serde_json::Value,

    pub id: RequestId,
}

impl Request {
    pub fn new(kind: TaskKind, data: serde_json::Value, id: impl Into<RequestId>) -> Self {
        Self {
            kind,
            data,
            id: id.into(),
        }
    }

    /// Decode the envelope into a typed task
    pub fn task(&self) -> EngineResult<Task> {
        Ok(match self.kind {
            TaskKind::MonteCarlo => Task::MonteCarlo(self.payload()?),
            TaskKind::PortfolioProjections => Task::PortfolioProjections(self.payload()?),
            TaskKind::SensitivityAnalysis => Task::SensitivityAnalysis(self.payload()?),
            TaskKind::CompareScenarios => Task::CompareScenarios(self.payload()?),
            TaskKind::ClearCache => Task::ClearCache,
            TaskKind::Cancel => Task::Cancel,
        })
    }

    fn payload<T: DeserializeOwned + Default>(&self) -> EngineResult<T> {
        if self.data.is_null() {
            return Ok(T::default());
        }
        Ok(T::deserialize(&self.data)?)
    }
}

/// Decoded request
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    MonteCarlo(MonteCarloRequest),
    PortfolioProjections(SimulationParameters),
    SensitivityAnalysis(SensitivityRequest),
    CompareScenarios(CompareRequest),
    ClearCache,
    Cancel,
}

/// Monte Carlo payload: the parameters plus an optional chunk size
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloRequest {
    #[serde(flatten)]
    pub params: SimulationParameters,

    #[serde(default)]
    pub chunk_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensitivityRequest {
    pub params: SimulationParameters,
    pub parameters: Vec<SensitivityParameter>,
    /// Relative variations, e.g. -0.1 for -10%
    pub variations: Vec<f64>,
    pub chunk_size: Option<u32>,
}

impl Default for SensitivityRequest {
    fn default() -> Self {
        Self {
            params: SimulationParameters::default(),
            parameters: SensitivityParameter::DEFAULTS.to_vec(),
            variations: DEFAULT_VARIATIONS.to_vec(),
            chunk_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompareRequest {
    pub scenarios: Vec<NamedScenario>,
    /// Seed shared by all scenarios
    pub seed: Option<u64>,
    pub chunk_size: Option<u32>,
}

/// Progress report for a running task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub task: TaskKind,
    /// Percent complete of the current session
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_simulations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_simulations: Option<u32>,
}

impl ProgressEvent {
    pub fn from_progress(task: TaskKind, progress: &Progress, status: Option<String>) -> Self {
        Self {
            task,
            progress: progress.percent,
            status,
            current_chunk: Some(progress.chunk),
            total_chunks: Some(progress.total_chunks),
            processed_simulations: Some(progress.completed),
            total_simulations: Some(progress.total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub message: String,
    pub task: TaskKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledEvent {
    pub task: TaskKind,
    pub processed_simulations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub scenarios: Vec<ScenarioSummary>,
    pub seed: u64,
}

/// Outgoing event body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ResponseKind {
    Progress(ProgressEvent),
    MonteCarloResults(Box<MonteCarloResult>),
    PortfolioProjections(Box<PortfolioProjection>),
    SensitivityResults(SensitivityReport),
    ComparisonResults(ComparisonReport),
    Error(ErrorEvent),
    Cancelled(CancelledEvent),
    CacheCleared,
}

impl ResponseKind {
    /// Last event for its id
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResponseKind::Progress(_))
    }
}

/// Outgoing event envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(flatten)]
    pub kind: ResponseKind,

    pub id: RequestId,

    /// Set on terminal events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Response {
    pub fn new(id: RequestId, kind: ResponseKind) -> Self {
        let completed_at = kind.is_terminal().then(Utc::now);
        Self { kind, id, completed_at }
    }

    pub fn error(id: RequestId, task: TaskKind, message: impl Into<String>) -> Self {
        Self::new(
            id,
            ResponseKind::Error(ErrorEvent {
                message: message.into(),
                task,
            }),
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}
