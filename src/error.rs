//! Error types shared across the engine

use thiserror::Error;

/// A parameter failed validation
///
/// Carries the wire name of the offending field and the constraint it broke,
/// so callers can surface the problem next to the right input.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid parameter `{field}`: {constraint}")]
pub struct ValidationError {
    /// Field name as it appears in the request payload (camelCase)
    pub field: String,

    /// Human readable description of the violated constraint
    pub constraint: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

/// Errors raised by the simulation engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("simulation fault in {stage}: {message}")]
    Simulation { stage: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn simulation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Simulation {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
