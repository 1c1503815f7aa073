//! Typed error hierarchy for grwm.
//!
//! Three top-level enums cover the three subsystems:
//! - `PipelineError`: orchestrator and session failures
//! - `StageError`: failures reported by a stage implementation
//! - `ConfigError`: configuration loading and validation

use grwm_common::{ErrorInfo, SessionStatus, StageName};
use thiserror::Error;

/// Errors from the orchestrator and the session registry.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failure that ended the session once retries ran out.
    #[error("Stage {stage} failed: {message}")]
    Stage { stage: StageName, message: String },

    /// The routing policy selected a stage whose input is missing.
    #[error("Stage {stage} cannot run: missing {missing}")]
    Precondition {
        stage: StageName,
        missing: &'static str,
    },

    /// A control call arrived while the session was in the wrong state.
    #[error("Session {session_id} is {actual}, expected {expected}")]
    State {
        session_id: String,
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Session {session_id} exceeded its time budget of {budget_secs}s")]
    Timeout { session_id: String, budget_secs: u64 },

    #[error("Session {session_id} not found")]
    NotFound { session_id: String },

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::State { .. } => "invalid_state",
            Self::Timeout { .. } => "timeout",
            Self::Stage { .. } => "stage_failed",
            Self::Precondition { .. } | Self::Internal(_) => "internal_error",
        }
    }
}

impl From<ErrorInfo> for PipelineError {
    fn from(info: ErrorInfo) -> Self {
        Self::Stage {
            stage: info.stage,
            message: info.message,
        }
    }
}

/// Errors returned by a stage's blocking `execute`.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The text model answered with an error or with no text.
    #[error("Model error: {0}")]
    Model(String),

    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for StageError {
    fn from(e: reqwest::Error) -> Self {
        StageError::Network(e.to_string())
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}
