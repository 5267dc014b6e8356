//! Error taxonomy for a pipeline run.
//!
//! Degenerate epochs are not errors: they are collected as
//! [`DegenerateEpochWarning`](crate::aggregate::DegenerateEpochWarning)
//! values and the run continues.
use std::path::PathBuf;
use thiserror::Error;

use crate::config::SignalKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed timeline, config or channel map.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{kind} column '{column}' not found in recording")]
    MissingColumn { kind: SignalKind, column: String },

    #[error("processing {kind} signal failed: {reason}")]
    Processing { kind: SignalKind, reason: String },

    #[error("analysis of {channel} epoch '{label}' failed: {reason}")]
    AnalysisFailure {
        channel: String,
        label: String,
        reason: String,
    },

    #[error("no epochs left to report for {0}")]
    EmptyReport(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load recording {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("failed to write {}: {reason}", path.display())]
    Export { path: PathBuf, reason: String },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.into(), source }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Load { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn export(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Export { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
