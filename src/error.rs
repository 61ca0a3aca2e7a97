//! Error taxonomy
//!
//! Initialization errors are detected by the coordinator and are fatal for
//! the whole group: each maps to the exit code every participant leaves
//! with. Tile errors stay local to one participant and only degrade its
//! contribution to the gathered results.

use crate::task::TaskState;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status used when the participant group itself breaks down
pub const EXIT_COMMUNICATION_FAILURE: i32 = 3;

/// Invalid or missing configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure of the coordinator's initialization step
#[derive(Debug, Error)]
pub enum InitError {
    /// Malformed command line; carries the rendered usage and message
    #[error("{0}")]
    Cli(String),

    /// Help or version was requested; carries the rendered text
    #[error("help requested")]
    Help(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Cannot create output directory, permission denied: {}", .0.display())]
    OutputPermission(PathBuf),
}

impl InitError {
    /// Exit status shared by every participant for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            InitError::Help(_) => 0,
            InitError::Cli(_) | InitError::Configuration(_) => 1,
            InitError::OutputPermission(_) => 2,
        }
    }
}

/// A tile runner could not be constructed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TileInitializationError(pub String);

impl TileInitializationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A tile runner failed part way through its tile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TileRunError(pub String);

impl TileRunError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure of a task phase
#[derive(Debug, Error)]
pub enum TaskError {
    /// The group agreed to stop; every participant exits with `code`
    #[error("task stopped with exit status {code}")]
    Exit { code: i32 },

    /// A phase was called out of order
    #[error("{operation}() called in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: TaskState,
    },

    /// A collective operation failed
    #[error("group communication failed: {0:#}")]
    Communication(#[from] anyhow::Error),
}

impl TaskError {
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskError::Exit { code } => *code,
            TaskError::InvalidState { .. } => 1,
            TaskError::Communication(_) => EXIT_COMMUNICATION_FAILURE,
        }
    }
}
