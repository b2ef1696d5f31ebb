//! Error types for tickload core

use crate::scheduler::TaskHandle;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in tickload core
#[derive(Debug, Error)]
pub enum TickloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("A transfer to this destination is already in progress: {0}")]
    AlreadyInProgress(Uuid),

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Server did not report a content length for {0}")]
    MissingContentLength(String),

    #[error("Transfer interrupted: {0}")]
    Interrupted(std::io::Error),

    #[error("Connection closed after {received} of {expected} bytes")]
    IncompleteBody { expected: u64, received: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler misuse: {0}")]
    SchedulerMisuse(#[from] SchedulerMisuse),
}

impl TickloadError {
    /// Network-side failures, as opposed to local disk or caller errors
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            TickloadError::Network(_)
                | TickloadError::ServerError { .. }
                | TickloadError::MissingContentLength(_)
                | TickloadError::Interrupted(_)
                | TickloadError::IncompleteBody { .. }
        )
    }
}

/// Non-fatal scheduler misuse. The offending call is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerMisuse {
    #[error("callback is already attached to this task")]
    DuplicateCallback,

    #[error("no task registered under flag {0:?}")]
    UnknownFlag(String),

    #[error("task {0} is not registered")]
    UnknownTask(TaskHandle),

    #[error("task {0} has already finished")]
    TaskFinished(TaskHandle),

    #[error("task {0} is not paused")]
    NotPaused(TaskHandle),
}

// Allow converting to String for display in hosts
impl From<TickloadError> for String {
    fn from(error: TickloadError) -> Self {
        error.to_string()
    }
}
