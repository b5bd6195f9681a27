//! Error types for the fileflow pipeline.
//!
//! Per-record failures travel as `Err` items on the record stream: fatal for
//! the record that triggered them, non-fatal for the stream. An unresolvable
//! stage name is deliberately NOT an error (it degrades to a pass-through).

use thiserror::Error;

/// The main error type for fileflow operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage received streaming contents it cannot process.
    #[error("{0}")]
    Streaming(#[from] StreamingNotSupportedError),

    /// A stage could not be constructed or configured.
    #[error("{0}")]
    StageConstruction(#[from] StageConstructionError),

    /// A lifecycle hook reported failure.
    #[error("{0}")]
    Hook(#[from] HookError),

    /// A glob pattern could not be interpreted.
    #[error("{0}")]
    Pattern(#[from] PatternError),

    /// A task name could not be resolved by the orchestrator.
    #[error("{0}")]
    TaskNotFound(#[from] TaskNotFoundError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Creates an internal error from a message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Error raised when a stage receives a record with streaming contents.
///
/// Buffer-oriented stages (ingest, dest) fail fast on streamed contents
/// rather than draining the stream mid-pipeline.
#[derive(Debug, Clone, Error)]
#[error("fileflow-{stage}: streaming is not supported")]
pub struct StreamingNotSupportedError {
    /// The stage that rejected the record.
    pub stage: String,
}

impl StreamingNotSupportedError {
    /// Creates a new streaming-not-supported error.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
        }
    }
}

/// Error raised when building or configuring a stage fails.
#[derive(Debug, Clone, Error)]
#[error("fileflow-{stage}: {reason}")]
pub struct StageConstructionError {
    /// The stage being constructed.
    pub stage: String,
    /// Why construction failed.
    pub reason: String,
}

impl StageConstructionError {
    /// Creates a new stage construction error.
    #[must_use]
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a lifecycle hook reports failure.
///
/// Hook errors are forwarded to the stream's error channel, never thrown
/// synchronously.
#[derive(Debug, Clone, Error)]
#[error("hook '{hook}' failed for '{path}': {reason}")]
pub struct HookError {
    /// The hook name (e.g. `onDest`).
    pub hook: String,
    /// The record path the hook was handling.
    pub path: String,
    /// The failure reason.
    pub reason: String,
}

impl HookError {
    /// Creates a new hook error.
    #[must_use]
    pub fn new(
        hook: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            hook: hook.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a glob pattern cannot be interpreted.
#[derive(Debug, Clone, Error)]
#[error("bad pattern '{pattern}': {reason}")]
pub struct PatternError {
    /// The offending pattern.
    pub pattern: String,
    /// Why it could not be interpreted.
    pub reason: String,
}

impl PatternError {
    /// Creates a new pattern error.
    #[must_use]
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when running a task name the orchestrator does not know.
#[derive(Debug, Clone, Error)]
#[error("task not found: {name}")]
pub struct TaskNotFoundError {
    /// The unknown task name.
    pub name: String,
}

impl TaskNotFoundError {
    /// Creates a new task-not-found error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
