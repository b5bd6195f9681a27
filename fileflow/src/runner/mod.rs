//! Task orchestrator boundary.
//!
//! Ordering and parallelism of named tasks belong to an external
//! orchestrator; fileflow only defines the contract and ships a sequential
//! implementation. Session scoping happens above this boundary: bodies
//! arrive here already wrapped so each invocation opens its own scope.

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{PipelineError, TaskNotFoundError};
use crate::observability::SpanTimer;

/// The future a task body produces.
pub type TaskFuture = BoxFuture<'static, Result<(), PipelineError>>;

/// A registered, invocable task body.
pub type TaskBody = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Outcome of one task invocation.
#[derive(Debug)]
pub struct TaskReport {
    /// The task name.
    pub name: String,
    /// The task's completion signal. One task's error leaves other tasks
    /// unaffected.
    pub outcome: Result<(), PipelineError>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl TaskReport {
    /// Returns true if the task completed without error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// The task orchestrator collaborator.
#[async_trait]
pub trait TaskOrchestrator: Send + Sync {
    /// Registers a body under a name, overwriting any existing entry.
    fn register(&self, name: &str, body: TaskBody);

    /// Returns true if a task is registered under `name`.
    fn contains(&self, name: &str) -> bool;

    /// Returns the registered task names.
    fn names(&self) -> Vec<String>;

    /// Runs the named tasks and reports each outcome.
    async fn run(&self, names: &[String]) -> Vec<TaskReport>;
}

/// Runs named tasks one after another in the order given.
///
/// No dependency graph: a body that needs another task's output runs after
/// it by being listed after it.
#[derive(Default)]
pub struct SequentialRunner {
    tasks: RwLock<HashMap<String, TaskBody>>,
}

impl SequentialRunner {
    /// Creates an empty runner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskOrchestrator for SequentialRunner {
    fn register(&self, name: &str, body: TaskBody) {
        self.tasks.write().insert(name.to_string(), body);
    }

    fn contains(&self, name: &str) -> bool {
        self.tasks.read().contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }

    async fn run(&self, names: &[String]) -> Vec<TaskReport> {
        let mut reports = Vec::with_capacity(names.len());

        for name in names {
            let body = self.tasks.read().get(name).cloned();
            let timer = SpanTimer::start();

            let outcome = match body {
                Some(body) => {
                    tracing::info!(task = %name, "task started");
                    body().await
                }
                None => Err(TaskNotFoundError::new(name.clone()).into()),
            };

            let duration_ms = timer.elapsed_ms();
            match &outcome {
                Ok(()) => tracing::info!(task = %name, duration_ms, "task completed"),
                Err(err) => tracing::error!(task = %name, duration_ms, error = %err, "task failed"),
            }

            reports.push(TaskReport {
                name: name.clone(),
                outcome,
                duration_ms,
            });
        }

        reports
    }
}

impl std::fmt::Debug for SequentialRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialRunner")
            .field("tasks", &self.names())
            .finish()
    }
}
