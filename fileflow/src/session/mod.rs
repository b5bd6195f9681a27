//! Session-scoped task context.
//!
//! Tasks run as asynchronous stream pipelines, so two task runs can be
//! interleaved cooperatively (a watch-triggered rerun starting while a
//! previous run's IO is still settling). Instead of restoring an ambient
//! scope at callback time, fileflow passes the scope explicitly: every stage
//! that needs the task identifier receives it at construction, and the frame
//! lives exactly as long as the run's future.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Collection identifier used when no task is active in the scope.
pub const FALLBACK_TASK_ID: &str = "taskfile";

/// The key the task runner sets on scope entry.
pub const TASK_KEY: &str = "task";

struct ScopeFrame {
    run_id: Uuid,
    values: RwLock<HashMap<String, serde_json::Value>>,
    parent: Option<TaskScope>,
}

/// A key/value frame for one logical task run.
///
/// Cloning is cheap and shares the frame. Reads consult the frame and then
/// its enclosing frames, never a sibling run's frame, which is what keeps
/// interleaved runs from cross-contaminating.
#[derive(Clone)]
pub struct TaskScope {
    frame: Arc<ScopeFrame>,
}

impl TaskScope {
    /// Creates a scope with no active task.
    ///
    /// Identifier lookups on a detached scope degrade to
    /// [`FALLBACK_TASK_ID`] rather than fail.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            frame: Arc::new(ScopeFrame {
                run_id: Uuid::new_v4(),
                values: RwLock::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// Creates a child frame that observes this frame's values.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            frame: Arc::new(ScopeFrame {
                run_id: Uuid::new_v4(),
                values: RwLock::new(HashMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Returns the unique id of this run's frame.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.frame.run_id
    }

    /// Sets a value on the innermost frame.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.frame.values.write().insert(key.into(), value);
    }

    /// Reads a value, consulting enclosing frames on a miss.
    ///
    /// Never panics; a missing key is `None`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(value) = self.frame.values.read().get(key) {
            return Some(value.clone());
        }
        self.frame.parent.as_ref().and_then(|p| p.get(key))
    }

    /// Returns the name of the task this scope is running, if any.
    #[must_use]
    pub fn task_name(&self) -> Option<String> {
        self.get(TASK_KEY)
            .and_then(|v| v.as_str().map(String::from))
    }

    /// Returns the collection identifier for the current task.
    ///
    /// `task_{name}` when a task is active, [`FALLBACK_TASK_ID`] otherwise.
    #[must_use]
    pub fn task_id(&self) -> String {
        self.task_name()
            .map_or_else(|| FALLBACK_TASK_ID.to_string(), |name| format!("task_{name}"))
    }
}

impl std::fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScope")
            .field("run_id", &self.frame.run_id)
            .field("task", &self.task_name())
            .finish()
    }
}

/// Scoped acquisition of task context frames.
pub struct Session;

impl Session {
    /// Runs `f` under a fresh scope with `task` set to `task_name`.
    ///
    /// The frame is torn down when the returned future completes, on every
    /// exit path: the frame is owned by the scope handles, and the last one
    /// drops with the future even on panic unwind.
    pub async fn run<F, Fut, T>(task_name: impl Into<String>, f: F) -> T
    where
        F: FnOnce(TaskScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let name = task_name.into();
        let scope = TaskScope::detached();
        scope.set(TASK_KEY, serde_json::json!(name));

        tracing::debug!(task = %name, run_id = %scope.run_id(), "session scope opened");
        let out = f(scope.clone()).await;
        tracing::debug!(task = %name, run_id = %scope.run_id(), "session scope closed");
        out
    }

    /// Runs `f` under a child scope of `parent` with `task` re-pointed to
    /// `task_name`.
    ///
    /// Reads inside the child observe the parent's writes; the parent never
    /// observes the child's.
    pub async fn run_nested<F, Fut, T>(
        parent: &TaskScope,
        task_name: impl Into<String>,
        f: F,
    ) -> T
    where
        F: FnOnce(TaskScope) -> Fut,
        Fut: Future<Output = T>,
    {
        let name = task_name.into();
        let scope = parent.child();
        scope.set(TASK_KEY, serde_json::json!(name));

        tracing::debug!(task = %name, run_id = %scope.run_id(), "nested session scope opened");
        let out = f(scope.clone()).await;
        tracing::debug!(task = %name, run_id = %scope.run_id(), "nested session scope closed");
        out
    }
}
