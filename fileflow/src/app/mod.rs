//! The application facade.
//!
//! An [`App`] owns the pieces a build pipeline shares: an embedded task
//! runner, an embedded template store, the stage registry, the filesystem
//! collaborator, and configuration. The pieces compose by delegation; there
//! are no ambient globals; stages receive references at construction.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::errors::PipelineError;
use crate::pipeline::{compose, BoxTransform, RecordStream, StageSource, Transform};
use crate::registry::{StageOptions, StageRegistry};
use crate::runner::{SequentialRunner, TaskBody, TaskOrchestrator, TaskReport};
use crate::session::{Session, TaskScope, FALLBACK_TASK_ID};
use crate::stages::{DestHook, DestStage, DestTarget, InitStage, SourceOptions, SourceStage};
use crate::store::{Collection, TemplateStore};
use crate::vfs::{MemoryVfs, Vfs};

/// The name run when no task names are given.
pub const DEFAULT_TASK: &str = "default";

/// Application-level configuration.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Template delimiter pair handed to the rendering collaborator.
    pub delims: (String, String),
    /// Read file contents when sourcing.
    pub read: bool,
    /// Buffer contents eagerly when sourcing.
    pub buffer: bool,
    /// Front-matter delimiter override.
    pub matter_delims: Option<String>,
    /// Free-form flags consulted during composition (`plugin {name}`).
    pub flags: StageOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            delims: ("{{".to_string(), "}}".to_string()),
            read: true,
            buffer: true,
            matter_delims: None,
            flags: StageOptions::new(),
        }
    }
}

impl AppOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the template delimiter pair.
    #[must_use]
    pub fn with_delims(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.delims = (open.into(), close.into());
        self
    }

    /// Sets whether sourcing reads contents.
    #[must_use]
    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Sets whether sourcing buffers contents.
    #[must_use]
    pub fn with_buffer(mut self, buffer: bool) -> Self {
        self.buffer = buffer;
        self
    }

    /// Sets the front-matter delimiter override.
    #[must_use]
    pub fn with_matter_delims(mut self, delims: impl Into<String>) -> Self {
        self.matter_delims = Some(delims.into());
        self
    }

    /// Sets a composition flag.
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.flags.set(key, value);
        self
    }
}

/// Builder for [`App`].
pub struct AppBuilder {
    vfs: Option<Arc<dyn Vfs>>,
    runner: Option<Box<dyn TaskOrchestrator>>,
    options: AppOptions,
}

impl AppBuilder {
    fn new() -> Self {
        Self {
            vfs: None,
            runner: None,
            options: AppOptions::default(),
        }
    }

    /// Sets the filesystem collaborator.
    #[must_use]
    pub fn vfs(mut self, vfs: Arc<dyn Vfs>) -> Self {
        self.vfs = Some(vfs);
        self
    }

    /// Sets the task orchestrator.
    #[must_use]
    pub fn runner(mut self, runner: Box<dyn TaskOrchestrator>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the app, registering the built-in `init` and `dest` stages.
    #[must_use]
    pub fn build(self) -> Arc<App> {
        let store = Arc::new(TemplateStore::new());
        store.set_delims(self.options.delims.0.clone(), self.options.delims.1.clone());
        if let Some(ref delims) = self.options.matter_delims {
            store.set_matter_delims(delims.clone());
        }

        let app = Arc::new(App {
            runner: self.runner.unwrap_or_else(|| Box::new(SequentialRunner::new())),
            store,
            plugins: StageRegistry::new(),
            vfs: self.vfs.unwrap_or_else(|| Arc::new(MemoryVfs::new())),
            options: RwLock::new(self.options),
            dest_hooks: Arc::new(RwLock::new(Vec::new())),
        });

        app.register_builtin_stages();
        app
    }
}

/// A task-based file build pipeline application.
pub struct App {
    runner: Box<dyn TaskOrchestrator>,
    store: Arc<TemplateStore>,
    plugins: StageRegistry,
    vfs: Arc<dyn Vfs>,
    options: RwLock<AppOptions>,
    dest_hooks: Arc<RwLock<Vec<DestHook>>>,
}

impl App {
    /// Starts building an app.
    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    fn register_builtin_stages(&self) {
        let store = self.store.clone();
        self.plugins.register(
            "init",
            Arc::new(move |opts: &StageOptions| -> BoxTransform {
                let collection = opts
                    .get_str("task_id")
                    .unwrap_or(FALLBACK_TASK_ID)
                    .to_string();
                Box::new(InitStage::for_collection(store.clone(), collection))
            }),
        );

        let hooks = self.dest_hooks.clone();
        self.plugins.register(
            "dest",
            Arc::new(move |opts: &StageOptions| -> BoxTransform {
                let target = opts
                    .get_str("dest_dir")
                    .map_or(DestTarget::InPlace, |dir| DestTarget::dir(dir));
                Box::new(DestStage::new(target).with_hooks(hooks.read().clone()))
            }),
        );
    }

    /// Returns the template store.
    #[must_use]
    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    /// Returns the filesystem collaborator.
    #[must_use]
    pub fn vfs(&self) -> &Arc<dyn Vfs> {
        &self.vfs
    }

    /// Returns the stage registry.
    #[must_use]
    pub fn plugins(&self) -> &StageRegistry {
        &self.plugins
    }

    /// Returns a copy of the current options.
    #[must_use]
    pub fn options(&self) -> AppOptions {
        self.options.read().clone()
    }

    /// Replaces the options, forwarding delimiters to the store.
    pub fn set_options(&self, options: AppOptions) {
        self.store
            .set_delims(options.delims.0.clone(), options.delims.1.clone());
        if let Some(ref delims) = options.matter_delims {
            self.store.set_matter_delims(delims.clone());
        }
        *self.options.write() = options;
    }

    /// Registers a named stage factory.
    pub fn plugin(&self, name: &str, factory: crate::registry::StageFactory) {
        self.plugins.register(name, factory);
    }

    /// Registers an `onDest` lifecycle hook.
    pub fn on_dest(&self, hook: DestHook) {
        self.dest_hooks.write().push(hook);
    }

    /// Defines a task.
    ///
    /// Each invocation of the body runs under its own session scope with
    /// `task` set to the task's name, so interleaved runs stay isolated.
    pub fn task<F, Fut>(self: &Arc<Self>, name: &str, body: F)
    where
        F: Fn(Arc<App>, TaskScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let app = Arc::downgrade(self);
        let task_name = name.to_string();
        let body = Arc::new(body);

        let wrapped: TaskBody = Arc::new(move || {
            let app = app.clone();
            let name = task_name.clone();
            let body = body.clone();
            Box::pin(async move {
                let Some(app) = app.upgrade() else {
                    return Err(PipelineError::internal("application dropped before task ran"));
                };
                Session::run(name, move |scope| body(app, scope)).await
            })
        });

        self.runner.register(name, wrapped);
    }

    /// Runs tasks by name, defaulting to `default` when none are given.
    pub async fn run(&self, names: &[&str]) -> Vec<TaskReport> {
        let names: Vec<String> = if names.is_empty() {
            vec![DEFAULT_TASK.to_string()]
        } else {
            names.iter().map(|s| (*s).to_string()).collect()
        };
        self.runner.run(&names).await
    }

    /// Re-runs tasks when a watched path changes.
    ///
    /// Each rerun goes through the task wrapper, so it gets a fresh session
    /// scope.
    pub fn watch<S: AsRef<str>>(
        self: &Arc<Self>,
        patterns: &[S],
        tasks: &[&str],
    ) -> Result<(), PipelineError> {
        let patterns: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        let tasks: Vec<String> = tasks.iter().map(|s| (*s).to_string()).collect();
        let app = Arc::downgrade(self);

        self.vfs.watch(
            &patterns,
            Arc::new(move |path| {
                let Some(app) = app.upgrade() else { return };
                let tasks = tasks.clone();
                tracing::info!(path = %path.display(), "change detected, re-running tasks");
                tokio::spawn(async move {
                    let _ = app.runner.run(&tasks).await;
                });
            }),
        )
    }

    /// Sources a record stream for glob patterns under a task scope.
    ///
    /// Content handling follows the app options; see
    /// [`App::src_with`] for per-call control.
    #[must_use]
    pub fn src<S: AsRef<str>>(&self, scope: &TaskScope, patterns: &[S]) -> RecordStream {
        let options = {
            let opts = self.options.read();
            SourceOptions::new().with_read(opts.read).with_buffer(opts.buffer)
        };
        self.src_with(scope, patterns, options)
    }

    /// Sources a record stream with explicit content options.
    #[must_use]
    pub fn src_with<S: AsRef<str>>(
        &self,
        scope: &TaskScope,
        patterns: &[S],
        options: SourceOptions,
    ) -> RecordStream {
        SourceStage::new(self.vfs.clone(), self.store.clone(), scope, patterns, options).stream()
    }

    /// Builds a dest stage with the app's `onDest` hooks attached.
    #[must_use]
    pub fn dest(&self, target: DestTarget) -> BoxTransform {
        Box::new(DestStage::new(target).with_hooks(self.dest_hooks.read().clone()))
    }

    /// Builds a dest stage with extra locals merged into each record.
    #[must_use]
    pub fn dest_with_locals(
        &self,
        target: DestTarget,
        locals: HashMap<String, serde_json::Value>,
    ) -> BoxTransform {
        Box::new(
            DestStage::new(target)
                .with_locals(locals)
                .with_hooks(self.dest_hooks.read().clone()),
        )
    }

    /// Composes a pipeline from mixed stage sources under a task scope.
    ///
    /// The scope's task identifier is injected into the shared options so
    /// named stages (the built-in `init`, for one) bind to the right
    /// collection at construction time.
    #[must_use]
    pub fn combine(
        &self,
        scope: &TaskScope,
        sources: Vec<StageSource>,
        options: StageOptions,
    ) -> BoxTransform {
        let mut shared = self.options.read().flags.clone();
        shared.merge(&options);
        shared.set("task_id", serde_json::json!(scope.task_id()));
        compose(&self.plugins, sources, &shared)
    }

    /// Returns the collection identifier for the scope's task.
    #[must_use]
    pub fn get_task(&self, scope: &TaskScope) -> String {
        scope.task_id()
    }

    /// Gets a collection by name, with inflection fallback.
    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Collection> {
        self.store.get_collection(name)
    }

    /// Returns the current task's ingested records in insertion order.
    #[must_use]
    pub fn task_records(&self, scope: &TaskScope) -> Vec<crate::record::FileRecord> {
        self.store.records(&scope.task_id())
    }

    /// Lifts a collection's entities back into a record stream.
    #[must_use]
    pub fn push_to_stream(&self, collection: &str) -> RecordStream {
        Box::pin(stream::iter(
            self.store.records(collection).into_iter().map(Ok),
        ))
    }

    /// Drains a record stream through the filesystem writer.
    ///
    /// Every `Ok` record is written; the first error is reported after the
    /// stream is fully drained. Returns the number of records written.
    pub async fn write(&self, mut stream: RecordStream) -> Result<usize, PipelineError> {
        let mut written = 0usize;
        let mut first_error: Option<PipelineError> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(rec) => match self.vfs.write(&rec).await {
                    Ok(()) => written += 1,
                    Err(err) => {
                        tracing::error!(path = %rec.path.display(), error = %err, "write failed");
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                },
                Err(err) => {
                    tracing::error!(error = %err, "pipeline error");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    /// Copies matched files straight to a destination directory, bypassing
    /// ingestion. Returns the number of records written.
    pub async fn copy<S: AsRef<str>>(
        &self,
        patterns: &[S],
        dest: impl Into<PathBuf>,
    ) -> Result<usize, PipelineError> {
        let scope = TaskScope::detached();
        let sourced = self.src_with(&scope, patterns, SourceOptions::default());
        let routed = Box::new(DestStage::new(DestTarget::dir(dest))).apply(sourced);
        self.write(routed).await
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("tasks", &self.runner.names())
            .field("plugins", &self.plugins.names())
            .field("collections", &self.store.collection_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::drain;
    use crate::record::FileRecord;
    use crate::vfs::{ByteStream, ChangeHandler};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn fixture_vfs() -> Arc<MemoryVfs> {
        Arc::new(
            MemoryVfs::new()
                .with_file("a.md", "alpha")
                .with_file("b.md", "beta")
                .with_file("assets/logo.svg", "<svg/>"),
        )
    }

    /// Delegates to an inner [`MemoryVfs`] but fails writes for one path.
    struct RejectingVfs {
        inner: MemoryVfs,
        reject: PathBuf,
    }

    #[async_trait]
    impl Vfs for RejectingVfs {
        async fn resolve(&self, patterns: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
            self.inner.resolve(patterns).await
        }

        async fn read(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
            self.inner.read(path).await
        }

        async fn open(&self, path: &Path) -> Result<ByteStream, PipelineError> {
            self.inner.open(path).await
        }

        async fn write(&self, record: &FileRecord) -> Result<(), PipelineError> {
            if record.path == self.reject {
                return Err(PipelineError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write(record).await
        }

        fn watch(
            &self,
            patterns: &[String],
            on_change: ChangeHandler,
        ) -> Result<(), PipelineError> {
            self.inner.watch(patterns, on_change)
        }
    }

    #[tokio::test]
    async fn test_task_runs_under_session_scope() {
        let vfs = fixture_vfs();
        let app = App::builder().vfs(vfs).build();

        app.task("docs", |app, scope| async move {
            assert_eq!(app.get_task(&scope), "task_docs");
            Ok(())
        });

        let reports = app.run(&["docs"]).await;
        assert!(reports[0].is_ok());
    }

    #[tokio::test]
    async fn test_run_defaults_to_default_task() {
        let app = App::builder().vfs(fixture_vfs()).build();
        app.task("default", |_, _| async { Ok(()) });

        let reports = app.run(&[]).await;
        assert_eq!(reports[0].name, "default");
        assert!(reports[0].is_ok());
    }

    #[tokio::test]
    async fn test_src_dest_write_end_to_end() {
        let vfs = fixture_vfs();
        let app = App::builder().vfs(vfs.clone()).build();
        app.task("build", |app, scope| async move {
            let sourced = app.src(&scope, &["*.md"]);
            let routed = app.dest(DestTarget::dir("/out")).apply(sourced);
            app.write(routed).await.map(|_| ())
        });

        let reports = app.run(&["build"]).await;
        assert!(reports[0].is_ok());

        let written = vfs.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].path, PathBuf::from("/out/a.md"));
        assert_eq!(written[1].path, PathBuf::from("/out/b.md"));
    }

    #[tokio::test]
    async fn test_combine_injects_task_id_for_init() {
        let app = App::builder().vfs(fixture_vfs()).build();

        app.task("ingest", |app, scope| async move {
            let sourced = app.src(&scope, &["*.md"]);
            let pipeline = app.combine(
                &scope,
                vec![StageSource::named("init")],
                StageOptions::new(),
            );
            let out = pipeline.apply(sourced);
            app.write(out).await.map(|_| ())
        });

        let reports = app.run(&["ingest"]).await;
        assert!(reports[0].is_ok());

        let collection = app.get_collection("task_ingest").unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[tokio::test]
    async fn test_on_dest_hook_fires() {
        let vfs = fixture_vfs();
        let app = App::builder().vfs(vfs.clone()).build();
        app.on_dest(Arc::new(|rec| {
            rec.data.insert("stamped".to_string(), serde_json::json!(true));
            Ok(())
        }));

        app.task("stamp", |app, scope| async move {
            let sourced = app.src(&scope, &["a.md"]);
            let routed = app.dest(DestTarget::dir("/out")).apply(sourced);
            app.write(routed).await.map(|_| ())
        });

        let reports = app.run(&["stamp"]).await;
        assert!(reports[0].is_ok());

        let written = vfs.written();
        assert_eq!(written[0].data.get("stamped"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_write_keeps_draining_after_writer_error() {
        let vfs = Arc::new(RejectingVfs {
            inner: MemoryVfs::new(),
            reject: PathBuf::from("/out/a.md"),
        });
        let app = App::builder().vfs(vfs.clone()).build();

        let input: RecordStream = Box::pin(stream::iter(vec![
            Ok(FileRecord::new("/out/a.md").with_contents("a")),
            Ok(FileRecord::new("/out/b.md").with_contents("b")),
        ]));

        let result = app.write(input).await;
        assert!(matches!(result, Err(PipelineError::Io(_))));

        // The record behind the failed one still reached the writer.
        let written = vfs.inner.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].path, PathBuf::from("/out/b.md"));
    }

    #[tokio::test]
    async fn test_task_records_and_push_to_stream_read_back_ingested() {
        let app = App::builder().vfs(fixture_vfs()).build();

        app.task("ingest", |app, scope| async move {
            let sourced = app.src(&scope, &["*.md"]);
            let pipeline = app.combine(
                &scope,
                vec![StageSource::named("init")],
                StageOptions::new(),
            );
            let _ = app.write(pipeline.apply(sourced)).await?;

            let records = app.task_records(&scope);
            let ids: Vec<_> = records.iter().filter_map(|r| r.id.clone()).collect();
            assert_eq!(ids, vec!["a.md".to_string(), "b.md".to_string()]);
            Ok(())
        });

        let reports = app.run(&["ingest"]).await;
        assert!(reports[0].is_ok());

        let (records, errors) = drain(app.push_to_stream("task_ingest")).await;
        assert!(errors.is_empty());
        let ids: Vec<_> = records.iter().filter_map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["a.md".to_string(), "b.md".to_string()]);
        assert_eq!(records[0].contents_utf8().as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_task_error_reported_in_its_own_report() {
        let app = App::builder().vfs(fixture_vfs()).build();
        app.task("bad", |_, _| async { Err(PipelineError::internal("boom")) });
        app.task("good", |_, _| async { Ok(()) });

        let reports = app.run(&["bad", "good"]).await;
        assert!(!reports[0].is_ok());
        assert!(reports[1].is_ok());
    }

    #[tokio::test]
    async fn test_copy_bypasses_ingestion() {
        let vfs = fixture_vfs();
        let app = App::builder().vfs(vfs.clone()).build();

        let copied = app.copy(&["assets/*.svg"], "/dist/assets").await.unwrap();
        assert_eq!(copied, 1);
        assert_eq!(vfs.written()[0].path, PathBuf::from("/dist/assets/logo.svg"));
        assert!(app.store().collection_names().iter().all(|n| n == "taskfile"));
    }

    #[tokio::test]
    async fn test_watch_reruns_tasks_with_fresh_scope() {
        let vfs = fixture_vfs();
        let app = App::builder().vfs(vfs.clone()).build();

        let runs: Arc<RwLock<Vec<uuid::Uuid>>> = Arc::new(RwLock::new(Vec::new()));
        let seen = runs.clone();
        app.task("docs", move |_, scope| {
            let seen = seen.clone();
            async move {
                seen.write().push(scope.run_id());
                Ok(())
            }
        });

        app.watch(&["*.md"], &["docs"]).unwrap();

        let _ = app.run(&["docs"]).await;
        vfs.notify_change("a.md");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let runs = runs.read();
        assert_eq!(runs.len(), 2);
        assert_ne!(runs[0], runs[1]);
    }

    #[tokio::test]
    async fn test_set_options_forwards_delims_to_store() {
        let app = App::builder().vfs(fixture_vfs()).build();
        app.set_options(AppOptions::new().with_delims("<%", "%>"));
        assert_eq!(app.store().delims(), ("<%".to_string(), "%>".to_string()));
    }
}
