//! # Fileflow
//!
//! A task-based streaming file build pipeline.
//!
//! Fileflow discovers source files, flows them through user-assembled chains
//! of asynchronous transform stages, and routes the results to destinations.
//! Each task runs under its own session scope, so interleaved or re-entrant
//! task runs (a watch-triggered rerun, for example) never leak collection
//! state into each other:
//!
//! - **File records**: path, contents, and a metadata bag flowing through
//!   the pipeline as a stream
//! - **Session scopes**: explicit per-run task context passed to stage
//!   constructors instead of ambient globals
//! - **Stage registry**: named, composable transform factories with
//!   flag-based disabling
//! - **Ingest collections**: per-task template collections buffered until
//!   stream end, then flushed back into the stream in insertion order
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fileflow::prelude::*;
//!
//! let app = App::builder().vfs(vfs).build();
//! app.task("docs", |app, scope| async move {
//!     let stream = app.src(&scope, &["docs/*.md"]);
//!     let stream = app.dest(DestTarget::dir("out")).apply(stream);
//!     app.write(stream).await.map(|_| ())
//! });
//! app.run(&["docs"]).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod app;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod runner;
pub mod session;
pub mod stages;
pub mod store;
pub mod vfs;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::{App, AppBuilder, AppOptions};
    pub use crate::errors::{
        HookError, PatternError, PipelineError, StageConstructionError,
        StreamingNotSupportedError, TaskNotFoundError,
    };
    pub use crate::pipeline::{
        compose, PassThrough, RecordStream, StageSource, Transform,
    };
    pub use crate::record::{Contents, FileRecord, FileStat};
    pub use crate::registry::{StageOptions, StageRegistry};
    pub use crate::runner::{SequentialRunner, TaskOrchestrator, TaskReport};
    pub use crate::session::{Session, TaskScope};
    pub use crate::stages::{DestStage, DestTarget, InitStage, SourceOptions, SourceStage};
    pub use crate::store::{Collection, TemplateEntity, TemplateStore};
    pub use crate::vfs::{ByteStream, MemoryVfs, Vfs};
}
