//! Dest stage: compute final output paths and metadata.

use futures::stream::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{HookError, PipelineError, StageConstructionError, StreamingNotSupportedError};
use crate::pipeline::{RecordStream, Transform};
use crate::record::FileRecord;

const STAGE_NAME: &str = "dest";

/// Routing function mapping a record to its destination directory.
pub type DestRouter = Arc<dyn Fn(&FileRecord) -> Result<PathBuf, String> + Send + Sync>;

/// Lifecycle hook invoked for each routed record.
///
/// Hook failures are forwarded to the stream's error channel, never thrown.
pub type DestHook = Arc<dyn Fn(&mut FileRecord) -> Result<(), String> + Send + Sync>;

/// Where records are routed.
pub enum DestTarget {
    /// A fixed directory, resolved against the record's cwd when relative.
    Dir(PathBuf),
    /// A per-record routing function.
    Router(DestRouter),
    /// Keep each record in its current directory.
    InPlace,
}

impl DestTarget {
    /// Routes into a fixed directory.
    #[must_use]
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::Dir(path.into())
    }

    /// Routes through a per-record function.
    pub fn router(f: impl Fn(&FileRecord) -> Result<PathBuf, String> + Send + Sync + 'static) -> Self {
        Self::Router(Arc::new(f))
    }
}

impl std::fmt::Debug for DestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dir(path) => f.debug_tuple("Dir").field(path).finish(),
            Self::Router(_) => f.write_str("Router(..)"),
            Self::InPlace => f.write_str("InPlace"),
        }
    }
}

/// Computes `dest.*` metadata and the final path for each record.
///
/// Recomputation is pure given the record's current state, so applying the
/// stage twice with the same target yields the same final path. Existing
/// keys on `data.dest` that the stage does not compute are preserved.
pub struct DestStage {
    target: DestTarget,
    locals: HashMap<String, serde_json::Value>,
    hooks: Vec<DestHook>,
}

impl DestStage {
    /// Creates a dest stage for a target.
    #[must_use]
    pub fn new(target: DestTarget) -> Self {
        Self {
            target,
            locals: HashMap::new(),
            hooks: Vec::new(),
        }
    }

    /// Merges locals into each routed record (stage locals win).
    #[must_use]
    pub fn with_locals(mut self, locals: HashMap<String, serde_json::Value>) -> Self {
        self.locals = locals;
        self
    }

    /// Attaches `onDest` lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<DestHook>) -> Self {
        self.hooks = hooks;
        self
    }
}

impl Transform for DestStage {
    fn name(&self) -> &str {
        STAGE_NAME
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let Self {
            target,
            locals,
            hooks,
        } = *self;
        let target = Arc::new(target);

        Box::pin(input.map(move |item| {
            item.and_then(|rec| route_record(&target, &locals, &hooks, rec))
        }))
    }
}

fn route_record(
    target: &DestTarget,
    locals: &HashMap<String, serde_json::Value>,
    hooks: &[DestHook],
    mut rec: FileRecord,
) -> Result<FileRecord, PipelineError> {
    if rec.contents.is_empty() {
        return Ok(rec);
    }
    if rec.contents.is_stream() {
        return Err(StreamingNotSupportedError::new(STAGE_NAME).into());
    }

    let dirname = match target {
        DestTarget::Router(route) => route(&rec)
            .map_err(|reason| StageConstructionError::new(STAGE_NAME, reason))?,
        DestTarget::Dir(dir) => {
            if dir.is_absolute() {
                dir.clone()
            } else {
                rec.cwd.join(dir)
            }
        }
        DestTarget::InPlace => rec
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from),
    };

    let relative = rec.relative();
    let extname = relative
        .extension()
        .map_or_else(String::new, |ext| format!(".{}", ext.to_string_lossy()));
    let basename = relative
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
    let filename = basename
        .strip_suffix(&extname)
        .unwrap_or(&basename)
        .to_string();
    let path = dirname.join(&basename);

    let computed = [
        ("dirname", serde_json::json!(dirname.to_string_lossy())),
        ("cwd", serde_json::json!(rec.cwd.to_string_lossy())),
        ("base", serde_json::json!(rec.base.to_string_lossy())),
        ("relative", serde_json::json!(relative.to_string_lossy())),
        ("extname", serde_json::json!(extname)),
        ("basename", serde_json::json!(basename)),
        ("filename", serde_json::json!(filename)),
        ("path", serde_json::json!(path.to_string_lossy())),
    ];
    let dest = rec.data_object_mut("dest");
    for (key, value) in computed {
        dest.insert(key.to_string(), value);
    }

    rec.data.insert(
        "__filename".to_string(),
        serde_json::json!(path.to_string_lossy()),
    );
    rec.data.insert(
        "__dirname".to_string(),
        serde_json::json!(dirname.to_string_lossy()),
    );
    rec.path = path;

    for (key, value) in locals {
        rec.locals.insert(key.clone(), value.clone());
    }

    for hook in hooks {
        hook(&mut rec).map_err(|reason| {
            HookError::new("onDest", rec.path.to_string_lossy(), reason)
        })?;
    }

    Ok(rec)
}
