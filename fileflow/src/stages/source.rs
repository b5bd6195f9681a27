//! Source stage: glob patterns to a stream of file records.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::pipeline::RecordStream;
use crate::record::{Contents, FileRecord, FileStat};
use crate::session::TaskScope;
use crate::store::TemplateStore;
use crate::vfs::{partition_patterns, Vfs};

/// Content-handling options for sourcing.
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    /// Read file contents at all. `false` sources empty records.
    pub read: bool,
    /// Buffer contents eagerly. `false` leaves contents as a stream.
    pub buffer: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            read: true,
            buffer: true,
        }
    }
}

impl SourceOptions {
    /// Creates default options (read and buffer on).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether contents are read.
    #[must_use]
    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Sets whether contents are buffered.
    #[must_use]
    pub fn with_buffer(mut self, buffer: bool) -> Self {
        self.buffer = buffer;
        self
    }
}

/// Resolves glob patterns against the filesystem collaborator and emits one
/// record per match.
///
/// Patterns prefixed with `!` exclude their matches from the result; order
/// of the remaining paths follows include-pattern resolution order. The
/// stage registers the scope's task collection with the store but relies on
/// the task runner having set the task identifier before construction.
pub struct SourceStage {
    vfs: Arc<dyn Vfs>,
    store: Arc<TemplateStore>,
    task_id: String,
    patterns: Vec<String>,
    options: SourceOptions,
}

impl SourceStage {
    /// Creates a source stage for the given scope and patterns.
    #[must_use]
    pub fn new<S: AsRef<str>>(
        vfs: Arc<dyn Vfs>,
        store: Arc<TemplateStore>,
        scope: &TaskScope,
        patterns: &[S],
        options: SourceOptions,
    ) -> Self {
        Self {
            vfs,
            store,
            task_id: scope.task_id(),
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            options,
        }
    }

    /// Resolves the patterns and returns the record stream.
    ///
    /// An empty match set yields an empty stream, not an error; resolution
    /// failures surface as a single `Err` item.
    #[must_use]
    pub fn stream(self) -> RecordStream {
        let Self {
            vfs,
            store,
            task_id,
            patterns,
            options,
        } = self;

        Box::pin(
            stream::once(async move {
                if !store.has_collection(&task_id) {
                    store.create(&task_id, &["task"]);
                }

                let (includes, excludes) = partition_patterns(&patterns);

                let included = match vfs.resolve(&includes).await {
                    Ok(paths) => paths,
                    Err(err) => return error_stream(err),
                };
                let excluded: HashSet<PathBuf> = if excludes.is_empty() {
                    HashSet::new()
                } else {
                    match vfs.resolve(&excludes).await {
                        Ok(paths) => paths.into_iter().collect(),
                        Err(err) => return error_stream(err),
                    }
                };

                let paths: Vec<PathBuf> = included
                    .into_iter()
                    .filter(|p| !excluded.contains(p))
                    .collect();

                tracing::debug!(
                    task = %task_id,
                    matched = paths.len(),
                    "resolved source patterns"
                );

                let per_path = stream::iter(paths).then(move |path| {
                    let vfs = vfs.clone();
                    async move { source_record(&*vfs, &path, options).await }
                });
                Box::pin(per_path) as RecordStream
            })
            .flatten(),
        )
    }
}

fn error_stream(err: PipelineError) -> RecordStream {
    Box::pin(stream::iter(vec![Err(err)]))
}

async fn source_record(
    vfs: &dyn Vfs,
    path: &Path,
    options: SourceOptions,
) -> Result<FileRecord, PipelineError> {
    let record = FileRecord::new(path);

    if !options.read {
        return Ok(record);
    }

    if options.buffer {
        let bytes = vfs.read(path).await?;
        let stat = FileStat::new(bytes.len() as u64);
        Ok(record.with_contents(bytes).with_stat(stat))
    } else {
        let stream = vfs.open(path).await?;
        Ok(FileRecord {
            contents: Contents::stream(stream),
            ..record
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::drain;
    use crate::vfs::MemoryVfs;

    fn fixture() -> (Arc<MemoryVfs>, Arc<TemplateStore>) {
        let vfs = MemoryVfs::new()
            .with_file("a.md", "alpha")
            .with_file("b.md", "beta")
            .with_file("docs/c.md", "gamma");
        (Arc::new(vfs), Arc::new(TemplateStore::new()))
    }

    fn stage<S: AsRef<str>>(
        vfs: &Arc<MemoryVfs>,
        store: &Arc<TemplateStore>,
        patterns: &[S],
        options: SourceOptions,
    ) -> SourceStage {
        let scope = TaskScope::detached();
        scope.set("task", serde_json::json!("docs"));
        SourceStage::new(vfs.clone(), store.clone(), &scope, patterns, options)
    }

    #[tokio::test]
    async fn test_emits_one_record_per_match() {
        let (vfs, store) = fixture();
        let src = stage(&vfs, &store, &["*.md"], SourceOptions::default());

        let (records, errors) = drain(src.stream()).await;
        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, PathBuf::from("a.md"));
        assert_eq!(records[0].contents_utf8().as_deref(), Some("alpha"));
        assert_eq!(records[0].stat.as_ref().map(|s| s.size), Some(5));
    }

    #[tokio::test]
    async fn test_negated_pattern_excludes_matches() {
        let (vfs, store) = fixture();
        let src = stage(&vfs, &store, &["*.md", "!b.md"], SourceOptions::default());

        let (records, errors) = drain(src.stream()).await;
        assert!(errors.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, PathBuf::from("a.md"));
    }

    #[tokio::test]
    async fn test_empty_match_set_is_empty_stream() {
        let (vfs, store) = fixture();
        let src = stage(&vfs, &store, &["*.txt"], SourceOptions::default());

        let (records, errors) = drain(src.stream()).await;
        assert!(records.is_empty());
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_read_false_sources_empty_records() {
        let (vfs, store) = fixture();
        let src = stage(
            &vfs,
            &store,
            &["a.md"],
            SourceOptions::new().with_read(false),
        );

        let (records, _) = drain(src.stream()).await;
        assert_eq!(records.len(), 1);
        assert!(records[0].contents.is_empty());
    }

    #[tokio::test]
    async fn test_buffer_false_sources_streamed_records() {
        let (vfs, store) = fixture();
        let src = stage(
            &vfs,
            &store,
            &["a.md"],
            SourceOptions::new().with_buffer(false),
        );

        let (records, _) = drain(src.stream()).await;
        assert_eq!(records.len(), 1);
        assert!(records[0].contents.is_stream());
    }

    #[tokio::test]
    async fn test_registers_task_collection() {
        let (vfs, store) = fixture();
        let src = stage(&vfs, &store, &["a.md"], SourceOptions::default());
        let _ = drain(src.stream()).await;

        assert!(store.has_collection("task_docs"));
    }

    #[tokio::test]
    async fn test_multiple_patterns_preserve_resolution_order() {
        let (vfs, store) = fixture();
        let src = stage(&vfs, &store, &["b.md", "a.md"], SourceOptions::default());

        let (records, _) = drain(src.stream()).await;
        let paths: Vec<_> = records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("b.md"), PathBuf::from("a.md")]);
    }
}
