//! Init/ingest stage: buffer records into the task collection, flush at
//! end-of-stream.
//!
//! Downstream stages and task bodies often need the complete collection (to
//! compute cross-file relationships, for example) before any single file is
//! finalized, so every record is ingested before any is re-emitted. The
//! stage moves through three phases: collecting, flushing, done.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::errors::{PipelineError, StreamingNotSupportedError};
use crate::pipeline::{RecordStream, Transform};
use crate::record::FileRecord;
use crate::session::TaskScope;
use crate::store::{TemplateEntity, TemplateStore};

const STAGE_NAME: &str = "init";

/// Ingests buffered records into the current task's collection.
///
/// While collecting: empty records pass through unchanged, streamed records
/// are rejected per record, buffered records become collection entities and
/// are withheld from the stream. On upstream end-of-stream every entity in
/// the collection is converted back to a record and emitted in insertion
/// order, then the stage signals its own end-of-stream.
pub struct InitStage {
    store: Arc<TemplateStore>,
    collection: String,
}

impl InitStage {
    /// Creates an init stage bound to the scope's task collection.
    ///
    /// The collection identifier is captured at construction time, so later
    /// asynchronous callbacks need no ambient scope.
    #[must_use]
    pub fn new(store: Arc<TemplateStore>, scope: &TaskScope) -> Self {
        Self {
            store,
            collection: scope.task_id(),
        }
    }

    /// Creates an init stage for an explicit collection identifier.
    #[must_use]
    pub fn for_collection(store: Arc<TemplateStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Returns the collection this stage ingests into.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl Transform for InitStage {
    fn name(&self) -> &str {
        STAGE_NAME
    }

    fn apply(self: Box<Self>, mut input: RecordStream) -> RecordStream {
        let Self { store, collection } = *self;

        Box::pin(
            stream::once(async move {
                if !store.has_collection(&collection) {
                    store.create(&collection, &["task"]);
                }

                // Collecting.
                let mut passed: Vec<Result<FileRecord, PipelineError>> = Vec::new();
                let mut ingested = 0usize;
                while let Some(item) = input.next().await {
                    match item {
                        Ok(rec) if rec.contents.is_empty() => passed.push(Ok(rec)),
                        Ok(rec) if rec.contents.is_stream() => {
                            passed.push(Err(StreamingNotSupportedError::new(STAGE_NAME).into()));
                        }
                        Ok(rec) => {
                            store.add_entity(&collection, TemplateEntity::from_record(&rec));
                            ingested += 1;
                        }
                        Err(err) => passed.push(Err(err)),
                    }
                }

                // Flushing.
                let flushed: Vec<Result<FileRecord, PipelineError>> =
                    store.records(&collection).into_iter().map(Ok).collect();
                tracing::debug!(
                    collection = %collection,
                    ingested,
                    flushed = flushed.len(),
                    "flushing ingested collection"
                );

                // Done.
                stream::iter(passed.into_iter().chain(flushed))
            })
            .flatten(),
        )
    }
}
