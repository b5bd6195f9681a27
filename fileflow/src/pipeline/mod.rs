//! The streaming transform pipeline.
//!
//! A pipeline is an ordered chain of [`Transform`]s over a [`RecordStream`].
//! Records and per-record errors travel as `Result` items: an `Err` is fatal
//! for the record that produced it and invisible to the records around it.
//! End-of-stream propagates in composition order: a stage only observes the
//! end of its input after the previous stage has flushed everything it
//! buffered.

use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::record::FileRecord;

mod compose;
#[cfg(test)]
mod integration_tests;

pub use compose::{compose, StageSource};

/// The item stream flowing between stages.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<FileRecord, PipelineError>> + Send>>;

/// A boxed transform, as produced by stage factories.
pub type BoxTransform = Box<dyn Transform>;

/// A transform stage over a record stream.
///
/// Implementations must forward `Err` items they did not produce, so that
/// per-record errors surface to the pipeline's consumer regardless of where
/// in the chain they originated.
pub trait Transform: Send + Sync {
    /// Returns the stage name, used in logs and error reports.
    fn name(&self) -> &str;

    /// Consumes the stage and applies it to an input stream.
    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream;
}

/// A transform that forwards its input unchanged.
///
/// Stands in for disabled or unregistered named stages, so composition
/// never fails merely because an optional stage is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl PassThrough {
    /// Creates a new pass-through.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transform for PassThrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        input
    }
}

/// A stream-to-stream function lifted into a transform.
pub struct FnTransform {
    name: String,
    func: Arc<dyn Fn(RecordStream) -> RecordStream + Send + Sync>,
}

impl FnTransform {
    /// Creates a named function transform.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(RecordStream) -> RecordStream + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub(crate) fn from_arc(
        name: impl Into<String>,
        func: Arc<dyn Fn(RecordStream) -> RecordStream + Send + Sync>,
    ) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl std::fmt::Debug for FnTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransform").field("name", &self.name).finish()
    }
}

impl Transform for FnTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        (self.func)(input)
    }
}

/// An ordered chain of transforms applied back to back.
pub struct Chain {
    name: String,
    stages: Vec<BoxTransform>,
}

impl Chain {
    /// Creates a chain from transforms in composition order.
    #[must_use]
    pub fn new(name: impl Into<String>, stages: Vec<BoxTransform>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    /// Returns the number of chained stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl Transform for Chain {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        self.stages
            .into_iter()
            .fold(input, |stream, stage| stage.apply(stream))
    }
}

/// A per-record map stage over `Ok` items.
///
/// `Err` items are forwarded untouched. The mapping function itself may turn
/// a record into an `Err`, dropping the record and surfacing the error.
pub struct MapRecord<F>
where
    F: Fn(FileRecord) -> Result<FileRecord, PipelineError> + Send + Sync + 'static,
{
    name: String,
    func: F,
}

impl<F> MapRecord<F>
where
    F: Fn(FileRecord) -> Result<FileRecord, PipelineError> + Send + Sync + 'static,
{
    /// Creates a named per-record map stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Transform for MapRecord<F>
where
    F: Fn(FileRecord) -> Result<FileRecord, PipelineError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(self: Box<Self>, input: RecordStream) -> RecordStream {
        let func = self.func;
        Box::pin(input.map(move |item| item.and_then(&func)))
    }
}
