//! Pipeline composition from mixed stage sources.
//!
//! A pipeline is assembled from an ordered list whose elements are functions,
//! pre-built transforms, or registry names. Names that are unregistered or
//! disabled by an explicit `plugin {name} = false` flag become pass-throughs:
//! composition never fails merely because an optional stage is missing.

use std::sync::Arc;

use super::{BoxTransform, Chain, FnTransform, PassThrough, RecordStream};
use crate::registry::{StageOptions, StageRegistry};

/// One element of a pipeline description.
///
/// A tagged variant rather than runtime type inspection: each case is
/// resolved by exhaustive matching at composition time.
pub enum StageSource {
    /// A stream-to-stream function. Captures whatever shared context it
    /// needs at creation time.
    Fn(Arc<dyn Fn(RecordStream) -> RecordStream + Send + Sync>),
    /// An already-built transform, used verbatim.
    Built(BoxTransform),
    /// A registry name resolved against call-time options.
    Named(String),
}

impl StageSource {
    /// Wraps a stream function.
    pub fn func(f: impl Fn(RecordStream) -> RecordStream + Send + Sync + 'static) -> Self {
        Self::Fn(Arc::new(f))
    }

    /// Wraps a pre-built transform.
    pub fn built(transform: impl super::Transform + 'static) -> Self {
        Self::Built(Box::new(transform))
    }

    /// Refers to a registered stage by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl std::fmt::Debug for StageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fn(_) => f.write_str("Fn(..)"),
            Self::Built(t) => f.debug_tuple("Built").field(&t.name()).finish(),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// Builds a single composed transform from an ordered stage list.
///
/// Elements compose in the order given: each element's output is the next
/// element's input, and end-of-stream follows the same order. Shared
/// `options` are handed to every named stage's factory.
#[must_use]
pub fn compose(
    registry: &StageRegistry,
    sources: Vec<StageSource>,
    options: &StageOptions,
) -> BoxTransform {
    let mut stages: Vec<BoxTransform> = Vec::with_capacity(sources.len());

    for source in sources {
        let stage: BoxTransform = match source {
            StageSource::Fn(func) => Box::new(FnTransform::from_arc("fn", func)),
            StageSource::Built(transform) => transform,
            StageSource::Named(name) => {
                if options.is_false(&format!("plugin {name}")) {
                    tracing::debug!(stage = %name, "stage disabled by flag, using pass-through");
                    Box::new(PassThrough::new())
                } else if let Some(factory) = registry.resolve(&name) {
                    factory(options)
                } else {
                    tracing::debug!(stage = %name, "stage not registered, using pass-through");
                    Box::new(PassThrough::new())
                }
            }
        };
        stages.push(stage);
    }

    Box::new(Chain::new("combined", stages))
}
