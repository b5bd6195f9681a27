//! Filesystem collaborator boundary.
//!
//! Real glob traversal and IO live outside the pipeline; the pipeline talks
//! to them through [`Vfs`]. [`MemoryVfs`] is the in-memory implementation
//! used by fixtures and tests.

use async_trait::async_trait;
use futures::stream::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::PipelineError;
use crate::record::FileRecord;

mod memory;

pub use memory::MemoryVfs;

/// A stream of content chunks for records sourced with `buffer: false`.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// Callback fired by `watch` when a matched path changes.
pub type ChangeHandler = Arc<dyn Fn(&Path) + Send + Sync>;

/// The filesystem collaborator the pipeline reads from and writes to.
#[async_trait]
pub trait Vfs: Send + Sync {
    /// Resolves glob patterns to matching paths, preserving per-pattern
    /// resolution order. Patterns here are always positive; exclusion
    /// markers are handled by the source stage before resolution.
    async fn resolve(&self, patterns: &[String]) -> Result<Vec<PathBuf>, PipelineError>;

    /// Reads a file's contents into a buffer.
    async fn read(&self, path: &Path) -> Result<Vec<u8>, PipelineError>;

    /// Opens a file as a stream of content chunks.
    async fn open(&self, path: &Path) -> Result<ByteStream, PipelineError>;

    /// Writes a record to its current path.
    ///
    /// Writes are all-or-nothing per record; no partial state is observable
    /// on error.
    async fn write(&self, record: &FileRecord) -> Result<(), PipelineError>;

    /// Registers a change handler for paths matching `patterns`.
    fn watch(&self, patterns: &[String], on_change: ChangeHandler) -> Result<(), PipelineError>;
}

/// Exclusion marker prefix for negated patterns.
pub const NEGATION_MARKER: char = '!';

/// Splits a mixed pattern list into includes and (unprefixed) excludes.
#[must_use]
pub fn partition_patterns<S: AsRef<str>>(patterns: &[S]) -> (Vec<String>, Vec<String>) {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        if let Some(stripped) = pattern.strip_prefix(NEGATION_MARKER) {
            excludes.push(stripped.to_string());
        } else {
            includes.push(pattern.to_string());
        }
    }
    (includes, excludes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_patterns() {
        let (includes, excludes) = partition_patterns(&["*.md", "!b.md", "docs/**", "!tmp/*"]);
        assert_eq!(includes, vec!["*.md".to_string(), "docs/**".to_string()]);
        assert_eq!(excludes, vec!["b.md".to_string(), "tmp/*".to_string()]);
    }

    #[test]
    fn test_partition_patterns_all_positive() {
        let (includes, excludes) = partition_patterns(&["a.md"]);
        assert_eq!(includes.len(), 1);
        assert!(excludes.is_empty());
    }
}
