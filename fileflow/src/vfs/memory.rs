//! In-memory filesystem for fixtures and tests.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ByteStream, ChangeHandler, Vfs};
use crate::errors::{PatternError, PipelineError};
use crate::record::{FileRecord, FileStat};

struct Watcher {
    patterns: Vec<String>,
    handler: ChangeHandler,
}

/// An in-memory [`Vfs`] with simple glob matching.
///
/// Supports `**` (any path segment run), `*` (within a segment), and `?`.
/// Writes are recorded rather than persisted back into the file map, so
/// tests can assert on exactly what the pipeline emitted. Change
/// notification is manual via [`MemoryVfs::notify_change`].
#[derive(Default)]
pub struct MemoryVfs {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
    written: RwLock<Vec<FileRecord>>,
    watchers: RwLock<Vec<Watcher>>,
}

impl MemoryVfs {
    /// Creates an empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file (builder form).
    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Adds or replaces a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), contents.into());
    }

    /// Returns the records written through the pipeline boundary.
    #[must_use]
    pub fn written(&self) -> Vec<FileRecord> {
        self.written.read().clone()
    }

    /// Fires registered watchers whose patterns match `path`.
    pub fn notify_change(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let text = path.to_string_lossy();
        let watchers = self.watchers.read();
        for watcher in watchers.iter() {
            let hit = watcher.patterns.iter().any(|pattern| {
                glob_to_regex(pattern).is_ok_and(|re| re.is_match(&text))
            });
            if hit {
                (watcher.handler)(path);
            }
        }
    }
}

#[async_trait]
impl Vfs for MemoryVfs {
    async fn resolve(&self, patterns: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
        let files = self.files.read();
        let mut resolved: Vec<PathBuf> = Vec::new();

        for pattern in patterns {
            let re = glob_to_regex(pattern)?;
            for path in files.keys() {
                if re.is_match(&path.to_string_lossy()) && !resolved.contains(path) {
                    resolved.push(path.clone());
                }
            }
        }

        Ok(resolved)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            ))
        })
    }

    async fn open(&self, path: &Path) -> Result<ByteStream, PipelineError> {
        let contents = self.read(path).await?;
        Ok(Box::pin(stream::once(async move { Ok(contents) })))
    }

    async fn write(&self, record: &FileRecord) -> Result<(), PipelineError> {
        self.written.write().push(record.clone());
        Ok(())
    }

    fn watch(&self, patterns: &[String], on_change: ChangeHandler) -> Result<(), PipelineError> {
        for pattern in patterns {
            // Validate up front so a bad watch pattern fails at registration.
            glob_to_regex(pattern)?;
        }
        self.watchers.write().push(Watcher {
            patterns: patterns.to_vec(),
            handler: on_change,
        });
        Ok(())
    }
}

impl MemoryVfs {
    /// Builds a sourced record for `path`, buffering its contents.
    ///
    /// Convenience for fixtures that want records without running the
    /// source stage.
    #[must_use]
    pub fn record(&self, path: impl Into<PathBuf>) -> Option<FileRecord> {
        let path = path.into();
        let contents = self.files.read().get(&path).cloned()?;
        let size = contents.len() as u64;
        Some(
            FileRecord::new(path)
                .with_contents(contents)
                .with_stat(FileStat::new(size).with_mtime(Utc::now())),
        )
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex, PatternError> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` also matches the empty prefix.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(?:.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| PatternError::new(pattern, e.to_string()))
}
