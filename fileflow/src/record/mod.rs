//! File records flowing through the pipeline.
//!
//! A [`FileRecord`] is the unit of data in a fileflow pipeline: a path, its
//! contents, and a mutable metadata bag. Stages mutate the record in place as
//! it flows downstream; the record keeps its identity end-to-end unless a
//! stage deliberately replaces it (the ingest stage's flush does).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::vfs::ByteStream;

/// Contents of a file record.
///
/// Exactly one mode holds at a time. Stages that cannot process
/// [`Contents::Stream`] must fail fast for that record.
pub enum Contents {
    /// Fully buffered contents.
    Buffer(Vec<u8>),
    /// Streaming contents, shared so the record stays cheaply clonable.
    Stream(Arc<tokio::sync::Mutex<ByteStream>>),
    /// No contents (the record was sourced with `read: false`).
    Empty,
}

impl Contents {
    /// Wraps a byte stream as streaming contents.
    #[must_use]
    pub fn stream(stream: ByteStream) -> Self {
        Self::Stream(Arc::new(tokio::sync::Mutex::new(stream)))
    }

    /// Returns true if the contents are buffered.
    #[must_use]
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }

    /// Returns true if the contents are streamed.
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true if there are no contents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl Clone for Contents {
    fn clone(&self) -> Self {
        match self {
            Self::Buffer(bytes) => Self::Buffer(bytes.clone()),
            Self::Stream(shared) => Self::Stream(shared.clone()),
            Self::Empty => Self::Empty,
        }
    }
}

impl std::fmt::Debug for Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl Default for Contents {
    fn default() -> Self {
        Self::Empty
    }
}

impl From<Vec<u8>> for Contents {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<&str> for Contents {
    fn from(s: &str) -> Self {
        Self::Buffer(s.as_bytes().to_vec())
    }
}

/// Filesystem metadata captured when the record was sourced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if known.
    pub mtime: Option<DateTime<Utc>>,
}

impl FileStat {
    /// Creates a stat with the given size.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self { size, mtime: None }
    }

    /// Sets the modification time.
    #[must_use]
    pub fn with_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

/// A file flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Working directory the record was sourced under.
    pub cwd: PathBuf,
    /// Base directory that relative paths are computed against.
    pub base: PathBuf,
    /// Current path. Stages may rewrite this (dest does).
    pub path: PathBuf,
    /// Contents in exactly one of three modes.
    pub contents: Contents,
    /// Mutable metadata bag (`data.dest`, front-matter, ...).
    pub data: HashMap<String, serde_json::Value>,
    /// Render-time variables.
    pub locals: HashMap<String, serde_json::Value>,
    /// Identifier correlating the record to a collection entry.
    pub id: Option<String>,
    /// Filesystem stat captured at source time.
    pub stat: Option<FileStat>,
}

impl FileRecord {
    /// Creates a new record with empty contents.
    ///
    /// `base` and `cwd` default to the path's parent directory and `"."`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let base = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            cwd: PathBuf::from("."),
            base,
            path,
            contents: Contents::Empty,
            data: HashMap::new(),
            locals: HashMap::new(),
            id: None,
            stat: None,
        }
    }

    /// Sets the contents.
    #[must_use]
    pub fn with_contents(mut self, contents: impl Into<Contents>) -> Self {
        self.contents = contents.into();
        self
    }

    /// Sets the base directory.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Sets the collection-entry id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the stat.
    #[must_use]
    pub fn with_stat(mut self, stat: FileStat) -> Self {
        self.stat = Some(stat);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_data_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the path relative to `base`.
    ///
    /// Falls back to the file name when the path no longer sits under the
    /// base, which keeps dest recomputation stable after the path has been
    /// rewritten once.
    #[must_use]
    pub fn relative(&self) -> PathBuf {
        self.path.strip_prefix(&self.base).map_or_else(
            |_| {
                self.path
                    .file_name()
                    .map_or_else(|| self.path.clone(), PathBuf::from)
            },
            Path::to_path_buf,
        )
    }

    /// Returns the buffered contents, if any.
    #[must_use]
    pub fn contents_bytes(&self) -> Option<&[u8]> {
        match &self.contents {
            Contents::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the buffered contents decoded as UTF-8 (lossy), if any.
    #[must_use]
    pub fn contents_utf8(&self) -> Option<String> {
        self.contents_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Returns a mutable handle to an object-valued metadata entry,
    /// inserting an empty object first if the key is absent or not an
    /// object.
    pub fn data_object_mut(
        &mut self,
        key: &str,
    ) -> &mut serde_json::Map<String, serde_json::Value> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = serde_json::Value::Object(serde_json::Map::new());
        }
        match entry {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }
}
