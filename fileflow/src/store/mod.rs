//! Per-task template collections.
//!
//! The store is the substrate the template-engine collaborator works
//! against: named collections of managed entities, keyed by a stable id
//! derived from the record's relative path. Collections are created lazily
//! the first time a task identifier is seen, preserve insertion order, and
//! persist for the process lifetime unless explicitly cleared.
//!
//! Name lookup falls back through the singular→plural inflection table
//! before failing; when both the raw name and its inflected form exist, the
//! raw name wins.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::record::{Contents, FileRecord};

/// A managed template entity inside a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntity {
    /// Stable id, derived from the source record's relative path.
    pub id: String,
    /// Path at ingest time.
    pub path: PathBuf,
    /// Base directory at ingest time.
    pub base: PathBuf,
    /// Working directory at ingest time.
    pub cwd: PathBuf,
    /// Buffered contents, if the record had any.
    pub content: Option<String>,
    /// Metadata bag carried over from the record.
    pub data: HashMap<String, serde_json::Value>,
    /// Render-time variables carried over from the record.
    pub locals: HashMap<String, serde_json::Value>,
}

impl TemplateEntity {
    /// Converts a buffered record into an entity.
    ///
    /// The id is the record's relative path, which is unique within one
    /// source resolution.
    #[must_use]
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            id: record.relative().to_string_lossy().into_owned(),
            path: record.path.clone(),
            base: record.base.clone(),
            cwd: record.cwd.clone(),
            content: record.contents_utf8(),
            data: record.data.clone(),
            locals: record.locals.clone(),
        }
    }

    /// Converts the entity back into a file-record-shaped value.
    #[must_use]
    pub fn to_record(&self) -> FileRecord {
        let contents = self
            .content
            .as_ref()
            .map_or(Contents::Empty, |c| Contents::from(c.as_str()));
        FileRecord {
            cwd: self.cwd.clone(),
            base: self.base.clone(),
            path: self.path.clone(),
            contents,
            data: self.data.clone(),
            locals: self.locals.clone(),
            id: Some(self.id.clone()),
            stat: None,
        }
    }
}

/// A named, insertion-ordered set of template entities.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Collection name.
    pub name: String,
    /// Collections this one inherits behavior from.
    pub inherits: Vec<String>,
    entities: HashMap<String, TemplateEntity>,
    order: Vec<String>,
}

impl Collection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new(name: impl Into<String>, inherits: Vec<String>) -> Self {
        Self {
            name: name.into(),
            inherits,
            entities: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Adds an entity, replacing any entity with the same id in place.
    ///
    /// Ids are unique within the collection; a replacement keeps the
    /// original insertion position.
    pub fn add(&mut self, entity: TemplateEntity) {
        if !self.entities.contains_key(&entity.id) {
            self.order.push(entity.id.clone());
        }
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Gets an entity by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TemplateEntity> {
        self.entities.get(id)
    }

    /// Iterates entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TemplateEntity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the collection has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the entity ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.order
    }
}

/// Process-wide store of template collections.
///
/// All mutation happens on the cooperative event loop, so a read-write lock
/// is the only serialization discipline needed; insertion order per
/// collection stays deterministic.
#[derive(Debug, Default)]
pub struct TemplateStore {
    collections: RwLock<HashMap<String, Collection>>,
    inflections: RwLock<HashMap<String, String>>,
    delims: RwLock<(String, String)>,
    matter_delims: RwLock<Option<String>>,
}

impl TemplateStore {
    /// Creates an empty store with default `{{`/`}}` delimiters.
    #[must_use]
    pub fn new() -> Self {
        let store = Self::default();
        *store.delims.write() = ("{{".to_string(), "}}".to_string());
        store
    }

    /// Sets the template delimiter pair handed to the rendering collaborator.
    pub fn set_delims(&self, open: impl Into<String>, close: impl Into<String>) {
        *self.delims.write() = (open.into(), close.into());
    }

    /// Returns the template delimiter pair.
    #[must_use]
    pub fn delims(&self) -> (String, String) {
        self.delims.read().clone()
    }

    /// Sets the front-matter delimiter override.
    pub fn set_matter_delims(&self, delims: impl Into<String>) {
        *self.matter_delims.write() = Some(delims.into());
    }

    /// Returns the front-matter delimiter override, if set.
    #[must_use]
    pub fn matter_delims(&self) -> Option<String> {
        self.matter_delims.read().clone()
    }

    /// Creates a collection if it does not exist yet.
    pub fn create(&self, name: impl Into<String>, inherits: &[&str]) {
        let name = name.into();
        let mut collections = self.collections.write();
        if !collections.contains_key(&name) {
            tracing::debug!(collection = %name, "creating collection");
            collections.insert(
                name.clone(),
                Collection::new(name, inherits.iter().map(|s| (*s).to_string()).collect()),
            );
        }
    }

    /// Returns true if a collection exists under exactly `name`.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Registers a singular→plural inflection.
    pub fn set_inflection(&self, singular: impl Into<String>, plural: impl Into<String>) {
        self.inflections
            .write()
            .insert(singular.into(), plural.into());
    }

    /// Adds an entity, creating the collection lazily.
    pub fn add_entity(&self, collection: &str, entity: TemplateEntity) {
        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection, vec!["task".to_string()]))
            .add(entity);
    }

    /// Gets a collection by name, falling back through the inflection table.
    ///
    /// Direct lookup first; when that misses, the name is inflected once and
    /// looked up again. A raw-name hit always wins over the inflected form.
    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Collection> {
        let collections = self.collections.read();
        if let Some(collection) = collections.get(name) {
            return Some(collection.clone());
        }
        let inflected = self.inflections.read().get(name).cloned()?;
        collections.get(&inflected).cloned()
    }

    /// Gets a single entity from a collection.
    #[must_use]
    pub fn entity(&self, collection: &str, id: &str) -> Option<TemplateEntity> {
        self.get_collection(collection)
            .and_then(|c| c.get(id).cloned())
    }

    /// Converts every entity of a collection back into records, in
    /// insertion order.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<FileRecord> {
        self.get_collection(collection)
            .map(|c| c.iter().map(TemplateEntity::to_record).collect())
            .unwrap_or_default()
    }

    /// Removes every entity from a collection, keeping the collection.
    pub fn clear(&self, collection: &str) {
        if let Some(existing) = self.collections.write().get_mut(collection) {
            *existing = Collection::new(existing.name.clone(), existing.inherits.clone());
        }
    }

    /// Returns the known collection names.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }
}
