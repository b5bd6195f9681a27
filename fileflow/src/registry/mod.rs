//! Named transform-stage factories.
//!
//! Pipelines refer to optional stages by name; the registry resolves a name
//! to a factory that builds a concrete transform from call-time options.
//! Registering under an existing name overwrites silently (last write wins),
//! and resolving an unknown name is not an error: composition degrades it
//! to a pass-through so optional stages stay optional.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::pipeline::BoxTransform;

/// Call-time options shared by every stage in one composition.
///
/// A free-form bag so user stages and built-in stages read the same
/// configuration surface. Boolean flags follow the `plugin {name}` naming
/// convention for disabling named stages.
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    values: HashMap<String, serde_json::Value>,
}

impl StageOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Sets an option in place.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    /// Gets an option.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Gets a string-valued option.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Copies every entry of `other` over this set (overrides win).
    pub fn merge(&mut self, other: &StageOptions) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Returns true only when the key is explicitly set to boolean `false`.
    ///
    /// Absent keys and non-boolean values are not "false": a stage is only
    /// disabled by an explicit negative.
    #[must_use]
    pub fn is_false(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(serde_json::Value::Bool(false)))
    }
}

/// Factory producing a transform from call-time options.
pub type StageFactory = Arc<dyn Fn(&StageOptions) -> BoxTransform + Send + Sync>;

/// Registry of named transform-stage factories.
#[derive(Default)]
pub struct StageRegistry {
    entries: RwLock<HashMap<String, StageFactory>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `factory` under `name`, overwriting any existing entry.
    pub fn register(&self, name: impl Into<String>, factory: StageFactory) {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            tracing::debug!(stage = %name, "overwriting registered stage");
        }
        entries.insert(name, factory);
    }

    /// Resolves a factory by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<StageFactory> {
        self.entries.read().get(name).cloned()
    }

    /// Returns true if a stage is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Returns the registered stage names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("names", &self.names())
            .finish()
    }
}
