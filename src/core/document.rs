//! The persisted application state as one open JSON mapping.
//!
//! The top level is always an object; everything below it is opaque to the
//! store. Callers that expect specific collections describe them with a
//! [`DocumentShape`] and get missing keys backfilled with empty defaults
//! instead of errors.

use crate::core::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Accepts only a top-level JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidDocument(format!(
                "expected a JSON object at the top level, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Parses raw bytes as read from disk or downloaded from the remote
    /// namespace. Zero-length and unparseable content is `Corrupt`, as is a
    /// parseable top level that is not an object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(StoreError::Corrupt("zero-length document".to_string()));
        }
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Corrupt(format!("invalid JSON: {}", e)))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::Corrupt(format!(
                "top level is {}, not an object",
                json_type_name(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Pretty-printed UTF-8 JSON, the on-disk and on-the-wire form.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.0)
            .map_err(|e| StoreError::InvalidDocument(format!("serialization failed: {}", e)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// A fresh document holding an empty collection for every shape key.
    pub fn default_shaped(shape: &DocumentShape) -> Self {
        let mut doc = Self::new();
        doc.backfill(shape);
        doc
    }

    /// Inserts an empty collection of the right kind for every shape key
    /// that is missing. Returns whether anything was added.
    pub fn backfill(&mut self, shape: &DocumentShape) -> bool {
        let mut changed = false;
        for (key, kind) in shape.entries() {
            if !self.0.contains_key(key) {
                self.0.insert(key.to_string(), kind.empty_value());
                changed = true;
            }
        }
        changed
    }

    /// Gives every object entry of the named array collections an `"id"`
    /// if it lacks one. Returns the number of ids assigned.
    pub fn assign_missing_ids(&mut self, collections: &[String]) -> usize {
        let mut assigned = 0;
        for name in collections {
            let Some(Value::Array(entries)) = self.0.get_mut(name.as_str()) else {
                continue;
            };
            for entry in entries.iter_mut() {
                if let Value::Object(fields) = entry {
                    let missing = match fields.get("id") {
                        None | Some(Value::Null) => true,
                        Some(_) => false,
                    };
                    if missing {
                        fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
                        assigned += 1;
                    }
                }
            }
        }
        assigned
    }

    /// True when the document carries no data beyond empty collections.
    /// Such a document is not treated as an authoritative primary; `load`
    /// falls through to snapshot recovery instead.
    pub fn is_empty_shell(&self, _shape: &DocumentShape) -> bool {
        self.0.values().all(|value| match value {
            Value::Array(items) => items.is_empty(),
            Value::Object(fields) => fields.is_empty(),
            _ => false,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Document Shape
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Array,
    Object,
}

impl CollectionKind {
    pub fn empty_value(self) -> Value {
        match self {
            CollectionKind::Array => Value::Array(Vec::new()),
            CollectionKind::Object => Value::Object(Map::new()),
        }
    }
}

/// The top-level collections a caller expects to find in a document.
/// The shape is advisory: extra keys are preserved untouched, missing keys
/// are backfilled with empty collections.
#[derive(Debug, Clone)]
pub struct DocumentShape {
    entries: Vec<(String, CollectionKind)>,
}

impl DocumentShape {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn with(mut self, key: impl Into<String>, kind: CollectionKind) -> Self {
        self.entries.push((key.into(), kind));
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, CollectionKind)> {
        self.entries.iter().map(|(key, kind)| (key.as_str(), *kind))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl Default for DocumentShape {
    /// The canonical team-management shape.
    fn default() -> Self {
        Self::empty()
            .with("players", CollectionKind::Array)
            .with("trainings", CollectionKind::Object)
            .with("exercises", CollectionKind::Object)
            .with("tactics", CollectionKind::Array)
            .with("games", CollectionKind::Array)
    }
}
