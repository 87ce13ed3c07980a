//! Core types shared by the registry, the listeners and the local store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an owning context (a navigation or lifecycle scope).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        ContextId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        ContextId(id.to_string())
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a record in the local store: model type plus key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub model: String,
    pub id: String,
}

impl RecordKey {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

/// De-duplication key for a subscription within a context.
///
/// Identities are built deliberately from the thing being watched:
/// - a record: `post:1`
/// - a collection: `post[*]` for the root collection, `post[recent]` for a labelled query
/// - a relationship: `post:1#comments`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityIdentity(String);

/// Label used for the root collection of a model.
pub const ROOT_COLLECTION_LABEL: &str = "*";

impl EntityIdentity {
    /// Identity of a single record.
    pub fn record(key: &RecordKey) -> Self {
        EntityIdentity(format!("{}:{}", key.model, key.id))
    }

    /// Identity of a collection of `model`, optionally narrowed by a query label.
    pub fn collection(model: &str, label: Option<&str>) -> Self {
        EntityIdentity(format!(
            "{}[{}]",
            model,
            label.unwrap_or(ROOT_COLLECTION_LABEL)
        ))
    }

    /// Identity of a relationship edge hanging off `parent`.
    pub fn relationship(parent: &RecordKey, name: &str) -> Self {
        EntityIdentity(format!("{}:{}#{}", parent.model, parent.id, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityIdentity({})", self.0)
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One generation of a context's subscriptions.
///
/// A context torn down with `unsubscribe(context, None)` and later re-entered
/// gets a fresh generation; work queued for the old one is discarded.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen({})", self.0)
    }
}

/// Cardinality of a relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    ToOne,
    ToMany,
}

/// Normalized linkage data for one relationship of a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RelationshipData {
    ToOne(Option<RecordKey>),
    ToMany(Vec<RecordKey>),
}

impl RelationshipData {
    pub fn kind(&self) -> RelationshipKind {
        match self {
            RelationshipData::ToOne(_) => RelationshipKind::ToOne,
            RelationshipData::ToMany(_) => RelationshipKind::ToMany,
        }
    }
}

/// A remote payload converted into the generic local record format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub key: RecordKey,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipData>,
}

impl NormalizedRecord {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            attributes: serde_json::Map::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Add relationship linkage.
    pub fn with_relationship(mut self, name: impl Into<String>, data: RelationshipData) -> Self {
        self.relationships.insert(name.into(), data);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}
