use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A numeric embedding. Never persisted locally.
pub type Vector = Vec<f32>;

/// Size-bounded field map stored as metadata next to a vector.
///
/// Field order is insertion order, which is also the serialization order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), Value::String(value.into()));
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate `(field, value)` pairs; non-string values are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Byte size of the compact JSON encoding.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(&self.fields).map_or(0, |bytes| bytes.len())
    }

    /// Text handed to the embedding model: `key: value` pairs joined by spaces.
    pub fn embedding_text(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build a document from arbitrary JSON metadata returned by an index.
    ///
    /// Scalars are stringified so documents read back from any backend look alike.
    pub fn from_metadata(map: Map<String, Value>) -> Self {
        let fields = map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, Value::String(s))),
                Value::Null => None,
                Value::Bool(_) | Value::Number(_) => Some((k, Value::String(v.to_string()))),
                other => Some((k, Value::String(other.to_string()))),
            })
            .collect();
        Self { fields }
    }
}

/// One stored entry: identifier, embedding and document metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vector,
    pub document: Document,
}

impl IndexEntry {
    pub fn new(id: impl Into<String>, vector: Vector, document: Document) -> Self {
        Self {
            id: id.into(),
            vector,
            document,
        }
    }
}
