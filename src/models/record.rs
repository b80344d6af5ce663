use serde::{Deserialize, Serialize};

/// One row of the metadata table: field name to text value, in column order.
///
/// The first field is the series identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    fields: Vec<(String, String)>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Column order is preserved.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Series identifier, taken from the first column.
    pub fn id(&self) -> &str {
        self.fields.first().map_or("", |(_, v)| v.as_str())
    }

    /// Strip surrounding whitespace from the identifier field.
    pub fn trim_id(&mut self) {
        if let Some((_, value)) = self.fields.first_mut()
            && value.trim().len() != value.len()
        {
            *value = value.trim().to_string();
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MetadataRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
