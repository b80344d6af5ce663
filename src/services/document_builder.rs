//! Size-bounded document construction from metadata records.

use std::borrow::Cow;

use crate::models::{Document, DocumentConfig, MetadataRecord};
use crate::utils::text::{json_escaped_len, json_string_len, truncate_chars};

/// Appended to values cut at the per-field truncation size.
pub const ELLIPSIS: &str = "...";

/// Serialized size of an empty JSON object (`{}`).
const EMPTY_OBJECT_LEN: usize = 2;

/// Builds documents whose compact JSON encoding never exceeds `size_budget` bytes.
///
/// Priority fields go first, in declared order, then the remaining fields in
/// record order. Empty values are treated as absent. Once a field does not fit
/// whole, its longest fitting prefix is kept and the build ends.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    priority_fields: Vec<String>,
    field_truncate_size: usize,
    size_budget: usize,
}

enum Fit {
    Whole,
    Exhausted,
}

impl DocumentBuilder {
    pub fn new(priority_fields: Vec<String>, field_truncate_size: usize, size_budget: usize) -> Self {
        Self {
            priority_fields,
            field_truncate_size,
            size_budget,
        }
    }

    pub fn from_config(config: &DocumentConfig) -> Self {
        Self::new(
            config.priority_fields.clone(),
            config.field_truncate_size,
            config.size_budget,
        )
    }

    pub fn build(&self, record: &MetadataRecord) -> Document {
        let mut document = Document::new();
        let mut size = EMPTY_OBJECT_LEN;

        if size > self.size_budget {
            return document;
        }

        let priority = self
            .priority_fields
            .iter()
            .filter_map(|field| record.get(field).map(|value| (field.as_str(), value)));
        let remaining = record
            .fields()
            .filter(|(field, _)| !self.priority_fields.iter().any(|p| p == field));

        for (field, value) in priority.chain(remaining) {
            if value.is_empty() || document.contains(field) {
                continue;
            }

            let value = self.clip(value);
            if let Fit::Exhausted = self.add(&mut document, &mut size, field, &value) {
                break;
            }
        }

        debug_assert_eq!(size, document.serialized_size());
        document
    }

    /// Cut `value` to the per-field character limit, marking the cut.
    fn clip<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.chars().count() > self.field_truncate_size {
            Cow::Owned(format!(
                "{}{}",
                truncate_chars(value, self.field_truncate_size),
                ELLIPSIS
            ))
        } else {
            Cow::Borrowed(value)
        }
    }

    fn add(&self, document: &mut Document, size: &mut usize, field: &str, value: &str) -> Fit {
        let separator = usize::from(!document.is_empty());
        // `,"key":` before the value literal
        let key_cost = separator + json_string_len(field) + 1;
        let tentative = *size + key_cost + json_string_len(value);

        if tentative <= self.size_budget {
            document.insert(field, value);
            *size = tentative;
            return Fit::Whole;
        }

        // Both value quotes must fit as well as at least one character.
        let overhead = key_cost + 2;
        let remaining = self.size_budget - *size;
        if remaining <= overhead {
            return Fit::Exhausted;
        }

        let room = remaining - overhead;
        let mut used = 0;
        let mut end = 0;
        for (idx, c) in value.char_indices() {
            let cost = json_escaped_len(c);
            if used + cost > room {
                break;
            }
            used += cost;
            end = idx + c.len_utf8();
        }

        if end > 0 {
            document.insert(field, &value[..end]);
            *size += overhead + used;
        }
        Fit::Exhausted
    }
}
