// ABOUTME: Schema inference over a sample of documents
// ABOUTME: Summarises observed value kinds, presence and example values per top-level field

use std::collections::{BTreeSet, HashMap};

use bson::{Bson, Document};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Number of example values kept per field.
pub const MAX_EXAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
    Date,
    ObjectId,
}

impl ValueKind {
    /// Object ids and timestamps are reported apart from plain nested documents.
    pub fn of(value: &Bson) -> Self {
        match value {
            Bson::String(_) | Bson::Symbol(_) => ValueKind::String,
            Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => {
                ValueKind::Number
            }
            Bson::Boolean(_) => ValueKind::Boolean,
            Bson::Array(_) => ValueKind::Array,
            Bson::Null | Bson::Undefined => ValueKind::Null,
            Bson::DateTime(_) | Bson::Timestamp(_) => ValueKind::Date,
            Bson::ObjectId(_) => ValueKind::ObjectId,
            _ => ValueKind::Object,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FieldSummary {
    pub types: BTreeSet<ValueKind>,
    pub count: usize,
    pub percentage: u32,
    pub examples: Vec<Bson>,
}

/// Per-field summary in first-seen field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSummary {
    fields: Vec<(String, FieldSummary)>,
}

impl SchemaSummary {
    pub fn get(&self, field: &str) -> Option<&FieldSummary> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, summary)| summary)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSummary)> {
        self.fields.iter().map(|(name, summary)| (name.as_str(), summary))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for SchemaSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, summary) in &self.fields {
            map.serialize_entry(name, summary)?;
        }
        map.end()
    }
}

pub fn infer(documents: &[Document]) -> SchemaSummary {
    let mut fields: Vec<(String, FieldSummary)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for document in documents {
        for (key, value) in document {
            let position = *positions.entry(key.clone()).or_insert_with(|| {
                fields.push((
                    key.clone(),
                    FieldSummary {
                        types: BTreeSet::new(),
                        count: 0,
                        percentage: 0,
                        examples: Vec::new(),
                    },
                ));
                fields.len() - 1
            });

            let summary = &mut fields[position].1;
            summary.types.insert(ValueKind::of(value));
            summary.count += 1;
            if summary.examples.len() < MAX_EXAMPLES {
                summary.examples.push(value.clone());
            }
        }
    }

    let sample_size = documents.len() as f64;
    for (_, summary) in &mut fields {
        summary.percentage = (summary.count as f64 / sample_size * 100.0).round() as u32;
    }

    SchemaSummary { fields }
}
