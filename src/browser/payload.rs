// ABOUTME: Decoding of filter, sort, document and update payloads
// ABOUTME: Accepts structured JSON or JSON text; anything that is not an object is rejected

use bson::{Bson, Document};
use serde::Deserialize;

use crate::error::{ClonerError, Result};

/// A request field that may arrive already structured or as encoded JSON text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Structured(serde_json::Value),
}

impl Payload {
    /// Decodes the payload as an extended-JSON object. `what` names the field in errors.
    pub fn into_document(self, what: &str) -> Result<Document> {
        let value = match self {
            Payload::Text(text) | Payload::Structured(serde_json::Value::String(text)) => {
                serde_json::from_str(&text).map_err(|e| {
                    ClonerError::InvalidInput(format!("Invalid {} JSON: {}", what, e))
                })?
            }
            Payload::Structured(value) => value,
        };

        match Bson::try_from(value) {
            Ok(Bson::Document(document)) => Ok(document),
            Ok(_) => Err(ClonerError::InvalidInput(format!(
                "{} must be a JSON object",
                what
            ))),
            Err(e) => Err(ClonerError::InvalidInput(format!("Invalid {}: {}", what, e))),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Structured(value)
    }
}

/// Decodes an optional payload; absence means an empty document.
pub fn document_or_empty(payload: Option<Payload>, what: &str) -> Result<Document> {
    match payload {
        Some(payload) => payload.into_document(what),
        None => Ok(Document::new()),
    }
}

/// Turns an update payload into update modifications.
///
/// Payloads made only of `$` operators pass through; plain field maps are
/// wrapped in `$set` with `_id` removed.
pub fn update_modifications(mut update: Document) -> Result<Document> {
    let operators = update.keys().filter(|key| key.starts_with('$')).count();
    if operators > 0 && operators == update.len() {
        return Ok(update);
    }
    if operators > 0 {
        return Err(ClonerError::InvalidInput(
            "Update cannot mix operators and plain fields".to_string(),
        ));
    }

    update.remove("_id");
    if update.is_empty() {
        return Err(ClonerError::InvalidInput(
            "Update must contain at least one field".to_string(),
        ));
    }
    Ok(bson::doc! { "$set": update })
}
