// ABOUTME: Error types shared by the job tracker, clone engine and document browser
// ABOUTME: Variants separate client mistakes (bad input, missing entity) from datastore failures

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClonerError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl ClonerError {
    /// True when the caller, not the datastore, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ClonerError::InvalidInput(_) | ClonerError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ClonerError>;

impl From<mongodb::error::Error> for ClonerError {
    fn from(err: mongodb::error::Error) -> Self {
        ClonerError::Database(err.to_string())
    }
}

impl From<bson::oid::Error> for ClonerError {
    fn from(err: bson::oid::Error) -> Self {
        ClonerError::InvalidInput(format!("Invalid document id: {}", err))
    }
}

impl From<serde_json::Error> for ClonerError {
    fn from(err: serde_json::Error) -> Self {
        ClonerError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<bson::ser::Error> for ClonerError {
    fn from(err: bson::ser::Error) -> Self {
        ClonerError::InvalidInput(format!("BSON encoding error: {}", err))
    }
}

impl From<bson::de::Error> for ClonerError {
    fn from(err: bson::de::Error) -> Self {
        ClonerError::InvalidInput(format!("BSON decoding error: {}", err))
    }
}
