// ABOUTME: Input for a clone job
// ABOUTME: Validated once, before the job is created

use serde::{Deserialize, Serialize};

use crate::error::{ClonerError, Result};
use crate::store::ConnectionDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequest {
    pub source: ConnectionDescriptor,
    pub target: ConnectionDescriptor,
    pub database: String,
}

impl CloneRequest {
    pub fn new(
        source: ConnectionDescriptor,
        target: ConnectionDescriptor,
        database: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            database: database.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.uri.trim().is_empty() {
            return Err(ClonerError::InvalidInput(
                "Source connection string is required".to_string(),
            ));
        }
        if self.target.uri.trim().is_empty() {
            return Err(ClonerError::InvalidInput(
                "Target connection string is required".to_string(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(ClonerError::InvalidInput(
                "Database name is required".to_string(),
            ));
        }
        Ok(())
    }
}
