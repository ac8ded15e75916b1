// ABOUTME: Datastore seam used by the clone engine and the document browser
// ABOUTME: Defines connection descriptors plus the Connector and DocumentStore traits

pub mod mongo;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use bson::Document;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use mongo::{MongoConnector, MongoStore};

/// Name of the implicit primary-key index, which is never copied.
pub const PRIMARY_INDEX_NAME: &str = "_id_";

/// Index metadata fields that only make sense on the server that produced them.
pub const NON_PORTABLE_INDEX_FIELDS: [&str; 3] = ["v", "name", "ns"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

impl ConnectionDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            app_name: None,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// The URI with any password replaced, safe to log.
    pub fn redacted(&self) -> String {
        let Some(scheme_end) = self.uri.find("://") else {
            return self.uri.clone();
        };
        let rest = &self.uri[scheme_end + 3..];
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let Some(at) = rest[..authority_end].rfind('@') else {
            return self.uri.clone();
        };
        let credentials = &rest[..at];
        let user = credentials.split(':').next().unwrap_or_default();
        format!(
            "{}://{}:****@{}",
            &self.uri[..scheme_end],
            user,
            &rest[at + 1..]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    pub name: String,
    pub size_on_disk: u64,
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub collection_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Document,
    /// Creation options without `v`, `name` or `ns`.
    pub options: Document,
}

impl IndexSpec {
    /// Builds a spec from a raw index description, dropping non-portable fields.
    pub fn from_raw(name: impl Into<String>, keys: Document, mut raw_options: Document) -> Self {
        for field in NON_PORTABLE_INDEX_FIELDS {
            raw_options.remove(field);
        }
        raw_options.remove("key");
        Self {
            name: name.into(),
            keys,
            options: raw_options,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.name == PRIMARY_INDEX_NAME
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub skip: u64,
    pub limit: Option<i64>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DocumentStore>>;
}

/// One open connection to a document database server.
///
/// Every method is scoped to a database by name; cross-database operations
/// are never performed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<DatabaseSummary>>;

    async fn list_collections(&self, database: &str) -> Result<Vec<CollectionInfo>>;

    async fn count_documents(&self, database: &str, collection: &str, filter: Document)
        -> Result<u64>;

    /// Drops a collection. A collection that does not exist is not an error.
    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()>;

    async fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>>;

    async fn find(&self, database: &str, collection: &str, query: FindQuery)
        -> Result<Vec<Document>>;

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>>;

    async fn insert_one(&self, database: &str, collection: &str, document: Document)
        -> Result<bson::Bson>;

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64>;

    /// Returns the number of matched documents.
    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64>;

    /// Returns the number of deleted documents.
    async fn delete_one(&self, database: &str, collection: &str, filter: Document) -> Result<u64>;

    async fn list_indexes(&self, database: &str, collection: &str) -> Result<Vec<IndexSpec>>;

    async fn create_index(&self, database: &str, collection: &str, index: &IndexSpec)
        -> Result<()>;

    /// Releases the underlying connection.
    async fn close(&self);
}
