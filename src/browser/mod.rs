// ABOUTME: CRUD document browser over a single database connection per call
// ABOUTME: Produces the connection, collection and paginated document listings

pub mod payload;

use std::sync::Arc;

use bson::{doc, oid::ObjectId, Bson, Document};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClonerError, Result};
use crate::schema::{self, SchemaSummary};
use crate::store::{
    ConnectionDescriptor, Connector, DatabaseSummary, DocumentStore, FindQuery,
};

pub use payload::Payload;

pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Largest skip or limit the server accepts.
const MAX_SERVER_COUNT: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub collection_type: String,
    pub document_count: u64,
    pub sample_schema: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub filter: Option<Payload>,
    pub sort: Option<Payload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_documents: u64,
    pub documents_per_page: u64,
}

impl Pagination {
    pub fn new(current_page: u64, documents_per_page: u64, total_documents: u64) -> Self {
        Self {
            current_page,
            total_pages: total_documents.div_ceil(documents_per_page),
            total_documents,
            documents_per_page,
        }
    }

    /// Documents to skip to reach the current page, if that fits the server's signed 64-bit range.
    pub fn skip(&self) -> Option<u64> {
        self.current_page
            .checked_sub(1)?
            .checked_mul(self.documents_per_page)
            .filter(|skip| *skip <= MAX_SERVER_COUNT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub pagination: Pagination,
    pub schema: SchemaSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedDocument {
    pub inserted_id: Bson,
}

pub fn parse_object_id(id: &str) -> Result<ObjectId> {
    Ok(ObjectId::parse_str(id.trim())?)
}

pub struct DocumentBrowser {
    connector: Arc<dyn Connector>,
}

impl DocumentBrowser {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    async fn open(&self, conn: &ConnectionDescriptor) -> Result<Box<dyn DocumentStore>> {
        debug!("Opening browser connection to {}", conn.redacted());
        self.connector.connect(conn).await
    }

    /// Lists every database visible to the credential.
    pub async fn test_connection(&self, conn: &ConnectionDescriptor) -> Result<Vec<DatabaseSummary>> {
        let store = self.open(conn).await?;
        let databases = store.list_databases().await;
        store.close().await;

        let databases = databases?;
        info!("Connection to {} lists {} databases", conn.redacted(), databases.len());
        Ok(databases)
    }

    pub async fn list_collections(
        &self,
        conn: &ConnectionDescriptor,
        database: &str,
    ) -> Result<Vec<CollectionSummary>> {
        let store = self.open(conn).await?;
        let summaries = summarize_collections(store.as_ref(), database).await;
        store.close().await;
        summaries
    }

    pub async fn list_documents(
        &self,
        conn: &ConnectionDescriptor,
        database: &str,
        collection: &str,
        query: DocumentQuery,
    ) -> Result<DocumentPage> {
        let page = query.page.unwrap_or(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 || limit == 0 {
            return Err(ClonerError::InvalidInput(
                "page and limit must be at least 1".to_string(),
            ));
        }
        if limit > MAX_SERVER_COUNT {
            return Err(ClonerError::InvalidInput(format!(
                "limit must not exceed {}",
                MAX_SERVER_COUNT
            )));
        }
        let skip = Pagination::new(page, limit, 0).skip().ok_or_else(|| {
            ClonerError::InvalidInput(format!("page {} is out of range for limit {}", page, limit))
        })?;
        let filter = payload::document_or_empty(query.filter, "filter")?;
        let sort = query.sort.map(|sort| sort.into_document("sort")).transpose()?;

        let store = self.open(conn).await?;
        let query = FindQuery {
            filter,
            sort,
            skip,
            limit: Some(limit as i64),
        };
        let result = fetch_page(store.as_ref(), database, collection, query, page, limit).await;
        store.close().await;
        result
    }

    pub async fn get_document(
        &self,
        conn: &ConnectionDescriptor,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Document> {
        let id = parse_object_id(id)?;

        let store = self.open(conn).await?;
        let found = store.find_one(database, collection, doc! { "_id": id }).await;
        store.close().await;

        found?.ok_or_else(|| ClonerError::NotFound(format!("Document {}", id)))
    }

    pub async fn insert_document(
        &self,
        conn: &ConnectionDescriptor,
        database: &str,
        collection: &str,
        document: Payload,
    ) -> Result<InsertedDocument> {
        let document = document.into_document("document")?;

        let store = self.open(conn).await?;
        let inserted = store.insert_one(database, collection, document).await;
        store.close().await;

        let inserted_id = inserted?;
        info!("Inserted document {} into {}.{}", inserted_id, database, collection);
        Ok(InsertedDocument { inserted_id })
    }

    pub async fn update_document(
        &self,
        conn: &ConnectionDescriptor,
        database: &str,
        collection: &str,
        id: &str,
        update: Payload,
    ) -> Result<()> {
        let id = parse_object_id(id)?;
        let update = payload::update_modifications(update.into_document("update")?)?;

        let store = self.open(conn).await?;
        let matched = store
            .update_one(database, collection, doc! { "_id": id }, update)
            .await;
        store.close().await;

        match matched? {
            0 => Err(ClonerError::NotFound(format!("Document {}", id))),
            _ => Ok(()),
        }
    }

    pub async fn delete_document(
        &self,
        conn: &ConnectionDescriptor,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<()> {
        let id = parse_object_id(id)?;

        let store = self.open(conn).await?;
        let deleted = store
            .delete_one(database, collection, doc! { "_id": id })
            .await;
        store.close().await;

        match deleted? {
            0 => Err(ClonerError::NotFound(format!("Document {}", id))),
            _ => {
                info!("Deleted document {} from {}.{}", id, database, collection);
                Ok(())
            }
        }
    }
}

async fn summarize_collections(
    store: &dyn DocumentStore,
    database: &str,
) -> Result<Vec<CollectionSummary>> {
    let mut summaries = Vec::new();
    for info in store.list_collections(database).await? {
        let document_count = store
            .count_documents(database, &info.name, Document::new())
            .await?;
        let sample_schema = store
            .find_one(database, &info.name, Document::new())
            .await?
            .map(|sample| sample.keys().cloned().collect())
            .unwrap_or_default();

        summaries.push(CollectionSummary {
            name: info.name,
            collection_type: info.collection_type,
            document_count,
            sample_schema,
        });
    }
    Ok(summaries)
}

async fn fetch_page(
    store: &dyn DocumentStore,
    database: &str,
    collection: &str,
    query: FindQuery,
    page: u64,
    limit: u64,
) -> Result<DocumentPage> {
    let total = store
        .count_documents(database, collection, query.filter.clone())
        .await?;
    let pagination = Pagination::new(page, limit, total);

    let documents = store.find(database, collection, query).await?;
    let schema = schema::infer(&documents);

    Ok(DocumentPage {
        documents,
        pagination,
        schema,
    })
}
