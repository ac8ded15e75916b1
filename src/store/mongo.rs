// ABOUTME: MongoDB implementation of the datastore seam on top of the official driver
// ABOUTME: Every call maps driver failures into ClonerError with context

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::ErrorKind,
    options::{ClientOptions, FindOptions, IndexOptions},
    results::CollectionType,
    Client, Collection, IndexModel,
};
use tracing::{debug, info};

use super::{
    CollectionInfo, ConnectionDescriptor, Connector, DatabaseSummary, DocumentStore, FindQuery,
    IndexSpec,
};
use crate::error::{ClonerError, Result};

/// Server error code for "ns not found".
const NAMESPACE_NOT_FOUND: i32 = 26;

#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DocumentStore>> {
        let store = MongoStore::connect(descriptor).await?;
        Ok(Box::new(store))
    }
}

pub struct MongoStore {
    client: Client,
    label: String,
}

impl MongoStore {
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let label = descriptor.redacted();
        debug!("Connecting to {}", label);

        let mut options = ClientOptions::parse(&descriptor.uri).await.map_err(|e| {
            ClonerError::Connection(format!("Invalid connection string {}: {}", label, e))
        })?;
        if let Some(app_name) = &descriptor.app_name {
            options.app_name = Some(app_name.clone());
        }

        let client = Client::with_options(options).map_err(|e| {
            ClonerError::Connection(format!("Failed to create client for {}: {}", label, e))
        })?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| ClonerError::Connection(format!("Failed to reach {}: {}", label, e)))?;

        info!("Connected to {}", label);
        Ok(Self { client, label })
    }

    fn collection(&self, database: &str, collection: &str) -> Collection<Document> {
        self.client.database(database).collection(collection)
    }
}

fn collection_type_name(kind: &CollectionType) -> String {
    match kind {
        CollectionType::View => "view".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

fn is_namespace_not_found(err: &mongodb::error::Error) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn list_databases(&self) -> Result<Vec<DatabaseSummary>> {
        let databases = self.client.list_databases(None, None).await?;
        Ok(databases
            .into_iter()
            .map(|spec| DatabaseSummary {
                name: spec.name,
                size_on_disk: spec.size_on_disk,
                empty: spec.empty,
            })
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<CollectionInfo>> {
        let cursor = self
            .client
            .database(database)
            .list_collections(None, None)
            .await?;
        let specs: Vec<_> = cursor.try_collect().await?;
        Ok(specs
            .into_iter()
            .map(|spec| CollectionInfo {
                collection_type: collection_type_name(&spec.collection_type),
                name: spec.name,
            })
            .collect())
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64> {
        Ok(self
            .collection(database, collection)
            .count_documents(filter, None)
            .await?)
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()> {
        match self.collection(database, collection).drop(None).await {
            Ok(()) => Ok(()),
            Err(e) if is_namespace_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let cursor = self.collection(database, collection).find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: FindQuery,
    ) -> Result<Vec<Document>> {
        let options = FindOptions::builder()
            .sort(query.sort)
            .skip(Some(query.skip))
            .limit(query.limit)
            .build();
        let cursor = self
            .collection(database, collection)
            .find(query.filter, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        Ok(self
            .collection(database, collection)
            .find_one(filter, None)
            .await?)
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<Bson> {
        let result = self
            .collection(database, collection)
            .insert_one(document, None)
            .await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let result = self
            .collection(database, collection)
            .insert_many(documents, None)
            .await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        let result = self
            .collection(database, collection)
            .update_one(filter, update, None)
            .await?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, database: &str, collection: &str, filter: Document) -> Result<u64> {
        let result = self
            .collection(database, collection)
            .delete_one(filter, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn list_indexes(&self, database: &str, collection: &str) -> Result<Vec<IndexSpec>> {
        let cursor = self
            .collection(database, collection)
            .list_indexes(None)
            .await?;
        let models: Vec<IndexModel> = cursor.try_collect().await?;

        let mut specs = Vec::with_capacity(models.len());
        for model in models {
            let name = model
                .options
                .as_ref()
                .and_then(|options| options.name.clone())
                .unwrap_or_default();
            let raw_options = match &model.options {
                Some(options) => bson::to_document(options)?,
                None => Document::new(),
            };
            specs.push(IndexSpec::from_raw(name, model.keys, raw_options));
        }
        Ok(specs)
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<()> {
        let options: IndexOptions = bson::from_document(index.options.clone())?;
        let model = IndexModel::builder()
            .keys(index.keys.clone())
            .options(Some(options))
            .build();
        self.collection(database, collection)
            .create_index(model, None)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        debug!("Closing connection to {}", self.label);
        self.client.clone().shutdown().await;
    }
}
