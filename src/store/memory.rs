// ABOUTME: In-process document store used by the engine and browser tests
// ABOUTME: Supports views plus failure injection for unreachable servers, inserts, index builds and panics

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};

use super::{
    CollectionInfo, ConnectionDescriptor, Connector, DatabaseSummary, DocumentStore, FindQuery,
    IndexSpec, PRIMARY_INDEX_NAME,
};
use crate::error::{ClonerError, Result};

#[derive(Debug, Default, Clone)]
pub struct MemoryCollection {
    pub collection_type: String,
    pub documents: Vec<Document>,
    pub indexes: Vec<IndexSpec>,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub databases: BTreeMap<String, BTreeMap<String, MemoryCollection>>,
    pub failing_indexes: HashSet<String>,
    pub failing_inserts: HashSet<String>,
    pub panicking_fetches: HashSet<String>,
    pub insert_batches: Vec<usize>,
    pub last_find: Option<FindQuery>,
}

impl ServerState {
    fn collection_mut(&mut self, database: &str, collection: &str) -> &mut MemoryCollection {
        self.databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                collection_type: "collection".to_string(),
                documents: Vec::new(),
                indexes: vec![IndexSpec::from_raw(
                    PRIMARY_INDEX_NAME,
                    doc! { "_id": 1 },
                    Document::new(),
                )],
            })
    }

    fn collection(&self, database: &str, collection: &str) -> Option<&MemoryCollection> {
        self.databases.get(database)?.get(collection)
    }
}

#[derive(Clone, Default)]
pub struct MemoryServer {
    pub state: Arc<Mutex<ServerState>>,
    pub closed: Arc<AtomicUsize>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, database: &str, collection: &str, documents: Vec<Document>) {
        let mut state = self.state.lock().unwrap();
        state
            .collection_mut(database, collection)
            .documents
            .extend(documents);
    }

    /// Registers a read-only view; like a server, it has no indexes to list.
    pub fn add_view(&self, database: &str, view: &str, documents: Vec<Document>) {
        let mut state = self.state.lock().unwrap();
        let collection = state.collection_mut(database, view);
        collection.collection_type = "view".to_string();
        collection.indexes.clear();
        collection.documents.extend(documents);
    }

    pub fn add_index(&self, database: &str, collection: &str, index: IndexSpec) {
        let mut state = self.state.lock().unwrap();
        state.collection_mut(database, collection).indexes.push(index);
    }

    pub fn fail_index(&self, name: &str) {
        self.state.lock().unwrap().failing_indexes.insert(name.to_string());
    }

    pub fn fail_inserts_into(&self, collection: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_inserts
            .insert(collection.to_string());
    }

    pub fn panic_on_fetch(&self, collection: &str) {
        self.state
            .lock()
            .unwrap()
            .panicking_fetches
            .insert(collection.to_string());
    }

    pub fn last_find(&self) -> Option<FindQuery> {
        self.state.lock().unwrap().last_find.clone()
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let state = self.state.lock().unwrap();
        state
            .collection(database, collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    pub fn index_names(&self, database: &str, collection: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .collection(database, collection)
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn insert_batches(&self) -> Vec<usize> {
        self.state.lock().unwrap().insert_batches.clone()
    }

    pub fn closed_connections(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Routes URIs to in-memory servers; unknown URIs are unreachable.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    servers: HashMap<String, MemoryServer>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, uri: &str, server: MemoryServer) -> Self {
        self.servers.insert(uri.to_string(), server);
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DocumentStore>> {
        match self.servers.get(&descriptor.uri) {
            Some(server) => Ok(Box::new(MemoryStore {
                server: server.clone(),
            })),
            None => Err(ClonerError::Connection(format!(
                "Failed to reach {}",
                descriptor.redacted()
            ))),
        }
    }
}

pub struct MemoryStore {
    server: MemoryServer,
}

/// Top-level equality match; operators are not interpreted and sorts are ignored.
fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_databases(&self) -> Result<Vec<DatabaseSummary>> {
        let state = self.server.state.lock().unwrap();
        Ok(state
            .databases
            .iter()
            .map(|(name, collections)| DatabaseSummary {
                name: name.clone(),
                size_on_disk: collections.values().map(|c| c.documents.len() as u64).sum(),
                empty: collections.values().all(|c| c.documents.is_empty()),
            })
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<CollectionInfo>> {
        let state = self.server.state.lock().unwrap();
        Ok(state
            .databases
            .get(database)
            .map(|collections| {
                collections
                    .iter()
                    .map(|(name, found)| CollectionInfo {
                        name: name.clone(),
                        collection_type: found.collection_type.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_documents(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<u64> {
        let state = self.server.state.lock().unwrap();
        Ok(state
            .collection(database, collection)
            .map(|c| c.documents.iter().filter(|d| matches_filter(d, &filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> Result<()> {
        let mut state = self.server.state.lock().unwrap();
        if let Some(collections) = state.databases.get_mut(database) {
            collections.remove(collection);
        }
        Ok(())
    }

    async fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let panics = self
            .server
            .state
            .lock()
            .unwrap()
            .panicking_fetches
            .contains(collection);
        if panics {
            panic!("cursor for {}.{} blew up", database, collection);
        }
        Ok(self.server.documents(database, collection))
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: FindQuery,
    ) -> Result<Vec<Document>> {
        let mut state = self.server.state.lock().unwrap();
        state.last_find = Some(query.clone());
        let Some(found) = state.collection(database, collection) else {
            return Ok(Vec::new());
        };
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(found
            .documents
            .iter()
            .filter(|d| matches_filter(d, &query.filter))
            .skip(query.skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        let state = self.server.state.lock().unwrap();
        Ok(state
            .collection(database, collection)
            .and_then(|c| c.documents.iter().find(|d| matches_filter(d, &filter)).cloned()))
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        mut document: Document,
    ) -> Result<Bson> {
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };
        let mut state = self.server.state.lock().unwrap();
        state.collection_mut(database, collection).documents.push(document);
        Ok(id)
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64> {
        let mut state = self.server.state.lock().unwrap();
        if state.failing_inserts.contains(collection) {
            return Err(ClonerError::Database(format!(
                "insert into {}.{} rejected",
                database, collection
            )));
        }
        let inserted = documents.len();
        state.insert_batches.push(inserted);
        state
            .collection_mut(database, collection)
            .documents
            .extend(documents);
        Ok(inserted as u64)
    }

    async fn update_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        let mut state = self.server.state.lock().unwrap();
        let target = state.collection_mut(database, collection);
        let Some(document) = target.documents.iter_mut().find(|d| matches_filter(d, &filter)) else {
            return Ok(0);
        };
        if let Ok(set) = update.get_document("$set") {
            for (key, value) in set {
                document.insert(key.clone(), value.clone());
            }
        }
        if let Ok(unset) = update.get_document("$unset") {
            for key in unset.keys() {
                document.remove(key);
            }
        }
        Ok(1)
    }

    async fn delete_one(&self, database: &str, collection: &str, filter: Document) -> Result<u64> {
        let mut state = self.server.state.lock().unwrap();
        let target = state.collection_mut(database, collection);
        match target.documents.iter().position(|d| matches_filter(d, &filter)) {
            Some(position) => {
                target.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn list_indexes(&self, database: &str, collection: &str) -> Result<Vec<IndexSpec>> {
        let state = self.server.state.lock().unwrap();
        match state.collection(database, collection) {
            Some(found) if found.collection_type == "view" => Err(ClonerError::Database(format!(
                "Namespace {}.{} is a view, not a collection",
                database, collection
            ))),
            Some(found) => Ok(found.indexes.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<()> {
        let mut state = self.server.state.lock().unwrap();
        if state.failing_indexes.contains(&index.name) {
            return Err(ClonerError::Database(format!(
                "Index build failed for {}",
                index.name
            )));
        }
        state
            .collection_mut(database, collection)
            .indexes
            .push(index.clone());
        Ok(())
    }

    async fn close(&self) {
        self.server.closed.fetch_add(1, Ordering::SeqCst);
    }
}
