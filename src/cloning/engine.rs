// ABOUTME: Clone engine that copies documents and indexes collection by collection
// ABOUTME: Runs detached from the caller and reports progress only through its job handle

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bson::Document;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::request::CloneRequest;
use crate::error::Result;
use crate::jobs::{JobHandle, JobStarted, JobStatus, JobTracker};
use crate::store::{Connector, DocumentStore};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

const VIEW_TYPE: &str = "view";
const SYSTEM_PREFIX: &str = "system.";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CloneTotals {
    collections: usize,
    documents: u64,
}

#[derive(Clone)]
pub struct CloneEngine {
    connector: Arc<dyn Connector>,
    batch_size: usize,
}

impl CloneEngine {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Validates the request, registers a job and starts cloning in the background.
    ///
    /// Only an invalid request makes this fail; everything that goes wrong
    /// afterwards is reported through the job's status.
    pub fn launch(&self, tracker: &JobTracker, request: CloneRequest) -> Result<JobStarted> {
        request.validate()?;

        let handle = tracker.create();
        let started = JobStarted::new(handle.id());
        info!(
            "Starting clone job {} for database '{}': {} -> {}",
            handle.id(),
            request.database,
            request.source.redacted(),
            request.target.redacted()
        );

        drop(self.spawn(handle, request));
        Ok(started)
    }

    /// Runs the clone on its own task. A panic inside the run fails the job.
    pub fn spawn(&self, handle: JobHandle, request: CloneRequest) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(engine.run(handle.clone(), request))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                engine.abort(&handle, "Clone task panicked");
            }
        })
    }

    pub async fn run(&self, handle: JobHandle, request: CloneRequest) {
        handle.transition(
            JobStatus::Connecting,
            "Connecting to source and target databases",
        );

        let source = match self.connector.connect(&request.source).await {
            Ok(store) => store,
            Err(e) => {
                self.abort(&handle, &e.to_string());
                return;
            }
        };
        let target = match self.connector.connect(&request.target).await {
            Ok(store) => store,
            Err(e) => {
                source.close().await;
                self.abort(&handle, &e.to_string());
                return;
            }
        };

        let outcome = self
            .clone_database(&handle, source.as_ref(), target.as_ref(), &request.database)
            .await;

        source.close().await;
        target.close().await;

        match outcome {
            Ok(totals) => {
                info!(
                    "Clone job {} completed: {} collections, {} documents",
                    handle.id(),
                    totals.collections,
                    totals.documents
                );
                handle.complete(format!(
                    "Successfully cloned {} collections with {} documents",
                    totals.collections, totals.documents
                ));
            }
            Err(e) => self.abort(&handle, &e.to_string()),
        }
    }

    fn abort(&self, handle: &JobHandle, message: &str) {
        error!("Clone job {} failed: {}", handle.id(), message);
        handle.fail(message);
    }

    async fn clone_database(
        &self,
        handle: &JobHandle,
        source: &dyn DocumentStore,
        target: &dyn DocumentStore,
        database: &str,
    ) -> Result<CloneTotals> {
        handle.transition(
            JobStatus::Analyzing,
            format!("Analyzing database '{}'", database),
        );

        let mut collections = Vec::new();
        for info in source.list_collections(database).await? {
            if info.collection_type == VIEW_TYPE {
                let note = format!("Skipped view '{}': views are not cloned", info.name);
                warn!("{}", note);
                handle.record_error(note);
            } else if info.name.starts_with(SYSTEM_PREFIX) {
                let note = format!(
                    "Skipped system collection '{}': it is managed by the server",
                    info.name
                );
                warn!("{}", note);
                handle.record_error(note);
            } else {
                collections.push(info.name);
            }
        }

        let mut total_documents = 0;
        for collection in &collections {
            total_documents += source
                .count_documents(database, collection, Document::new())
                .await?;
        }
        info!(
            "Found {} collections with {} documents in '{}'",
            collections.len(),
            total_documents,
            database
        );
        handle.set_analysis(collections.clone(), total_documents);

        handle.transition(
            JobStatus::Cloning,
            format!(
                "Cloning {} collections ({} documents)",
                collections.len(),
                total_documents
            ),
        );

        let mut totals = CloneTotals::default();
        for (position, collection) in collections.iter().enumerate() {
            handle.begin_collection(
                collection,
                format!(
                    "Cloning collection '{}' ({}/{})",
                    collection,
                    position + 1,
                    collections.len()
                ),
            );

            totals.documents += self
                .clone_collection(handle, source, target, database, collection)
                .await?;
            totals.collections += 1;
            handle.finish_collection();
        }

        Ok(totals)
    }

    async fn clone_collection(
        &self,
        handle: &JobHandle,
        source: &dyn DocumentStore,
        target: &dyn DocumentStore,
        database: &str,
        collection: &str,
    ) -> Result<u64> {
        target.drop_collection(database, collection).await?;

        let documents = source.fetch_all(database, collection).await?;
        let mut copied = 0;
        let mut remaining = documents.into_iter();
        loop {
            let batch: Vec<Document> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len() as u64;
            target.insert_many(database, collection, batch).await?;
            copied += batch_len;
            handle.add_processed_documents(batch_len);
        }
        info!("Copied {} documents into '{}'", copied, collection);

        for index in source.list_indexes(database, collection).await? {
            if index.is_primary() {
                continue;
            }
            if let Err(e) = target.create_index(database, collection, &index).await {
                let message = format!(
                    "Failed to create index {} on {}: {}",
                    index.name, collection, e
                );
                warn!("{}", message);
                handle.record_error(message);
            }
        }

        Ok(copied)
    }
}
