// ABOUTME: Library root for the MongoDB cloner
// ABOUTME: Exposes the job tracker, clone engine, schema inference and document browser

pub mod browser;
pub mod cloning;
pub mod config;
pub mod error;
pub mod jobs;
pub mod schema;
pub mod store;

pub use browser::DocumentBrowser;
pub use cloning::{CloneEngine, CloneRequest};
pub use error::{ClonerError, Result};
pub use jobs::{CloneJob, JobStatus, JobTracker};
pub use schema::{infer, SchemaSummary};
