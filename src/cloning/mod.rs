// ABOUTME: Database cloning module
// ABOUTME: Mirrors every collection of one database from a source server onto a target server

pub mod engine;
pub mod request;

pub use engine::{CloneEngine, DEFAULT_BATCH_SIZE};
pub use request::CloneRequest;
