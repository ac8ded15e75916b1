// ABOUTME: Clone job tracking module
// ABOUTME: Holds job records in memory and hands the engine a write handle per job

pub mod models;
pub mod tracker;

pub use models::{compute_progress, CloneJob, JobStarted, JobStatus};
pub use tracker::{JobHandle, JobTracker};
