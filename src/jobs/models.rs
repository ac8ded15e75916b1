// ABOUTME: Data structures for clone jobs and their status
// ABOUTME: These are serialized to JSON (camelCase, RFC 3339 timestamps) for status polling

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Starting,
    Connecting,
    Analyzing,
    Cloning,
    Completed,
    Failed,
}

impl JobStatus {
    /// Position in the lifecycle; a job's rank never decreases.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Starting => 0,
            JobStatus::Connecting => 1,
            JobStatus::Analyzing => 2,
            JobStatus::Cloning => 3,
            JobStatus::Completed | JobStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Starting => "starting",
            JobStatus::Connecting => "connecting",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Cloning => "cloning",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneJob {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub details: String,
    pub collections: Vec<String>,
    pub current_collection: Option<String>,
    pub total_collections: usize,
    pub processed_collections: usize,
    pub total_documents: u64,
    pub processed_documents: u64,
    pub errors: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CloneJob {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Starting,
            progress: 0,
            details: "Initializing clone operation".to_string(),
            collections: Vec::new(),
            current_collection: None,
            total_collections: 0,
            processed_collections: 0,
            total_documents: 0,
            processed_documents: 0,
            errors: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

/// Percentage of documents copied, rounded; an empty source counts as done.
pub fn compute_progress(processed_documents: u64, total_documents: u64) -> u8 {
    if total_documents == 0 {
        return 100;
    }
    let percent = (processed_documents as f64 / total_documents as f64 * 100.0).round();
    percent.min(100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStarted {
    pub job_id: String,
    pub started: bool,
}

impl JobStarted {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            started: true,
        }
    }
}
