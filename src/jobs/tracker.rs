// ABOUTME: In-process registry of clone jobs keyed by job id
// ABOUTME: Supports concurrent creation, polling, listing and deletion; state is lost on restart

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::models::{compute_progress, CloneJob, JobStatus};
use crate::error::{ClonerError, Result};

type JobMap = Arc<RwLock<HashMap<String, CloneJob>>>;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_job_id() -> String {
    let sequence = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("clone_{}_{}", Utc::now().timestamp_millis(), sequence)
}

#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: JobMap,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CloneJob>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a fresh job in `starting` state and returns its write handle.
    pub fn create(&self) -> JobHandle {
        let id = next_job_id();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), CloneJob::new(id.clone()));
        debug!("Created clone job {}", id);

        JobHandle {
            id,
            jobs: Arc::clone(&self.jobs),
        }
    }

    pub fn get(&self, job_id: &str) -> Result<CloneJob> {
        self.read()
            .get(job_id)
            .cloned()
            .ok_or_else(|| ClonerError::NotFound(format!("Job {}", job_id)))
    }

    /// All known jobs, oldest first.
    pub fn list(&self) -> Vec<CloneJob> {
        let mut jobs: Vec<CloneJob> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Removes a job record. A running clone is not cancelled; its later writes are dropped.
    pub fn delete(&self, job_id: &str) -> bool {
        let removed = self
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id)
            .is_some();
        if removed {
            debug!("Deleted clone job {}", job_id);
        }
        removed
    }

    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        interval: Duration,
        callback: impl Fn(&CloneJob),
    ) -> Result<CloneJob> {
        loop {
            let job = self.get(job_id)?;
            callback(&job);

            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Write capability for exactly one job entry.
///
/// Every mutation is a no-op once the entry has been deleted from the
/// tracker or has reached a terminal status.
#[derive(Clone)]
pub struct JobHandle {
    id: String,
    jobs: JobMap,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> Option<CloneJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.id)
            .cloned()
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CloneJob>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` to the live entry. Returns false if the entry is gone or terminal.
    pub fn update(&self, f: impl FnOnce(&mut CloneJob)) -> bool {
        let mut jobs = self.write();
        match jobs.get_mut(&self.id) {
            Some(job) if !job.status.is_terminal() => {
                f(job);
                true
            }
            _ => false,
        }
    }

    pub fn transition(&self, status: JobStatus, details: impl Into<String>) -> bool {
        let details = details.into();
        let mut jobs = self.write();
        let Some(job) = jobs.get_mut(&self.id) else {
            return false;
        };
        if job.status.is_terminal() || status.rank() < job.status.rank() {
            warn!(
                "Refusing transition of job {} from {} to {}",
                self.id, job.status, status
            );
            return false;
        }

        job.status = status;
        job.details = details;
        match status {
            JobStatus::Cloning => {
                job.progress = compute_progress(job.processed_documents, job.total_documents);
            }
            JobStatus::Completed => {
                job.progress = 100;
                job.current_collection = None;
                job.end_time = Some(Utc::now());
            }
            JobStatus::Failed => {
                job.current_collection = None;
                job.end_time = Some(Utc::now());
            }
            _ => {}
        }
        true
    }

    pub fn set_analysis(&self, collections: Vec<String>, total_documents: u64) -> bool {
        self.update(|job| {
            job.total_collections = collections.len();
            job.collections = collections;
            job.total_documents = total_documents;
        })
    }

    pub fn begin_collection(&self, name: &str, details: impl Into<String>) -> bool {
        let details = details.into();
        self.update(|job| {
            job.current_collection = Some(name.to_string());
            job.details = details;
        })
    }

    pub fn add_processed_documents(&self, count: u64) -> bool {
        self.update(|job| {
            job.processed_documents += count;
            job.progress = compute_progress(job.processed_documents, job.total_documents);
        })
    }

    pub fn finish_collection(&self) -> bool {
        self.update(|job| job.processed_collections += 1)
    }

    pub fn record_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|job| job.errors.push(message))
    }

    pub fn complete(&self, details: impl Into<String>) -> bool {
        self.transition(JobStatus::Completed, details)
    }

    /// Appends the fatal error and moves the job to `failed`.
    pub fn fail(&self, error: impl Into<String>) -> bool {
        let error = error.into();
        self.record_error(error.clone()) && self.transition(JobStatus::Failed, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_initial_state() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        let job = tracker.get(handle.id()).unwrap();

        assert_eq!(job.status, JobStatus::Starting);
        assert_eq!(job.progress, 0);
        assert!(job.errors.is_empty());
        assert!(job.collections.is_empty());
        assert_eq!(job.processed_documents, 0);
        assert!(job.end_time.is_none());
        assert!(job.start_time <= Utc::now());
    }

    #[test]
    fn test_ids_are_unique() {
        let tracker = JobTracker::new();
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| tracker.create().id().to_string()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let tracker = JobTracker::new();
        assert!(matches!(
            tracker.get("clone_0_missing"),
            Err(ClonerError::NotFound(_))
        ));
        assert!(!tracker.delete("clone_0_missing"));
    }

    #[test]
    fn test_list_includes_terminal_jobs_until_deleted() {
        let tracker = JobTracker::new();
        let first = tracker.create();
        let second = tracker.create();
        assert!(first.fail("boom"));

        let listed = tracker.list();
        assert_eq!(listed.len(), 2);
        let failed = listed.iter().find(|job| job.id == first.id()).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);

        assert!(tracker.delete(second.id()));
        assert_eq!(tracker.list().len(), 1);
    }

    #[test]
    fn test_transitions_never_go_backwards() {
        let tracker = JobTracker::new();
        let handle = tracker.create();

        assert!(handle.transition(JobStatus::Connecting, "Connecting"));
        assert!(handle.transition(JobStatus::Analyzing, "Analyzing"));
        assert!(!handle.transition(JobStatus::Connecting, "Back again"));
        assert_eq!(tracker.get(handle.id()).unwrap().status, JobStatus::Analyzing);
    }

    #[test]
    fn test_terminal_job_is_frozen() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        assert!(handle.complete("done"));

        assert!(!handle.fail("late failure"));
        assert!(!handle.record_error("late error"));
        assert!(!handle.add_processed_documents(10));

        let job = tracker.get(handle.id()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.errors.is_empty());
        assert!(job.end_time.is_some());
    }

    #[test]
    fn test_progress_follows_processed_documents() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        handle.set_analysis(vec!["a".to_string(), "b".to_string()], 3);
        handle.transition(JobStatus::Cloning, "Cloning");

        handle.add_processed_documents(1);
        assert_eq!(tracker.get(handle.id()).unwrap().progress, 33);
        handle.add_processed_documents(2);
        let job = tracker.get(handle.id()).unwrap();
        assert_eq!(job.progress, 100);
        assert_eq!(job.total_collections, 2);
    }

    #[test]
    fn test_cloning_empty_source_reports_full_progress() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        handle.set_analysis(Vec::new(), 0);
        handle.transition(JobStatus::Cloning, "Cloning");
        assert_eq!(tracker.get(handle.id()).unwrap().progress, 100);
    }

    #[test]
    fn test_writes_after_delete_are_noops() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        assert!(tracker.delete(handle.id()));

        assert!(!handle.transition(JobStatus::Connecting, "Connecting"));
        assert!(!handle.record_error("ignored"));
        assert!(handle.snapshot().is_none());
        assert!(tracker.list().is_empty());
    }

    #[test]
    fn test_fail_records_error_and_details() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        handle.transition(JobStatus::Connecting, "Connecting");
        assert!(handle.fail("Connection error: refused"));

        let job = tracker.get(handle.id()).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors, vec!["Connection error: refused".to_string()]);
        assert_eq!(job.details, "Connection error: refused");
        assert!(job.end_time.is_some());
    }

    #[tokio::test]
    async fn test_wait_for_completion_polls_until_terminal() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        let writer = handle.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.complete("done");
        });

        let polls = std::sync::atomic::AtomicUsize::new(0);
        let job = tracker
            .wait_for_completion(handle.id(), Duration::from_millis(5), |_| {
                polls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(polls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_wait_for_deleted_job_is_not_found() {
        let tracker = JobTracker::new();
        let handle = tracker.create();
        tracker.delete(handle.id());

        let result = tracker
            .wait_for_completion(handle.id(), Duration::from_millis(5), |_| {})
            .await;
        assert!(matches!(result, Err(ClonerError::NotFound(_))));
    }
}
