//! Status of every known job, readable from any task.
//!
//! Finished jobs stay queryable until `retention` newer jobs have finished.

use crate::pipeline::error::{ErrorKind, StageError};
use crate::pipeline::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Point-in-time view of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug)]
struct Inner {
    jobs: HashMap<JobId, JobSnapshot>,
    finished: VecDeque<JobId>,
    retention: usize,
}

#[derive(Debug)]
pub struct JobRegistry {
    inner: Mutex<Inner>,
}

impl JobRegistry {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                finished: VecDeque::new(),
                retention: retention.max(1),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, id: JobId) {
        self.lock().jobs.insert(
            id,
            JobSnapshot {
                id,
                status: JobStatus::Queued,
                error: None,
                message: None,
                skipped: false,
            },
        );
    }

    /// Removes a job that never made it into the queue.
    pub fn forget(&self, id: JobId) {
        self.lock().jobs.remove(&id);
    }

    pub fn set_status(&self, id: JobId, status: JobStatus) {
        if let Some(job) = self.lock().jobs.get_mut(&id) {
            job.status = status;
        }
    }

    pub fn mark_done(&self, id: JobId, skipped: bool) {
        self.finish(id, |job| {
            job.status = JobStatus::Done;
            job.skipped = skipped;
        });
    }

    pub fn mark_failed(&self, id: JobId, error: &StageError) {
        self.finish(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error.kind());
            job.message = Some(error.to_string());
        });
    }

    fn finish(&self, id: JobId, update: impl FnOnce(&mut JobSnapshot)) {
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get_mut(&id) else {
            return;
        };
        update(job);
        inner.finished.push_back(id);
        while inner.finished.len() > inner.retention {
            if let Some(old) = inner.finished.pop_front() {
                inner.jobs.remove(&old);
            }
        }
    }

    pub fn get(&self, id: JobId) -> Option<JobSnapshot> {
        self.lock().jobs.get(&id).cloned()
    }

    /// Jobs not yet finished, oldest first.
    pub fn active(&self) -> Vec<JobSnapshot> {
        let mut active: Vec<JobSnapshot> = self
            .lock()
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|job| job.id);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_lifecycle() {
        let registry = JobRegistry::new(8);
        registry.insert(JobId(1));
        assert_eq!(registry.get(JobId(1)).unwrap().status, JobStatus::Queued);

        registry.set_status(JobId(1), JobStatus::Converting);
        assert_eq!(registry.get(JobId(1)).unwrap().status, JobStatus::Converting);

        registry.mark_done(JobId(1), true);
        let job = registry.get(JobId(1)).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.skipped);
        assert!(job.error.is_none());
    }

    #[test]
    fn failure_records_kind_and_message() {
        let registry = JobRegistry::new(8);
        registry.insert(JobId(2));
        registry.mark_failed(JobId(2), &StageError::Separation("oom".to_string()));

        let job = registry.get(JobId(2)).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error, Some(ErrorKind::SeparationError));
        assert_eq!(job.message.as_deref(), Some("source separation failed: oom"));
    }

    #[test]
    fn old_finished_jobs_are_evicted() {
        let registry = JobRegistry::new(2);
        for id in 1..=3 {
            registry.insert(JobId(id));
            registry.mark_done(JobId(id), false);
        }
        registry.insert(JobId(4));

        assert!(registry.get(JobId(1)).is_none());
        assert!(registry.get(JobId(2)).is_some());
        assert!(registry.get(JobId(3)).is_some());
        assert_eq!(registry.get(JobId(4)).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn active_lists_unfinished_jobs_in_order() {
        let registry = JobRegistry::new(8);
        for id in [3, 1, 2] {
            registry.insert(JobId(id));
        }
        registry.mark_done(JobId(2), false);

        let ids: Vec<JobId> = registry.active().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![JobId(1), JobId(3)]);
    }

    #[test]
    fn unknown_job_updates_are_ignored() {
        let registry = JobRegistry::new(8);
        registry.set_status(JobId(9), JobStatus::Playing);
        registry.mark_done(JobId(9), false);
        assert!(registry.get(JobId(9)).is_none());
    }
}
