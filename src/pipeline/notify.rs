//! Progress reports delivered to whoever submitted a job.

use crate::pipeline::error::ErrorKind;
use crate::pipeline::types::{JobId, RequesterId, Stage};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Queued { job: JobId, position: usize },
    StageStarted { job: JobId, stage: Stage },
    Playing { job: JobId },
    Done { job: JobId, skipped: bool },
    Failed { job: JobId, kind: ErrorKind, message: String },
}

impl JobEvent {
    pub fn job(&self) -> JobId {
        match self {
            JobEvent::Queued { job, .. }
            | JobEvent::StageStarted { job, .. }
            | JobEvent::Playing { job }
            | JobEvent::Done { job, .. }
            | JobEvent::Failed { job, .. } => *job,
        }
    }
}

/// Trait for delivering job events to requesters.
///
/// Called from the worker; implementations must not block for long.
pub trait Notifier: Send + Sync {
    fn notify(&self, requester: &RequesterId, event: &JobEvent);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, requester: &RequesterId, event: &JobEvent) {
        match event {
            JobEvent::Failed { job, kind, message } => {
                tracing::warn!(%requester, %job, %kind, "job failed: {}", message);
            }
            other => tracing::info!(%requester, job = %other.job(), ?other, "job update"),
        }
    }
}

/// Keeps every event, for tests.
#[derive(Debug, Default)]
pub struct CollectorNotifier {
    events: Mutex<Vec<(RequesterId, JobEvent)>>,
}

impl CollectorNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(RequesterId, JobEvent)> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Events for one job, in delivery order.
    pub fn events_for(&self, job: JobId) -> Vec<JobEvent> {
        self.events()
            .into_iter()
            .map(|(_, event)| event)
            .filter(|event| event.job() == job)
            .collect()
    }
}

impl Notifier for CollectorNotifier {
    fn notify(&self, requester: &RequesterId, event: &JobEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((requester.clone(), event.clone()));
    }
}
