//! Unbounded FIFO of admitted jobs with a single consumer.

use crate::error::{Result, VoicoverError};
use crate::pipeline::types::Job;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Producer side, shared by every request handler.
pub struct JobQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    depth: Arc<AtomicUsize>,
    consumer: Mutex<Option<JobConsumer>>,
}

/// Consumer side. There is exactly one, owned by the worker.
pub struct JobConsumer {
    rx: mpsc::UnboundedReceiver<Job>,
    depth: Arc<AtomicUsize>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        Self {
            tx: Mutex::new(Some(tx)),
            depth: Arc::clone(&depth),
            consumer: Mutex::new(Some(JobConsumer { rx, depth })),
        }
    }

    /// Appends `job` without blocking and returns its 1-based position.
    pub fn enqueue(&self, job: Job) -> Result<usize> {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = tx.as_ref().ok_or(VoicoverError::QueueClosed)?;

        let position = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        if tx.send(job).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(VoicoverError::QueueClosed);
        }
        Ok(position)
    }

    /// Jobs waiting to be dequeued. A snapshot; may be stale immediately.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Hands out the consumer. Returns `None` after the first call.
    pub fn take_consumer(&self) -> Option<JobConsumer> {
        self.consumer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Stops accepting jobs. Already queued jobs can still be dequeued.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobConsumer {
    /// Waits for the next job; `None` once the queue is closed and drained.
    pub async fn dequeue(&mut self) -> Option<Job> {
        let job = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }

    pub fn is_empty(&self) -> bool {
        self.depth.load(Ordering::SeqCst) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{ChannelId, GuildId, JobId, JobStatus, ModelRef, RequesterId};
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn job(id: u64) -> Job {
        Job {
            id: JobId(id),
            created_at: SystemTime::now(),
            requester: RequesterId("r".to_string()),
            guild: GuildId(1),
            channel: ChannelId(1),
            source_url: format!("song-{}", id),
            model: ModelRef {
                name: "m".to_string(),
                path: PathBuf::from("m.pth"),
            },
            pitch_shift: 0,
            status: JobStatus::Queued,
        }
    }

    #[tokio::test]
    async fn dequeues_in_submission_order() {
        let queue = JobQueue::new();
        let mut consumer = queue.take_consumer().unwrap();

        for id in 1..=3 {
            assert_eq!(queue.enqueue(job(id)).unwrap(), id as usize);
        }
        assert_eq!(queue.depth(), 3);

        for id in 1..=3 {
            assert_eq!(consumer.dequeue().await.unwrap().id, JobId(id));
        }
        assert_eq!(queue.depth(), 0);
        assert!(consumer.is_empty());
    }

    #[test]
    fn consumer_can_be_taken_once() {
        let queue = JobQueue::new();
        assert!(queue.take_consumer().is_some());
        assert!(queue.take_consumer().is_none());
    }

    #[tokio::test]
    async fn close_rejects_new_jobs_and_drains_old_ones() {
        let queue = JobQueue::new();
        let mut consumer = queue.take_consumer().unwrap();
        queue.enqueue(job(1)).unwrap();

        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(queue.enqueue(job(2)), Err(VoicoverError::QueueClosed)));
        assert_eq!(consumer.dequeue().await.unwrap().id, JobId(1));
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_enqueue_keeps_every_job() {
        let queue = Arc::new(JobQueue::new());
        let mut consumer = queue.take_consumer().unwrap();

        let mut handles = Vec::new();
        for id in 1..=50 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move { queue.enqueue(job(id)).unwrap() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        queue.close();

        let mut seen = Vec::new();
        while let Some(job) = consumer.dequeue().await {
            seen.push(job.id.0);
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<_>>());
    }
}
