//! Public entry point: submit jobs, query them, skip playback.
//!
//! [`CoverService::start`] spawns the single worker on the current Tokio
//! runtime; every other method is safe to call concurrently from any task.

use crate::config::Config;
use crate::defaults::MAX_PITCH_SHIFT;
use crate::engine::accelerator::{Accelerator, NoopAccelerator};
use crate::engine::converter::{CommandConverter, VoiceConverter};
use crate::engine::fetcher::{MediaFetcher, SourceFetcher, check_source};
use crate::engine::separator::{CommandSeparator, Separator};
use crate::engine::voice::{DirectoryVoiceProvider, VoiceProvider};
use crate::error::{Result, VoicoverError};
use crate::models::ModelRegistry;
use crate::pipeline::notify::{JobEvent, LogNotifier, Notifier};
use crate::pipeline::stages::PipelineStages;
use crate::pipeline::types::{GuildId, Job, JobId, JobRequest, JobStatus};
use crate::queue::fifo::JobQueue;
use crate::queue::registry::{JobRegistry, JobSnapshot};
use crate::queue::session::SessionTable;
use crate::queue::worker::{JobExecutor, JobWorker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::task::JoinHandle;

/// The collaborators a service drives.
pub struct Capabilities {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub separator: Arc<dyn Separator>,
    pub converter: Arc<dyn VoiceConverter>,
    pub accelerator: Arc<dyn Accelerator>,
    pub voice: Arc<dyn VoiceProvider>,
    pub notifier: Arc<dyn Notifier>,
}

impl Capabilities {
    /// Command-backed engines and a voice provider exporting to `output.dir`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetcher: Arc::new(SourceFetcher::new(config.fetch.clone())),
            separator: Arc::new(CommandSeparator::new(config.separate.clone())),
            converter: Arc::new(CommandConverter::new(config.convert.clone())),
            accelerator: Arc::new(NoopAccelerator),
            voice: Arc::new(DirectoryVoiceProvider::new(config.output.dir.clone())),
            notifier: Arc::new(LogNotifier),
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub job: JobId,
    /// 1-based position in the queue at admission time.
    pub position: usize,
}

pub struct CoverService {
    queue: JobQueue,
    registry: Arc<JobRegistry>,
    sessions: Arc<SessionTable>,
    voice: Arc<dyn VoiceProvider>,
    notifier: Arc<dyn Notifier>,
    models: ModelRegistry,
    next_id: AtomicU64,
    /// Keeps id order and queue order identical under concurrent submits.
    admission: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CoverService {
    /// Validates `config`, builds the pipeline and spawns the worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &Config, models: ModelRegistry, caps: Capabilities) -> Result<Self> {
        config.validate()?;

        let stages = PipelineStages::new(
            caps.fetcher,
            caps.separator,
            caps.converter,
            caps.accelerator,
            config,
        )?;
        let queue = JobQueue::new();
        let consumer = queue.take_consumer().ok_or(VoicoverError::QueueClosed)?;
        let registry = Arc::new(JobRegistry::new(config.queue.status_retention));
        let sessions = Arc::new(SessionTable::new());

        let executor = JobExecutor {
            stages: Arc::new(stages),
            voice: Arc::clone(&caps.voice),
            sessions: Arc::clone(&sessions),
            registry: Arc::clone(&registry),
            notifier: Arc::clone(&caps.notifier),
        };
        let worker = JobWorker::new(consumer, executor, config.queue.idle_disconnect());
        let handle = tokio::spawn(worker.run());

        tracing::info!(models = models.len(), "cover service started");
        Ok(Self {
            queue,
            registry,
            sessions,
            voice: caps.voice,
            notifier: caps.notifier,
            models,
            next_id: AtomicU64::new(1),
            admission: Mutex::new(()),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Admits a job and returns immediately.
    ///
    /// The model is resolved here so unknown names are rejected before the
    /// job ever reaches the queue.
    pub fn submit(&self, request: JobRequest) -> Result<Submitted> {
        check_source(&request.source_url)
            .map_err(|message| VoicoverError::InvalidRequest { message })?;
        if request.pitch_shift.abs() > MAX_PITCH_SHIFT {
            return Err(VoicoverError::InvalidRequest {
                message: format!(
                    "pitch shift {} is outside ±{} semitones",
                    request.pitch_shift, MAX_PITCH_SHIFT
                ),
            });
        }
        let model = self.models.resolve(&request.model)?;

        let _admission = self.admission.lock().unwrap_or_else(|e| e.into_inner());
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let job = Job {
            id,
            created_at: SystemTime::now(),
            requester: request.requester.clone(),
            guild: request.guild,
            channel: request.channel,
            source_url: request.source_url,
            model,
            pitch_shift: request.pitch_shift,
            status: JobStatus::Queued,
        };

        self.registry.insert(id);
        let position = match self.queue.enqueue(job) {
            Ok(position) => position,
            Err(e) => {
                self.registry.forget(id);
                return Err(e);
            }
        };

        tracing::info!(job = %id, requester = %request.requester, position, "job queued");
        self.notifier
            .notify(&request.requester, &JobEvent::Queued { job: id, position });
        Ok(Submitted { job: id, position })
    }

    /// Jobs waiting to start.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn status(&self, id: JobId) -> Option<JobSnapshot> {
        self.registry.get(id)
    }

    /// Jobs queued or running, oldest first.
    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        self.registry.active()
    }

    /// Stops the guild's current playback. True if one was active.
    ///
    /// The skipped job ends as Done and the worker moves on without
    /// re-running any of its stages.
    pub fn skip(&self, guild: GuildId) -> bool {
        let skipped = self.sessions.skip(guild, |handle| self.voice.stop(handle));
        if skipped {
            tracing::info!(%guild, "playback skipped");
        }
        skipped
    }

    /// Model names matching `query`, for autocompletion.
    pub fn models(&self, query: &str) -> Vec<String> {
        self.models.autocomplete(query)
    }

    /// Stops accepting jobs and waits until every queued job has finished.
    pub async fn drain(&self) {
        self.queue.close();
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!("job worker ended abnormally: {}", e);
        }
    }

    /// Stops accepting jobs, abandons queued ones and releases every session.
    pub async fn shutdown(&self) {
        self.queue.close();
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                tracing::error!("job worker ended abnormally: {}", e);
            }
        }
        for guild in self.sessions.guilds() {
            if let Some(session) = self.sessions.remove(guild) {
                self.voice.stop(&session.handle);
                self.voice.disconnect(&session.handle).await;
            }
        }
        tracing::info!("cover service stopped");
    }
}
