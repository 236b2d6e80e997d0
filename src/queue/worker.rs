//! The single job worker.
//!
//! Takes jobs off the queue one at a time, renders them, plays the result on
//! the guild's voice session and waits for playback to end before moving on.
//! A failing job is reported and dropped; it never stops the loop.

use crate::audio::track::AudioTrack;
use crate::engine::voice::{FinishedCallback, SessionHandle, VoiceProvider};
use crate::pipeline::error::StageError;
use crate::pipeline::notify::{JobEvent, Notifier};
use crate::pipeline::stages::PipelineStages;
use crate::pipeline::types::{Job, JobStatus, Stage};
use crate::queue::fifo::JobConsumer;
use crate::queue::registry::JobRegistry;
use crate::queue::session::SessionTable;
use crate::queue::sync::{PlaybackOutcome, PlaybackSynchronizer};
use std::sync::Arc;
use std::time::Duration;

/// Runs one job end to end: session, stages, playback, final status.
pub struct JobExecutor {
    pub stages: Arc<PipelineStages>,
    pub voice: Arc<dyn VoiceProvider>,
    pub sessions: Arc<SessionTable>,
    pub registry: Arc<JobRegistry>,
    pub notifier: Arc<dyn Notifier>,
}

/// The queue's only consumer.
pub struct JobWorker {
    consumer: JobConsumer,
    executor: JobExecutor,
    idle_disconnect: Duration,
}

impl JobWorker {
    pub fn new(consumer: JobConsumer, executor: JobExecutor, idle_disconnect: Duration) -> Self {
        Self {
            consumer,
            executor,
            idle_disconnect,
        }
    }

    /// Runs until the queue is closed and drained, then releases every session.
    pub async fn run(mut self) {
        tracing::info!("job worker started");
        let mut next = self.consumer.dequeue().await;

        while let Some(job) = next {
            self.executor.process(job).await;
            next = if self.consumer.is_empty() {
                self.wait_idle().await
            } else {
                self.consumer.dequeue().await
            };
        }

        self.executor.release_idle_sessions().await;
        tracing::info!("job worker stopped");
    }

    /// Waits for the next job, releasing idle sessions if none arrives within
    /// the grace period.
    async fn wait_idle(&mut self) -> Option<Job> {
        let arrived = tokio::select! {
            job = self.consumer.dequeue() => Some(job),
            _ = tokio::time::sleep(self.idle_disconnect) => None,
        };

        match arrived {
            Some(job) => job,
            None => {
                self.executor.release_idle_sessions().await;
                self.consumer.dequeue().await
            }
        }
    }
}

impl JobExecutor {
    /// Disconnects every connected session with nothing playing.
    pub async fn release_idle_sessions(&self) {
        for (guild, handle) in self.sessions.idle() {
            tracing::info!(%guild, "releasing idle voice session");
            self.voice.disconnect(&handle).await;
            self.sessions.remove(guild);
        }
    }

    pub async fn process(&self, mut job: Job) {
        tracing::info!(job = %job.id, guild = %job.guild, model = %job.model.name, "job started");
        self.set_status(&mut job, JobStatus::Fetching);

        let handle = match self.acquire_session(&job).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(&mut job, e);
                return;
            }
        };

        let registry = &self.registry;
        let notifier = &self.notifier;
        let (id, requester) = (job.id, job.requester.clone());
        let rendered = self
            .stages
            .render(&job, |stage: Stage| {
                tracing::info!(job = %id, stage = stage.name(), "stage started");
                registry.set_status(id, stage.status());
                notifier.notify(&requester, &JobEvent::StageStarted { job: id, stage });
            })
            .await;

        let track = match rendered {
            Ok(track) => track,
            Err(e) => {
                self.fail(&mut job, e);
                return;
            }
        };

        match self.play(&mut job, handle, track).await {
            Ok(PlaybackOutcome::Finished) => self.done(&mut job, false),
            Ok(PlaybackOutcome::Skipped) => self.done(&mut job, true),
            Ok(PlaybackOutcome::Failed(reason)) => self.fail(&mut job, StageError::Playback(reason)),
            Err(e) => self.fail(&mut job, e),
        }
    }

    /// Connect if absent, move if on another channel, reuse otherwise.
    async fn acquire_session(&self, job: &Job) -> Result<SessionHandle, StageError> {
        match self.sessions.get(job.guild) {
            Some(session) if session.channel == job.channel => Ok(session.handle),
            Some(session) => {
                tracing::debug!(guild = %job.guild, from = %session.channel, to = %job.channel, "moving voice session");
                self.voice.move_to(&session.handle, job.channel).await?;
                self.sessions.moved(job.guild, job.channel);
                Ok(session.handle)
            }
            None => {
                tracing::debug!(guild = %job.guild, channel = %job.channel, "connecting voice session");
                let handle = self.voice.connect(job.guild, job.channel).await?;
                self.sessions.connected(job.guild, handle, job.channel);
                Ok(handle)
            }
        }
    }

    async fn play(
        &self,
        job: &mut Job,
        handle: SessionHandle,
        track: AudioTrack,
    ) -> Result<PlaybackOutcome, StageError> {
        if self.voice.is_playing(&handle) {
            tracing::warn!(guild = %job.guild, "stopping playback still active on session");
            self.voice.stop(&handle);
        }

        let (sync, signal) = PlaybackSynchronizer::new();
        if !self
            .sessions
            .begin_playback(job.guild, job.id, signal.skip_handle())
        {
            return Err(StageError::Playback(format!(
                "guild {} already has a playback in flight",
                job.guild
            )));
        }

        let on_finished: FinishedCallback = Box::new(move |error| {
            signal.signal(match error {
                None => PlaybackOutcome::Finished,
                Some(reason) => PlaybackOutcome::Failed(reason),
            });
        });

        let duration_ms = track.duration_ms();
        if let Err(e) = self.voice.play(&handle, track, on_finished).await {
            self.sessions.end_playback(job.guild);
            return Err(e);
        }
        tracing::info!(job = %job.id, duration_ms, "playback started");
        self.set_status(job, JobStatus::Playing);

        let outcome = sync.wait().await;
        self.sessions.end_playback(job.guild);
        Ok(outcome)
    }

    fn set_status(&self, job: &mut Job, status: JobStatus) {
        job.status = status;
        self.registry.set_status(job.id, status);
        if status == JobStatus::Playing {
            self.notifier
                .notify(&job.requester, &JobEvent::Playing { job: job.id });
        }
    }

    fn done(&self, job: &mut Job, skipped: bool) {
        job.status = JobStatus::Done;
        self.registry.mark_done(job.id, skipped);
        tracing::info!(job = %job.id, skipped, "job done");
        self.notifier
            .notify(&job.requester, &JobEvent::Done { job: job.id, skipped });
    }

    fn fail(&self, job: &mut Job, error: StageError) {
        job.status = JobStatus::Failed;
        self.registry.mark_failed(job.id, &error);
        tracing::warn!(job = %job.id, kind = %error.kind(), "job failed: {}", error);
        self.notifier.notify(
            &job.requester,
            &JobEvent::Failed {
                job: job.id,
                kind: error.kind(),
                message: error.to_string(),
            },
        );
    }
}
