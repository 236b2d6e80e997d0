//! Voice session capability: connect to a guild's voice channel and play a track.
//!
//! Playback completion is reported through a callback that the provider may
//! invoke from any task or thread. Stopping a playback also invokes the callback.

use crate::audio::track::AudioTrack;
use crate::audio::wav::write_wav_file;
use crate::pipeline::error::StageError;
use crate::pipeline::types::{ChannelId, GuildId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Invoked once when a playback ends; `Some(reason)` if the engine failed.
pub type FinishedCallback = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// One live voice connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub guild: GuildId,
    pub connection: u64,
}

/// Platform voice client.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<SessionHandle, StageError>;

    async fn move_to(&self, handle: &SessionHandle, channel: ChannelId) -> Result<(), StageError>;

    async fn disconnect(&self, handle: &SessionHandle);

    /// Starts playback and returns without waiting for it to end.
    async fn play(
        &self,
        handle: &SessionHandle,
        track: AudioTrack,
        on_finished: FinishedCallback,
    ) -> Result<(), StageError>;

    fn stop(&self, handle: &SessionHandle);

    fn is_playing(&self, handle: &SessionHandle) -> bool;
}

struct ExportSession {
    connection: u64,
    channel: ChannelId,
    exported: u64,
    /// Export number of the live playback and its stop switch.
    cancel: Option<(u64, oneshot::Sender<()>)>,
}

/// Voice provider that exports each cover as a WAV file under
/// `<dir>/<guild>/` and keeps the session busy for the track's duration.
pub struct DirectoryVoiceProvider {
    dir: PathBuf,
    next_connection: AtomicU64,
    sessions: Arc<Mutex<HashMap<GuildId, ExportSession>>>,
}

impl DirectoryVoiceProvider {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            next_connection: AtomicU64::new(1),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<GuildId, ExportSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Channel the guild's session is connected to, if any.
    pub fn connected_channel(&self, guild: GuildId) -> Option<ChannelId> {
        self.lock().get(&guild).map(|s| s.channel)
    }
}

#[async_trait]
impl VoiceProvider for DirectoryVoiceProvider {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<SessionHandle, StageError> {
        let guild_dir = self.dir.join(guild.to_string());
        tokio::fs::create_dir_all(&guild_dir).await.map_err(|e| {
            StageError::VoiceConnect(format!("cannot create {}: {}", guild_dir.display(), e))
        })?;

        let connection = self.next_connection.fetch_add(1, Ordering::SeqCst);
        let previous = self.lock().insert(
            guild,
            ExportSession {
                connection,
                channel,
                exported: 0,
                cancel: None,
            },
        );
        if let Some((_, cancel)) = previous.and_then(|s| s.cancel) {
            let _ = cancel.send(());
        }
        tracing::debug!(%guild, %channel, connection, "voice session connected");
        Ok(SessionHandle { guild, connection })
    }

    async fn move_to(&self, handle: &SessionHandle, channel: ChannelId) -> Result<(), StageError> {
        let mut sessions = self.lock();
        match sessions.get_mut(&handle.guild) {
            Some(session) if session.connection == handle.connection => {
                session.channel = channel;
                Ok(())
            }
            _ => Err(StageError::VoiceConnect(format!(
                "no live session for guild {}",
                handle.guild
            ))),
        }
    }

    async fn disconnect(&self, handle: &SessionHandle) {
        let mut sessions = self.lock();
        if sessions
            .get(&handle.guild)
            .is_some_and(|s| s.connection == handle.connection)
            && let Some(session) = sessions.remove(&handle.guild)
            && let Some((_, cancel)) = session.cancel
        {
            let _ = cancel.send(());
        }
    }

    async fn play(
        &self,
        handle: &SessionHandle,
        track: AudioTrack,
        on_finished: FinishedCallback,
    ) -> Result<(), StageError> {
        let index = {
            let mut sessions = self.lock();
            let session = sessions
                .get_mut(&handle.guild)
                .filter(|s| s.connection == handle.connection)
                .ok_or_else(|| {
                    StageError::Playback(format!("no live session for guild {}", handle.guild))
                })?;
            session.exported += 1;
            session.exported
        };

        let path = self
            .dir
            .join(handle.guild.to_string())
            .join(format!("cover-{}-{:04}.wav", handle.connection, index));
        let duration = Duration::from_millis(track.duration_ms());
        let export_path = path.clone();
        tokio::task::spawn_blocking(move || write_wav_file(&track, &export_path))
            .await
            .map_err(|e| StageError::Playback(format!("export task failed: {}", e)))?
            .map_err(|e| StageError::Playback(e.to_string()))?;
        tracing::info!(guild = %handle.guild, path = %path.display(), "cover exported");

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        {
            let mut sessions = self.lock();
            let Some(session) = sessions
                .get_mut(&handle.guild)
                .filter(|s| s.connection == handle.connection)
            else {
                return Err(StageError::Playback(format!(
                    "session for guild {} closed during export",
                    handle.guild
                )));
            };
            session.cancel = Some((index, cancel_tx));
        }

        let sessions = Arc::clone(&self.sessions);
        let handle = *handle;
        tokio::spawn(async move {
            // A dropped sender means the session went away; end the playback too
            tokio::select! {
                _ = cancel_rx => {}
                _ = tokio::time::sleep(duration) => {}
            }
            if let Some(session) = sessions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(&handle.guild)
                .filter(|s| s.connection == handle.connection)
                && session.cancel.as_ref().is_some_and(|(live, _)| *live == index)
            {
                session.cancel = None;
            }
            on_finished(None);
        });
        Ok(())
    }

    fn stop(&self, handle: &SessionHandle) {
        let cancel = self
            .lock()
            .get_mut(&handle.guild)
            .filter(|s| s.connection == handle.connection)
            .and_then(|s| s.cancel.take());
        if let Some((_, cancel)) = cancel {
            let _ = cancel.send(());
        }
    }

    fn is_playing(&self, handle: &SessionHandle) -> bool {
        self.lock()
            .get(&handle.guild)
            .is_some_and(|s| s.connection == handle.connection && s.cancel.is_some())
    }
}

/// Something the mock provider was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Connect(GuildId, ChannelId),
    Move(GuildId, ChannelId),
    Disconnect(GuildId),
    Play(GuildId, u64),
    Stop(GuildId),
}

struct MockPlayback {
    id: u64,
    callback: Option<FinishedCallback>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    connected: HashMap<GuildId, (u64, ChannelId)>,
    playing: HashMap<GuildId, MockPlayback>,
    events: Vec<VoiceEvent>,
    overlapping_plays: usize,
}

/// Mock voice provider for testing.
///
/// Playback ends after `play_duration` on a spawned task, or only when
/// stopped if built with [`MockVoiceProvider::hold_until_stopped`].
pub struct MockVoiceProvider {
    state: Arc<Mutex<MockState>>,
    play_duration: Option<Duration>,
    connect_failures: Vec<GuildId>,
    play_failure: Option<String>,
    engine_error: Option<String>,
}

impl Default for MockVoiceProvider {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            play_duration: Some(Duration::from_millis(5)),
            connect_failures: Vec::new(),
            play_failure: None,
            engine_error: None,
        }
    }
}

impl MockVoiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_play_duration(mut self, duration: Duration) -> Self {
        self.play_duration = Some(duration);
        self
    }

    /// Playback never ends on its own.
    pub fn hold_until_stopped(mut self) -> Self {
        self.play_duration = None;
        self
    }

    pub fn with_connect_failure(mut self, guild: GuildId) -> Self {
        self.connect_failures.push(guild);
        self
    }

    /// `play` itself returns an error.
    pub fn with_play_failure(mut self, reason: &str) -> Self {
        self.play_failure = Some(reason.to_string());
        self
    }

    /// Playback starts but the finished callback reports an error.
    pub fn with_engine_error(mut self, reason: &str) -> Self {
        self.engine_error = Some(reason.to_string());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<VoiceEvent> {
        self.lock().events.clone()
    }

    pub fn is_connected(&self, guild: GuildId) -> bool {
        self.lock().connected.contains_key(&guild)
    }

    pub fn play_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, VoiceEvent::Play(..)))
            .count()
    }

    /// Plays started while another one was live on the same guild.
    pub fn overlapping_plays(&self) -> usize {
        self.lock().overlapping_plays
    }

    /// Whether any playback is live right now.
    pub fn any_playing(&self) -> bool {
        !self.lock().playing.is_empty()
    }

    fn finish(state: &Mutex<MockState>, guild: GuildId, id: u64, error: Option<String>) {
        let callback = {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            match state.playing.get(&guild) {
                Some(p) if p.id == id => state.playing.remove(&guild).and_then(|p| p.callback),
                _ => None,
            }
        };
        if let Some(callback) = callback {
            callback(error);
        }
    }
}

#[async_trait]
impl VoiceProvider for MockVoiceProvider {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<SessionHandle, StageError> {
        if self.connect_failures.contains(&guild) {
            return Err(StageError::VoiceConnect(format!(
                "mock cannot join channel {}",
                channel
            )));
        }
        let mut state = self.lock();
        state.next_id += 1;
        let connection = state.next_id;
        state.connected.insert(guild, (connection, channel));
        state.events.push(VoiceEvent::Connect(guild, channel));
        Ok(SessionHandle { guild, connection })
    }

    async fn move_to(&self, handle: &SessionHandle, channel: ChannelId) -> Result<(), StageError> {
        let mut state = self.lock();
        match state.connected.get_mut(&handle.guild) {
            Some(entry) if entry.0 == handle.connection => {
                entry.1 = channel;
                state.events.push(VoiceEvent::Move(handle.guild, channel));
                Ok(())
            }
            _ => Err(StageError::VoiceConnect("stale session handle".to_string())),
        }
    }

    async fn disconnect(&self, handle: &SessionHandle) {
        let mut state = self.lock();
        if state
            .connected
            .get(&handle.guild)
            .is_some_and(|entry| entry.0 == handle.connection)
        {
            state.connected.remove(&handle.guild);
            state.events.push(VoiceEvent::Disconnect(handle.guild));
        }
    }

    async fn play(
        &self,
        handle: &SessionHandle,
        track: AudioTrack,
        on_finished: FinishedCallback,
    ) -> Result<(), StageError> {
        if let Some(reason) = &self.play_failure {
            return Err(StageError::Playback(reason.clone()));
        }

        let id = {
            let mut state = self.lock();
            if !state
                .connected
                .get(&handle.guild)
                .is_some_and(|entry| entry.0 == handle.connection)
            {
                return Err(StageError::Playback("not connected".to_string()));
            }
            if state.playing.contains_key(&handle.guild) {
                state.overlapping_plays += 1;
            }
            state.next_id += 1;
            let id = state.next_id;
            state.playing.insert(
                handle.guild,
                MockPlayback {
                    id,
                    callback: Some(on_finished),
                },
            );
            state
                .events
                .push(VoiceEvent::Play(handle.guild, track.duration_ms()));
            id
        };

        if let Some(duration) = self.play_duration {
            let state = Arc::clone(&self.state);
            let guild = handle.guild;
            let error = self.engine_error.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                Self::finish(&state, guild, id, error);
            });
        }
        Ok(())
    }

    fn stop(&self, handle: &SessionHandle) {
        let id = {
            let mut state = self.lock();
            state.events.push(VoiceEvent::Stop(handle.guild));
            state.playing.get(&handle.guild).map(|p| p.id)
        };
        if let Some(id) = id {
            Self::finish(&self.state, handle.guild, id, None);
        }
    }

    fn is_playing(&self, handle: &SessionHandle) -> bool {
        self.lock().playing.contains_key(&handle.guild)
    }
}
