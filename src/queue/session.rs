//! Per-guild voice session bookkeeping.
//!
//! The worker is the only writer of connection state. Request handlers only
//! call `skip`, which fires the in-flight playback's skip handle.

use crate::engine::voice::SessionHandle;
use crate::pipeline::types::{ChannelId, GuildId, JobId};
use crate::queue::sync::SkipHandle;
use std::collections::HashMap;
use std::sync::Mutex;

/// One guild's voice connection and what it is playing.
#[derive(Debug, Clone)]
pub struct GuildVoiceSession {
    pub handle: SessionHandle,
    pub channel: ChannelId,
    pub playing: Option<JobId>,
    skip: Option<SkipHandle>,
}

impl GuildVoiceSession {
    pub fn is_idle(&self) -> bool {
        self.playing.is_none()
    }
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<GuildId, GuildVoiceSession>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<GuildId, GuildVoiceSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, guild: GuildId) -> Option<GuildVoiceSession> {
        self.lock().get(&guild).cloned()
    }

    pub fn connected(&self, guild: GuildId, handle: SessionHandle, channel: ChannelId) {
        self.lock().insert(
            guild,
            GuildVoiceSession {
                handle,
                channel,
                playing: None,
                skip: None,
            },
        );
    }

    pub fn moved(&self, guild: GuildId, channel: ChannelId) {
        if let Some(session) = self.lock().get_mut(&guild) {
            session.channel = channel;
        }
    }

    pub fn remove(&self, guild: GuildId) -> Option<GuildVoiceSession> {
        self.lock().remove(&guild)
    }

    /// Records `job` as the guild's in-flight playback.
    ///
    /// Returns false if another playback is still registered.
    pub fn begin_playback(&self, guild: GuildId, job: JobId, skip: SkipHandle) -> bool {
        match self.lock().get_mut(&guild) {
            Some(session) if session.playing.is_none() => {
                session.playing = Some(job);
                session.skip = Some(skip);
                true
            }
            _ => false,
        }
    }

    pub fn end_playback(&self, guild: GuildId) {
        if let Some(session) = self.lock().get_mut(&guild) {
            session.playing = None;
            session.skip = None;
        }
    }

    /// Fires the skip handle of the guild's in-flight playback, then runs
    /// `stop` on its session handle.
    ///
    /// `stop` runs under the table lock so the next job cannot begin its
    /// playback until the skipped one is silenced. Returns false if nothing
    /// was playing or the playback had already ended.
    pub fn skip(&self, guild: GuildId, stop: impl FnOnce(&SessionHandle)) -> bool {
        let sessions = self.lock();
        let Some(session) = sessions.get(&guild) else {
            return false;
        };
        let fired = session.skip.as_ref().is_some_and(SkipHandle::skip);
        if fired {
            stop(&session.handle);
        }
        fired
    }

    /// Connected sessions with nothing playing.
    pub fn idle(&self) -> Vec<(GuildId, SessionHandle)> {
        self.lock()
            .iter()
            .filter(|(_, session)| session.is_idle())
            .map(|(guild, session)| (*guild, session.handle))
            .collect()
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::sync::{PlaybackOutcome, PlaybackSynchronizer};

    fn handle(guild: u64) -> SessionHandle {
        SessionHandle {
            guild: GuildId(guild),
            connection: 1,
        }
    }

    #[tokio::test]
    async fn skip_fires_in_flight_playback_once() {
        let table = SessionTable::new();
        table.connected(GuildId(1), handle(1), ChannelId(10));

        let (sync, signal) = PlaybackSynchronizer::new();
        assert!(table.begin_playback(GuildId(1), JobId(5), signal.skip_handle()));

        let mut stopped = Vec::new();
        assert!(table.skip(GuildId(1), |h| stopped.push(*h)));
        assert!(!table.skip(GuildId(1), |h| stopped.push(*h)));
        assert_eq!(stopped, vec![handle(1)]);
        drop(signal);
        assert_eq!(sync.wait().await, PlaybackOutcome::Skipped);
    }

    #[test]
    fn skip_without_playback_is_false() {
        let table = SessionTable::new();
        assert!(!table.skip(GuildId(1), |_| panic!("nothing to stop")));
        table.connected(GuildId(1), handle(1), ChannelId(10));
        assert!(!table.skip(GuildId(1), |_| panic!("nothing to stop")));
    }

    #[test]
    fn second_playback_is_refused_until_first_ends() {
        let table = SessionTable::new();
        table.connected(GuildId(1), handle(1), ChannelId(10));
        let (_sync, signal) = PlaybackSynchronizer::new();

        assert!(table.begin_playback(GuildId(1), JobId(1), signal.skip_handle()));
        assert!(!table.begin_playback(GuildId(1), JobId(2), signal.skip_handle()));
        table.end_playback(GuildId(1));
        assert!(table.begin_playback(GuildId(1), JobId(2), signal.skip_handle()));
    }

    #[test]
    fn idle_excludes_playing_sessions() {
        let table = SessionTable::new();
        table.connected(GuildId(1), handle(1), ChannelId(10));
        table.connected(GuildId(2), handle(2), ChannelId(20));
        let (_sync, signal) = PlaybackSynchronizer::new();
        table.begin_playback(GuildId(2), JobId(1), signal.skip_handle());

        let idle: Vec<GuildId> = table.idle().into_iter().map(|(g, _)| g).collect();
        assert_eq!(idle, vec![GuildId(1)]);
    }

    #[test]
    fn moved_updates_channel() {
        let table = SessionTable::new();
        table.connected(GuildId(1), handle(1), ChannelId(10));
        table.moved(GuildId(1), ChannelId(11));
        assert_eq!(table.get(GuildId(1)).unwrap().channel, ChannelId(11));
    }
}
