//! Source audio retrieval.
//!
//! A source is a local path, a `file://` URL, or a remote URL handled either
//! by an external downloader command or by a direct HTTP download.

#[cfg(feature = "http-fetch")]
use crate::audio::decode::decode_bytes;
use crate::audio::decode::decode_file;
use crate::audio::track::AudioTrack;
use crate::config::FetchConfig;
use crate::engine::command::{CommandRunner, SystemCommandRunner, render_args};
use crate::pipeline::error::StageError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for retrieving a job's source audio.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, source_url: &str) -> Result<AudioTrack, StageError>;
}

/// Production fetcher.
pub struct SourceFetcher {
    config: FetchConfig,
    runner: Arc<dyn CommandRunner>,
}

impl SourceFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemCommandRunner::new()))
    }

    pub fn with_runner(config: FetchConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    async fn fetch_local(&self, path: PathBuf) -> Result<AudioTrack, StageError> {
        tokio::task::spawn_blocking(move || {
            decode_file(&path).map_err(|e| StageError::Fetch(e.to_string()))
        })
        .await
        .map_err(|e| StageError::Fetch(format!("decode task failed: {}", e)))?
    }

    async fn fetch_with_command(&self, command: &str, url: &str) -> Result<AudioTrack, StageError> {
        let scratch = tempfile::Builder::new()
            .prefix("voicover-fetch-")
            .tempdir()
            .map_err(|e| StageError::Fetch(format!("cannot create scratch dir: {}", e)))?;
        let output = scratch.path().join("source.wav");

        let vars = HashMap::from([
            ("url", url.to_string()),
            ("output", output.display().to_string()),
        ]);
        let args = render_args(&self.config.args, &vars);
        let runner = self.runner.clone();
        let program = command.to_string();

        let track = tokio::task::spawn_blocking(move || {
            runner.run(&program, &args).map_err(StageError::Fetch)?;
            decode_file(&output).map_err(|e| StageError::Fetch(format!("downloaded file: {}", e)))
        })
        .await
        .map_err(|e| StageError::Fetch(format!("download task failed: {}", e)))?;

        drop(scratch);
        track
    }

    #[cfg(feature = "http-fetch")]
    async fn fetch_http(&self, url: &str) -> Result<AudioTrack, StageError> {
        use futures_util::StreamExt;

        let limit = self.config.max_download_mb.saturating_mul(1024 * 1024);
        let response = reqwest::Client::new()
            .get(url)
            .send()
            .await
            .map_err(|e| StageError::Fetch(format!("failed to start download: {}", e)))?;

        if !response.status().is_success() {
            return Err(StageError::Fetch(format!(
                "download failed with status: {}",
                response.status()
            )));
        }
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(StageError::Fetch(format!(
                "source is larger than {} MB",
                self.config.max_download_mb
            )));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| StageError::Fetch(format!("failed to read download: {}", e)))?;
            if body.len() as u64 + chunk.len() as u64 > limit {
                return Err(StageError::Fetch(format!(
                    "source is larger than {} MB",
                    self.config.max_download_mb
                )));
            }
            body.extend_from_slice(&chunk);
        }

        let extension = url_extension(url);
        tokio::task::spawn_blocking(move || {
            decode_bytes(body, extension.as_deref()).map_err(|e| StageError::Fetch(e.to_string()))
        })
        .await
        .map_err(|e| StageError::Fetch(format!("decode task failed: {}", e)))?
    }

    #[cfg(not(feature = "http-fetch"))]
    async fn fetch_http(&self, url: &str) -> Result<AudioTrack, StageError> {
        Err(StageError::Fetch(format!(
            "cannot fetch {}: built without http-fetch and no fetch.command configured",
            url
        )))
    }

    async fn fetch_inner(&self, source_url: &str) -> Result<AudioTrack, StageError> {
        match classify(source_url)? {
            Source::Local(path) => self.fetch_local(path).await,
            Source::Remote => match self.config.command.as_deref() {
                Some(command) => self.fetch_with_command(command, source_url).await,
                None => {
                    let limit = Duration::from_secs(self.config.timeout_secs);
                    tokio::time::timeout(limit, self.fetch_http(source_url))
                        .await
                        .map_err(|_| {
                            StageError::Fetch(format!(
                                "download timed out after {}s",
                                self.config.timeout_secs
                            ))
                        })?
                }
            },
        }
    }
}

#[async_trait]
impl MediaFetcher for SourceFetcher {
    async fn fetch(&self, source_url: &str) -> Result<AudioTrack, StageError> {
        let track = self.fetch_inner(source_url).await?;

        if track.is_empty() {
            return Err(StageError::Fetch(format!("{} contains no audio", source_url)));
        }
        Ok(track)
    }
}

#[derive(Debug, PartialEq)]
enum Source {
    Local(PathBuf),
    Remote,
}

/// File extension of a URL's last path segment, used as a decoder hint.
#[cfg_attr(not(feature = "http-fetch"), allow(dead_code))]
fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, segment) = path.rsplit_once('/')?;
    let (_, extension) = segment.rsplit_once('.')?;
    (!extension.is_empty()).then(|| extension.to_ascii_lowercase())
}

/// URL schemes a source may use. Anything without a scheme is a local path.
const ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "file"];

/// Checks that `source_url` is a local path or an http(s)/file URL.
///
/// Sources end up as downloader arguments, so anything an argument parser
/// could take for an option is refused.
pub fn check_source(source_url: &str) -> Result<(), String> {
    let source = source_url.trim();
    if source.is_empty() {
        return Err("source URL is empty".to_string());
    }
    if source.starts_with('-') {
        return Err(format!("source '{}' must not start with '-'", source));
    }
    if source.chars().any(char::is_control) {
        return Err("source URL contains control characters".to_string());
    }
    if let Some((scheme, _)) = source.split_once("://")
        && !ALLOWED_SCHEMES
            .iter()
            .any(|allowed| scheme.eq_ignore_ascii_case(allowed))
    {
        return Err(format!(
            "unsupported source scheme '{}' (expected http, https or file)",
            scheme
        ));
    }
    Ok(())
}

fn classify(source_url: &str) -> Result<Source, StageError> {
    check_source(source_url).map_err(StageError::Fetch)?;

    if let Some(path) = source_url.strip_prefix("file://") {
        return Ok(Source::Local(PathBuf::from(path)));
    }
    if source_url.contains("://") {
        Ok(Source::Remote)
    } else {
        Ok(Source::Local(PathBuf::from(source_url)))
    }
}

/// Mock fetcher for testing.
///
/// Serves registered tracks by URL, or a short default track otherwise.
pub struct MockFetcher {
    tracks: HashMap<String, AudioTrack>,
    failing: HashSet<String>,
    default_duration_ms: u64,
    fetched: Mutex<Vec<String>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self {
            tracks: HashMap::new(),
            failing: HashSet::new(),
            default_duration_ms: 1_000,
            fetched: Mutex::new(Vec::new()),
        }
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, url: &str, track: AudioTrack) -> Self {
        self.tracks.insert(url.to_string(), track);
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn with_default_duration_ms(mut self, ms: u64) -> Self {
        self.default_duration_ms = ms;
        self
    }

    /// URLs fetched so far, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, source_url: &str) -> Result<AudioTrack, StageError> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(source_url.to_string());

        if self.failing.contains(source_url) {
            return Err(StageError::Fetch(format!("mock fetch failure for {}", source_url)));
        }
        match self.tracks.get(source_url) {
            Some(track) => Ok(track.clone()),
            None => AudioTrack::silence(self.default_duration_ms, 44_100, 2)
                .map_err(|e| StageError::Fetch(e.to_string())),
        }
    }
}
