use crate::defaults;
use crate::error::{Result, VoicoverError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub fetch: FetchConfig,
    pub separate: SeparateConfig,
    pub convert: ConvertConfig,
    pub mix: MixConfig,
    pub models: ModelsConfig,
    pub output: OutputConfig,
}

/// Worker loop behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Seconds an idle voice session stays connected once the queue is empty.
    pub idle_disconnect_secs: u64,
    /// Finished jobs whose status stays queryable.
    pub status_retention: usize,
}

/// Media download
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// External downloader for remote URLs (e.g. yt-dlp). Direct HTTP if unset.
    pub command: Option<String>,
    /// Arguments; `{url}` and `{output}` are substituted.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub max_download_mb: u64,
}

/// Source separation engine invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeparateConfig {
    pub command: String,
    /// Arguments; `{input}` and `{output_dir}` are substituted.
    pub args: Vec<String>,
    /// Vocal stem location relative to the output directory.
    pub vocals_path: String,
    /// Accompaniment stem location relative to the output directory.
    pub instrumental_path: String,
}

/// Voice conversion engine invocation and chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConvertConfig {
    pub chunk_length_ms: u64,
    pub fade_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub f0_method: String,
    pub command: String,
    /// Arguments; `{input}`, `{output}`, `{model}`, `{pitch}` and
    /// `{f0_method}` are substituted.
    pub args: Vec<String>,
}

/// Vocal effect chain parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixConfig {
    pub noise_gate_threshold_db: f32,
    pub noise_gate_ratio: f32,
    pub high_pass_cutoff_hz: f32,
    pub compressor_threshold_db: f32,
    pub compressor_ratio: f32,
    pub reverb_room_size: f32,
    pub reverb_wet_level: f32,
    pub reverb_dry_level: f32,
    pub reverb_width: f32,
    pub output_gain_db: f32,
}

/// Voice model location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    pub index_file: String,
}

/// Where finished covers are written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            idle_disconnect_secs: defaults::IDLE_DISCONNECT_SECS,
            status_retention: defaults::STATUS_RETENTION,
        }
    }
}

impl QueueConfig {
    pub fn idle_disconnect(&self) -> Duration {
        Duration::from_secs(self.idle_disconnect_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: vec![
                "-x".to_string(),
                "--audio-format".to_string(),
                "wav".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
                "--".to_string(),
                "{url}".to_string(),
            ],
            timeout_secs: defaults::FETCH_TIMEOUT_SECS,
            max_download_mb: defaults::MAX_DOWNLOAD_MB,
        }
    }
}

impl Default for SeparateConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec![
                "-m".to_string(),
                "demucs.separate".to_string(),
                "-n".to_string(),
                "htdemucs".to_string(),
                "--two-stems=vocals".to_string(),
                "-o".to_string(),
                "{output_dir}".to_string(),
                "{input}".to_string(),
            ],
            vocals_path: "htdemucs/input/vocals.wav".to_string(),
            instrumental_path: "htdemucs/input/no_vocals.wav".to_string(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            chunk_length_ms: defaults::CHUNK_LENGTH_MS,
            fade_ms: defaults::CHUNK_FADE_MS,
            sample_rate: defaults::CONVERSION_SAMPLE_RATE,
            channels: defaults::CONVERSION_CHANNELS,
            f0_method: defaults::F0_METHOD.to_string(),
            command: "rvc".to_string(),
            args: vec![
                "-i".to_string(),
                "{input}".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
                "-mp".to_string(),
                "{model}".to_string(),
                "-pi".to_string(),
                "{pitch}".to_string(),
                "-me".to_string(),
                "{f0_method}".to_string(),
            ],
        }
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            noise_gate_threshold_db: defaults::NOISE_GATE_THRESHOLD_DB,
            noise_gate_ratio: defaults::NOISE_GATE_RATIO,
            high_pass_cutoff_hz: defaults::HIGH_PASS_CUTOFF_HZ,
            compressor_threshold_db: defaults::COMPRESSOR_THRESHOLD_DB,
            compressor_ratio: defaults::COMPRESSOR_RATIO,
            reverb_room_size: defaults::REVERB_ROOM_SIZE,
            reverb_wet_level: defaults::REVERB_WET_LEVEL,
            reverb_dry_level: defaults::REVERB_DRY_LEVEL,
            reverb_width: defaults::REVERB_WIDTH,
            output_gain_db: defaults::OUTPUT_GAIN_DB,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: data_dir().join("models"),
            index_file: defaults::MODEL_INDEX_FILE.to_string(),
        }
    }
}

impl ModelsConfig {
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(&self.index_file)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: data_dir().join("covers"),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voicover")
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOICOVER_MODELS_DIR → models.dir
    /// - VOICOVER_OUTPUT_DIR → output.dir
    /// - VOICOVER_CHUNK_MS → convert.chunk_length_ms
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("VOICOVER_MODELS_DIR")
            && !dir.is_empty()
        {
            self.models.dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("VOICOVER_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.output.dir = PathBuf::from(dir);
        }

        if let Ok(ms) = std::env::var("VOICOVER_CHUNK_MS")
            && let Ok(ms) = ms.parse::<u64>()
        {
            self.convert.chunk_length_ms = ms;
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.convert.chunk_length_ms == 0 {
            return Err(invalid("convert.chunk_length_ms", "must be greater than zero"));
        }
        if self.convert.sample_rate < defaults::MIN_SAMPLE_RATE {
            return Err(invalid(
                "convert.sample_rate",
                &format!("must be at least {} Hz", defaults::MIN_SAMPLE_RATE),
            ));
        }
        if self.convert.channels == 0 {
            return Err(invalid("convert.channels", "must be at least 1"));
        }
        if self.convert.fade_ms * 2 > self.convert.chunk_length_ms {
            return Err(invalid(
                "convert.fade_ms",
                "fades at both edges must fit inside one chunk",
            ));
        }
        if self.mix.compressor_ratio < 1.0 {
            return Err(invalid("mix.compressor_ratio", "must be at least 1.0"));
        }
        if self.queue.status_retention == 0 {
            return Err(invalid("queue.status_retention", "must be at least 1"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voicover/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voicover")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> VoicoverError {
    VoicoverError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
