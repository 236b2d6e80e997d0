//! Source separation: one mixed track in, vocal and accompaniment stems out.

use crate::audio::track::AudioTrack;
use crate::audio::wav::{read_wav_file, write_wav_file};
use crate::config::SeparateConfig;
use crate::engine::command::{CommandRunner, SystemCommandRunner, render_args};
use crate::pipeline::error::StageError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The two stems a separator produces.
#[derive(Debug, Clone)]
pub struct Stems {
    pub vocals: AudioTrack,
    pub instrumental: AudioTrack,
}

/// Trait for source separation engines.
///
/// Called from the blocking pool; implementations may take seconds to minutes.
pub trait Separator: Send + Sync {
    fn separate(&self, track: AudioTrack) -> Result<Stems, StageError>;

    fn name(&self) -> &str;
}

/// Separator driving an external tool such as demucs.
///
/// The input is written to a scratch directory that is removed when the call
/// returns, whether it succeeded or not.
pub struct CommandSeparator<R: CommandRunner = SystemCommandRunner> {
    config: SeparateConfig,
    runner: R,
}

impl CommandSeparator<SystemCommandRunner> {
    pub fn new(config: SeparateConfig) -> Self {
        Self::with_runner(config, SystemCommandRunner::new())
    }
}

impl<R: CommandRunner> CommandSeparator<R> {
    pub fn with_runner(config: SeparateConfig, runner: R) -> Self {
        Self { config, runner }
    }
}

impl<R: CommandRunner> Separator for CommandSeparator<R> {
    fn separate(&self, track: AudioTrack) -> Result<Stems, StageError> {
        let scratch = tempfile::Builder::new()
            .prefix("voicover-separate-")
            .tempdir()
            .map_err(|e| StageError::Separation(format!("cannot create scratch dir: {}", e)))?;
        let input = scratch.path().join("input.wav");
        let output_dir = scratch.path().join("separated");

        write_wav_file(&track, &input).map_err(|e| StageError::Separation(e.to_string()))?;
        drop(track);

        let vars = HashMap::from([
            ("input", input.display().to_string()),
            ("output_dir", output_dir.display().to_string()),
        ]);
        let args = render_args(&self.config.args, &vars);
        self.runner
            .run(&self.config.command, &args)
            .map_err(StageError::Separation)?;

        let vocals = read_wav_file(&output_dir.join(&self.config.vocals_path))
            .map_err(|e| StageError::Separation(format!("vocal stem: {}", e)))?;
        let instrumental = read_wav_file(&output_dir.join(&self.config.instrumental_path))
            .map_err(|e| StageError::Separation(format!("instrumental stem: {}", e)))?;

        Ok(Stems {
            vocals,
            instrumental,
        })
    }

    fn name(&self) -> &str {
        &self.config.command
    }
}

/// Mock separator for testing.
///
/// Returns the input as both stems, optionally failing on chosen calls.
#[derive(Debug, Default)]
pub struct MockSeparator {
    calls: AtomicUsize,
    fail_on: Mutex<Vec<usize>>,
    fail_always: bool,
}

impl MockSeparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call.
    pub fn with_failure(mut self) -> Self {
        self.fail_always = true;
        self
    }

    /// Fail the `n`th call (1-based).
    pub fn fail_on_call(self, n: usize) -> Self {
        self.fail_on
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Separator for MockSeparator {
    fn separate(&self, track: AudioTrack) -> Result<Stems, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduled = self
            .fail_on
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&call);
        if self.fail_always || scheduled {
            return Err(StageError::Separation(format!(
                "mock separation failure on call {}",
                call
            )));
        }
        Ok(Stems {
            vocals: track.clone(),
            instrumental: track,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::testing::RecordingRunner;

    fn tone(ms: u64) -> AudioTrack {
        AudioTrack::silence(ms, 44_100, 2).unwrap()
    }

    #[test]
    fn mock_fails_only_on_scheduled_call() {
        let separator = MockSeparator::new().fail_on_call(2);
        assert!(separator.separate(tone(10)).is_ok());
        assert!(matches!(
            separator.separate(tone(10)),
            Err(StageError::Separation(_))
        ));
        assert!(separator.separate(tone(10)).is_ok());
        assert_eq!(separator.calls(), 3);
    }

    #[test]
    fn command_separator_reads_stems_from_output_dir() {
        let config = SeparateConfig::default();
        let vocals_rel = config.vocals_path.clone();
        let inst_rel = config.instrumental_path.clone();

        let runner = RecordingRunner::new(move |args: &[String]| {
            // Emulate demucs: write both stems below the -o directory.
            let out_pos = args.iter().position(|a| a == "-o").ok_or("no -o")?;
            let out_dir = std::path::PathBuf::from(&args[out_pos + 1]);
            for rel in [&vocals_rel, &inst_rel] {
                let path = out_dir.join(rel);
                std::fs::create_dir_all(path.parent().unwrap()).map_err(|e| e.to_string())?;
                write_wav_file(&AudioTrack::silence(250, 44_100, 2).unwrap(), &path)
                    .map_err(|e| e.to_string())?;
            }
            Ok(String::new())
        });

        let separator = CommandSeparator::with_runner(config, runner);
        let stems = separator.separate(tone(250)).unwrap();

        assert_eq!(stems.vocals.duration_ms(), 250);
        assert_eq!(stems.instrumental.duration_ms(), 250);
        let calls = separator.runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "python3");
        assert!(calls[0].1.iter().any(|a| a.ends_with("input.wav")));
    }

    #[test]
    fn command_separator_reports_tool_failure() {
        let runner = RecordingRunner::new(|_: &[String]| Err("demucs crashed".to_string()));
        let separator = CommandSeparator::with_runner(SeparateConfig::default(), runner);

        let err = separator.separate(tone(100)).unwrap_err();
        assert_eq!(err, StageError::Separation("demucs crashed".to_string()));
    }

    #[test]
    fn command_separator_reports_missing_stems() {
        let runner = RecordingRunner::new(|_: &[String]| Ok(String::new()));
        let separator = CommandSeparator::with_runner(SeparateConfig::default(), runner);

        let err = separator.separate(tone(100)).unwrap_err();
        assert!(matches!(err, StageError::Separation(msg) if msg.contains("vocal stem")));
    }
}
