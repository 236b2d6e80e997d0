//! Voice conversion: re-sing a vocal segment with a target voice model.

use crate::audio::chunker::Chunk;
use crate::audio::track::AudioTrack;
use crate::audio::wav::{read_wav_file, write_wav_file};
use crate::config::ConvertConfig;
use crate::engine::command::{CommandRunner, SystemCommandRunner, render_args};
use crate::pipeline::error::StageError;
use crate::pipeline::types::ModelRef;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-job conversion parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionParams {
    /// Semitones; 0 keeps the original key.
    pub pitch_shift: i32,
    /// Pitch extraction method name understood by the engine.
    pub f0_method: String,
}

/// Trait for voice conversion engines.
///
/// One call converts one chunk. The output may differ slightly in length
/// from the input; the chunker corrects for that during reassembly. An engine
/// that ran but left no readable output fails with `ChunkRenderFailed`.
pub trait VoiceConverter: Send + Sync {
    /// Check that `model` can be used before any chunk is converted.
    fn prepare(&self, model: &ModelRef) -> Result<(), StageError> {
        if model.path.exists() {
            Ok(())
        } else {
            Err(StageError::Conversion(format!(
                "model '{}' weights missing at {}",
                model.name,
                model.path.display()
            )))
        }
    }

    fn convert(
        &self,
        chunk: &Chunk,
        model: &ModelRef,
        params: &ConversionParams,
    ) -> Result<AudioTrack, StageError>;

    fn name(&self) -> &str;
}

/// Converter driving an external RVC command line.
pub struct CommandConverter<R: CommandRunner = SystemCommandRunner> {
    config: ConvertConfig,
    runner: R,
}

impl CommandConverter<SystemCommandRunner> {
    pub fn new(config: ConvertConfig) -> Self {
        Self::with_runner(config, SystemCommandRunner::new())
    }
}

impl<R: CommandRunner> CommandConverter<R> {
    pub fn with_runner(config: ConvertConfig, runner: R) -> Self {
        Self { config, runner }
    }
}

impl<R: CommandRunner> VoiceConverter for CommandConverter<R> {
    fn convert(
        &self,
        chunk: &Chunk,
        model: &ModelRef,
        params: &ConversionParams,
    ) -> Result<AudioTrack, StageError> {
        let scratch = tempfile::Builder::new()
            .prefix("voicover-convert-")
            .tempdir()
            .map_err(|e| StageError::Conversion(format!("cannot create scratch dir: {}", e)))?;
        let input = scratch.path().join("chunk.wav");
        let output = scratch.path().join("converted.wav");

        write_wav_file(&chunk.payload, &input).map_err(|e| StageError::Conversion(e.to_string()))?;

        let vars = HashMap::from([
            ("input", input.display().to_string()),
            ("output", output.display().to_string()),
            ("model", model.path.display().to_string()),
            ("pitch", params.pitch_shift.to_string()),
            ("f0_method", params.f0_method.clone()),
        ]);
        let args = render_args(&self.config.args, &vars);
        self.runner
            .run(&self.config.command, &args)
            .map_err(StageError::Conversion)?;

        read_wav_file(&output).map_err(|e| StageError::ChunkRenderFailed {
            index: chunk.index,
            message: format!("converted output: {}", e),
        })
    }

    fn name(&self) -> &str {
        &self.config.command
    }
}

/// Mock converter for testing.
///
/// Echoes the input, optionally stretched and optionally failing on chosen calls.
#[derive(Debug)]
pub struct MockConverter {
    calls: AtomicUsize,
    fail_on: Mutex<Vec<usize>>,
    length_percent: u64,
    require_weights: bool,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: Mutex::new(Vec::new()),
            length_percent: 100,
            require_weights: false,
        }
    }
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale every output to `percent` of its input duration.
    pub fn with_length_percent(mut self, percent: u64) -> Self {
        self.length_percent = percent;
        self
    }

    /// Fail the `n`th convert call (1-based).
    pub fn fail_on_call(self, n: usize) -> Self {
        self.fail_on
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(n);
        self
    }

    /// Check model weights on disk in `prepare`, as real engines do.
    pub fn requiring_weights(mut self) -> Self {
        self.require_weights = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VoiceConverter for MockConverter {
    fn prepare(&self, model: &ModelRef) -> Result<(), StageError> {
        if self.require_weights && !model.path.exists() {
            return Err(StageError::Conversion(format!(
                "model '{}' weights missing",
                model.name
            )));
        }
        Ok(())
    }

    fn convert(
        &self,
        chunk: &Chunk,
        _model: &ModelRef,
        _params: &ConversionParams,
    ) -> Result<AudioTrack, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_on
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&call)
        {
            return Err(StageError::Conversion(format!(
                "mock conversion failure on call {}",
                call
            )));
        }

        let mut out = chunk.payload.clone();
        let frames = chunk.payload.frames() as u64 * self.length_percent / 100;
        out.resize_frames(frames as usize);
        Ok(out)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::testing::RecordingRunner;
    use std::path::PathBuf;

    fn model() -> ModelRef {
        ModelRef {
            name: "Alto".to_string(),
            path: PathBuf::from("/models/alto.pth"),
        }
    }

    fn chunk(index: usize, payload: AudioTrack) -> Chunk {
        Chunk {
            index,
            start_ms: 0,
            original_length_ms: payload.duration_ms(),
            payload,
        }
    }

    fn params() -> ConversionParams {
        ConversionParams {
            pitch_shift: -12,
            f0_method: "rmvpe".to_string(),
        }
    }

    #[test]
    fn mock_stretches_output() {
        let converter = MockConverter::new().with_length_percent(110);
        let input = AudioTrack::silence(1_000, 8_000, 1).unwrap();
        let out = converter.convert(&chunk(0, input), &model(), &params()).unwrap();
        assert_eq!(out.frames(), 8_800);
    }

    #[test]
    fn mock_fails_scheduled_call() {
        let converter = MockConverter::new().fail_on_call(1);
        let input = AudioTrack::silence(10, 8_000, 1).unwrap();
        assert!(converter.convert(&chunk(0, input.clone()), &model(), &params()).is_err());
        assert!(converter.convert(&chunk(0, input.clone()), &model(), &params()).is_ok());
        assert_eq!(converter.calls(), 2);
    }

    #[test]
    fn default_prepare_rejects_missing_weights() {
        let runner = RecordingRunner::new(|_: &[String]| Ok(String::new()));
        let converter = CommandConverter::with_runner(ConvertConfig::default(), runner);
        let err = converter.prepare(&model()).unwrap_err();
        assert!(matches!(err, StageError::Conversion(msg) if msg.contains("Alto")));
    }

    #[test]
    fn command_converter_substitutes_job_parameters() {
        let runner = RecordingRunner::new(|args: &[String]| {
            let input = &args[args.iter().position(|a| a == "-i").ok_or("no -i")? + 1];
            let output = &args[args.iter().position(|a| a == "-o").ok_or("no -o")? + 1];
            std::fs::copy(input, output).map_err(|e| e.to_string())?;
            Ok(String::new())
        });
        let converter = CommandConverter::with_runner(ConvertConfig::default(), runner);
        let input = AudioTrack::silence(500, 44_100, 1).unwrap();

        let out = converter.convert(&chunk(0, input), &model(), &params()).unwrap();

        assert_eq!(out.duration_ms(), 500);
        let calls = converter.runner.calls.lock().unwrap();
        let args = &calls[0].1;
        assert!(args.contains(&"/models/alto.pth".to_string()));
        assert!(args.contains(&"-12".to_string()));
        assert!(args.contains(&"rmvpe".to_string()));
    }

    #[test]
    fn command_converter_reports_missing_output() {
        let runner = RecordingRunner::new(|_: &[String]| Ok(String::new()));
        let converter = CommandConverter::with_runner(ConvertConfig::default(), runner);
        let input = AudioTrack::silence(10, 44_100, 1).unwrap();

        let err = converter.convert(&chunk(3, input), &model(), &params()).unwrap_err();
        assert_eq!(err.kind(), crate::pipeline::error::ErrorKind::ChunkRenderFailed);
        assert!(
            matches!(err, StageError::ChunkRenderFailed { index: 3, message } if message.contains("converted output"))
        );
    }

    #[test]
    fn command_converter_reports_corrupt_output() {
        let runner = RecordingRunner::new(|args: &[String]| {
            let output = &args[args.iter().position(|a| a == "-o").ok_or("no -o")? + 1];
            std::fs::write(output, b"not a wav file").map_err(|e| e.to_string())?;
            Ok(String::new())
        });
        let converter = CommandConverter::with_runner(ConvertConfig::default(), runner);
        let input = AudioTrack::silence(10, 44_100, 1).unwrap();

        let err = converter.convert(&chunk(1, input), &model(), &params()).unwrap_err();
        assert!(matches!(err, StageError::ChunkRenderFailed { index: 1, .. }));
    }

    #[test]
    fn failing_engine_is_a_conversion_error() {
        let runner = RecordingRunner::new(|_: &[String]| Err("rvc exited with status 1".to_string()));
        let converter = CommandConverter::with_runner(ConvertConfig::default(), runner);
        let input = AudioTrack::silence(10, 44_100, 1).unwrap();

        let err = converter.convert(&chunk(0, input), &model(), &params()).unwrap_err();
        assert_eq!(err, StageError::Conversion("rvc exited with status 1".to_string()));
    }
}
