//! The four rendering stages of a cover job.
//!
//! Fetch runs on the async runtime; separation, conversion and mixing run on
//! the blocking pool so the worker's await points never stall request
//! handling. Separation and conversion hold an [`AcceleratorScope`] for the
//! whole call.

use crate::audio::chunker::AudioChunker;
use crate::audio::effects::EffectChain;
use crate::audio::mixer::overlay;
use crate::audio::track::{AudioTrack, frames_for_ms};
use crate::config::{Config, ConvertConfig, MixConfig};
use crate::engine::accelerator::{Accelerator, AcceleratorScope};
use crate::engine::converter::{ConversionParams, VoiceConverter};
use crate::engine::fetcher::MediaFetcher;
use crate::engine::separator::{Separator, Stems};
use crate::error::Result;
use crate::pipeline::error::StageError;
use crate::pipeline::types::{Job, ModelRef, Stage};
use std::sync::Arc;

/// Rounding slack allowed between a stem and its source, in milliseconds.
const STEM_DURATION_SLACK_MS: u64 = 1;

/// Fetch, separate, convert and mix, wired to their capabilities.
pub struct PipelineStages {
    fetcher: Arc<dyn MediaFetcher>,
    separator: Arc<dyn Separator>,
    converter: Arc<dyn VoiceConverter>,
    accelerator: Arc<dyn Accelerator>,
    chunker: AudioChunker,
    convert: ConvertConfig,
    mix: MixConfig,
}

impl PipelineStages {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        separator: Arc<dyn Separator>,
        converter: Arc<dyn VoiceConverter>,
        accelerator: Arc<dyn Accelerator>,
        config: &Config,
    ) -> Result<Self> {
        let chunker =
            AudioChunker::new(config.convert.chunk_length_ms)?.with_fade_ms(config.convert.fade_ms);
        Ok(Self {
            fetcher,
            separator,
            converter,
            accelerator,
            chunker,
            convert: config.convert.clone(),
            mix: config.mix.clone(),
        })
    }

    /// Runs every stage for `job`, calling `on_stage` as each one begins.
    ///
    /// Stops at the first failing stage.
    pub async fn render(
        &self,
        job: &Job,
        mut on_stage: impl FnMut(Stage) + Send,
    ) -> std::result::Result<AudioTrack, StageError> {
        on_stage(Stage::Fetch);
        let source = self.fetch(&job.source_url).await?;

        on_stage(Stage::Separate);
        let Stems {
            vocals,
            instrumental,
        } = self.separate(source).await?;

        on_stage(Stage::Convert);
        let converted = self.convert(vocals, &job.model, job.pitch_shift).await?;

        on_stage(Stage::Mix);
        self.mix(converted, instrumental).await
    }

    pub async fn fetch(&self, source_url: &str) -> std::result::Result<AudioTrack, StageError> {
        let track = self.fetcher.fetch(source_url).await?;
        tracing::debug!(
            duration_ms = track.duration_ms(),
            sample_rate = track.sample_rate(),
            channels = track.channels(),
            "source fetched"
        );
        Ok(track)
    }

    /// Splits the source into vocal and instrumental stems of the source's duration.
    pub async fn separate(&self, track: AudioTrack) -> std::result::Result<Stems, StageError> {
        let separator = Arc::clone(&self.separator);
        let accelerator = Arc::clone(&self.accelerator);

        tokio::task::spawn_blocking(move || {
            let _scope = AcceleratorScope::enter(accelerator, "separate");
            let duration_ms = track.duration_ms();
            let mut stems = separator.separate(track)?;

            for (label, stem) in [
                ("vocals", &mut stems.vocals),
                ("instrumental", &mut stems.instrumental),
            ] {
                if stem.duration_ms().abs_diff(duration_ms) > STEM_DURATION_SLACK_MS {
                    return Err(StageError::Separation(format!(
                        "{} stem is {} ms long, source is {} ms",
                        label,
                        stem.duration_ms(),
                        duration_ms
                    )));
                }
                let frames = frames_for_ms(duration_ms, stem.sample_rate());
                stem.resize_frames(frames);
            }
            Ok(stems)
        })
        .await
        .map_err(|e| StageError::Separation(format!("separation task failed: {}", e)))?
    }

    /// Re-sings `vocals` with `model`, chunk by chunk, keeping the duration exact.
    pub async fn convert(
        &self,
        vocals: AudioTrack,
        model: &ModelRef,
        pitch_shift: i32,
    ) -> std::result::Result<AudioTrack, StageError> {
        let converter = Arc::clone(&self.converter);
        let accelerator = Arc::clone(&self.accelerator);
        let chunker = self.chunker.clone();
        let model = model.clone();
        let sample_rate = self.convert.sample_rate;
        let channels = self.convert.channels;
        let params = ConversionParams {
            pitch_shift,
            f0_method: self.convert.f0_method.clone(),
        };

        tokio::task::spawn_blocking(move || {
            let _scope = AcceleratorScope::enter(accelerator, "convert");
            converter.prepare(&model)?;

            let normalized = vocals
                .conform(sample_rate, channels)
                .map_err(|e| StageError::Conversion(e.to_string()))?;
            drop(vocals);
            let duration_ms = normalized.duration_ms();
            let chunks = chunker.split(&normalized);
            let total = chunks.len();

            let mut rendered = Vec::with_capacity(total);
            for chunk in &chunks {
                tracing::debug!(
                    chunk = chunk.index + 1,
                    total,
                    start_ms = chunk.start_ms,
                    end_ms = chunk.end_ms(),
                    "converting chunk"
                );
                let payload = converter.convert(chunk, &model, &params)?;
                rendered.push(chunk.rendered(payload));
            }

            chunker.reassemble(rendered, duration_ms, sample_rate, channels)
        })
        .await
        .map_err(|e| StageError::Conversion(format!("conversion task failed: {}", e)))?
    }

    /// Applies the vocal effect chain and lays the vocal over the instrumental.
    pub async fn mix(
        &self,
        vocals: AudioTrack,
        instrumental: AudioTrack,
    ) -> std::result::Result<AudioTrack, StageError> {
        let mix = self.mix.clone();

        tokio::task::spawn_blocking(move || {
            let mut vocals = vocals;
            let mut chain = EffectChain::vocal(&mix);
            tracing::debug!(effects = ?chain.names(), "applying vocal chain");
            chain.apply(&mut vocals);

            if vocals.has_non_finite() {
                return Err(StageError::Mix(
                    "effect chain produced non-finite samples".to_string(),
                ));
            }
            overlay(&instrumental, &vocals).map_err(|e| StageError::Mix(e.to_string()))
        })
        .await
        .map_err(|e| StageError::Mix(format!("mix task failed: {}", e)))?
    }
}
