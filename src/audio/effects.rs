//! Vocal post-processing chain applied before the final mix.
//!
//! Order is fixed: noise gate, high-pass filter, compressor, reverb, gain.

use crate::audio::track::AudioTrack;
use crate::config::MixConfig;

/// An in-place processor over interleaved samples.
pub trait Effect: Send {
    fn process(&mut self, samples: &mut [f32], sample_rate: u32, channels: usize);

    fn name(&self) -> &'static str;
}

fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-9).log10()
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
fn smoothing(ms: f32, sample_rate: u32) -> f32 {
    (-1.0 / (ms * 0.001 * sample_rate as f32)).exp()
}

/// Peak envelope follower shared by the gate and the compressor.
#[derive(Debug, Clone)]
struct Envelope {
    attack_ms: f32,
    release_ms: f32,
    level: f32,
}

impl Envelope {
    fn new(attack_ms: f32, release_ms: f32) -> Self {
        Self {
            attack_ms,
            release_ms,
            level: 0.0,
        }
    }

    fn follow(&mut self, input: f32, attack: f32, release: f32) -> f32 {
        let coeff = if input > self.level { attack } else { release };
        self.level = coeff * self.level + (1.0 - coeff) * input;
        self.level
    }
}

/// Downward expander: signal under the threshold is pushed further down.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    threshold_db: f32,
    ratio: f32,
    envelope: Envelope,
}

impl NoiseGate {
    pub fn new(threshold_db: f32, ratio: f32) -> Self {
        Self {
            threshold_db,
            ratio,
            envelope: Envelope::new(1.0, 100.0),
        }
    }
}

impl Effect for NoiseGate {
    fn process(&mut self, samples: &mut [f32], sample_rate: u32, channels: usize) {
        let attack = smoothing(self.envelope.attack_ms, sample_rate);
        let release = smoothing(self.envelope.release_ms, sample_rate);
        for frame in samples.chunks_exact_mut(channels) {
            let peak = frame.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            let level_db = gain_to_db(self.envelope.follow(peak, attack, release));
            if level_db < self.threshold_db {
                let reduction_db = (level_db - self.threshold_db) * (self.ratio - 1.0);
                let gain = db_to_gain(reduction_db.max(-120.0));
                frame.iter_mut().for_each(|s| *s *= gain);
            }
        }
    }

    fn name(&self) -> &'static str {
        "noise_gate"
    }
}

/// 12 dB/octave Butterworth high-pass (RBJ biquad).
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    cutoff_hz: f32,
    state: Vec<[f32; 4]>,
}

impl HighPassFilter {
    pub fn new(cutoff_hz: f32) -> Self {
        Self {
            cutoff_hz,
            state: Vec::new(),
        }
    }
}

impl Effect for HighPassFilter {
    fn process(&mut self, samples: &mut [f32], sample_rate: u32, channels: usize) {
        let nyquist = sample_rate as f32 / 2.0;
        let cutoff = self.cutoff_hz.clamp(1.0, nyquist * 0.99);
        let w0 = 2.0 * std::f32::consts::PI * cutoff / sample_rate as f32;
        let alpha = w0.sin() / (2.0 * std::f32::consts::FRAC_1_SQRT_2);
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha;
        let b0 = (1.0 + cos_w0) / 2.0 / a0;
        let b1 = -(1.0 + cos_w0) / a0;
        let b2 = b0;
        let a1 = -2.0 * cos_w0 / a0;
        let a2 = (1.0 - alpha) / a0;

        self.state.resize(channels, [0.0; 4]);
        for frame in samples.chunks_exact_mut(channels) {
            for (s, st) in frame.iter_mut().zip(self.state.iter_mut()) {
                let [x1, x2, y1, y2] = *st;
                let x0 = *s;
                let y0 = b0 * x0 + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
                *st = [x0, x1, y0, y1];
                *s = y0;
            }
        }
    }

    fn name(&self) -> &'static str {
        "high_pass"
    }
}

/// Feed-forward peak compressor.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    envelope: Envelope,
}

impl Compressor {
    pub fn new(threshold_db: f32, ratio: f32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            envelope: Envelope::new(1.0, 100.0),
        }
    }
}

impl Effect for Compressor {
    fn process(&mut self, samples: &mut [f32], sample_rate: u32, channels: usize) {
        let attack = smoothing(self.envelope.attack_ms, sample_rate);
        let release = smoothing(self.envelope.release_ms, sample_rate);
        for frame in samples.chunks_exact_mut(channels) {
            let peak = frame.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            let level_db = gain_to_db(self.envelope.follow(peak, attack, release));
            if level_db > self.threshold_db {
                let target_db = self.threshold_db + (level_db - self.threshold_db) / self.ratio;
                let gain = db_to_gain(target_db - level_db);
                frame.iter_mut().for_each(|s| *s *= gain);
            }
        }
    }

    fn name(&self) -> &'static str {
        "compressor"
    }
}

// Freeverb tunings at 44.1 kHz, scaled to the actual rate.
const COMB_TUNINGS: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNINGS: [usize; 2] = [556, 441];
const STEREO_SPREAD: usize = 23;
const DAMPING: f32 = 0.5;

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
            store: 0.0,
        }
    }

    fn tick(&mut self, input: f32, feedback: f32) -> f32 {
        let out = self.buffer[self.pos];
        self.store = out * (1.0 - DAMPING) + self.store * DAMPING;
        self.buffer[self.pos] = input + self.store * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    fn tick(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        self.buffer[self.pos] = input + buffered * 0.5;
        self.pos = (self.pos + 1) % self.buffer.len();
        buffered - input
    }
}

#[derive(Debug, Clone)]
struct ReverbLine {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl ReverbLine {
    fn new(sample_rate: u32, spread: usize) -> Self {
        let scale = |n: usize| (n + spread) * sample_rate as usize / 44_100;
        Self {
            combs: COMB_TUNINGS.iter().map(|&n| Comb::new(scale(n))).collect(),
            allpasses: ALLPASS_TUNINGS.iter().map(|&n| Allpass::new(scale(n))).collect(),
        }
    }

    fn tick(&mut self, input: f32, feedback: f32) -> f32 {
        let mut out: f32 = self.combs.iter_mut().map(|c| c.tick(input, feedback)).sum();
        for ap in &mut self.allpasses {
            out = ap.tick(out);
        }
        out
    }
}

/// Small Schroeder/Freeverb style room.
#[derive(Debug, Clone)]
pub struct Reverb {
    room_size: f32,
    wet_level: f32,
    dry_level: f32,
    width: f32,
    lines: Vec<ReverbLine>,
    built_for: Option<(u32, usize)>,
}

impl Reverb {
    pub fn new(room_size: f32, wet_level: f32, dry_level: f32, width: f32) -> Self {
        Self {
            room_size: room_size.clamp(0.0, 1.0),
            wet_level,
            dry_level,
            width: width.clamp(0.0, 1.0),
            lines: Vec::new(),
            built_for: None,
        }
    }
}

impl Effect for Reverb {
    fn process(&mut self, samples: &mut [f32], sample_rate: u32, channels: usize) {
        if self.built_for != Some((sample_rate, channels)) {
            self.lines = (0..channels)
                .map(|c| ReverbLine::new(sample_rate, c * STEREO_SPREAD))
                .collect();
            self.built_for = Some((sample_rate, channels));
        }

        let feedback = 0.7 + 0.28 * self.room_size;
        let wet_main = self.wet_level * (self.width / 2.0 + 0.5);
        let wet_cross = self.wet_level * ((1.0 - self.width) / 2.0);
        let mut wet = vec![0.0f32; channels];

        for frame in samples.chunks_exact_mut(channels) {
            let input = frame.iter().sum::<f32>() / channels as f32 * 0.015;
            for (w, line) in wet.iter_mut().zip(self.lines.iter_mut()) {
                *w = line.tick(input, feedback);
            }
            if channels == 1 {
                frame[0] = frame[0] * self.dry_level + wet[0] * self.wet_level;
                continue;
            }
            for c in 0..channels {
                let other = wet[(c + 1) % channels];
                frame[c] = frame[c] * self.dry_level + wet[c] * wet_main + other * wet_cross;
            }
        }
    }

    fn name(&self) -> &'static str {
        "reverb"
    }
}

/// Static gain in decibels.
#[derive(Debug, Clone)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    pub fn new(gain_db: f32) -> Self {
        Self {
            gain: db_to_gain(gain_db),
        }
    }
}

impl Effect for Gain {
    fn process(&mut self, samples: &mut [f32], _sample_rate: u32, _channels: usize) {
        samples.iter_mut().for_each(|s| *s *= self.gain);
    }

    fn name(&self) -> &'static str {
        "gain"
    }
}

/// Ordered list of effects run over a whole track.
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new(effects: Vec<Box<dyn Effect>>) -> Self {
        Self { effects }
    }

    /// The vocal chain: gate, high-pass, compressor, reverb, gain.
    pub fn vocal(config: &MixConfig) -> Self {
        Self::new(vec![
            Box::new(NoiseGate::new(
                config.noise_gate_threshold_db,
                config.noise_gate_ratio,
            )),
            Box::new(HighPassFilter::new(config.high_pass_cutoff_hz)),
            Box::new(Compressor::new(
                config.compressor_threshold_db,
                config.compressor_ratio,
            )),
            Box::new(Reverb::new(
                config.reverb_room_size,
                config.reverb_wet_level,
                config.reverb_dry_level,
                config.reverb_width,
            )),
            Box::new(Gain::new(config.output_gain_db)),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    pub fn apply(&mut self, track: &mut AudioTrack) {
        let sample_rate = track.sample_rate();
        let channels = usize::from(track.channels());
        for effect in &mut self.effects {
            effect.process(track.samples_mut(), sample_rate, channels);
        }
    }
}
