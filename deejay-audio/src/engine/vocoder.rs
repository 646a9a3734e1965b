//! Vocoder engine: phase vocoder time-stretch followed by a pitch resampler

use super::{EngineKind, EngineOptions, EngineSpec, FormantMode, PitchMode, StretchEngine, TransientMode};
use crate::error::StretchError;
use crate::params::Parameters;
use crate::timestretcher::{PhaseLockMode, PhaseVocoder, PitchResampler, ResamplerQuality};
use tracing::warn;

pub struct VocoderEngine {
    vocoder: PhaseVocoder,
    resampler: PitchResampler,
    options: EngineOptions,
    channels: usize,
    /// Pitch scale in effect (1.0 bypasses the resampler)
    pitch_scale: f64,
    /// Vocoder output awaiting resampling
    stretched: Vec<f32>,
}

impl VocoderEngine {
    pub fn new(spec: &EngineSpec, params: &Parameters) -> Result<Self, StretchError> {
        StretchError::check_format(spec.sample_rate, spec.channels)?;

        let options = EngineOptions::from_quality(&params.quality);

        let mut vocoder = PhaseVocoder::new(spec.fft_size, spec.channels);
        let resampler_quality = match options.pitch_mode {
            PitchMode::HighQuality => {
                vocoder.set_phase_lock_mode(PhaseLockMode::PeakLocked);
                ResamplerQuality::Sinc
            }
            PitchMode::HighSpeed => {
                vocoder.set_phase_lock_mode(PhaseLockMode::Identity);
                ResamplerQuality::Polynomial
            }
        };
        vocoder.set_transient_reset(options.transients == TransientMode::Crisp);
        vocoder.set_preserve_formants(options.formants == FormantMode::Preserved);

        let resampler = PitchResampler::new(resampler_quality, spec.channels)?;

        let mut engine = Self {
            vocoder,
            resampler,
            options,
            channels: spec.channels,
            pitch_scale: 1.0,
            stretched: Vec::with_capacity(spec.fft_size.as_usize() * spec.channels * 2),
        };
        engine.configure(params);
        Ok(engine)
    }

    #[inline]
    fn resampling(&self) -> bool {
        (self.pitch_scale - 1.0).abs() > f64::EPSILON
    }
}

impl StretchEngine for VocoderEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Vocoder
    }

    fn options(&self) -> EngineOptions {
        self.options
    }

    fn configure(&mut self, params: &Parameters) {
        let was_resampling = self.resampling();

        let requested = params.pitch_scale();
        if let Err(e) = self.resampler.set_ratio(1.0 / requested) {
            warn!("Pitch ratio rejected, keeping {}: {}", self.resampler.ratio(), e);
        }
        // The resampler clamps; keep the vocoder consistent with what it runs
        self.pitch_scale = if requested.is_finite() && (requested - 1.0).abs() > f64::EPSILON {
            1.0 / self.resampler.ratio()
        } else {
            1.0
        };

        if self.resampling() && !was_resampling {
            // Drop frames staged before the resampler was bypassed
            self.resampler.reset();
        }

        self.vocoder.set_pitch_scale(self.pitch_scale as f32);
        self.vocoder
            .set_stretch_ratio((params.tempo_ratio * self.pitch_scale) as f32);
    }

    fn process(&mut self, input: &[f32], frames: usize, output: &mut Vec<f32>) -> usize {
        output.clear();

        if !self.resampling() {
            return self.vocoder.process_block(input, frames, output);
        }

        self.stretched.clear();
        self.vocoder.process_block(input, frames, &mut self.stretched);
        match self.resampler.process(&self.stretched, output) {
            Ok(produced) => produced,
            Err(e) => {
                warn!("Resampler failed, dropping block: {}", e);
                output.clear();
                0
            }
        }
    }

    fn latency(&self) -> usize {
        let resampler = if self.resampling() {
            self.resampler.latency()
        } else {
            0
        };
        self.vocoder.latency() + resampler
    }

    fn reset(&mut self) {
        self.vocoder.reset();
        self.resampler.reset();
        self.stretched.clear();
    }
}
