//! Latency-compensated processor.
//!
//! Wraps a [`StretchProcessor`] and pads its output with silence so that,
//! summed over blocks, downstream consumers see one fixed total latency:
//! the engine's delay plus a user-specified manual offset.
//!
//! The bookkeeping is a single counter, `pending_latency_samples`:
//! - every control update resets it to [`LatencyCompensatedProcessor::total_latency_samples`]
//! - every block drains it, first as leading zeros capped by what the engine
//!   produced, then any remainder as trailing zeros in the same block
//!
//! The engine delay is in frames and the manual offset in samples; the two
//! are added as-is.

use crate::config::ProcessorConfig;
use crate::endpoint::{self, ControlEndpoint, EndpointKind};
use crate::engine::EngineKind;
use crate::error::StretchError;
use crate::params::{Controls, Parameters, Quality};
use crate::stretch::{StretchProcessor, PITCH_RANGE, TEMPO_RANGE};
use crate::timestretcher::FftSize;
use tracing::trace;

/// Advertised manual latency range in samples
pub const MANUAL_LATENCY_RANGE: (f64, f64) = (0.0, 4096.0);

pub struct LatencyCompensatedProcessor {
    processor: StretchProcessor,
    controls: Controls,
    pending_latency_samples: usize,
    channels: usize,
    /// Engine output for the current block, reused across blocks
    processed: Vec<f32>,
}

impl LatencyCompensatedProcessor {
    /// Create a processor running the best available engine
    pub fn new(sample_rate: f64, channels: usize) -> Result<Self, StretchError> {
        let processor = StretchProcessor::new(sample_rate, channels, Parameters::default())?;
        Ok(Self::from_processor(processor, Controls::default()))
    }

    /// Create a processor from persisted settings, applying its controls and quality
    pub fn with_config(config: &ProcessorConfig) -> Result<Self, StretchError> {
        let processor = StretchProcessor::with_engine(
            config.engine,
            config.fft_size,
            config.sample_rate,
            config.channels,
            config.parameters(),
        )?;
        Ok(Self::from_processor(processor, config.controls()))
    }

    pub fn with_engine(
        kind: EngineKind,
        fft_size: FftSize,
        sample_rate: f64,
        channels: usize,
        quality: Quality,
        controls: Controls,
    ) -> Result<Self, StretchError> {
        let defaults = Parameters {
            tempo_ratio: controls.tempo_ratio,
            pitch_semitones: controls.pitch_semitones,
            quality,
        };
        let processor = StretchProcessor::with_engine(kind, fft_size, sample_rate, channels, defaults)?;
        Ok(Self::from_processor(processor, controls))
    }

    fn from_processor(processor: StretchProcessor, controls: Controls) -> Self {
        let channels = processor.channel_count();
        let mut this = Self {
            processor,
            controls,
            pending_latency_samples: 0,
            channels,
            processed: Vec::new(),
        };
        this.refresh_pending_latency();
        this
    }

    /// Replace the controls and restart the alignment drain
    pub fn update_controls(&mut self, controls: Controls) {
        self.controls = controls;

        // Quality stays as is; only tempo and pitch come from the controls
        let mut parameters = self.processor.parameters();
        parameters.tempo_ratio = controls.tempo_ratio;
        parameters.pitch_semitones = controls.pitch_semitones;
        self.processor.set_parameters(parameters);

        self.refresh_pending_latency();
    }

    pub fn current_controls(&self) -> Controls {
        self.controls
    }

    /// Change the engine quality options. Rebuilds the engine if they differ,
    /// then restarts the alignment drain.
    pub fn set_quality(&mut self, quality: Quality) {
        let mut parameters = self.processor.parameters();
        parameters.quality = quality;
        self.processor.set_parameters(parameters);
        self.refresh_pending_latency();
    }

    pub fn quality(&self) -> Quality {
        self.processor.parameters().quality
    }

    /// Discard in-flight audio and restart the alignment drain
    pub fn reset(&mut self) {
        self.processor.reset();
        self.refresh_pending_latency();
    }

    /// Process one block of `frames` interleaved frames.
    ///
    /// `output` is cleared and rewritten with
    /// `[leading zeros][engine output][trailing zeros]`, so its length is not
    /// tied to `frames`. Returns the number of frames the engine produced.
    pub fn process_block(&mut self, input: &[f32], frames: usize, output: &mut Vec<f32>) -> usize {
        debug_assert!(
            input.len() >= frames * self.channels,
            "input holds {} samples, {} frames requested",
            input.len(),
            frames
        );
        let frames = frames.min(input.len() / self.channels);

        let produced = self.processor.process(input, frames, &mut self.processed);

        output.clear();

        let capacity = produced * self.channels;
        let leading = self.pending_latency_samples.min(capacity);
        if leading > 0 {
            output.resize(leading, 0.0);
            self.pending_latency_samples -= leading;
        }

        output.extend_from_slice(&self.processed);

        // Whatever the cap held back is flushed now, not carried to later blocks
        if self.pending_latency_samples > 0 {
            trace!(
                "Flushing {} latency samples after {} produced frames",
                self.pending_latency_samples,
                produced
            );
            output.resize(output.len() + self.pending_latency_samples, 0.0);
            self.pending_latency_samples = 0;
        }

        produced
    }

    /// Engine delay plus the (non-negative) manual offset
    pub fn total_latency_samples(&self) -> usize {
        self.processor.latency_samples() + self.controls.manual_latency()
    }

    /// Latency still to be injected as silence
    pub fn pending_latency_samples(&self) -> usize {
        self.pending_latency_samples
    }

    pub fn control_endpoints(&self) -> Vec<ControlEndpoint> {
        let engine = self.processor.describe_endpoints();
        let range = |id: &str, fallback: (f64, f64)| {
            endpoint::find(&engine, id).map_or(fallback, |e| (e.minimum, e.maximum))
        };
        let tempo = range("tempo", TEMPO_RANGE);
        let pitch = range("pitch", PITCH_RANGE);

        vec![
            ControlEndpoint {
                id: "tempo",
                label: "Tempo",
                kind: EndpointKind::Slider,
                minimum: tempo.0,
                maximum: tempo.1,
                default_value: self.controls.tempo_ratio,
                description: "User-facing tempo slider bound to time-stretch ratio.",
            },
            ControlEndpoint {
                id: "pitch",
                label: "Pitch",
                kind: EndpointKind::Slider,
                minimum: pitch.0,
                maximum: pitch.1,
                default_value: self.controls.pitch_semitones,
                description: "Pitch slider or numeric input in semitones.",
            },
            ControlEndpoint {
                id: "manualLatency",
                label: "Manual Latency",
                kind: EndpointKind::Numeric,
                minimum: MANUAL_LATENCY_RANGE.0,
                maximum: MANUAL_LATENCY_RANGE.1,
                default_value: self.controls.manual_latency_samples as f64,
                description: "Additional latency compensation in samples, editable via numeric input.",
            },
        ]
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.processor.engine_kind()
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.processor.sample_rate()
    }

    fn refresh_pending_latency(&mut self) {
        self.pending_latency_samples = self.total_latency_samples();
    }
}
