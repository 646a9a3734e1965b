//! Stretch/pitch processor - owns an engine and keeps it in sync with `Parameters`

use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::engine::{build_engine, EngineKind, EngineOptions, EngineSpec, StretchEngine};
use crate::error::StretchError;
use crate::params::Parameters;
use crate::timestretcher::FftSize;
use tracing::debug;

/// Advertised tempo ratio range
pub const TEMPO_RANGE: (f64, f64) = (0.5, 2.5);
/// Advertised pitch range in semitones
pub const PITCH_RANGE: (f64, f64) = (-12.0, 12.0);

/// Maps `Parameters` onto a stretch engine.
///
/// Tempo/pitch changes reconfigure the engine in place. A change to the
/// quality options rebuilds it, since engines cannot change those.
pub struct StretchProcessor {
    spec: EngineSpec,
    kind: EngineKind,
    parameters: Parameters,
    engine: Option<Box<dyn StretchEngine>>,
}

impl StretchProcessor {
    /// Create a processor running the best available engine
    pub fn new(sample_rate: f64, channels: usize, defaults: Parameters) -> Result<Self, StretchError> {
        Self::with_engine(EngineKind::preferred(), FftSize::default(), sample_rate, channels, defaults)
    }

    pub fn with_engine(
        kind: EngineKind,
        fft_size: FftSize,
        sample_rate: f64,
        channels: usize,
        defaults: Parameters,
    ) -> Result<Self, StretchError> {
        StretchError::check_format(sample_rate, channels)?;

        let mut processor = Self {
            spec: EngineSpec {
                sample_rate,
                channels,
                fft_size,
            },
            kind,
            parameters: defaults,
            engine: None,
        };
        processor.engine_mut();
        Ok(processor)
    }

    /// Store `parameters` and bring the engine in line with them
    pub fn set_parameters(&mut self, parameters: Parameters) {
        self.parameters = parameters;

        let wanted = EngineOptions::from_quality(&parameters.quality);
        if let Some(engine) = &self.engine {
            if engine.options() != wanted {
                debug!("Quality options changed, rebuilding engine: {:?}", wanted);
                self.engine = None;
            }
        }

        // A freshly built engine is configured from `self.parameters`
        self.engine_mut().configure(&parameters);
    }

    /// Last stored parameters (not read back from the engine)
    pub fn parameters(&self) -> Parameters {
        self.parameters
    }

    /// Run the engine. `output` is cleared and refilled; returns produced frames.
    pub fn process(&mut self, input: &[f32], frames: usize, output: &mut Vec<f32>) -> usize {
        self.engine_mut().process(input, frames, output)
    }

    /// Engine delay in frames, or the synthetic delay when no engine exists
    pub fn latency_samples(&self) -> usize {
        match &self.engine {
            Some(engine) => engine.latency(),
            None => self.spec.synthetic_latency(),
        }
    }

    /// Discard in-flight audio
    pub fn reset(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
        }
    }

    /// Drop the engine and return to default parameters.
    /// The next use builds a fresh engine.
    pub fn restore_defaults(&mut self) {
        self.parameters = Parameters::default();
        self.engine = None;
    }

    pub fn describe_endpoints(&self) -> Vec<EndpointDescriptor> {
        let p = &self.parameters;
        vec![
            EndpointDescriptor {
                id: "tempo",
                label: "Tempo Ratio",
                kind: EndpointKind::Slider,
                minimum: TEMPO_RANGE.0,
                maximum: TEMPO_RANGE.1,
                default_value: p.tempo_ratio,
                description: "Time-stretch control exposed to slider and numeric input.",
            },
            EndpointDescriptor {
                id: "pitch",
                label: "Pitch (semitones)",
                kind: EndpointKind::Slider,
                minimum: PITCH_RANGE.0,
                maximum: PITCH_RANGE.1,
                default_value: p.pitch_semitones,
                description: "Pitch shift in semitones, mapped to rotary or numeric control.",
            },
            EndpointDescriptor {
                id: "formant",
                label: "Formant Preservation",
                kind: EndpointKind::Slider,
                minimum: 0.0,
                maximum: 1.0,
                default_value: p.quality.formant_preservation as f64,
                description: "Blend between neutral and formant-preserving processing.",
            },
            EndpointDescriptor {
                id: "transient",
                label: "Transient Sensitivity",
                kind: EndpointKind::Slider,
                minimum: 0.0,
                maximum: 1.0,
                default_value: p.quality.transient_sensitivity as f64,
                description: "Higher values keep percussive edges sharper.",
            },
        ]
    }

    /// Kind of the running engine (the requested kind if none is built yet)
    pub fn engine_kind(&self) -> EngineKind {
        self.engine.as_ref().map_or(self.kind, |e| e.kind())
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.spec.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.spec.sample_rate
    }

    fn engine_mut(&mut self) -> &mut Box<dyn StretchEngine> {
        let spec = self.spec;
        let kind = self.kind;
        let parameters = self.parameters;
        self.engine
            .get_or_insert_with(|| build_engine(kind, &spec, &parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint;
    use crate::params::Quality;

    fn passthrough(channels: usize) -> StretchProcessor {
        StretchProcessor::with_engine(
            EngineKind::Passthrough,
            FftSize::Small,
            48000.0,
            channels,
            Parameters::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_format() {
        assert!(matches!(
            StretchProcessor::new(48000.0, 0, Parameters::default()),
            Err(StretchError::InvalidChannelCount(0))
        ));
        assert!(matches!(
            StretchProcessor::new(0.0, 2, Parameters::default()),
            Err(StretchError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn test_get_returns_stored_parameters() {
        let mut processor = passthrough(2);
        let params = Parameters {
            tempo_ratio: 1.25,
            pitch_semitones: -3.0,
            ..Parameters::default()
        };
        processor.set_parameters(params);
        assert_eq!(processor.parameters(), params);
    }

    #[test]
    fn test_passthrough_process_is_identity() {
        let mut processor = passthrough(2);
        let input: Vec<f32> = (0..1024).map(|i| i as f32 / 1024.0).collect();
        let mut output = Vec::new();

        assert_eq!(processor.process(&input, 512, &mut output), 512);
        assert_eq!(output, input);
        assert_eq!(processor.latency_samples(), 480);
    }

    #[test]
    fn test_endpoints_mirror_current_parameters() {
        let mut processor = passthrough(2);
        assert_eq!(processor.describe_endpoints().len(), 4);

        processor.set_parameters(Parameters {
            tempo_ratio: 1.5,
            pitch_semitones: 4.0,
            quality: Quality {
                formant_preservation: 0.25,
                transient_sensitivity: 0.75,
                high_quality: true,
            },
        });

        let endpoints = processor.describe_endpoints();
        assert_eq!(endpoints.len(), 4);
        assert_eq!(endpoint::find(&endpoints, "tempo").unwrap().default_value, 1.5);
        assert_eq!(endpoint::find(&endpoints, "pitch").unwrap().default_value, 4.0);
        assert_eq!(endpoint::find(&endpoints, "formant").unwrap().default_value, 0.25);
        assert_eq!(endpoint::find(&endpoints, "transient").unwrap().default_value, 0.75);

        let pitch = endpoint::find(&endpoints, "pitch").unwrap();
        assert_eq!((pitch.minimum, pitch.maximum), PITCH_RANGE);
        assert!(endpoints.iter().all(|e| e.kind == EndpointKind::Slider));
    }

    #[test]
    fn test_restore_defaults_rebuilds_lazily() {
        let mut processor = passthrough(1);
        processor.set_parameters(Parameters {
            tempo_ratio: 2.0,
            ..Parameters::default()
        });
        processor.restore_defaults();

        assert_eq!(processor.parameters(), Parameters::default());
        // Synthetic delay while no engine exists
        assert_eq!(processor.latency_samples(), 480);

        let mut output = Vec::new();
        assert_eq!(processor.process(&[0.5; 8], 8, &mut output), 8);
        assert_eq!(processor.engine_kind(), EngineKind::Passthrough);
    }

    #[cfg(feature = "vocoder")]
    #[test]
    fn test_quality_change_rebuilds_engine() {
        let mut processor = StretchProcessor::with_engine(
            EngineKind::Vocoder,
            FftSize::Small,
            48000.0,
            2,
            Parameters::default(),
        )
        .unwrap();

        // Prime the engine's input buffer: 200 frames is one 128-frame hop plus 72
        let input = vec![0.25; 200 * 2];
        let mut output = Vec::new();
        assert_eq!(processor.process(&input, 200, &mut output), 128);

        // Tempo-only change keeps the engine: 72 + 100 frames crosses the next hop
        processor.set_parameters(Parameters {
            tempo_ratio: 1.0,
            pitch_semitones: 0.0,
            quality: Quality::default(),
        });
        assert_eq!(processor.process(&input[..200], 100, &mut output), 128);

        // Quality change rebuilds: the fresh engine starts empty again
        processor.set_parameters(Parameters {
            quality: Quality {
                transient_sensitivity: 0.9,
                ..Quality::default()
            },
            ..Parameters::default()
        });
        assert_eq!(processor.process(&input[..200], 100, &mut output), 0);
        assert_eq!(processor.engine_kind(), EngineKind::Vocoder);
    }

    #[cfg(feature = "vocoder")]
    #[test]
    fn test_vocoder_latency_reported() {
        let processor = StretchProcessor::with_engine(
            EngineKind::Vocoder,
            FftSize::Medium,
            48000.0,
            2,
            Parameters::default(),
        )
        .unwrap();
        assert_eq!(processor.latency_samples(), 2048 - 256);
    }
}
