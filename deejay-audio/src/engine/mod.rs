//! Stretch engines - the replaceable processing unit behind a processor.
//!
//! Two implementations sit behind [`StretchEngine`]:
//! - [`VocoderEngine`]: phase vocoder stretch + resampled pitch (feature `vocoder`)
//! - [`PassthroughEngine`]: copies input unchanged, reports a synthetic delay
//!
//! [`build_engine`] picks one at construction time. When the vocoder is not
//! compiled in, or fails to construct, the passthrough engine is substituted
//! and the failure is only logged.

mod passthrough;
#[cfg(feature = "vocoder")]
mod vocoder;

pub use passthrough::PassthroughEngine;
#[cfg(feature = "vocoder")]
pub use vocoder::VocoderEngine;

use crate::params::{Parameters, Quality};
use crate::timestretcher::FftSize;
use tracing::{debug, warn};

/// Quality values above this enable the corresponding engine option
const OPTION_THRESHOLD: f32 = 0.6;

/// Synthetic delay reported when no real engine runs: 10ms
const SYNTHETIC_LATENCY_SECS: f64 = 0.01;

/// Engine implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Vocoder,
    Passthrough,
}

impl EngineKind {
    /// Best engine compiled into this build
    pub fn preferred() -> Self {
        if Self::Vocoder.is_available() {
            Self::Vocoder
        } else {
            Self::Passthrough
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            EngineKind::Vocoder => cfg!(feature = "vocoder"),
            EngineKind::Passthrough => true,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vocoder" => Some(EngineKind::Vocoder),
            "passthrough" => Some(EngineKind::Passthrough),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Vocoder => "vocoder",
            EngineKind::Passthrough => "passthrough",
        }
    }
}

/// Pitch processing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchMode {
    HighQuality,
    HighSpeed,
}

/// Transient handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientMode {
    /// Reset phases on detected onsets
    Crisp,
    /// Never reset phases
    Smooth,
}

/// Formant handling under pitch shift
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormantMode {
    Shifted,
    Preserved,
}

/// Options fixed when an engine is constructed.
///
/// An engine never changes these in place; different options mean a new engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub pitch_mode: PitchMode,
    pub transients: TransientMode,
    pub formants: FormantMode,
}

impl EngineOptions {
    pub fn from_quality(quality: &Quality) -> Self {
        Self {
            pitch_mode: if quality.high_quality {
                PitchMode::HighQuality
            } else {
                PitchMode::HighSpeed
            },
            transients: if quality.transient_sensitivity > OPTION_THRESHOLD {
                TransientMode::Smooth
            } else {
                TransientMode::Crisp
            },
            formants: if quality.formant_preservation > OPTION_THRESHOLD {
                FormantMode::Preserved
            } else {
                FormantMode::Shifted
            },
        }
    }
}

/// Stream format an engine is built for. Immutable for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSpec {
    pub sample_rate: f64,
    pub channels: usize,
    pub fft_size: FftSize,
}

impl EngineSpec {
    pub fn new(sample_rate: f64, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
            fft_size: FftSize::default(),
        }
    }

    /// 10ms worth of frames at this sample rate
    pub fn synthetic_latency(&self) -> usize {
        (self.sample_rate * SYNTHETIC_LATENCY_SECS) as usize
    }
}

/// Time-stretch/pitch-shift processing unit over interleaved f32 frames
pub trait StretchEngine: Send {
    fn kind(&self) -> EngineKind;

    /// Construction-time options
    fn options(&self) -> EngineOptions;

    /// Apply tempo and pitch. Quality is ignored; it is fixed at construction.
    fn configure(&mut self, params: &Parameters);

    /// Consume `frames` interleaved frames from `input`. `output` is cleared and
    /// filled with the produced interleaved frames, whose count is returned.
    /// The count may be zero, or differ from `frames` in either direction.
    fn process(&mut self, input: &[f32], frames: usize, output: &mut Vec<f32>) -> usize;

    /// Current algorithmic delay in frames
    fn latency(&self) -> usize;

    /// Drop all buffered audio
    fn reset(&mut self);
}

/// Build an engine of `kind`, falling back to passthrough if it cannot be built
pub fn build_engine(kind: EngineKind, spec: &EngineSpec, params: &Parameters) -> Box<dyn StretchEngine> {
    if kind == EngineKind::Vocoder {
        if let Some(engine) = build_vocoder(spec, params) {
            return engine;
        }
    }

    debug!(
        "Building passthrough engine ({} Hz, {} channels)",
        spec.sample_rate, spec.channels
    );
    Box::new(PassthroughEngine::new(spec, params))
}

#[cfg(feature = "vocoder")]
fn build_vocoder(spec: &EngineSpec, params: &Parameters) -> Option<Box<dyn StretchEngine>> {
    match VocoderEngine::new(spec, params) {
        Ok(engine) => {
            debug!(
                "Building vocoder engine ({} Hz, {} channels, {:?})",
                spec.sample_rate,
                spec.channels,
                engine.options()
            );
            Some(Box::new(engine))
        }
        Err(e) => {
            warn!("Vocoder engine unavailable, using passthrough: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "vocoder"))]
fn build_vocoder(_spec: &EngineSpec, _params: &Parameters) -> Option<Box<dyn StretchEngine>> {
    warn!("Vocoder engine not compiled in, using passthrough");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_thresholds() {
        let options = EngineOptions::from_quality(&Quality::default());
        assert_eq!(options.pitch_mode, PitchMode::HighQuality);
        assert_eq!(options.transients, TransientMode::Crisp);
        assert_eq!(options.formants, FormantMode::Shifted);

        // Strictly greater than 0.6
        let options = EngineOptions::from_quality(&Quality {
            formant_preservation: 0.6,
            transient_sensitivity: 0.6,
            high_quality: false,
        });
        assert_eq!(options.pitch_mode, PitchMode::HighSpeed);
        assert_eq!(options.transients, TransientMode::Crisp);
        assert_eq!(options.formants, FormantMode::Shifted);

        let options = EngineOptions::from_quality(&Quality {
            formant_preservation: 0.61,
            transient_sensitivity: 0.9,
            high_quality: true,
        });
        assert_eq!(options.transients, TransientMode::Smooth);
        assert_eq!(options.formants, FormantMode::Preserved);
    }

    #[test]
    fn test_synthetic_latency_is_10ms() {
        assert_eq!(EngineSpec::new(48000.0, 2).synthetic_latency(), 480);
        assert_eq!(EngineSpec::new(44100.0, 1).synthetic_latency(), 441);
    }

    #[test]
    fn test_engine_kind_names() {
        assert_eq!(EngineKind::from_name("Vocoder"), Some(EngineKind::Vocoder));
        assert_eq!(EngineKind::from_name("passthrough"), Some(EngineKind::Passthrough));
        assert_eq!(EngineKind::from_name("rubberband"), None);
        assert!(EngineKind::Passthrough.is_available());
    }

    #[test]
    fn test_build_passthrough() {
        let spec = EngineSpec::new(48000.0, 2);
        let engine = build_engine(EngineKind::Passthrough, &spec, &Parameters::default());
        assert_eq!(engine.kind(), EngineKind::Passthrough);
        assert_eq!(engine.latency(), 480);
    }

    #[test]
    fn test_build_preferred() {
        let spec = EngineSpec::new(48000.0, 2);
        let engine = build_engine(EngineKind::preferred(), &spec, &Parameters::default());
        assert_eq!(engine.kind(), EngineKind::preferred());
        assert_eq!(
            engine.options(),
            EngineOptions::from_quality(&Quality::default())
        );
    }
}
