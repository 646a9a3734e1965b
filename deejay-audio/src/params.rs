//! Value types flowing from the user-facing controls down to the engine

/// Engine quality settings. Baked into an engine when it is constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality {
    /// Formant preservation amount (0.0 - 1.0)
    pub formant_preservation: f32,
    /// Transient sensitivity (0.0 - 1.0)
    pub transient_sensitivity: f32,
    /// High quality pitch mode (false = high speed)
    pub high_quality: bool,
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            formant_preservation: 0.5,
            transient_sensitivity: 0.5,
            high_quality: true,
        }
    }
}

/// Parameters of the stretch/pitch processor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    /// Time ratio (0.5 - 2.5, 1.0 = unchanged)
    pub tempo_ratio: f64,
    /// Pitch shift in semitones (-12 to +12)
    pub pitch_semitones: f64,
    pub quality: Quality,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            tempo_ratio: 1.0,
            pitch_semitones: 0.0,
            quality: Quality::default(),
        }
    }
}

impl Parameters {
    /// Pitch scale factor: 2^(semitones/12)
    #[inline]
    pub fn pitch_scale(&self) -> f64 {
        semitones_to_ratio(self.pitch_semitones)
    }
}

/// User-facing controls of the latency-compensated processor.
///
/// Values are not range-checked; `manual_latency_samples` below zero counts as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controls {
    pub tempo_ratio: f64,
    pub pitch_semitones: f64,
    /// Extra delay in samples added on top of the engine latency
    pub manual_latency_samples: i32,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            tempo_ratio: 1.0,
            pitch_semitones: 0.0,
            manual_latency_samples: 0,
        }
    }
}

impl Controls {
    /// Manual latency with negative values clamped to zero
    #[inline]
    pub fn manual_latency(&self) -> usize {
        self.manual_latency_samples.max(0) as usize
    }
}

/// Convert semitones to a frequency ratio
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0f64.powf(semitones / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semitones_to_ratio() {
        assert!((semitones_to_ratio(0.0) - 1.0).abs() < 1e-12);
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-12);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-12);
        assert!((semitones_to_ratio(7.0) - 1.498307).abs() < 1e-5);
    }

    #[test]
    fn test_manual_latency_clamps_negative() {
        let controls = Controls {
            manual_latency_samples: -300,
            ..Controls::default()
        };
        assert_eq!(controls.manual_latency(), 0);

        let controls = Controls {
            manual_latency_samples: 512,
            ..Controls::default()
        };
        assert_eq!(controls.manual_latency(), 512);
    }

    #[test]
    fn test_defaults() {
        let params = Parameters::default();
        assert_eq!(params.tempo_ratio, 1.0);
        assert_eq!(params.pitch_semitones, 0.0);
        assert!(params.quality.high_quality);
        assert_eq!(params.pitch_scale(), 1.0);
    }
}
