//! Streaming resampler that turns a stretched signal into a pitch shift.
//!
//! rubato's fixed-input resamplers want exact chunks, so incoming frames are
//! staged per channel until a full chunk is available.

use crate::error::StretchError;
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::warn;

/// Input frames per resampler call
const CHUNK_FRAMES: usize = 256;

/// Resample ratios reachable from the initial ratio of 1.0 (covers ±12 semitones)
pub const MIN_RATIO: f64 = 0.5;
pub const MAX_RATIO: f64 = 2.0;
const MAX_RELATIVE_RATIO: f64 = 2.5;

/// Interpolation quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplerQuality {
    /// Windowed sinc interpolation
    Sinc,
    /// Cubic polynomial interpolation
    Polynomial,
}

enum Inner {
    Sinc(SincFixedIn<f32>),
    Fast(FastFixedIn<f32>),
}

// Both variants implement the same trait; dispatch without boxing.
macro_rules! with_inner {
    ($inner:expr, $r:ident => $body:expr) => {
        match $inner {
            Inner::Sinc($r) => $body,
            Inner::Fast($r) => $body,
        }
    };
}

/// Variable-ratio resampler over interleaved frames
pub struct PitchResampler {
    inner: Inner,
    channels: usize,
    ratio: f64,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
    /// Planar output of one chunk
    chunk_out: Vec<Vec<f32>>,
}

impl PitchResampler {
    pub fn new(quality: ResamplerQuality, channels: usize) -> Result<Self, StretchError> {
        let inner = match quality {
            ResamplerQuality::Sinc => {
                let params = SincInterpolationParameters {
                    sinc_len: 128,
                    f_cutoff: 0.95,
                    oversampling_factor: 128,
                    interpolation: SincInterpolationType::Linear,
                    window: WindowFunction::BlackmanHarris2,
                };
                SincFixedIn::<f32>::new(1.0, MAX_RELATIVE_RATIO, params, CHUNK_FRAMES, channels)
                    .map(Inner::Sinc)
            }
            ResamplerQuality::Polynomial => FastFixedIn::<f32>::new(
                1.0,
                MAX_RELATIVE_RATIO,
                PolynomialDegree::Cubic,
                CHUNK_FRAMES,
                channels,
            )
            .map(Inner::Fast),
        }
        .map_err(|e| StretchError::Resampler(e.to_string()))?;

        let chunk_out = with_inner!(&inner, r => r.output_buffer_allocate(true));

        Ok(Self {
            inner,
            channels,
            ratio: 1.0,
            pending: (0..channels)
                .map(|_| Vec::with_capacity(CHUNK_FRAMES * 2))
                .collect(),
            chunk_out,
        })
    }

    /// Output/input rate ratio (clamped to 0.5 - 2.0)
    pub fn set_ratio(&mut self, ratio: f64) -> Result<(), StretchError> {
        let ratio = if ratio.is_finite() {
            ratio.clamp(MIN_RATIO, MAX_RATIO)
        } else {
            1.0
        };
        let result = with_inner!(&mut self.inner, r => r.set_resample_ratio(ratio, false));
        result.map_err(|e| StretchError::Resampler(e.to_string()))?;
        self.ratio = ratio;
        Ok(())
    }

    #[inline]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Delay introduced by the resampler, in output frames
    pub fn latency(&self) -> usize {
        with_inner!(&self.inner, r => r.output_delay())
    }

    /// Resample interleaved `input`, appending whole chunks of output to `output`.
    /// Returns the number of frames appended.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<usize, StretchError> {
        for frame in input.chunks_exact(self.channels) {
            for (pending, &sample) in self.pending.iter_mut().zip(frame) {
                pending.push(sample);
            }
        }

        let mut produced = 0;
        loop {
            let needed = with_inner!(&self.inner, r => r.input_frames_next());
            if self.pending[0].len() < needed {
                break;
            }

            let result = with_inner!(&mut self.inner, r => r.process_into_buffer(
                &self.pending,
                &mut self.chunk_out,
                None,
            ));
            let (read, written) = result.map_err(|e| StretchError::Resampler(e.to_string()))?;

            for pending in self.pending.iter_mut() {
                pending.drain(..read);
            }

            output.reserve(written * self.channels);
            for i in 0..written {
                for channel in &self.chunk_out {
                    output.push(channel[i]);
                }
            }
            produced += written;
        }

        Ok(produced)
    }

    /// Drop staged and in-flight audio. The current ratio stays in effect.
    pub fn reset(&mut self) {
        let ratio = self.ratio;
        let result = with_inner!(&mut self.inner, r => {
            r.reset();
            // rubato's reset also restores the construction ratio
            r.set_resample_ratio(ratio, false)
        });
        if let Err(e) = result {
            warn!("Failed to restore resample ratio {}: {}", ratio, e);
        }
        for pending in self.pending.iter_mut() {
            pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, channels: usize) -> Vec<f32> {
        (0..frames * channels)
            .map(|i| ((i / channels) as f32 * 0.01).sin())
            .collect()
    }

    /// The resampler's warm-up delay and last partial chunk may hold frames back
    fn assert_within_delay(rs: &PitchResampler, produced: usize, expected: usize) {
        let slack = rs.latency() + CHUNK_FRAMES / 8;
        assert!(
            produced <= expected + 4 && produced + slack >= expected,
            "produced {} frames, expected {} (slack {})",
            produced,
            expected,
            slack
        );
    }

    #[test]
    fn test_unity_ratio_keeps_frame_count() {
        let mut rs = PitchResampler::new(ResamplerQuality::Polynomial, 2).unwrap();
        let mut output = Vec::new();
        let produced = rs.process(&ramp(CHUNK_FRAMES * 8, 2), &mut output).unwrap();

        assert_eq!(output.len(), produced * 2);
        assert_within_delay(&rs, produced, CHUNK_FRAMES * 8);
    }

    #[test]
    fn test_half_ratio_halves_output() {
        for quality in [ResamplerQuality::Sinc, ResamplerQuality::Polynomial] {
            let mut rs = PitchResampler::new(quality, 1).unwrap();
            rs.set_ratio(0.5).unwrap();
            let mut output = Vec::new();
            let produced = rs.process(&ramp(CHUNK_FRAMES * 16, 1), &mut output).unwrap();

            assert_within_delay(&rs, produced, CHUNK_FRAMES * 8);
        }
    }

    #[test]
    fn test_reset_keeps_ratio() {
        for quality in [ResamplerQuality::Sinc, ResamplerQuality::Polynomial] {
            let mut rs = PitchResampler::new(quality, 1).unwrap();
            rs.set_ratio(0.5).unwrap();
            rs.reset();
            assert_eq!(rs.ratio(), 0.5);

            let mut output = Vec::new();
            let produced = rs.process(&ramp(CHUNK_FRAMES * 16, 1), &mut output).unwrap();
            assert_within_delay(&rs, produced, CHUNK_FRAMES * 8);
        }
    }

    #[test]
    fn test_partial_chunks_are_staged() {
        let mut rs = PitchResampler::new(ResamplerQuality::Polynomial, 2).unwrap();
        let mut output = Vec::new();

        assert_eq!(rs.process(&ramp(100, 2), &mut output).unwrap(), 0);
        assert!(output.is_empty());

        let produced = rs.process(&ramp(200, 2), &mut output).unwrap();
        assert!(produced > 0);
    }

    #[test]
    fn test_ratio_clamped() {
        let mut rs = PitchResampler::new(ResamplerQuality::Polynomial, 1).unwrap();
        rs.set_ratio(10.0).unwrap();
        assert_eq!(rs.ratio(), MAX_RATIO);
        rs.set_ratio(0.01).unwrap();
        assert_eq!(rs.ratio(), MIN_RATIO);
    }
}
