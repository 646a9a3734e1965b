//! Phase vocoder time-stretching with resampling-based pitch shift.
//!
//! This is the processing core of the vocoder engine. Tempo is changed by
//! the phase vocoder alone; pitch is changed by stretching an extra
//! `pitch_scale` and resampling the result by `1 / pitch_scale`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use deejay_audio::timestretcher::{FftSize, PhaseVocoder};
//!
//! let mut vocoder = PhaseVocoder::new(FftSize::Medium, 2);
//! vocoder.set_stretch_ratio(1.5); // 50% longer, same pitch
//!
//! let mut out = Vec::new();
//! let produced = vocoder.process_block(&interleaved, frames, &mut out);
//! ```
//!
//! # Algorithm Details
//!
//! 1. Windowing input into overlapping frames (STFT, 87.5% overlap)
//! 2. Converting to frequency domain via FFT
//! 3. Manipulating phase to stretch/compress time
//! 4. Converting back via IFFT
//! 5. Overlap-add at the stretched hop to reconstruct signal
//!
//! Output is produced one synthesis hop at a time, so a block may yield zero
//! frames or several hops worth. The first output frame corresponds to the
//! input `size - hop` frames earlier.

#[cfg(feature = "vocoder")]
mod phase;
#[cfg(feature = "vocoder")]
mod resample;
#[cfg(feature = "vocoder")]
mod stft;

#[cfg(feature = "vocoder")]
pub use phase::{PhaseLockMode, PhaseVocoder, MAX_STRETCH, MIN_STRETCH};
#[cfg(feature = "vocoder")]
pub use resample::{PitchResampler, ResamplerQuality};
#[cfg(feature = "vocoder")]
pub use stft::Stft;

/// FFT size options for the vocoder engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftSize {
    /// 1024 samples - lower latency, less frequency resolution
    Small = 1024,
    /// 2048 samples - balanced (recommended)
    #[default]
    Medium = 2048,
    /// 4096 samples - higher quality, more latency
    Large = 4096,
}

impl FftSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn hop_size(self) -> usize {
        // 87.5% overlap keeps the synthesis hop inside the frame up to MAX_STRETCH
        self.as_usize() / 8
    }

    /// Parse a config name ("small", "medium", "large")
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "small" | "1024" => Some(FftSize::Small),
            "medium" | "2048" => Some(FftSize::Medium),
            "large" | "4096" => Some(FftSize::Large),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FftSize::Small => "small",
            FftSize::Medium => "medium",
            FftSize::Large => "large",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_size_names() {
        assert_eq!(FftSize::from_name("Large"), Some(FftSize::Large));
        assert_eq!(FftSize::from_name("2048"), Some(FftSize::Medium));
        assert_eq!(FftSize::from_name("huge"), None);
        assert_eq!(FftSize::Small.name(), "small");
        assert_eq!(FftSize::default(), FftSize::Medium);
    }
}
