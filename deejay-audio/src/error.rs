//! Error types for processor construction and configuration I/O

use thiserror::Error;

/// Errors that can occur while building a processor or persisting its config
#[derive(Error, Debug)]
pub enum StretchError {
    #[error("Invalid channel count: {0} (must be at least 1)")]
    InvalidChannelCount(usize),
    #[error("Invalid sample rate: {0} Hz (must be finite and positive)")]
    InvalidSampleRate(f64),
    #[error("Resampler error: {0}")]
    Resampler(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StretchError {
    /// Validate the immutable stream format shared by every engine
    pub fn check_format(sample_rate: f64, channels: usize) -> Result<(), Self> {
        if channels == 0 {
            return Err(Self::InvalidChannelCount(channels));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(Self::InvalidSampleRate(sample_rate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_format() {
        assert!(StretchError::check_format(48000.0, 2).is_ok());
        assert!(matches!(
            StretchError::check_format(48000.0, 0),
            Err(StretchError::InvalidChannelCount(0))
        ));
        assert!(matches!(
            StretchError::check_format(0.0, 2),
            Err(StretchError::InvalidSampleRate(_))
        ));
        assert!(StretchError::check_format(f64::NAN, 1).is_err());
        assert!(StretchError::check_format(-44100.0, 1).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = StretchError::InvalidChannelCount(0);
        assert!(err.to_string().contains("channel count"));
    }
}
