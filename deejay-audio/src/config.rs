//! Processor settings persisted between sessions
//!
//! Stored as `key=value` lines in the user config directory.

use crate::engine::EngineKind;
use crate::error::StretchError;
use crate::params::{Controls, Parameters, Quality};
use crate::timestretcher::FftSize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Settings used to build a [`crate::LatencyCompensatedProcessor`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    pub sample_rate: f64,
    pub channels: usize,
    pub engine: EngineKind,
    pub fft_size: FftSize,
    pub tempo_ratio: f64,
    pub pitch_semitones: f64,
    /// Extra delay in samples; negative values count as zero
    pub manual_latency_samples: i32,
    pub formant_preservation: f32,
    pub transient_sensitivity: f32,
    pub high_quality: bool,
    /// Frames per block requested from the audio device
    pub buffer_frames: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        let quality = Quality::default();
        let controls = Controls::default();
        Self {
            sample_rate: 48000.0,
            channels: 2,
            engine: EngineKind::preferred(),
            fft_size: FftSize::default(),
            tempo_ratio: controls.tempo_ratio,
            pitch_semitones: controls.pitch_semitones,
            manual_latency_samples: controls.manual_latency_samples,
            formant_preservation: quality.formant_preservation,
            transient_sensitivity: quality.transient_sensitivity,
            high_quality: quality.high_quality,
            buffer_frames: 512,
        }
    }
}

impl ProcessorConfig {
    /// Load config from the default location
    ///
    /// Returns the default config if the file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, StretchError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save(&self) -> Result<(), StretchError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StretchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deejay")
            .join("processor.txt")
    }

    pub fn quality(&self) -> Quality {
        Quality {
            formant_preservation: self.formant_preservation,
            transient_sensitivity: self.transient_sensitivity,
            high_quality: self.high_quality,
        }
    }

    pub fn parameters(&self) -> Parameters {
        Parameters {
            tempo_ratio: self.tempo_ratio,
            pitch_semitones: self.pitch_semitones,
            quality: self.quality(),
        }
    }

    pub fn controls(&self) -> Controls {
        Controls {
            tempo_ratio: self.tempo_ratio,
            pitch_semitones: self.pitch_semitones,
            manual_latency_samples: self.manual_latency_samples,
        }
    }

    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "sample_rate" => parse_into(key, value, &mut config.sample_rate),
                "channels" => parse_into(key, value, &mut config.channels),
                "engine" => match EngineKind::from_name(value) {
                    Some(kind) => config.engine = kind,
                    None => warn!("Unknown engine '{}', keeping {}", value, config.engine.name()),
                },
                "fft_size" => match FftSize::from_name(value) {
                    Some(size) => config.fft_size = size,
                    None => warn!("Unknown fft_size '{}', keeping {}", value, config.fft_size.name()),
                },
                "tempo_ratio" => parse_into(key, value, &mut config.tempo_ratio),
                "pitch_semitones" => parse_into(key, value, &mut config.pitch_semitones),
                "manual_latency_samples" => parse_into(key, value, &mut config.manual_latency_samples),
                "formant_preservation" => parse_into(key, value, &mut config.formant_preservation),
                "transient_sensitivity" => parse_into(key, value, &mut config.transient_sensitivity),
                "high_quality" => parse_into(key, value, &mut config.high_quality),
                "buffer_frames" => parse_into(key, value, &mut config.buffer_frames),
                _ => {} // Ignore unknown keys
            }
        }

        config
    }

    fn serialize(&self) -> String {
        let lines = [
            "# Deejay processor configuration".to_string(),
            format!("sample_rate={}", self.sample_rate),
            format!("channels={}", self.channels),
            format!("engine={}", self.engine.name()),
            format!("fft_size={}", self.fft_size.name()),
            format!("tempo_ratio={}", self.tempo_ratio),
            format!("pitch_semitones={}", self.pitch_semitones),
            format!("manual_latency_samples={}", self.manual_latency_samples),
            format!("formant_preservation={}", self.formant_preservation),
            format!("transient_sensitivity={}", self.transient_sensitivity),
            format!("high_quality={}", self.high_quality),
            format!("buffer_frames={}", self.buffer_frames),
        ];
        lines.join("\n")
    }
}

/// Overwrite `slot` with the parsed value, or warn and keep the current one
fn parse_into<T>(key: &str, value: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!("Invalid value '{}' for {}, keeping {:?}", value, key, slot),
    }
}
