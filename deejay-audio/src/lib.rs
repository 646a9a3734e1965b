//! Tempo/pitch processing for Deejay
//!
//! - Params: tempo, pitch and quality value types
//! - Engine: replaceable stretch engines (phase vocoder or passthrough)
//! - Stretch: keeps an engine in sync with parameter changes
//! - Latency: pads engine output so downstream sees a fixed total delay
//! - Config: persisted processor settings

mod config;
pub mod endpoint;
pub mod engine;
mod error;
mod latency;
mod params;
mod stretch;
pub mod timestretcher;

pub use config::ProcessorConfig;
pub use endpoint::{ControlEndpoint, EndpointDescriptor, EndpointKind};
pub use engine::{build_engine, EngineKind, EngineOptions, EngineSpec, StretchEngine};
pub use error::StretchError;
pub use latency::{LatencyCompensatedProcessor, MANUAL_LATENCY_RANGE};
pub use params::{semitones_to_ratio, Controls, Parameters, Quality};
pub use stretch::{StretchProcessor, PITCH_RANGE, TEMPO_RANGE};
pub use timestretcher::FftSize;
