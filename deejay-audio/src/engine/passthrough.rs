//! Passthrough engine used when no stretching engine is available

use super::{EngineKind, EngineOptions, EngineSpec, StretchEngine};
use crate::params::Parameters;

/// Copies input to output unchanged and reports a fixed synthetic delay
pub struct PassthroughEngine {
    channels: usize,
    latency: usize,
    options: EngineOptions,
}

impl PassthroughEngine {
    pub fn new(spec: &EngineSpec, params: &Parameters) -> Self {
        Self {
            channels: spec.channels.max(1),
            latency: spec.synthetic_latency(),
            options: EngineOptions::from_quality(&params.quality),
        }
    }
}

impl StretchEngine for PassthroughEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Passthrough
    }

    fn options(&self) -> EngineOptions {
        self.options
    }

    fn configure(&mut self, _params: &Parameters) {}

    fn process(&mut self, input: &[f32], frames: usize, output: &mut Vec<f32>) -> usize {
        let frames = frames.min(input.len() / self.channels);
        output.clear();
        output.extend_from_slice(&input[..frames * self.channels]);
        frames
    }

    fn latency(&self) -> usize {
        self.latency
    }

    fn reset(&mut self) {}
}
