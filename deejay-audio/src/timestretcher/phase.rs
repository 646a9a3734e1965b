//! Phase vocoder for pitch-independent time-stretching.
//!
//! - Phase-locking to preserve harmonic relationships
//! - Transient detection with phase reset (preserves attack clarity)
//! - Spectral envelope correction for formant-preserving pitch shifts

use super::{stft::Stft, FftSize};
use rustfft::num_complex::Complex;
use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

/// Stretch range accepted by the vocoder
pub const MIN_STRETCH: f32 = 0.25;
pub const MAX_STRETCH: f32 = 5.0;

/// Spectral flux ratio above which a frame counts as a transient
const TRANSIENT_THRESHOLD: f32 = 0.5;

/// Half-width (bins) of the moving average used as spectral envelope
const ENVELOPE_RADIUS: usize = 6;

/// Largest gain the formant correction may apply to a bin
const MAX_FORMANT_GAIN: f32 = 8.0;

/// Phase locking modes for different quality/CPU trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseLockMode {
    /// No phase locking (fastest, most phasiness)
    None,
    /// Identity phase locking (good quality, low CPU)
    Identity,
    /// Peak-locked phase locking (best quality, higher CPU)
    #[default]
    PeakLocked,
}

/// Per-channel analysis/synthesis state
struct ChannelState {
    phase_accum: Vec<f32>,
    prev_phase: Vec<f32>,
    prev_mag: Vec<f32>,
    envelope: Vec<f32>,
}

impl ChannelState {
    fn new(num_bins: usize) -> Self {
        Self {
            phase_accum: vec![0.0; num_bins],
            prev_phase: vec![0.0; num_bins],
            prev_mag: vec![0.0; num_bins],
            envelope: vec![0.0; num_bins],
        }
    }

    fn reset(&mut self) {
        self.phase_accum.fill(0.0);
        self.prev_phase.fill(0.0);
        self.prev_mag.fill(0.0);
        self.envelope.fill(0.0);
    }
}

/// Phase vocoder processing interleaved blocks of any channel count
pub struct PhaseVocoder {
    stft: Stft,
    hop_size: usize,
    num_bins: usize,
    /// Time stretch ratio (1.0 = normal, 2.0 = double length)
    stretch_ratio: f32,
    /// Pitch scale applied downstream, used for formant correction
    pitch_scale: f32,
    /// Expected phase advance per bin (based on hop size)
    omega: Vec<f32>,
    state: Vec<ChannelState>,
    bins: Vec<Vec<Complex<f32>>>,
    out_bins: Vec<Vec<Complex<f32>>>,
    /// Peak bin indices for phase locking
    peaks: Vec<usize>,
    phase_lock_mode: PhaseLockMode,
    /// Reset phases on detected transients
    transient_reset: bool,
    transient_detected: bool,
    preserve_formants: bool,
}

impl PhaseVocoder {
    pub fn new(fft_size: FftSize, channels: usize) -> Self {
        let stft = Stft::new(fft_size, channels);
        let num_bins = stft.num_bins();
        let hop_size = stft.hop_size();
        let size = stft.size();

        // omega[k] = 2 * pi * k * hop_size / fft_size
        let omega: Vec<f32> = (0..num_bins)
            .map(|k| TWO_PI * k as f32 * hop_size as f32 / size as f32)
            .collect();

        Self {
            stft,
            hop_size,
            num_bins,
            stretch_ratio: 1.0,
            pitch_scale: 1.0,
            omega,
            state: (0..channels).map(|_| ChannelState::new(num_bins)).collect(),
            bins: vec![vec![Complex::new(0.0, 0.0); num_bins]; channels],
            out_bins: vec![vec![Complex::new(0.0, 0.0); num_bins]; channels],
            peaks: Vec::with_capacity(num_bins / 4),
            phase_lock_mode: PhaseLockMode::PeakLocked,
            transient_reset: true,
            transient_detected: false,
            preserve_formants: false,
        }
    }

    /// Set time stretch ratio (0.25 to 5.0)
    #[inline]
    pub fn set_stretch_ratio(&mut self, ratio: f32) {
        self.stretch_ratio = if ratio.is_finite() {
            ratio.clamp(MIN_STRETCH, MAX_STRETCH)
        } else {
            1.0
        };
    }

    #[inline]
    pub fn stretch_ratio(&self) -> f32 {
        self.stretch_ratio
    }

    #[inline]
    pub fn set_pitch_scale(&mut self, scale: f32) {
        self.pitch_scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
    }

    #[inline]
    pub fn set_phase_lock_mode(&mut self, mode: PhaseLockMode) {
        self.phase_lock_mode = mode;
    }

    #[inline]
    pub fn phase_lock_mode(&self) -> PhaseLockMode {
        self.phase_lock_mode
    }

    /// Enable/disable phase reset on transients
    #[inline]
    pub fn set_transient_reset(&mut self, enabled: bool) {
        self.transient_reset = enabled;
    }

    #[inline]
    pub fn set_preserve_formants(&mut self, enabled: bool) {
        self.preserve_formants = enabled;
    }

    /// Input-to-output delay in frames. Each drained hop starts at the oldest
    /// sample of the analysis window, one hop after it was filled.
    #[inline]
    pub fn latency(&self) -> usize {
        self.stft.size() - self.stft.hop_size()
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.stft.channels()
    }

    /// Process `frames` interleaved input frames, appending the stretched
    /// frames to `output`. Returns the number of frames appended.
    pub fn process_block(&mut self, input: &[f32], frames: usize, output: &mut Vec<f32>) -> usize {
        let channels = self.channels();
        let mut produced = 0;

        for frame in input.chunks_exact(channels).take(frames) {
            if self.stft.push_frame(frame) {
                self.process_frame();
                produced += self.stft.drain_into(output);
            }
        }

        produced
    }

    fn process_frame(&mut self) {
        self.stft.analyze(&mut self.bins);

        if self.transient_reset {
            self.detect_transients();
        } else {
            self.transient_detected = false;
        }

        self.process_phase();

        if self.preserve_formants && (self.pitch_scale - 1.0).abs() > f32::EPSILON {
            self.correct_formants();
        }

        self.stft.synthesize(&self.out_bins, self.stretch_ratio);

        for (state, bins) in self.state.iter_mut().zip(&self.bins) {
            for k in 0..self.num_bins {
                state.prev_phase[k] = bins[k].arg();
                state.prev_mag[k] = bins[k].norm();
            }
        }
    }

    /// Core phase processing algorithm
    fn process_phase(&mut self) {
        if self.phase_lock_mode != PhaseLockMode::None {
            self.find_peaks();
        }

        let hop_size = self.hop_size as f32;
        let stretch_ratio = self.stretch_ratio;
        let output_hop = hop_size * stretch_ratio;

        for ((state, bins), out_bins) in self
            .state
            .iter_mut()
            .zip(&self.bins)
            .zip(self.out_bins.iter_mut())
        {
            for k in 0..self.num_bins {
                let omega_k = self.omega[k];
                let mag = bins[k].norm();
                let phase = bins[k].arg();

                let expected_phase = state.prev_phase[k] + omega_k;
                let freq_dev = wrap_phase(phase - expected_phase) / hop_size;

                let new_phase = if self.transient_detected {
                    phase
                } else {
                    state.phase_accum[k] =
                        wrap_phase(state.phase_accum[k] + omega_k * stretch_ratio + freq_dev * output_hop);
                    state.phase_accum[k]
                };

                out_bins[k] = Complex::from_polar(mag, new_phase);
            }
        }

        match self.phase_lock_mode {
            PhaseLockMode::None => {}
            PhaseLockMode::Identity => self.apply_identity_lock(),
            PhaseLockMode::PeakLocked => self.apply_peak_phase_lock(),
        }
    }

    /// Bin is a peak if greater than its two neighbors on each side (summed over channels)
    fn find_peaks(&mut self) {
        self.peaks.clear();
        if self.num_bins < 5 {
            return;
        }

        let mag = |k: usize| -> f32 { self.bins.iter().map(|b| b[k].norm()).sum() };

        for k in 2..self.num_bins - 2 {
            let m = mag(k);
            if m > mag(k - 2) && m > mag(k - 1) && m > mag(k + 1) && m > mag(k + 2) {
                self.peaks.push(k);
            }
        }
    }

    /// Each bin keeps its analysis phase offset relative to the nearest peak
    fn apply_identity_lock(&mut self) {
        if self.peaks.is_empty() {
            return;
        }

        for (bins, out_bins) in self.bins.iter().zip(self.out_bins.iter_mut()) {
            let mut peak_idx = 0;
            for k in 0..self.num_bins {
                // Advance to the nearest peak
                while peak_idx + 1 < self.peaks.len()
                    && self.peaks[peak_idx + 1].abs_diff(k) < self.peaks[peak_idx].abs_diff(k)
                {
                    peak_idx += 1;
                }
                let peak = self.peaks[peak_idx];
                if peak == k {
                    continue;
                }

                let locked = out_bins[peak].arg() + bins[k].arg() - bins[peak].arg();
                out_bins[k] = Complex::from_polar(out_bins[k].norm(), locked);
            }
        }
    }

    /// Blend bins near each peak towards the peak's phase
    fn apply_peak_phase_lock(&mut self) {
        for &peak in &self.peaks {
            let peak_mag: f32 = self.bins.iter().map(|b| b[peak].norm()).sum();
            let radius = ((peak_mag * 10.0) as usize).clamp(1, 5);

            for out_bins in self.out_bins.iter_mut() {
                let peak_phase = out_bins[peak].arg();

                for j in 1..=radius {
                    let weight = 1.0 - j as f32 / (radius + 1) as f32;
                    let neighbors = [peak.checked_sub(j), Some(peak + j)];
                    for k in neighbors.into_iter().flatten() {
                        if k >= self.num_bins {
                            continue;
                        }
                        let bin = out_bins[k];
                        let blended = blend_phase(bin.arg(), peak_phase, weight);
                        out_bins[k] = Complex::from_polar(bin.norm(), blended);
                    }
                }
            }
        }
    }

    /// Spectral flux onset detection
    fn detect_transients(&mut self) {
        let mut flux = 0.0f32;
        let mut total = 0.0f32;

        for (state, bins) in self.state.iter().zip(&self.bins) {
            for k in 0..self.num_bins {
                let mag = bins[k].norm();
                let diff = mag - state.prev_mag[k];
                // Only count increases
                if diff > 0.0 {
                    flux += diff * diff;
                }
                total += mag * mag;
            }
        }

        let total = total.sqrt();
        let flux = flux.sqrt();
        self.transient_detected = total > 0.001 && flux / total > TRANSIENT_THRESHOLD;

        if self.transient_detected {
            for (state, bins) in self.state.iter_mut().zip(&self.bins) {
                for k in 0..self.num_bins {
                    state.phase_accum[k] = bins[k].arg();
                }
            }
        }
    }

    /// Rescale magnitudes so the envelope at `k * pitch_scale` lands on bin `k`,
    /// which keeps formants in place once the signal is resampled by `1 / pitch_scale`.
    fn correct_formants(&mut self) {
        let num_bins = self.num_bins;
        let scale = self.pitch_scale;

        for (state, out_bins) in self.state.iter_mut().zip(self.out_bins.iter_mut()) {
            // Moving-average envelope of the synthesis magnitudes
            let mut window_sum = 0.0f32;
            let mut window_len = 0usize;
            for k in 0..=ENVELOPE_RADIUS.min(num_bins - 1) {
                window_sum += out_bins[k].norm();
                window_len += 1;
            }
            for k in 0..num_bins {
                state.envelope[k] = window_sum / window_len as f32;
                let add = k + ENVELOPE_RADIUS + 1;
                if add < num_bins {
                    window_sum += out_bins[add].norm();
                    window_len += 1;
                }
                if k >= ENVELOPE_RADIUS {
                    window_sum -= out_bins[k - ENVELOPE_RADIUS].norm();
                    window_len -= 1;
                }
            }

            for k in 0..num_bins {
                let src = k as f32 * scale;
                let target = if src >= (num_bins - 1) as f32 {
                    0.0
                } else {
                    let i = src as usize;
                    let frac = src - i as f32;
                    state.envelope[i] * (1.0 - frac) + state.envelope[i + 1] * frac
                };

                let current = state.envelope[k];
                let gain = if current > 1e-9 {
                    (target / current).min(MAX_FORMANT_GAIN)
                } else {
                    0.0
                };
                out_bins[k] = out_bins[k] * gain;
            }
        }
    }

    /// Reset all state
    pub fn reset(&mut self) {
        self.stft.reset();
        for state in self.state.iter_mut() {
            state.reset();
        }
        self.transient_detected = false;
    }
}

/// Wrap phase to [-π, π]
#[inline(always)]
fn wrap_phase(phase: f32) -> f32 {
    phase - TWO_PI * ((phase + PI) / TWO_PI).floor()
}

/// Blend two phases on the unit circle
#[inline(always)]
fn blend_phase(phase1: f32, phase2: f32, weight: f32) -> f32 {
    let (s1, c1) = phase1.sin_cos();
    let (s2, c2) = phase2.sin_cos();

    let s = s1 * (1.0 - weight) + s2 * weight;
    let c = c1 * (1.0 - weight) + c2 * weight;

    s.atan2(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_block(frames: usize, channels: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = i as f32 / 48000.0;
                let s = (2.0 * PI * 440.0 * t).sin() * 0.5;
                std::iter::repeat(s).take(channels)
            })
            .collect()
    }

    #[test]
    fn test_vocoder_produces_output() {
        let mut pv = PhaseVocoder::new(FftSize::Small, 2);
        let input = sine_block(4096, 2);
        let mut output = Vec::new();

        let produced = pv.process_block(&input, 4096, &mut output);

        assert!(produced > 0);
        assert_eq!(output.len(), produced * 2);
    }

    #[test]
    fn test_stretch_ratio_scales_output() {
        let mut pv = PhaseVocoder::new(FftSize::Small, 1);
        pv.set_stretch_ratio(2.0);
        let input = sine_block(8192, 1);
        let mut output = Vec::new();

        let produced = pv.process_block(&input, 8192, &mut output);

        assert_eq!(produced, 16384);
    }

    #[test]
    fn test_output_can_be_empty_for_short_blocks() {
        let mut pv = PhaseVocoder::new(FftSize::Medium, 2);
        let input = sine_block(64, 2);
        let mut output = Vec::new();

        assert_eq!(pv.process_block(&input, 64, &mut output), 0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_stretch_ratio_clamping() {
        let mut pv = PhaseVocoder::new(FftSize::Medium, 2);

        pv.set_stretch_ratio(0.1);
        assert_eq!(pv.stretch_ratio(), MIN_STRETCH);

        pv.set_stretch_ratio(10.0);
        assert_eq!(pv.stretch_ratio(), MAX_STRETCH);

        pv.set_stretch_ratio(f32::NAN);
        assert_eq!(pv.stretch_ratio(), 1.0);
    }

    #[test]
    fn test_modes_stay_finite() {
        for mode in [PhaseLockMode::None, PhaseLockMode::Identity, PhaseLockMode::PeakLocked] {
            let mut pv = PhaseVocoder::new(FftSize::Small, 2);
            pv.set_phase_lock_mode(mode);
            pv.set_transient_reset(mode != PhaseLockMode::None);
            pv.set_preserve_formants(true);
            pv.set_pitch_scale(1.5);
            pv.set_stretch_ratio(1.3);

            let input = sine_block(8192, 2);
            let mut output = Vec::new();
            pv.process_block(&input, 8192, &mut output);

            assert!(!output.is_empty());
            assert!(output.iter().all(|s| s.is_finite()), "{:?}", mode);
        }
    }

    #[test]
    fn test_reset_restarts_latency() {
        let mut pv = PhaseVocoder::new(FftSize::Small, 1);
        let input = sine_block(2048, 1);
        let mut output = Vec::new();
        pv.process_block(&input, 2048, &mut output);
        pv.reset();

        output.clear();
        let produced = pv.process_block(&input[..100], 100, &mut output);
        assert_eq!(produced, 0);
        assert_eq!(pv.latency(), 1024 - 128);
    }

    #[test]
    fn test_impulse_lands_at_reported_latency() {
        let mut pv = PhaseVocoder::new(FftSize::Small, 1);
        pv.set_phase_lock_mode(PhaseLockMode::None);
        pv.set_transient_reset(false);

        let mut input = vec![0.0; 8192];
        input[2000] = 1.0;
        let mut output = Vec::new();
        assert_eq!(pv.process_block(&input, 8192, &mut output), 8192);

        let peak = output
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &s)| if s.abs() > best.1 { (i, s.abs()) } else { best });
        assert_eq!(peak.0, 2000 + pv.latency());
        assert!((peak.1 - 1.0).abs() < 0.05, "peak = {}", peak.1);
    }

    #[test]
    fn test_stretch_up_to_five_keeps_hop_inside_frame() {
        let mut pv = PhaseVocoder::new(FftSize::Small, 1);
        pv.set_stretch_ratio(5.0);
        assert_eq!(pv.stretch_ratio(), 5.0);

        let input = sine_block(4096, 1);
        let mut output = Vec::new();
        assert_eq!(pv.process_block(&input, 4096, &mut output), 4096 * 5);
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_phase_wrap() {
        assert!(wrap_phase(0.0).abs() < 0.001);
        assert!((wrap_phase(PI + 0.1) - (-PI + 0.1)).abs() < 0.001);
        assert!((wrap_phase(-PI - 0.1) - (PI - 0.1)).abs() < 0.001);
        assert!((wrap_phase(5.0 * TWO_PI + 0.3) - 0.3).abs() < 0.001);
    }
}
