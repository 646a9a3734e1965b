//! Multi-channel Short-Time Fourier Transform for block time-stretching.
//!
//! Features:
//! - rustfft forward/inverse plans shared across channels
//! - 87.5% overlap Hann analysis and synthesis windows
//! - Variable synthesis hop with fractional carry (no tempo drift)
//! - Circular input and overlap-add buffers, allocated once

use super::FftSize;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Mean of the squared Hann window
const HANN_SQUARED_OLA: f32 = 0.375;

/// Short-Time Fourier Transform processor over interleaved frames
pub struct Stft {
    size: usize,
    hop_size: usize,
    channels: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// Per-channel circular input buffers
    input: Vec<Vec<f32>>,
    /// Per-channel overlap-add buffers (2x frame size)
    output: Vec<Vec<f32>>,
    input_pos: usize,
    output_pos: usize,
    /// Frames ready to be drained from the overlap-add buffers
    output_available: usize,
    /// Fractional part of the synthesis hop carried to the next frame
    hop_remainder: f32,
    work: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Stft {
    pub fn new(fft_size: FftSize, channels: usize) -> Self {
        let size = fft_size.as_usize();
        let hop_size = fft_size.hop_size();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());

        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect();

        Self {
            size,
            hop_size,
            channels,
            window,
            fft,
            ifft,
            input: vec![vec![0.0; size]; channels],
            output: vec![vec![0.0; size * 2]; channels],
            input_pos: 0,
            output_pos: 0,
            output_available: 0,
            hop_remainder: 0.0,
            work: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of positive frequency bins (size/2 + 1)
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Push one interleaved frame, returns true when an analysis frame is ready
    pub fn push_frame(&mut self, frame: &[f32]) -> bool {
        debug_assert_eq!(frame.len(), self.channels);
        for (buffer, &sample) in self.input.iter_mut().zip(frame) {
            buffer[self.input_pos] = sample;
        }
        self.input_pos = (self.input_pos + 1) % self.size;

        self.input_pos % self.hop_size == 0
    }

    /// Forward FFT of the current input frame, one bin vector per channel
    pub fn analyze(&mut self, bins: &mut [Vec<Complex<f32>>]) {
        let num_bins = self.num_bins();
        for (ch, out) in bins.iter_mut().enumerate().take(self.channels) {
            // input_pos points at the oldest sample
            let input = &self.input[ch];
            for (i, w) in self.window.iter().enumerate() {
                let idx = (self.input_pos + i) % self.size;
                self.work[i] = Complex::new(input[idx] * w, 0.0);
            }

            self.fft
                .process_with_scratch(&mut self.work, &mut self.scratch);
            out[..num_bins].copy_from_slice(&self.work[..num_bins]);
        }
    }

    /// Inverse FFT and overlap-add, advancing the output by `hop * stretch` frames
    pub fn synthesize(&mut self, bins: &[Vec<Complex<f32>>], stretch: f32) {
        let exact_hop = self.hop_size as f32 * stretch + self.hop_remainder;
        let output_hop = (exact_hop.floor() as usize).clamp(1, self.size);
        self.hop_remainder = exact_hop - output_hop as f32;

        // IFFT is unnormalized; also compensate for the overlap density
        let gain = output_hop as f32 / (HANN_SQUARED_OLA * self.size as f32 * self.size as f32);

        let num_bins = self.num_bins();
        for (ch, input) in bins.iter().enumerate().take(self.channels) {
            // Hermitian symmetry for a real output
            self.work[..num_bins].copy_from_slice(&input[..num_bins]);
            for i in 1..self.size / 2 {
                self.work[self.size - i] = input[i].conj();
            }

            self.ifft
                .process_with_scratch(&mut self.work, &mut self.scratch);

            let out = &mut self.output[ch];
            let out_len = out.len();
            for i in 0..self.size {
                let idx = (self.output_pos + self.output_available + i) % out_len;
                out[idx] += self.work[i].re * self.window[i] * gain;
            }
        }

        self.output_available += output_hop;
    }

    /// Append every completed frame to `output` (interleaved), returns frames written
    pub fn drain_into(&mut self, output: &mut Vec<f32>) -> usize {
        let frames = self.output_available;
        let out_len = self.size * 2;
        output.reserve(frames * self.channels);

        for _ in 0..frames {
            for buffer in self.output.iter_mut() {
                output.push(buffer[self.output_pos]);
                buffer[self.output_pos] = 0.0;
            }
            self.output_pos = (self.output_pos + 1) % out_len;
        }

        self.output_available = 0;
        frames
    }

    /// Reset all buffers
    pub fn reset(&mut self) {
        for buffer in self.input.iter_mut().chain(self.output.iter_mut()) {
            buffer.fill(0.0);
        }
        self.input_pos = 0;
        self.output_pos = 0;
        self.output_available = 0;
        self.hop_remainder = 0.0;
    }
}
