//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for the spectrum-peak fallback estimator. The time-domain
//! autocorrelation estimator in [`crate::pitch`] is the primary path; this
//! module only runs when the fallback is enabled and autocorrelation found no
//! usable peak.
//!
//! ## Features
//! - RustFFT plans cached per window size
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::audio::AudioFrame;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the buffer in place.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Forward FFT over frames of one fixed size.
pub struct SpectrumAnalyzer {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self { size, fft }
    }

    /// Returns the magnitude of bins `0..size/2` (DC up to, not including, Nyquist).
    ///
    /// The signal is DC-corrected and Hann-windowed first. A frame of a
    /// different length yields an empty spectrum.
    pub fn magnitudes(&self, frame: &AudioFrame) -> Vec<f32> {
        if frame.len() != self.size {
            return Vec::new();
        }

        let mut processed = frame.samples().to_vec();
        remove_dc_offset(&mut processed);
        apply_hann_window(&mut processed);

        let mut buffer: Vec<Complex<f32>> = processed
            .into_iter()
            .map(|sample| Complex { re: sample, im: 0.0 })
            .collect();

        self.fft.process(&mut buffer);

        buffer
            .iter()
            .take(self.size / 2)
            .map(|c| c.norm())
            .collect()
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .finish()
    }
}
