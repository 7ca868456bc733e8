//! # Pitch Detection Module
//!
//! Fundamental-frequency estimation for a single guitar string.
//!
//! ## Features
//! - Time-domain autocorrelation with an RMS noise gate
//! - Edge trimming to stabilize the lag search
//! - Parabolic interpolation for sub-sample accuracy
//! - Spectrum-peak fallback for when only magnitudes are available

use crate::audio::AudioFrame;

/// Default RMS level below which a frame counts as silence.
pub const DEFAULT_RMS_THRESHOLD: f32 = 0.01;

/// Default amplitude under which samples count as near a zero crossing.
pub const DEFAULT_TRIM_THRESHOLD: f32 = 0.2;

/// Outcome of one estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchEstimate {
    /// A fundamental frequency in Hz.
    Voiced(f32),
    /// The frame was below the quietness threshold.
    Silent,
    /// Loud enough, but no usable periodicity peak was found.
    Indeterminate,
}

impl PitchEstimate {
    pub fn frequency(self) -> Option<f32> {
        match self {
            PitchEstimate::Voiced(freq) => Some(freq),
            PitchEstimate::Silent | PitchEstimate::Indeterminate => None,
        }
    }
}

/// Autocorrelation pitch estimator.
///
/// Stateless apart from its thresholds: the same frame always produces the
/// same estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimator {
    rms_threshold: f32,
    trim_threshold: f32,
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RMS_THRESHOLD, DEFAULT_TRIM_THRESHOLD)
    }
}

impl PitchEstimator {
    pub fn new(rms_threshold: f32, trim_threshold: f32) -> Self {
        Self {
            rms_threshold,
            trim_threshold,
        }
    }

    /// Estimates the fundamental frequency of `frame`.
    pub fn estimate(&self, frame: &AudioFrame) -> PitchEstimate {
        detect_pitch_autocorrelation(
            frame.samples(),
            frame.sample_rate(),
            self.rms_threshold,
            self.trim_threshold,
        )
    }
}

/// Autocorrelation pitch detection over a raw sample slice.
///
/// # Arguments
/// * `signal` - Time-domain samples, DC-centred
/// * `sample_rate` - Sample rate in Hz
/// * `rms_threshold` - Frames quieter than this are `Silent`
/// * `trim_threshold` - Amplitude used to locate the trim points at both edges
///
/// # Returns
/// * `Voiced(frequency)` - Estimated fundamental in Hz
/// * `Silent` / `Indeterminate` - No pitch for this frame
pub fn detect_pitch_autocorrelation(
    signal: &[f32],
    sample_rate: u32,
    rms_threshold: f32,
    trim_threshold: f32,
) -> PitchEstimate {
    if signal.is_empty() || sample_rate == 0 {
        return PitchEstimate::Silent;
    }

    // --- Noise gate ---
    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt();
    if rms < rms_threshold {
        return PitchEstimate::Silent;
    }

    let trimmed = trim_edges(signal, trim_threshold);
    let max_lag = trimmed.len() / 2;
    if max_lag < 3 {
        return PitchEstimate::Indeterminate;
    }

    // --- Unnormalized autocorrelation ---
    let correlation: Vec<f32> = (0..max_lag)
        .map(|lag| {
            trimmed[..trimmed.len() - lag]
                .iter()
                .zip(&trimmed[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect();

    // --- Walk past the zero-lag peak down to the first local minimum ---
    let mut start = 0;
    while start + 1 < max_lag && correlation[start] > correlation[start + 1] {
        start += 1;
    }

    let Some(peak) = correlation[start..]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(offset, _)| start + offset)
    else {
        return PitchEstimate::Indeterminate;
    };

    // A peak on either edge of the search has no neighbours and is not a period.
    if peak == 0 || peak + 1 >= max_lag || correlation[peak] <= 0.0 {
        return PitchEstimate::Indeterminate;
    }

    // --- Parabolic interpolation ---
    let x1 = correlation[peak - 1];
    let x2 = correlation[peak];
    let x3 = correlation[peak + 1];
    let a = (x1 - 2.0 * x2 + x3) / 2.0;
    let b = (x3 - x1) / 2.0;
    let period = if a != 0.0 {
        peak as f32 - b / (2.0 * a)
    } else {
        peak as f32
    };

    let frequency = sample_rate as f32 / period;
    let nyquist = sample_rate as f32 / 2.0;
    if frequency.is_finite() && frequency > 0.0 && frequency < nyquist {
        PitchEstimate::Voiced(frequency)
    } else {
        PitchEstimate::Indeterminate
    }
}

/// Drops the leading and trailing samples up to the first near-zero sample
/// found from each edge, so the lag search starts and ends near zero crossings.
fn trim_edges(signal: &[f32], threshold: f32) -> &[f32] {
    let size = signal.len();
    let half = size / 2;

    let start = signal[..half]
        .iter()
        .position(|s| s.abs() < threshold)
        .unwrap_or(0);
    let end = (1..half)
        .map(|i| size - i)
        .find(|&i| signal[i].abs() < threshold)
        .unwrap_or(size - 1);

    if start < end { &signal[start..end] } else { &signal[..0] }
}

/// Coarse pitch estimate from a precomputed magnitude spectrum.
///
/// Returns the centre frequency of the strongest bin. Resolution is limited
/// to one bin (`nyquist / bins`), so this is only a degraded fallback.
///
/// # Arguments
/// * `magnitudes` - Bins from DC up to Nyquist
/// * `sample_rate` - Sample rate in Hz
pub fn estimate_from_spectrum(magnitudes: &[f32], sample_rate: u32) -> PitchEstimate {
    let Some((max_index, &max_value)) = magnitudes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    else {
        return PitchEstimate::Indeterminate;
    };

    if max_index == 0 || max_value <= 0.0 || !max_value.is_finite() {
        return PitchEstimate::Indeterminate;
    }

    let nyquist = sample_rate as f32 / 2.0;
    PitchEstimate::Voiced(max_index as f32 * nyquist / magnitudes.len() as f32)
}
