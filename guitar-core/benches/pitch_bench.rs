//! Benchmarks for pitch estimation.
//!
//! Run with: cargo bench -p guitar-core
//!
//! The GUI ticks every 16ms, so one estimate at the default window of 4096
//! samples has to fit comfortably inside that.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use guitar_core::fft::SpectrumAnalyzer;
use guitar_core::pitch::estimate_from_spectrum;
use guitar_core::{AudioFrame, PitchEstimator, StringMatcher, tuning::standard_profile};

/// Analysis windows worth comparing.
const WINDOW_SIZES: &[usize] = &[1024, 2048, 4096, 8192];

const SAMPLE_RATE: u32 = 44_100;

fn plucked_a_string(len: usize) -> AudioFrame {
    // A2 with a few decaying harmonics, roughly what a plucked string gives.
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (1..=4)
                .map(|h| {
                    let h = h as f32;
                    (0.5 / h) * (2.0 * std::f32::consts::PI * 110.0 * h * t).sin()
                })
                .sum::<f32>()
                * (-t * 2.0).exp()
        })
        .collect();
    AudioFrame::new(samples, SAMPLE_RATE).expect("window sizes are powers of two")
}

fn bench_autocorrelation(c: &mut Criterion) {
    let mut group = c.benchmark_group("pitch/autocorrelation");
    let estimator = PitchEstimator::default();

    for &size in WINDOW_SIZES {
        let frame = plucked_a_string(size);
        group.bench_with_input(BenchmarkId::new("estimate", size), &size, |b, _| {
            b.iter(|| estimator.estimate(black_box(&frame)))
        });
    }

    group.finish();
}

fn bench_spectrum_fallback(c: &mut Criterion) {
    let mut group = c.benchmark_group("pitch/spectrum");

    for &size in WINDOW_SIZES {
        let frame = plucked_a_string(size);
        let analyzer = SpectrumAnalyzer::new(size);
        group.bench_with_input(BenchmarkId::new("fallback", size), &size, |b, _| {
            b.iter(|| {
                let magnitudes = analyzer.magnitudes(black_box(&frame));
                estimate_from_spectrum(&magnitudes, SAMPLE_RATE)
            })
        });
    }

    group.finish();
}

fn bench_full_tick(c: &mut Criterion) {
    let estimator = PitchEstimator::default();
    let matcher = StringMatcher::default();
    let profile = standard_profile();
    let frame = plucked_a_string(4096);

    c.bench_function("pitch/estimate_and_match_4096", |b| {
        b.iter(|| {
            estimator
                .estimate(black_box(&frame))
                .frequency()
                .map(|freq| matcher.match_frequency(freq, profile))
        })
    });
}

criterion_group!(
    benches,
    bench_autocorrelation,
    bench_spectrum_fallback,
    bench_full_tick,
);
criterion_main!(benches);
