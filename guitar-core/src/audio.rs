//! # Audio Capture Module
//!
//! This module defines the analysis frame handed to the pitch estimator and the
//! capture collaborator the tuning monitor pulls frames from. The default
//! collaborator captures from the system input device using CPAL.
//!
//! ## Features
//! - Validated, immutable analysis frames (power-of-two windows)
//! - Automatic input device and configuration selection
//! - Multi-channel input down-mixed to mono
//! - Rolling window that always yields the newest samples
//! - Stream ownership on a dedicated worker thread with graceful shutdown

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{info, warn};

use crate::error::TunerError;

/// Default analysis window in samples (~93ms at 44.1kHz).
///
/// Low E (82 Hz) has a period of ~535 samples at 44.1kHz, so this leaves
/// several periods inside the half-window lag search.
pub const BUFFER_SIZE: usize = 4096;

/// Smallest supported analysis window.
pub const MIN_WINDOW_SIZE: usize = 256;

/// Largest supported analysis window.
pub const MAX_WINDOW_SIZE: usize = 32768;

/// Sample rate requested from the input device.
const TARGET_SAMPLE_RATE: u32 = 44100;

/// How long `open()` waits for the capture thread to report its stream.
const OPEN_TIMEOUT: Duration = Duration::from_secs(3);

/// Number of callback chunks buffered between the stream and the tuner.
const CHANNEL_DEPTH: usize = 64;

/// Returns true if `len` is a window size the estimator accepts.
pub fn is_supported_window(len: usize) -> bool {
    len.is_power_of_two() && (MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&len)
}

/// A fixed-size block of time-domain samples captured at a known rate.
///
/// Samples are normalized (roughly `[-1, 1]`) and DC-centred. A frame is
/// immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Builds a frame, rejecting unsupported window sizes and a zero rate.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, TunerError> {
        if !is_supported_window(samples.len()) {
            return Err(TunerError::UnsupportedWindow { len: samples.len() });
        }
        if sample_rate == 0 {
            return Err(TunerError::InvalidSampleRate(sample_rate));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The capture collaborator consumed by [`crate::monitor::TuningMonitor`].
///
/// Implementations own exactly one input resource at a time. `close` must be
/// safe to call repeatedly and on a source that failed to open.
pub trait AudioSource {
    /// Acquires the input and returns its sample rate in Hz.
    fn open(&mut self) -> Result<u32>;

    /// Returns the most recent full analysis window, if one is available.
    fn latest_frame(&mut self) -> Option<AudioFrame>;

    /// Releases the input.
    fn close(&mut self);
}

/// Capture thread management structure.
#[derive(Debug)]
struct CaptureWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    fn shutdown(mut self) {
        // The thread also exits when the sender is dropped.
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!(target: "audio", "capture thread panicked during shutdown");
            }
        }
    }
}

/// [`AudioSource`] backed by the default CPAL input device.
///
/// The CPAL stream lives on a dedicated thread; sample chunks travel over a
/// bounded channel and are folded into a rolling window on every
/// [`AudioSource::latest_frame`] call.
#[derive(Debug)]
pub struct CpalInput {
    window_size: usize,
    sample_rate: u32,
    worker: Option<CaptureWorker>,
    samples_rx: Option<Receiver<Vec<f32>>>,
    window: VecDeque<f32>,
}

impl CpalInput {
    /// Creates an unopened input that will yield frames of `window_size` samples.
    pub fn new(window_size: usize) -> Result<Self, TunerError> {
        if !is_supported_window(window_size) {
            return Err(TunerError::UnsupportedWindow { len: window_size });
        }
        Ok(Self {
            window_size,
            sample_rate: 0,
            worker: None,
            samples_rx: None,
            window: VecDeque::with_capacity(window_size * 2),
        })
    }
}

impl AudioSource for CpalInput {
    fn open(&mut self) -> Result<u32> {
        if self.worker.is_some() {
            return Ok(self.sample_rate);
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<u32, String>>(1);
        let (samples_tx, samples_rx) = crossbeam_channel::bounded::<Vec<f32>>(CHANNEL_DEPTH);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let (stream, sample_rate) = match start_audio_capture(samples_tx) {
                    Ok(tuple) => tuple,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{e:#}")));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(sample_rate));

                // Park until asked to stop or until the owner goes away.
                let _ = shutdown_rx.recv();

                if let Err(e) = stream.pause() {
                    warn!(target: "audio", "error pausing capture stream: {e}");
                }
                drop(stream);
                info!(target: "audio", "capture stream released");
            })?;

        let worker = CaptureWorker {
            shutdown_tx,
            thread_handle: Some(thread_handle),
        };

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(sample_rate)) => {
                self.sample_rate = sample_rate;
                self.worker = Some(worker);
                self.samples_rx = Some(samples_rx);
                self.window.clear();
                Ok(sample_rate)
            }
            Ok(Err(reason)) => {
                worker.shutdown();
                Err(anyhow!(reason))
            }
            Err(_) => {
                worker.shutdown();
                Err(anyhow!("capture thread did not report a stream within {OPEN_TIMEOUT:?}"))
            }
        }
    }

    fn latest_frame(&mut self) -> Option<AudioFrame> {
        let rx = self.samples_rx.as_ref()?;
        for chunk in rx.try_iter() {
            self.window.extend(chunk);
        }
        let excess = self.window.len().saturating_sub(self.window_size);
        self.window.drain(..excess);

        if self.window.len() < self.window_size {
            return None;
        }
        AudioFrame::new(self.window.iter().copied().collect(), self.sample_rate).ok()
    }

    fn close(&mut self) {
        self.samples_rx = None;
        self.window.clear();
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 configuration, preferring mono and the target rate
/// 3. Streams down-mixed mono chunks into `sender`
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Playing stream handle and its sample rate
/// * `Err(e)` - No device, no usable format, or the stream failed to build
fn start_audio_capture(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!(target: "audio", "using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));

    let sample_rate = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;
    let config: cpal::StreamConfig = config.into();

    info!(target: "audio", sample_rate, channels, "selected input configuration");

    let err_fn = |err| warn!(target: "audio", "an error occurred on the input stream: {err}");

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = downmix_to_mono(data, channels);
            // Dropping a chunk when the tuner lags is preferable to blocking the callback.
            let _ = sender.try_send(mono);
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Averages interleaved frames of `channels` samples into one mono sample each.
///
/// A trailing partial frame is averaged over the samples it has.
fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Distance in Hz from `target_rate` to the rate range of `config`; zero if inside.
pub(crate) fn rate_distance(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    let min = config.min_sample_rate().0;
    let max = config.max_sample_rate().0;
    if (min..=max).contains(&target_rate) {
        0
    } else {
        min.abs_diff(target_rate).min(max.abs_diff(target_rate))
    }
}

/// Finds the best supported f32 input configuration.
///
/// Mono is preferred over multi-channel; among equal channel counts the range
/// closest to `target_rate` wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| (c.channels(), rate_distance(c, target_rate)))
}
