//! # Click Module
//!
//! Short sine "clicks" for the metronome and the output sink that plays them.
//!
//! ## Features
//! - Exponential gain decay from peak to floor, so clicks end without a pop
//! - `ClickSink` trait so the scheduler can run against any output
//! - CPAL output sink mixing overlapping clicks on a dedicated thread

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use tracing::{info, warn};

use crate::audio::rate_distance;

/// Parameters of one click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickTone {
    pub frequency_hz: f32,
    pub duration: Duration,
    /// Gain at the first sample.
    pub peak_gain: f32,
    /// Gain reached at the end of `duration`.
    pub floor_gain: f32,
}

impl ClickTone {
    pub fn new(frequency_hz: f32, duration: Duration, peak_gain: f32) -> Self {
        Self {
            frequency_hz,
            duration,
            peak_gain,
            floor_gain: 0.01,
        }
    }

    /// Accent click (first beat of a measure).
    pub fn accent() -> Self {
        Self::new(1000.0, Duration::from_millis(100), 0.3)
    }

    /// Click for every other beat.
    pub fn normal() -> Self {
        Self::new(800.0, Duration::from_millis(100), 0.3)
    }

    /// Envelope gain `t` seconds into the click.
    pub fn gain_at(&self, t: f32) -> f32 {
        let length = self.duration.as_secs_f32();
        if length <= 0.0 || self.peak_gain <= 0.0 {
            return 0.0;
        }
        let floor = self.floor_gain.clamp(f32::MIN_POSITIVE, self.peak_gain);
        let progress = (t / length).clamp(0.0, 1.0);
        self.peak_gain * (floor / self.peak_gain).powf(progress)
    }

    /// Renders the click as mono samples.
    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let sample_rate = sample_rate as f32;
        let len = (self.duration.as_secs_f32() * sample_rate) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate;
                self.gain_at(t) * (2.0 * std::f32::consts::PI * self.frequency_hz * t).sin()
            })
            .collect()
    }
}

/// The audible-click collaborator.
pub trait ClickSink {
    /// Acquires the output if needed. Called when a scheduler starts.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Plays `tone` as soon as possible without blocking.
    fn play(&mut self, tone: &ClickTone);
}

/// A sink that discards every click, for silent operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct MutedClicks;

impl ClickSink for MutedClicks {
    fn play(&mut self, _tone: &ClickTone) {}
}

/// Output thread management structure.
#[derive(Debug)]
struct OutputWorker {
    clicks_tx: Sender<Vec<f32>>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

/// [`ClickSink`] playing through the default CPAL output device.
///
/// The output is opened lazily by [`ClickSink::prepare`]. If no device is
/// available the sink stays silent and later clicks are dropped.
#[derive(Debug, Default)]
pub struct CpalClickOutput {
    worker: Option<OutputWorker>,
}

impl CpalClickOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(());
            if let Some(handle) = worker.thread_handle.take() {
                if handle.join().is_err() {
                    warn!(target: "click", "output thread panicked during shutdown");
                }
            }
        }
    }
}

impl ClickSink for CpalClickOutput {
    fn prepare(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<u32, String>>(1);
        let (clicks_tx, clicks_rx) = crossbeam_channel::unbounded::<Vec<f32>>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_handle = thread::Builder::new()
            .name("click-output".into())
            .spawn(move || {
                let (stream, sample_rate) = match start_click_output(clicks_rx) {
                    Ok(tuple) => tuple,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{e:#}")));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(sample_rate));
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    warn!(target: "click", "error pausing output stream: {e}");
                }
                drop(stream);
            })?;

        match ready_rx.recv_timeout(Duration::from_secs(3)) {
            Ok(Ok(sample_rate)) => {
                self.worker = Some(OutputWorker {
                    clicks_tx,
                    shutdown_tx,
                    thread_handle: Some(thread_handle),
                    sample_rate,
                });
                Ok(())
            }
            Ok(Err(reason)) => {
                let _ = thread_handle.join();
                Err(anyhow!(reason))
            }
            Err(_) => {
                let _ = shutdown_tx.send(());
                Err(anyhow!("click output thread did not start"))
            }
        }
    }

    fn play(&mut self, tone: &ClickTone) {
        if let Some(worker) = &self.worker {
            let _ = worker.clicks_tx.send(tone.render(worker.sample_rate));
        }
    }
}

impl Drop for CpalClickOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// A click being played back, with its read position.
struct Voice {
    samples: Vec<f32>,
    position: usize,
}

/// Opens the default output device and mixes incoming clicks into it.
fn start_click_output(clicks: Receiver<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;

    info!(target: "click", "using audio output device: {}", device.name()?);

    let default = device.default_output_config()?;
    let supported = if default.sample_format() == SampleFormat::F32 {
        default
    } else {
        let configs = device.supported_output_configs()?.collect::<Vec<_>>();
        find_f32_output_config(configs, &default).ok_or_else(|| {
            anyhow!(
                "No f32 output format found (default is {:?})",
                default.sample_format()
            )
        })?
    };
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels().max(1) as usize;
    let config: cpal::StreamConfig = supported.into();

    let mut voices: Vec<Voice> = Vec::with_capacity(4);
    let err_fn = |err| warn!(target: "click", "an error occurred on the output stream: {err}");

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            voices.extend(clicks.try_iter().map(|samples| Voice {
                samples,
                position: 0,
            }));

            for frame in data.chunks_mut(channels) {
                let mut mixed = 0.0f32;
                for voice in voices.iter_mut() {
                    if let Some(&sample) = voice.samples.get(voice.position) {
                        mixed += sample;
                        voice.position += 1;
                    }
                }
                frame.fill(mixed.clamp(-1.0, 1.0));
            }

            voices.retain(|voice| voice.position < voice.samples.len());
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks an f32 output configuration as close as possible to `default`.
///
/// The default's rate matters most, then its channel count.
fn find_f32_output_config(
    configs: Vec<SupportedStreamConfigRange>,
    default: &SupportedStreamConfig,
) -> Option<SupportedStreamConfig> {
    let rate = default.sample_rate().0;
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| (rate_distance(c, rate), c.channels().abs_diff(default.channels())))
        .map(|c| {
            let clamped = rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0);
            c.with_sample_rate(cpal::SampleRate(clamped))
        })
}
