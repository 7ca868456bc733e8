//! # Tuning Monitor Module
//!
//! Runs the detect loop of the tuner: pull the newest window from the capture
//! source, estimate its pitch, match it against the active profile and hand
//! the report to the display.
//!
//! ## Features
//! - Idle/Listening state machine around one capture resource
//! - One loop iteration per [`TuningMonitor::tick`], driven by the host loop
//! - Cloneable [`StopHandle`] so a display callback can end the session
//! - Optional spectrum-peak fallback and a playable-range gate

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, trace, warn};

use crate::audio::AudioSource;
use crate::config::TunerSettings;
use crate::error::{Result, TunerError};
use crate::fft::SpectrumAnalyzer;
use crate::matcher::{DeviationReport, StringMatcher};
use crate::pitch::{PitchEstimate, PitchEstimator, estimate_from_spectrum};
use crate::tuning::TuningProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Listening,
}

/// What happened during one [`TuningMonitor::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The monitor is not listening (or was stopped during the tick).
    Idle,
    /// The source had no full window yet.
    NoFrame,
    /// Silent or no detectable period.
    Unvoiced,
    /// A pitch was found outside the playable range and ignored.
    OutOfRange(f32),
    /// A report was produced and passed to the display callback.
    Reported(DeviationReport),
}

/// Cancellation token for a [`TuningMonitor`].
///
/// Requesting a stop is honoured on the monitor's next tick, which then
/// releases the capture source.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Receives every report produced while listening.
pub type DisplayCallback = Box<dyn FnMut(&DeviationReport) + Send>;

/// The tuner state machine.
pub struct TuningMonitor<S: AudioSource> {
    source: S,
    state: MonitorState,
    estimator: PitchEstimator,
    matcher: StringMatcher,
    profile: TuningProfile,
    playable_range: RangeInclusive<f32>,
    fallback: Option<SpectrumAnalyzer>,
    display: Option<DisplayCallback>,
    stop: StopHandle,
}

impl<S: AudioSource> std::fmt::Debug for TuningMonitor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuningMonitor")
            .field("state", &self.state)
            .field("profile", &self.profile.key())
            .field("estimator", &self.estimator)
            .field("matcher", &self.matcher)
            .field("spectrum_fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: AudioSource> TuningMonitor<S> {
    /// Creates an idle monitor.
    ///
    /// # Arguments
    /// * `source` - Capture collaborator; not opened until [`TuningMonitor::start`]
    /// * `settings` - Thresholds, bands, range gate and fallback switch
    /// * `profile` - Initially selected tuning
    pub fn new(source: S, settings: &TunerSettings, profile: TuningProfile) -> Self {
        Self {
            source,
            state: MonitorState::Idle,
            estimator: settings.estimator(),
            matcher: StringMatcher::new(settings.bands()),
            profile,
            playable_range: settings.playable_range(),
            fallback: settings
                .spectrum_fallback
                .then(|| SpectrumAnalyzer::new(settings.window_size)),
            display: None,
            stop: StopHandle::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == MonitorState::Listening
    }

    pub fn profile(&self) -> &TuningProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: TuningProfile) {
        debug!(target: "monitor", profile = profile.key(), "profile selected");
        self.profile = profile;
    }

    pub fn set_display(&mut self, display: impl FnMut(&DeviationReport) + Send + 'static) {
        self.display = Some(Box::new(display));
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Opens the capture source and enters Listening.
    ///
    /// Does nothing if already listening. On failure the source is released
    /// again and the monitor stays idle; there is no retry.
    pub fn start(&mut self) -> Result<()> {
        if self.is_listening() {
            return Ok(());
        }

        match self.source.open() {
            Ok(sample_rate) => {
                self.stop.reset();
                self.state = MonitorState::Listening;
                info!(target: "monitor", sample_rate, profile = self.profile.key(), "tuner listening");
                Ok(())
            }
            Err(e) => {
                self.source.close();
                let reason = format!("{e:#}");
                warn!(target: "monitor", "could not open audio input: {reason}");
                Err(TunerError::CaptureUnavailable { reason })
            }
        }
    }

    /// Releases the capture source and returns to Idle. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.source.close();
        if self.state == MonitorState::Listening {
            self.state = MonitorState::Idle;
            info!(target: "monitor", "tuner stopped");
        }
    }

    /// Runs one iteration of the detect loop.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_listening() {
            return TickOutcome::Idle;
        }
        if self.stop.is_stop_requested() {
            self.stop();
            return TickOutcome::Idle;
        }

        let Some(frame) = self.source.latest_frame() else {
            return TickOutcome::NoFrame;
        };

        let mut estimate = self.estimator.estimate(&frame);
        if estimate == PitchEstimate::Indeterminate {
            if let Some(analyzer) = &self.fallback {
                estimate = estimate_from_spectrum(&analyzer.magnitudes(&frame), frame.sample_rate());
            }
        }

        let Some(freq) = estimate.frequency() else {
            trace!(target: "monitor", ?estimate, "no pitch");
            return TickOutcome::Unvoiced;
        };
        if !self.playable_range.contains(&freq) {
            trace!(target: "monitor", freq, "pitch outside guitar range");
            return TickOutcome::OutOfRange(freq);
        }

        let report = self.matcher.match_frequency(freq, &self.profile);

        // The callback of an earlier tick may have asked us to stop.
        if self.stop.is_stop_requested() {
            self.stop();
            return TickOutcome::Idle;
        }

        debug!(
            target: "monitor",
            note = %report.matched_target.note,
            freq,
            cents = report.cents_offset,
            "pitch matched"
        );
        if let Some(display) = self.display.as_mut() {
            display(&report);
        }
        TickOutcome::Reported(report)
    }
}

impl<S: AudioSource> Drop for TuningMonitor<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
