//! # Guitar Blueprint - Guitar Tuner and Metronome GUI
//!
//! This module contains the main GUI application. It drives the tuner and
//! the metronome from a single host loop and renders their state.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Audio Threads**: Capture and click output each run on a dedicated thread owned by `guitar-core`
//! - **Communication**: The tuner's display callback forwards reports over a crossbeam channel
//! - **Updates**: 60 FPS ticks while the tuner is listening or the metronome is running

mod ui;

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use guitar_core::config::DEFAULT_CONFIG_FILE;
use guitar_core::tuning::{builtin_profiles, standard_profile};
use guitar_core::{
    AppConfig, BeatScheduler, BeatState, CpalClickOutput, CpalInput, DeviationReport,
    TickOutcome, TimeSignature, ToleranceBands, TunerError, TuningMonitor, TuningProfile,
};
use iced::{Element, Subscription, Task, Theme};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::main_display::create_main_view;

/// Number of reports averaged for the cent meter.
const SMOOTHING_FACTOR: usize = 5;

/// Host loop period (about 60 FPS).
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Status line shown when the microphone cannot be opened.
const MIC_REQUIRED: &str = "Microphone access required for tuning";

pub fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("starting Guitar Blueprint");

    let config = load_config();
    let app = TunerApp::new(config)?;

    iced::application("Guitar Blueprint", TunerApp::update, TunerApp::view)
        .subscription(TunerApp::subscription)
        .theme(TunerApp::theme)
        .run_with(move || (app, Task::none()))?;

    info!("application finished");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Reads `guitar_blueprint.json`, falling back to defaults when it is missing or broken.
fn load_config() -> AppConfig {
    match AppConfig::load_or_default(DEFAULT_CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => {
            warn!("ignoring {DEFAULT_CONFIG_FILE}: {e}");
            AppConfig::default()
        }
    }
}

/// Application message types for the Iced GUI framework.
#[derive(Debug, Clone)]
pub enum Message {
    // Tuner
    StartTuner,
    StopTuner,
    ProfileSelected(TuningProfile),

    // Metronome
    ToggleMetronome,
    BpmChanged(u32),
    TimeSignatureSelected(TimeSignature),

    // Continuous update message
    Tick,
}

/// UI-specific data needed for rendering the interface.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    // Tuner state
    pub listening: bool,
    pub status: Option<String>,
    pub last_report: Option<DeviationReport>,
    pub smoothing_buffer: Vec<f32>,
    pub bands: ToleranceBands,
    pub profiles: Vec<TuningProfile>,
    pub selected_profile: TuningProfile,

    // Metronome state
    pub metronome: BeatState,
    pub time_signature: TimeSignature,
    /// Index of the beat that sounded last, for the beat indicator.
    pub last_beat: Option<usize>,
}

impl AppDisplayData {
    /// Adds a reading to the smoothing window, dropping the oldest.
    pub fn push_cents(&mut self, cents: f32) {
        self.smoothing_buffer.push(cents);
        if self.smoothing_buffer.len() > SMOOTHING_FACTOR {
            self.smoothing_buffer.remove(0);
        }
    }

    /// Mean of the smoothing window, or the last raw offset if the window is empty.
    pub fn smoothed_cents(&self) -> Option<f32> {
        if self.smoothing_buffer.is_empty() {
            return self.last_report.as_ref().map(|r| r.cents_offset);
        }
        let sum: f32 = self.smoothing_buffer.iter().sum();
        Some(sum / self.smoothing_buffer.len() as f32)
    }

    /// Applies the outcome of one monitor tick.
    ///
    /// Reports arrive through the display callback, and ticks without a
    /// pitch leave the readout as it was. Only a monitor that went idle on
    /// its own (its stop handle fired) clears the tuner.
    pub fn apply_tick(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Idle if self.listening => self.clear_tuner(),
            TickOutcome::Idle
            | TickOutcome::NoFrame
            | TickOutcome::Unvoiced
            | TickOutcome::OutOfRange(_)
            | TickOutcome::Reported(_) => {}
        }
    }

    fn clear_tuner(&mut self) {
        self.last_report = None;
        self.smoothing_buffer.clear();
    }
}

/// Main application state.
#[derive(Debug)]
struct TunerApp {
    monitor: TuningMonitor<CpalInput>,
    metronome: BeatScheduler<CpalClickOutput>,
    reports_rx: Receiver<DeviationReport>,

    // Single source of truth for all display data
    display_data: AppDisplayData,
}

impl TunerApp {
    /// Builds the tuner and metronome from `config`. No audio device is
    /// opened until the user starts one of them.
    fn new(config: AppConfig) -> anyhow::Result<Self> {
        let profiles = match config.tuner.available_profiles() {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!("custom profiles unavailable: {e}");
                builtin_profiles().to_vec()
            }
        };
        let selected_profile = config
            .tuner
            .selected_profile(&profiles)
            .unwrap_or_else(|e| {
                warn!("{e}, using standard tuning");
                standard_profile().clone()
            });

        let input = CpalInput::new(config.tuner.window_size)?;
        let mut monitor = TuningMonitor::new(input, &config.tuner, selected_profile.clone());

        let (reports_tx, reports_rx) = crossbeam_channel::unbounded();
        monitor.set_display(move |report| {
            let _ = reports_tx.send(report.clone());
        });

        let metronome = BeatScheduler::with_settings(
            CpalClickOutput::new(),
            config.metronome.bpm,
            config.metronome.time_signature,
            config.metronome.voicing(),
        );

        let display_data = AppDisplayData {
            listening: false,
            status: None,
            last_report: None,
            smoothing_buffer: Vec::with_capacity(SMOOTHING_FACTOR + 1),
            bands: config.tuner.bands(),
            profiles,
            selected_profile,
            metronome: metronome.state(),
            time_signature: metronome.time_signature(),
            last_beat: None,
        };

        Ok(Self {
            monitor,
            metronome,
            reports_rx,
            display_data,
        })
    }

    /// Handles application state updates based on incoming messages.
    ///
    /// Starting the tuner or the metronome opens its audio device here, on
    /// the UI thread. Each open waits up to 3 s for the device thread, and
    /// the window does not redraw during that wait.
    fn update(&mut self, message: Message) {
        match message {
            Message::StartTuner => match self.monitor.start() {
                Ok(()) => {
                    self.display_data.status = None;
                }
                Err(TunerError::CaptureUnavailable { reason }) => {
                    warn!("tuner not started: {reason}");
                    self.display_data.status = Some(MIC_REQUIRED.to_string());
                }
                Err(e) => {
                    warn!("tuner not started: {e}");
                    self.display_data.status = Some(e.to_string());
                }
            },
            Message::StopTuner => {
                self.monitor.stop();
                self.display_data.clear_tuner();
            }
            Message::ProfileSelected(profile) => {
                info!(profile = profile.key(), "tuning selected");
                self.monitor.set_profile(profile.clone());
                self.display_data.selected_profile = profile;
                self.display_data.clear_tuner();
            }
            Message::ToggleMetronome => {
                if self.metronome.is_running() {
                    self.metronome.stop();
                    self.display_data.last_beat = None;
                } else {
                    let beat = self.metronome.start(Instant::now());
                    self.display_data.last_beat = Some(beat.index);
                }
            }
            Message::BpmChanged(bpm) => {
                if let Some(beat) = self.metronome.set_bpm(bpm, Instant::now()) {
                    self.display_data.last_beat = Some(beat.index);
                }
            }
            Message::TimeSignatureSelected(time_signature) => {
                self.metronome.set_time_signature(time_signature);
                self.display_data.time_signature = time_signature;
                self.display_data.last_beat = None;
            }
            Message::Tick => {
                let outcome = self.monitor.tick();
                self.display_data.apply_tick(&outcome);

                // Collect all reports first, the callback may have queued several.
                let reports: Vec<DeviationReport> = self.reports_rx.try_iter().collect();
                for report in reports {
                    self.process_report(report);
                }

                if let Some(beat) = self.metronome.poll(Instant::now()) {
                    self.display_data.last_beat = Some(beat.index);
                }
            }
        }

        self.display_data.listening = self.monitor.is_listening();
        self.display_data.metronome = self.metronome.state();
    }

    /// Folds one report from the tuner into the display data.
    fn process_report(&mut self, report: DeviationReport) {
        let same_string = self
            .display_data
            .last_report
            .as_ref()
            .is_some_and(|last| last.matched_target.string_id == report.matched_target.string_id);
        if !same_string {
            self.display_data.smoothing_buffer.clear();
        }
        self.display_data.push_cents(report.cents_offset);
        self.display_data.last_report = Some(report);
    }

    /// Renders the main application interface.
    ///
    /// Delegates all UI rendering to the main_display module,
    /// keeping this function focused on application logic only.
    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    /// Ticks every 16ms while anything is running, otherwise stays quiet.
    fn subscription(&self) -> Subscription<Message> {
        if self.display_data.listening || self.display_data.metronome.is_running {
            iced::time::every(TICK_INTERVAL).map(|_| Message::Tick)
        } else {
            Subscription::none()
        }
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guitar_core::StringMatcher;

    fn display_data() -> AppDisplayData {
        AppDisplayData {
            listening: true,
            status: None,
            last_report: None,
            smoothing_buffer: Vec::new(),
            bands: ToleranceBands::default(),
            profiles: builtin_profiles().to_vec(),
            selected_profile: standard_profile().clone(),
            metronome: BeatState {
                bpm: 120,
                beats_per_measure: 4,
                current_beat_index: 0,
                is_running: false,
            },
            time_signature: TimeSignature::default(),
            last_beat: None,
        }
    }

    #[test]
    fn smoothing_keeps_the_last_five_readings() {
        let mut data = display_data();
        for cents in [100.0, 1.0, 2.0, 3.0, 4.0, 5.0] {
            data.push_cents(cents);
        }
        assert_eq!(data.smoothing_buffer, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(data.smoothed_cents(), Some(3.0));
    }

    #[test]
    fn smoothed_cents_falls_back_to_last_report() {
        let mut data = display_data();
        assert_eq!(data.smoothed_cents(), None);

        let report = StringMatcher::default().match_frequency(113.0, standard_profile());
        let cents = report.cents_offset;
        data.last_report = Some(report);
        assert_eq!(data.smoothed_cents(), Some(cents));

        data.clear_tuner();
        assert_eq!(data.smoothed_cents(), None);
    }

    #[test]
    fn ticks_without_pitch_leave_the_readout_alone() {
        let mut data = display_data();
        let matcher = StringMatcher::default();
        for freq in [110.0, 110.0, 110.0, 110.0, 111.0] {
            let report = matcher.match_frequency(freq, standard_profile());
            data.push_cents(report.cents_offset);
            data.last_report = Some(report);
        }
        let smoothed = data.smoothed_cents();
        let last = data.last_report.clone();
        assert_ne!(smoothed, last.as_ref().map(|r| r.cents_offset));

        for outcome in [
            TickOutcome::Unvoiced,
            TickOutcome::OutOfRange(1500.0),
            TickOutcome::NoFrame,
            TickOutcome::Unvoiced,
        ] {
            data.apply_tick(&outcome);
            assert_eq!(data.smoothed_cents(), smoothed);
            assert_eq!(data.last_report, last);
        }
    }

    #[test]
    fn monitor_going_idle_while_listening_clears_the_readout() {
        let mut data = display_data();
        data.push_cents(12.0);
        data.last_report = Some(StringMatcher::default().match_frequency(113.0, standard_profile()));

        data.listening = false;
        data.apply_tick(&TickOutcome::Idle);
        assert_eq!(data.smoothed_cents(), Some(12.0));

        data.listening = true;
        data.apply_tick(&TickOutcome::Idle);
        assert_eq!(data.smoothed_cents(), None);
        assert!(data.last_report.is_none());
    }
}
