// guitar-core/src/lib.rs

//! The core logic for the guitar tuner and metronome.
//! This crate is responsible for audio capture, pitch detection,
//! string matching and beat scheduling. It is completely headless
//! and contains no GUI code.

pub mod audio;
pub mod click;
pub mod config;
pub mod error;
pub mod fft;
pub mod matcher;
pub mod metronome;
pub mod monitor;
pub mod pitch;
pub mod tuning;

pub use audio::{AudioFrame, AudioSource, CpalInput};
pub use click::{ClickSink, ClickTone, CpalClickOutput, MutedClicks};
pub use config::{AppConfig, MetronomeSettings, TunerSettings};
pub use error::{Result, TunerError};
pub use matcher::{Classification, DeviationReport, Direction, StringMatcher, ToleranceBands};
pub use metronome::{BeatEvent, BeatScheduler, BeatState, ClickVoicing, TimeSignature};
pub use monitor::{MonitorState, StopHandle, TickOutcome, TuningMonitor};
pub use pitch::{PitchEstimate, PitchEstimator};
pub use tuning::{TuningProfile, TuningTarget};
