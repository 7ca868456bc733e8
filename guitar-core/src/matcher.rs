//! # String Matching Module
//!
//! Maps a detected frequency onto the nearest string of a tuning profile and
//! grades how far off it is.

use serde::{Deserialize, Serialize};

use crate::tuning::{TuningProfile, TuningTarget, calculate_cents_deviation};

/// How close a string is to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    InTune,
    SlightlyOff,
    Off,
}

/// Which way the string needs to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Reads high; loosen the string.
    Sharp,
    /// Reads low; tighten the string.
    Flat,
    /// Exactly on target.
    None,
}

/// Tolerance bands in cents, compared against the absolute offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBands {
    /// Offsets strictly below this are in tune.
    pub in_tune_cents: f32,
    /// Offsets strictly below this (and not in tune) are slightly off.
    pub slightly_off_cents: f32,
}

impl Default for ToleranceBands {
    fn default() -> Self {
        Self {
            in_tune_cents: 5.0,
            slightly_off_cents: 20.0,
        }
    }
}

impl ToleranceBands {
    pub fn classify(&self, cents: f32) -> Classification {
        let distance = cents.abs();
        if distance < self.in_tune_cents {
            Classification::InTune
        } else if distance < self.slightly_off_cents {
            Classification::SlightlyOff
        } else {
            Classification::Off
        }
    }
}

/// The result of matching one estimate against a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationReport {
    pub matched_target: TuningTarget,
    pub measured_frequency_hz: f32,
    /// Signed offset from the matched target; positive is sharp.
    pub cents_offset: f32,
    pub classification: Classification,
    pub direction: Direction,
}

impl DeviationReport {
    /// Short feedback line for the display.
    pub fn message(&self) -> &'static str {
        match (self.classification, self.direction) {
            (Classification::InTune, _) | (_, Direction::None) => "In tune",
            (Classification::SlightlyOff, Direction::Sharp) => "Slightly high",
            (Classification::SlightlyOff, Direction::Flat) => "Slightly low",
            (Classification::Off, Direction::Sharp) => "Too high",
            (Classification::Off, Direction::Flat) => "Too low",
        }
    }
}

/// Nearest-string matcher with configurable tolerance bands.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StringMatcher {
    bands: ToleranceBands,
}

impl StringMatcher {
    pub fn new(bands: ToleranceBands) -> Self {
        Self { bands }
    }

    /// Matches `freq_hz` against the nearest target of `profile`.
    ///
    /// Profiles are non-empty by construction, so matching cannot fail.
    pub fn match_frequency(&self, freq_hz: f32, profile: &TuningProfile) -> DeviationReport {
        let target = profile.nearest_target(freq_hz);
        let cents_offset = calculate_cents_deviation(freq_hz, target.frequency_hz);

        let direction = if cents_offset > 0.0 {
            Direction::Sharp
        } else if cents_offset < 0.0 {
            Direction::Flat
        } else {
            Direction::None
        };

        DeviationReport {
            matched_target: target.clone(),
            measured_frequency_hz: freq_hz,
            cents_offset,
            classification: self.bands.classify(cents_offset),
            direction,
        }
    }
}
