//! # Configuration Module
//!
//! JSON settings for the tuner and the metronome. Every field has a default,
//! so a partial file (or no file at all) is a valid configuration.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::{BUFFER_SIZE, is_supported_window};
use crate::click::ClickTone;
use crate::error::{Result, TunerError};
use crate::matcher::ToleranceBands;
use crate::metronome::{ClickVoicing, DEFAULT_BPM, TimeSignature};
use crate::pitch::{DEFAULT_RMS_THRESHOLD, DEFAULT_TRIM_THRESHOLD, PitchEstimator};
use crate::tuning::{TuningProfile, builtin_profile, load_profiles};

/// File name the GUI looks for in its working directory.
pub const DEFAULT_CONFIG_FILE: &str = "guitar_blueprint.json";

/// Longest click the metronome will render.
pub const MAX_CLICK_MS: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tuner: TunerSettings,
    pub metronome: MetronomeSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerSettings {
    /// Analysis window in samples; a power of two.
    pub window_size: usize,
    pub rms_threshold: f32,
    pub trim_threshold: f32,
    /// Estimates below this are ignored.
    pub min_frequency_hz: f32,
    /// Estimates above this are ignored.
    pub max_frequency_hz: f32,
    pub in_tune_cents: f32,
    pub slightly_off_cents: f32,
    /// Use the spectrum peak when autocorrelation finds no period.
    pub spectrum_fallback: bool,
    /// Key of the profile selected at startup.
    pub profile: String,
    /// Optional JSON file with extra profiles.
    pub custom_profiles: Option<PathBuf>,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            window_size: BUFFER_SIZE,
            rms_threshold: DEFAULT_RMS_THRESHOLD,
            trim_threshold: DEFAULT_TRIM_THRESHOLD,
            min_frequency_hz: 50.0,
            max_frequency_hz: 800.0,
            in_tune_cents: 5.0,
            slightly_off_cents: 20.0,
            spectrum_fallback: false,
            profile: "standard".to_string(),
            custom_profiles: None,
        }
    }
}

impl TunerSettings {
    pub fn estimator(&self) -> PitchEstimator {
        PitchEstimator::new(self.rms_threshold, self.trim_threshold)
    }

    pub fn bands(&self) -> ToleranceBands {
        ToleranceBands {
            in_tune_cents: self.in_tune_cents,
            slightly_off_cents: self.slightly_off_cents,
        }
    }

    /// Playable guitar range; estimates outside it are ignored.
    pub fn playable_range(&self) -> RangeInclusive<f32> {
        self.min_frequency_hz..=self.max_frequency_hz
    }

    /// Built-in profiles followed by any custom ones from `custom_profiles`.
    pub fn available_profiles(&self) -> Result<Vec<TuningProfile>> {
        let mut profiles = crate::tuning::builtin_profiles().to_vec();
        if let Some(path) = &self.custom_profiles {
            let custom = load_profiles(path)?;
            info!(target: "config", count = custom.len(), path = %path.display(), "loaded custom profiles");
            profiles.extend(custom);
        }
        Ok(profiles)
    }

    /// Resolves the configured startup profile among `profiles`, falling back
    /// to the built-in table.
    pub fn selected_profile(&self, profiles: &[TuningProfile]) -> Result<TuningProfile> {
        match profiles.iter().find(|p| p.key() == self.profile) {
            Some(profile) => Ok(profile.clone()),
            None => builtin_profile(&self.profile).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub accent_hz: f32,
    pub normal_hz: f32,
    pub click_ms: u64,
    pub peak_gain: f32,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            accent_hz: 1000.0,
            normal_hz: 800.0,
            click_ms: 100,
            peak_gain: 0.3,
        }
    }
}

impl MetronomeSettings {
    pub fn accent_tone(&self) -> ClickTone {
        ClickTone::new(self.accent_hz, Duration::from_millis(self.click_ms), self.peak_gain)
    }

    pub fn normal_tone(&self) -> ClickTone {
        ClickTone::new(self.normal_hz, Duration::from_millis(self.click_ms), self.peak_gain)
    }

    pub fn voicing(&self) -> ClickVoicing {
        ClickVoicing {
            accent: self.accent_tone(),
            normal: self.normal_tone(),
        }
    }
}

impl AppConfig {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: AppConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(TunerError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                info!(target: "config", path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let tuner = &self.tuner;
        if !is_supported_window(tuner.window_size) {
            return Err(TunerError::UnsupportedWindow {
                len: tuner.window_size,
            });
        }
        if !(tuner.rms_threshold > 0.0 && tuner.trim_threshold > 0.0) {
            return Err(TunerError::InvalidConfig(
                "rms_threshold and trim_threshold must be positive".into(),
            ));
        }
        if !(tuner.min_frequency_hz > 0.0 && tuner.min_frequency_hz < tuner.max_frequency_hz) {
            return Err(TunerError::InvalidConfig(format!(
                "frequency range {}..{} Hz is empty",
                tuner.min_frequency_hz, tuner.max_frequency_hz
            )));
        }
        if !(tuner.in_tune_cents > 0.0 && tuner.in_tune_cents < tuner.slightly_off_cents) {
            return Err(TunerError::InvalidConfig(format!(
                "in_tune_cents ({}) must be positive and below slightly_off_cents ({})",
                tuner.in_tune_cents, tuner.slightly_off_cents
            )));
        }

        let metronome = &self.metronome;
        if !(metronome.accent_hz > 0.0 && metronome.normal_hz > 0.0) {
            return Err(TunerError::InvalidConfig("click frequencies must be positive".into()));
        }
        if !(1..=MAX_CLICK_MS).contains(&metronome.click_ms) {
            return Err(TunerError::InvalidConfig(format!(
                "click_ms {} is outside 1..={MAX_CLICK_MS}",
                metronome.click_ms
            )));
        }
        if !(0.0..=1.0).contains(&metronome.peak_gain) {
            return Err(TunerError::InvalidConfig(format!(
                "peak_gain {} is outside 0..1",
                metronome.peak_gain
            )));
        }
        Ok(())
    }
}
