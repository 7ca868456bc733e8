//! # Guitar Tuning Module
//!
//! Reference pitches for the tuner: an equal-temperament note table and the
//! tuning profiles (ordered string targets) the string matcher works against.
//!
//! ## Features
//! - Equal temperament frequencies with A4 = 440 Hz
//! - Note name parsing with sharps and flats ("E2", "F#3", "Bb3")
//! - Built-in profiles: Standard, Drop D, Half Step Down, Open G, Open D, DADGAD
//! - Custom profiles loaded from JSON, validated on construction
//! - Cent deviation calculations

use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};

/// Concert pitch used for every computed frequency.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI number of A4.
const A4_MIDI: i32 = 69;

/// A single chromatic note with its name and frequency.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f32,
}

/// Chromatic notes from C1 to B6, covering every guitar tuning with room to spare.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let mut notes = Vec::with_capacity(72);
    for octave in 1..=6 {
        for (pitch_class, name) in NOTE_NAMES.iter().enumerate() {
            let midi = 12 * (octave + 1) + pitch_class as i32;
            notes.push(Note {
                name: format!("{name}{octave}"),
                frequency: midi_to_frequency(midi),
            });
        }
    }
    notes
});

/// Equal-temperament frequency of a MIDI note number.
fn midi_to_frequency(midi: i32) -> f32 {
    // Computed in f64 so exact octaves of A4 come out exact.
    (A4_FREQUENCY as f64 * 2f64.powf((midi - A4_MIDI) as f64 / 12.0)) as f32
}

/// Parses a note name such as "E2", "F#3" or "Bb3" into a MIDI number.
fn parse_note(name: &str) -> Option<i32> {
    let mut chars = name.chars();
    let pitch_class = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b') {
        (-1, octave)
    } else {
        (0, rest)
    };
    let octave: i32 = octave.parse().ok()?;
    if !(0..=9).contains(&octave) {
        return None;
    }
    Some(12 * (octave + 1) + pitch_class + accidental)
}

/// Equal-temperament frequency of a note name, `None` if the name is malformed.
pub fn note_frequency(name: &str) -> Option<f32> {
    parse_note(name).map(midi_to_frequency)
}

/// Finds the closest chromatic note to a given frequency.
///
/// # Returns
/// * `(note_name, target_frequency)` - Closest note name and its frequency
pub fn find_nearest_note(freq: f32) -> (String, f32) {
    let closest = NOTES
        .iter()
        .min_by(|a, b| {
            let diff_a = (a.frequency - freq).abs();
            let diff_b = (b.frequency - freq).abs();
            diff_a.total_cmp(&diff_b)
        })
        .expect("note table is never empty");

    (closest.name.clone(), closest.frequency)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values indicate sharpness, negative values flatness;
/// 1200 cents is one octave.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// One string of a tuning profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningTarget {
    /// String number, 1 being the highest-pitched string.
    pub string_id: u8,
    /// Display label such as "Low E".
    pub label: String,
    /// Scientific pitch name such as "E2".
    pub note: String,
    pub frequency_hz: f32,
}

/// Serialized shape of a target; the frequency may be derived from the note.
#[derive(Debug, Clone, Deserialize)]
struct TargetDefinition {
    string_id: u8,
    label: String,
    note: String,
    #[serde(default)]
    frequency_hz: Option<f32>,
}

/// Serialized shape of a profile before validation.
#[derive(Debug, Clone, Deserialize)]
struct ProfileDefinition {
    key: String,
    name: String,
    targets: Vec<TargetDefinition>,
}

/// A named, ordered set of string targets.
///
/// Always holds at least one target, and target frequencies are finite,
/// positive and pairwise distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileDefinition")]
pub struct TuningProfile {
    key: String,
    name: String,
    targets: Vec<TuningTarget>,
}

impl TryFrom<ProfileDefinition> for TuningProfile {
    type Error = TunerError;

    fn try_from(definition: ProfileDefinition) -> Result<Self> {
        let targets = definition
            .targets
            .into_iter()
            .map(|t| {
                let frequency_hz = match t.frequency_hz {
                    Some(freq) => freq,
                    None => note_frequency(&t.note).ok_or_else(|| {
                        TunerError::invalid_profile(
                            &definition.key,
                            format!("unrecognized note `{}`", t.note),
                        )
                    })?,
                };
                Ok(TuningTarget {
                    string_id: t.string_id,
                    label: t.label,
                    note: t.note,
                    frequency_hz,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        TuningProfile::new(definition.key, definition.name, targets)
    }
}

impl TuningProfile {
    /// Builds a profile, enforcing the target invariants.
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        targets: Vec<TuningTarget>,
    ) -> Result<Self> {
        let key = key.into();
        if targets.is_empty() {
            return Err(TunerError::invalid_profile(&key, "no targets"));
        }
        if let Some(bad) = targets
            .iter()
            .find(|t| !t.frequency_hz.is_finite() || t.frequency_hz <= 0.0)
        {
            return Err(TunerError::invalid_profile(
                &key,
                format!("string {} has frequency {}", bad.string_id, bad.frequency_hz),
            ));
        }
        for (i, a) in targets.iter().enumerate() {
            if let Some(b) = targets[i + 1..]
                .iter()
                .find(|b| b.frequency_hz == a.frequency_hz)
            {
                return Err(TunerError::invalid_profile(
                    &key,
                    format!(
                        "strings {} and {} share {} Hz",
                        a.string_id, b.string_id, a.frequency_hz
                    ),
                ));
            }
        }
        Ok(Self {
            key,
            name: name.into(),
            targets,
        })
    }

    /// Builds a profile from `(string_id, label, note)` rows using equal temperament.
    pub fn from_notes(key: &str, name: &str, strings: &[(u8, &str, &str)]) -> Result<Self> {
        let targets = strings
            .iter()
            .map(|&(string_id, label, note)| {
                let frequency_hz = note_frequency(note).ok_or_else(|| {
                    TunerError::invalid_profile(key, format!("unrecognized note `{note}`"))
                })?;
                Ok(TuningTarget {
                    string_id,
                    label: label.to_string(),
                    note: note.to_string(),
                    frequency_hz,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(key, name, targets)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &[TuningTarget] {
        &self.targets
    }

    /// The target with the smallest absolute Hz distance to `freq`.
    pub fn nearest_target(&self, freq: f32) -> &TuningTarget {
        self.targets
            .iter()
            .min_by(|a, b| {
                let diff_a = (a.frequency_hz - freq).abs();
                let diff_b = (b.frequency_hz - freq).abs();
                diff_a.total_cmp(&diff_b)
            })
            .expect("profiles are never empty")
    }
}

impl std::fmt::Display for TuningProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Built-in guitar tunings, highest string first.
static BUILTIN_PROFILES: Lazy<Vec<TuningProfile>> = Lazy::new(|| {
    let table: [(&str, &str, [(u8, &str, &str); 6]); 6] = [
        ("standard", "Standard (E-A-D-G-B-E)", [
            (1, "High E", "E4"), (2, "B", "B3"), (3, "G", "G3"),
            (4, "D", "D3"), (5, "A", "A2"), (6, "Low E", "E2"),
        ]),
        ("drop_d", "Drop D (D-A-D-G-B-E)", [
            (1, "High E", "E4"), (2, "B", "B3"), (3, "G", "G3"),
            (4, "D", "D3"), (5, "A", "A2"), (6, "Low D", "D2"),
        ]),
        ("half_step_down", "Half Step Down (Eb-Ab-Db-Gb-Bb-Eb)", [
            (1, "High Eb", "Eb4"), (2, "Bb", "Bb3"), (3, "Gb", "Gb3"),
            (4, "Db", "Db3"), (5, "Ab", "Ab2"), (6, "Low Eb", "Eb2"),
        ]),
        ("open_g", "Open G (D-G-D-G-B-D)", [
            (1, "High D", "D4"), (2, "B", "B3"), (3, "G", "G3"),
            (4, "D", "D3"), (5, "G", "G2"), (6, "Low D", "D2"),
        ]),
        ("open_d", "Open D (D-A-D-F#-A-D)", [
            (1, "High D", "D4"), (2, "A", "A3"), (3, "F#", "F#3"),
            (4, "D", "D3"), (5, "A", "A2"), (6, "Low D", "D2"),
        ]),
        ("dadgad", "DADGAD (D-A-D-G-A-D)", [
            (1, "High D", "D4"), (2, "A", "A3"), (3, "G", "G3"),
            (4, "D", "D3"), (5, "A", "A2"), (6, "Low D", "D2"),
        ]),
    ];
    table
        .iter()
        .map(|(key, name, strings)| {
            TuningProfile::from_notes(key, name, strings).expect("built-in profiles are valid")
        })
        .collect()
});

/// All built-in profiles, Standard first.
pub fn builtin_profiles() -> &'static [TuningProfile] {
    &BUILTIN_PROFILES
}

/// The standard E-A-D-G-B-E profile.
pub fn standard_profile() -> &'static TuningProfile {
    &BUILTIN_PROFILES[0]
}

/// Looks up a built-in profile by key (e.g. "drop_d").
pub fn builtin_profile(key: &str) -> Result<&'static TuningProfile> {
    BUILTIN_PROFILES
        .iter()
        .find(|p| p.key == key)
        .ok_or_else(|| TunerError::UnknownProfile(key.to_string()))
}

/// Parses a JSON array of profile definitions.
pub fn profiles_from_json(json: &str) -> Result<Vec<TuningProfile>> {
    Ok(serde_json::from_str(json)?)
}

/// Loads custom profiles from a JSON file.
pub fn load_profiles(path: impl AsRef<Path>) -> Result<Vec<TuningProfile>> {
    let data = std::fs::read_to_string(path)?;
    profiles_from_json(&data)
}
