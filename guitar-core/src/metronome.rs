//! # Metronome Module
//!
//! The beat scheduler behind the metronome. It is driven by the host loop:
//! the host calls [`BeatScheduler::poll`] with the current time as often as it
//! likes, and the scheduler fires a beat whenever the next point of its beat
//! grid has been reached.
//!
//! Beats are due at absolute times `start + k * period`, never at "previous
//! beat + period", so a late poll delays one click without shifting the beats
//! that follow.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::click::{ClickSink, ClickTone};
use crate::error::TunerError;

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 200;
pub const DEFAULT_BPM: u32 = 120;

/// A time signature such as 4/4 or 6/8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSignature {
    beats_per_measure: u8,
    beat_unit: u8,
}

impl TimeSignature {
    pub const COMMON: [TimeSignature; 4] = [
        TimeSignature { beats_per_measure: 2, beat_unit: 4 },
        TimeSignature { beats_per_measure: 3, beat_unit: 4 },
        TimeSignature { beats_per_measure: 4, beat_unit: 4 },
        TimeSignature { beats_per_measure: 6, beat_unit: 8 },
    ];

    pub fn new(beats_per_measure: u8, beat_unit: u8) -> Result<Self, TunerError> {
        if beats_per_measure == 0 || beat_unit == 0 {
            return Err(TunerError::InvalidTimeSignature(format!(
                "{beats_per_measure}/{beat_unit}"
            )));
        }
        Ok(Self {
            beats_per_measure,
            beat_unit,
        })
    }

    pub fn beats_per_measure(&self) -> u8 {
        self.beats_per_measure
    }

    pub fn beat_unit(&self) -> u8 {
        self.beat_unit
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_measure: 4,
            beat_unit: 4,
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_measure, self.beat_unit)
    }
}

impl FromStr for TimeSignature {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TunerError::InvalidTimeSignature(s.to_string());
        let (beats, unit) = s.trim().split_once('/').ok_or_else(invalid)?;
        let beats = beats.trim().parse().map_err(|_| invalid())?;
        let unit = unit.trim().parse().map_err(|_| invalid())?;
        Self::new(beats, unit)
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = TunerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSignature> for String {
    fn from(value: TimeSignature) -> Self {
        value.to_string()
    }
}

/// One emitted beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    /// Position in the measure, `0..beats_per_measure`.
    pub index: usize,
    /// True for the first beat of the measure.
    pub accent: bool,
    /// Grid time the beat was scheduled for.
    pub due_at: Instant,
}

/// Snapshot of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatState {
    pub bpm: u32,
    pub beats_per_measure: u8,
    /// Index of the beat that sounds next.
    pub current_beat_index: usize,
    pub is_running: bool,
}

/// The pair of clicks used for accented and normal beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickVoicing {
    pub accent: ClickTone,
    pub normal: ClickTone,
}

impl Default for ClickVoicing {
    fn default() -> Self {
        Self {
            accent: ClickTone::accent(),
            normal: ClickTone::normal(),
        }
    }
}

/// An armed beat grid.
#[derive(Debug, Clone, Copy)]
struct BeatGrid {
    origin: Instant,
    period: Duration,
    /// Grid points already consumed, including the immediate beat 0.
    elapsed: u32,
}

impl BeatGrid {
    fn next_due(&self) -> Instant {
        self.origin + self.period * self.elapsed
    }
}

/// Clamps a requested tempo into the supported range.
pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Beat period for a tempo.
pub fn beat_period(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / clamp_bpm(bpm) as f64)
}

/// Periodic beat generator with accent/normal clicks.
#[derive(Debug)]
pub struct BeatScheduler<C: ClickSink> {
    bpm: u32,
    time_signature: TimeSignature,
    current_beat_index: usize,
    grid: Option<BeatGrid>,
    voicing: ClickVoicing,
    clicks: C,
}

impl<C: ClickSink> BeatScheduler<C> {
    pub fn new(clicks: C) -> Self {
        Self::with_settings(clicks, DEFAULT_BPM, TimeSignature::default(), ClickVoicing::default())
    }

    pub fn with_settings(clicks: C, bpm: u32, time_signature: TimeSignature, voicing: ClickVoicing) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            time_signature,
            current_beat_index: 0,
            grid: None,
            voicing,
            clicks,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn current_beat_index(&self) -> usize {
        self.current_beat_index
    }

    pub fn is_running(&self) -> bool {
        self.grid.is_some()
    }

    pub fn state(&self) -> BeatState {
        BeatState {
            bpm: self.bpm,
            beats_per_measure: self.time_signature.beats_per_measure,
            current_beat_index: self.current_beat_index,
            is_running: self.is_running(),
        }
    }

    pub fn clicks(&self) -> &C {
        &self.clicks
    }

    /// Starts (or restarts) at `now`, emitting the accented first beat immediately.
    pub fn start(&mut self, now: Instant) -> BeatEvent {
        if let Err(e) = self.clicks.prepare() {
            warn!(target: "metronome", "click output unavailable, running silently: {e:#}");
        }

        self.current_beat_index = 0;
        let period = beat_period(self.bpm);
        self.grid = Some(BeatGrid {
            origin: now,
            period,
            elapsed: 1,
        });
        info!(target: "metronome", bpm = self.bpm, signature = %self.time_signature, "metronome started");

        self.emit(now)
    }

    /// Stops the grid and rewinds to the first beat. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.grid.take().is_some() {
            info!(target: "metronome", "metronome stopped");
        }
        self.current_beat_index = 0;
    }

    /// Fires the next beat if its grid time has been reached.
    ///
    /// At most one beat is emitted per call. If `now` is past more than one
    /// grid point, the missed points are skipped (the measure position still
    /// advances) instead of being played back in a burst.
    pub fn poll(&mut self, now: Instant) -> Option<BeatEvent> {
        let grid = self.grid.as_mut()?;
        let due = grid.next_due();
        if now < due {
            return None;
        }

        let late = now.duration_since(due);
        let missed = (late.as_nanos() / grid.period.as_nanos().max(1)) as u32;
        if missed > 0 {
            debug!(target: "metronome", missed, "host loop stalled, skipping beats");
            let beats = self.time_signature.beats_per_measure as usize;
            self.current_beat_index = (self.current_beat_index + missed as usize) % beats;
        }
        grid.elapsed += missed + 1;
        let due_at = grid.origin + grid.period * (grid.elapsed - 1);

        Some(self.emit(due_at))
    }

    /// Sets the tempo, clamped to `[MIN_BPM, MAX_BPM]`.
    ///
    /// When running, the grid restarts at `now` with beat 0, which is returned.
    pub fn set_bpm(&mut self, bpm: u32, now: Instant) -> Option<BeatEvent> {
        let clamped = clamp_bpm(bpm);
        if clamped != bpm {
            debug!(target: "metronome", requested = bpm, clamped, "tempo clamped");
        }
        self.bpm = clamped;
        if self.is_running() {
            self.stop();
            Some(self.start(now))
        } else {
            None
        }
    }

    /// Changes the measure length. A running grid keeps its period; the next
    /// beat is the accented first beat of a new measure.
    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        self.current_beat_index = 0;
    }

    fn emit(&mut self, due_at: Instant) -> BeatEvent {
        let index = self.current_beat_index;
        let accent = index == 0;
        let tone = if accent {
            self.voicing.accent
        } else {
            self.voicing.normal
        };
        self.clicks.play(&tone);

        let beats = self.time_signature.beats_per_measure as usize;
        self.current_beat_index = (index + 1) % beats;

        BeatEvent {
            index,
            accent,
            due_at,
        }
    }
}

impl<C: ClickSink> Drop for BeatScheduler<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the frequency of every click played.
    #[derive(Debug, Default)]
    struct RecordingClicks {
        played: Vec<f32>,
        prepared: usize,
    }

    impl ClickSink for RecordingClicks {
        fn prepare(&mut self) -> anyhow::Result<()> {
            self.prepared += 1;
            Ok(())
        }

        fn play(&mut self, tone: &ClickTone) {
            self.played.push(tone.frequency_hz);
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn parses_and_formats_time_signatures() {
        let sig: TimeSignature = "6/8".parse().unwrap();
        assert_eq!(sig.beats_per_measure(), 6);
        assert_eq!(sig.beat_unit(), 8);
        assert_eq!(sig.to_string(), "6/8");
        assert!("0/4".parse::<TimeSignature>().is_err());
        assert!("four".parse::<TimeSignature>().is_err());
        assert!("4/".parse::<TimeSignature>().is_err());
    }

    #[test]
    fn time_signature_serializes_as_string() {
        let json = serde_json::to_string(&TimeSignature::default()).unwrap();
        assert_eq!(json, "\"4/4\"");
        let sig: TimeSignature = serde_json::from_str("\"3/4\"").unwrap();
        assert_eq!(sig.beats_per_measure(), 3);
    }

    #[test]
    fn start_emits_accented_beat_zero_immediately() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        let beat = scheduler.start(t0);
        assert_eq!(beat.index, 0);
        assert!(beat.accent);
        assert_eq!(beat.due_at, t0);
        assert!(scheduler.is_running());
        assert_eq!(scheduler.clicks().played, vec![1000.0]);
        assert_eq!(scheduler.clicks().prepared, 1);
    }

    #[test]
    fn cycles_through_the_measure_every_period() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        scheduler.start(t0);

        assert!(scheduler.poll(t0 + ms(499)).is_none());

        let mut indices = vec![];
        for k in 1..=8u64 {
            let beat = scheduler.poll(t0 + ms(500 * k)).expect("beat due");
            assert_eq!(beat.due_at, t0 + ms(500 * k));
            indices.push(beat.index);
            assert!(scheduler.poll(t0 + ms(500 * k + 10)).is_none());
        }
        assert_eq!(indices, vec![1, 2, 3, 0, 1, 2, 3, 0]);
        let played = &scheduler.clicks().played;
        assert_eq!(played[..5], [1000.0, 800.0, 800.0, 800.0, 1000.0]);
    }

    #[test]
    fn late_polls_do_not_drift() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        scheduler.start(t0);

        // Each poll arrives 30ms late; the grid stays on 500ms multiples.
        let first = scheduler.poll(t0 + ms(530)).unwrap();
        let second = scheduler.poll(t0 + ms(1030)).unwrap();
        assert_eq!(first.due_at, t0 + ms(500));
        assert_eq!(second.due_at, t0 + ms(1000));
    }

    #[test]
    fn stalled_host_skips_missed_beats() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        scheduler.start(t0);

        // Two whole periods late: beats 1 and 2 are skipped, beat 3 sounds.
        let beat = scheduler.poll(t0 + ms(1600)).unwrap();
        assert_eq!(beat.index, 3);
        assert_eq!(beat.due_at, t0 + ms(1500));
        assert!(scheduler.poll(t0 + ms(1700)).is_none());
        assert_eq!(scheduler.poll(t0 + ms(2000)).unwrap().index, 0);
        assert_eq!(scheduler.clicks().played.len(), 3);
    }

    #[test]
    fn bpm_is_always_clamped() {
        let now = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        scheduler.set_bpm(300, now);
        assert_eq!(scheduler.bpm(), 200);
        scheduler.set_bpm(10, now);
        assert_eq!(scheduler.bpm(), 40);
        scheduler.set_bpm(90, now);
        assert_eq!(scheduler.bpm(), 90);
        assert_eq!(beat_period(60), ms(1000));
        assert_eq!(beat_period(1000), beat_period(200));
        assert_eq!(beat_period(1), beat_period(40));
    }

    #[test]
    fn set_bpm_while_running_restarts_fresh() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        scheduler.start(t0);
        scheduler.poll(t0 + ms(500)).unwrap();

        let t1 = t0 + ms(700);
        let restart = scheduler.set_bpm(60, t1).expect("restart beat");
        assert_eq!(restart.index, 0);
        assert!(restart.accent);

        // Nothing from the old 500ms grid survives.
        assert!(scheduler.poll(t0 + ms(1000)).is_none());
        assert!(scheduler.poll(t1 + ms(999)).is_none());
        assert_eq!(scheduler.poll(t1 + ms(1000)).unwrap().index, 1);
    }

    #[test]
    fn set_bpm_while_stopped_does_not_start() {
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        assert!(scheduler.set_bpm(100, Instant::now()).is_none());
        assert!(!scheduler.is_running());
        assert!(scheduler.clicks().played.is_empty());
    }

    #[test]
    fn stop_is_idempotent_and_silences_the_grid() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        scheduler.start(t0);
        scheduler.poll(t0 + ms(500)).unwrap();

        scheduler.stop();
        assert_eq!(scheduler.current_beat_index(), 0);
        scheduler.stop();
        assert!(!scheduler.is_running());

        for k in 1..10 {
            assert!(scheduler.poll(t0 + ms(500 * k)).is_none());
        }
        assert_eq!(scheduler.clicks().played.len(), 2);
    }

    #[test]
    fn time_signature_change_restarts_the_measure() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        scheduler.start(t0);
        scheduler.poll(t0 + ms(500)).unwrap();

        scheduler.set_time_signature("3/4".parse().unwrap());
        assert_eq!(scheduler.current_beat_index(), 0);

        let indices: Vec<usize> = (2..=5)
            .map(|k| scheduler.poll(t0 + ms(500 * k)).unwrap().index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn beat_index_stays_in_range_across_signature_changes() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::new(RecordingClicks::default());
        let mut now = t0;
        for (round, beats) in [4u8, 1, 7, 2, 3, 6].into_iter().cycle().take(24).enumerate() {
            scheduler.set_time_signature(TimeSignature::new(beats, 4).unwrap());
            scheduler.start(now);
            for _ in 0..round % 5 {
                now += ms(500);
                if let Some(beat) = scheduler.poll(now) {
                    assert!(beat.index < beats as usize);
                }
                assert!(scheduler.current_beat_index() < beats as usize);
            }
            scheduler.stop();
            assert!(scheduler.current_beat_index() < beats as usize);
        }
    }

    #[test]
    fn single_beat_measure_always_accents() {
        let t0 = Instant::now();
        let mut scheduler = BeatScheduler::with_settings(
            RecordingClicks::default(),
            120,
            TimeSignature::new(1, 4).unwrap(),
            ClickVoicing::default(),
        );
        assert!(scheduler.start(t0).accent);
        assert!(scheduler.poll(t0 + ms(500)).unwrap().accent);
        assert_eq!(scheduler.state().current_beat_index, 0);
    }
}
