//! End-to-end runs of the tuner and the metronome against scripted
//! collaborators; no audio hardware is touched.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use guitar_core::tuning::{builtin_profile, standard_profile};
use guitar_core::{
    AppConfig, AudioFrame, AudioSource, BeatScheduler, Classification, ClickSink, ClickTone,
    Direction, MonitorState, TickOutcome, TimeSignature, TunerError, TuningMonitor,
};

const SAMPLE_RATE: u32 = 44_100;
const WINDOW: usize = 4096;

fn tone(freq: f32, amplitude: f32) -> AudioFrame {
    let samples = (0..WINDOW)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect();
    AudioFrame::new(samples, SAMPLE_RATE).unwrap()
}

/// A microphone that replays a fixed session.
struct RecordedSession {
    frames: VecDeque<AudioFrame>,
    available: bool,
    open: Arc<Mutex<bool>>,
}

impl RecordedSession {
    fn new(frames: impl IntoIterator<Item = AudioFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            available: true,
            open: Arc::new(Mutex::new(false)),
        }
    }
}

impl AudioSource for RecordedSession {
    fn open(&mut self) -> anyhow::Result<u32> {
        if !self.available {
            anyhow::bail!("NotAllowedError: microphone permission denied");
        }
        *self.open.lock().unwrap() = true;
        Ok(SAMPLE_RATE)
    }

    fn latest_frame(&mut self) -> Option<AudioFrame> {
        self.frames.pop_front()
    }

    fn close(&mut self) {
        *self.open.lock().unwrap() = false;
    }
}

#[derive(Default, Clone)]
struct ClickLog(Arc<Mutex<Vec<f32>>>);

impl ClickSink for ClickLog {
    fn play(&mut self, tone: &ClickTone) {
        self.0.lock().unwrap().push(tone.frequency_hz);
    }
}

#[test]
fn tuning_session_reports_each_string() {
    let config = AppConfig::default();
    let strings = [82.41, 110.0, 146.83, 196.0, 246.94, 329.63];
    let session = RecordedSession::new(strings.iter().map(|&f| tone(f, 0.5)));
    let open = session.open.clone();

    let labels = Arc::new(Mutex::new(Vec::new()));
    let sink = labels.clone();
    let mut monitor = TuningMonitor::new(session, &config.tuner, standard_profile().clone());
    monitor.set_display(move |report| sink.lock().unwrap().push(report.matched_target.label.clone()));

    monitor.start().unwrap();
    assert!(*open.lock().unwrap());
    while let TickOutcome::Reported(report) = monitor.tick() {
        assert_ne!(report.classification, Classification::Off, "{report:?}");
    }

    assert_eq!(
        *labels.lock().unwrap(),
        vec!["Low E", "A", "D", "G", "B", "High E"]
    );

    monitor.stop();
    assert!(!*open.lock().unwrap());
}

#[test]
fn detuned_string_reads_too_high() {
    let session = RecordedSession::new([tone(113.0, 0.5)]);
    let mut monitor = TuningMonitor::new(session, &AppConfig::default().tuner, standard_profile().clone());
    monitor.start().unwrap();

    let TickOutcome::Reported(report) = monitor.tick() else {
        panic!("expected a report");
    };
    assert_eq!(report.matched_target.note, "A2");
    assert!(report.cents_offset > 20.0);
    assert_eq!(report.classification, Classification::Off);
    assert_eq!(report.direction, Direction::Sharp);
    assert_eq!(report.message(), "Too high");
}

#[test]
fn quiet_room_produces_no_reports() {
    let session = RecordedSession::new([tone(110.0, 0.002), AudioFrame::new(vec![0.0; WINDOW], SAMPLE_RATE).unwrap()]);
    let mut monitor = TuningMonitor::new(session, &AppConfig::default().tuner, standard_profile().clone());
    monitor.set_display(|report| panic!("unexpected report {report:?}"));
    monitor.start().unwrap();
    assert_eq!(monitor.tick(), TickOutcome::Unvoiced);
    assert_eq!(monitor.tick(), TickOutcome::Unvoiced);
    assert_eq!(monitor.tick(), TickOutcome::NoFrame);
}

#[test]
fn denied_microphone_leaves_monitor_idle() {
    let mut session = RecordedSession::new([tone(110.0, 0.5)]);
    session.available = false;
    let mut monitor = TuningMonitor::new(session, &AppConfig::default().tuner, standard_profile().clone());

    let err = monitor.start().unwrap_err();
    assert!(matches!(err, TunerError::CaptureUnavailable { .. }));
    assert!(err.to_string().contains("permission denied"));
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert_eq!(monitor.tick(), TickOutcome::Idle);
}

#[test]
fn switching_profile_mid_session_changes_the_target() {
    let session = RecordedSession::new([tone(73.42, 0.5), tone(73.42, 0.5)]);
    let mut monitor = TuningMonitor::new(session, &AppConfig::default().tuner, standard_profile().clone());
    monitor.start().unwrap();

    let TickOutcome::Reported(first) = monitor.tick() else {
        panic!("expected a report");
    };
    assert_eq!(first.matched_target.label, "Low E");
    assert_eq!(first.direction, Direction::Flat);

    monitor.set_profile(builtin_profile("drop_d").unwrap().clone());
    let TickOutcome::Reported(second) = monitor.tick() else {
        panic!("expected a report");
    };
    assert_eq!(second.matched_target.label, "Low D");
}

#[test]
fn metronome_session_follows_the_beat_grid() {
    let clicks = ClickLog::default();
    let config = AppConfig::default();
    let mut metronome = BeatScheduler::with_settings(
        clicks.clone(),
        config.metronome.bpm,
        config.metronome.time_signature,
        config.metronome.voicing(),
    );

    let t0 = Instant::now();
    let mut beats = vec![metronome.start(t0)];

    // Poll like a 60 Hz host loop for two seconds.
    let mut now = t0;
    while now < t0 + Duration::from_millis(2000) {
        now += Duration::from_millis(16);
        beats.extend(metronome.poll(now));
    }

    let indices: Vec<usize> = beats.iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 0]);
    for (k, beat) in beats.iter().enumerate() {
        assert_eq!(beat.due_at, t0 + Duration::from_millis(500) * k as u32);
        assert_eq!(beat.accent, beat.index == 0);
    }
    assert_eq!(
        *clicks.0.lock().unwrap(),
        vec![1000.0, 800.0, 800.0, 800.0, 1000.0]
    );

    metronome.stop();
    assert!(metronome.poll(now + Duration::from_secs(10)).is_none());
    assert_eq!(metronome.state().current_beat_index, 0);
}

#[test]
fn metronome_in_three_four_at_slowest_tempo() {
    let clicks = ClickLog::default();
    let mut metronome = BeatScheduler::new(clicks.clone());
    metronome.set_time_signature("3/4".parse::<TimeSignature>().unwrap());
    let t0 = Instant::now();
    metronome.set_bpm(20, t0);
    assert_eq!(metronome.bpm(), 40);

    metronome.start(t0);
    let period = Duration::from_millis(1500);
    let indices: Vec<usize> = (1..=4u32)
        .filter_map(|k| metronome.poll(t0 + period * k))
        .map(|b| b.index)
        .collect();
    assert_eq!(indices, vec![1, 2, 0, 1]);
    assert_eq!(clicks.0.lock().unwrap().len(), 5);
}
