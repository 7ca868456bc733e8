//! # Main Display Module
//!
//! This module contains the main display components and layout logic
//! for the Guitar Blueprint application.

use guitar_core::TimeSignature;
use guitar_core::metronome::{MAX_BPM, MIN_BPM};
use guitar_core::tuning::find_nearest_note;
use iced::widget::{Space, button, column, container, horizontal_space, pick_list, row, slider, text};
use iced::{Alignment, Color, Element, Length};

use super::beat_indicator::BeatIndicator;
use super::cent_meter::{CentMeter, classification_color};
use crate::{AppDisplayData, Message};

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'_, Message> {
    let title = text("Guitar Blueprint").size(28);

    let main_content = column![
        title,
        Space::with_height(20),
        row![
            create_tuner_panel(data),
            Space::with_width(10),
            create_metronome_panel(data),
        ]
        .align_y(Alignment::Start),
    ]
    .spacing(10)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Creates the tuner panel: profile choice, note readout, cent meter and controls.
fn create_tuner_panel(data: &AppDisplayData) -> Element<'_, Message> {
    let profile_picker = pick_list(
        data.profiles.as_slice(),
        Some(&data.selected_profile),
        Message::ProfileSelected,
    )
    .width(Length::Fill);

    let (string_label, freq_text, feedback, feedback_color) = match &data.last_report {
        Some(report) => (
            format!("{} ({})", report.matched_target.label, report.matched_target.note),
            format!(
                "{:.2} Hz ~ {}",
                report.measured_frequency_hz,
                find_nearest_note(report.measured_frequency_hz).0
            ),
            format!("{} {:+.1} cents", report.message(), report.cents_offset),
            classification_color(report.classification),
        ),
        None => (
            "--".to_string(),
            "0.00 Hz".to_string(),
            if data.listening { "Play a string" } else { "Tuner off" }.to_string(),
            Color::from_rgb(0.6, 0.6, 0.6),
        ),
    };

    let control = if data.listening {
        button(text("Stop Tuner").size(16).width(Length::Fill))
            .padding([8, 12])
            .on_press(Message::StopTuner)
    } else {
        button(text("Start Tuner").size(16).width(Length::Fill))
            .padding([8, 12])
            .on_press(Message::StartTuner)
    };

    let mut content = column![
        text("Tuning").size(14),
        profile_picker,
        Space::with_height(10),
        row![
            text(string_label).size(24),
            horizontal_space(),
            text(freq_text).size(24),
        ]
        .align_y(Alignment::Center),
        text(feedback).size(16).color(feedback_color),
        Space::with_height(10),
        CentMeter::new(data.smoothed_cents(), data.bands).view(),
        Space::with_height(10),
        control,
    ]
    .spacing(5);

    if let Some(status) = &data.status {
        content = content.push(text(status.as_str()).size(14).color(Color::from_rgb(1.0, 0.4, 0.4)));
    }

    container(
        column![text("Tuner").size(18), Space::with_height(10), content]
            .spacing(5)
            .padding(15),
    )
    .width(Length::FillPortion(3))
    .into()
}

/// Creates the metronome panel: tempo slider, time signature and beat indicator.
fn create_metronome_panel(data: &AppDisplayData) -> Element<'_, Message> {
    let state = &data.metronome;

    let tempo = column![
        row![
            text("Tempo").size(14),
            horizontal_space(),
            text(format!("{} BPM", state.bpm)).size(14),
        ],
        slider(MIN_BPM..=MAX_BPM, state.bpm, Message::BpmChanged),
    ]
    .spacing(5);

    let signature_picker = pick_list(
        TimeSignature::COMMON,
        Some(data.time_signature),
        Message::TimeSignatureSelected,
    )
    .width(Length::Fill);

    let active_beat = if state.is_running { data.last_beat } else { None };

    let toggle_label = if state.is_running { "Stop" } else { "Start" };
    let toggle_color = if state.is_running {
        Color::from_rgb(0.8, 0.2, 0.2)
    } else {
        Color::from_rgb(0.2, 0.6, 0.3)
    };
    let toggle = button(text(toggle_label).size(18).width(Length::Fill))
        .padding([12, 20])
        .style(move |_theme, _status| button::Style {
            background: Some(iced::Background::Color(toggle_color)),
            text_color: Color::WHITE,
            ..button::Style::default()
        })
        .on_press(Message::ToggleMetronome);

    container(
        column![
            text("Metronome").size(18),
            Space::with_height(10),
            tempo,
            text("Time Signature").size(14),
            signature_picker,
            Space::with_height(10),
            BeatIndicator::new(state.beats_per_measure, active_beat).view(),
            Space::with_height(10),
            toggle,
        ]
        .spacing(5)
        .padding(15),
    )
    .width(Length::FillPortion(2))
    .into()
}
