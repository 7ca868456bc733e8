//! # Beat Indicator Widget
//!
//! One circle per beat of the measure. The beat that sounded last is lit,
//! and the first beat of the measure is drawn larger.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{Color, Element, Point, Rectangle, Renderer, Theme, mouse};

const ACCENT_COLOR: Color = Color {
    r: 1.000,
    g: 0.549,
    b: 0.000,
    a: 1.0,
};
const BEAT_COLOR: Color = Color {
    r: 0.204,
    g: 0.596,
    b: 0.859,
    a: 1.0,
};
const IDLE_COLOR: Color = Color {
    r: 0.314,
    g: 0.314,
    b: 0.314,
    a: 1.0,
};

pub struct BeatIndicator {
    beats_per_measure: u8,
    /// Beat to highlight, if the metronome is running.
    active: Option<usize>,
}

impl BeatIndicator {
    pub fn new(beats_per_measure: u8, active: Option<usize>) -> Self {
        Self {
            beats_per_measure: beats_per_measure.max(1),
            active,
        }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(60.0)),
        )
        .into()
    }
}

impl<Message> canvas::Program<Message> for BeatIndicator {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        let count = self.beats_per_measure as usize;
        let slot = bounds.width / count as f32;
        let base_radius = (slot.min(bounds.height) / 2.0 - 4.0).max(2.0);
        let center_y = bounds.height / 2.0;

        for beat in 0..count {
            let center = Point::new(slot * (beat as f32 + 0.5), center_y);
            let accent = beat == 0;
            let radius = if accent { base_radius } else { base_radius * 0.75 };
            let circle = Path::circle(center, radius);

            if self.active == Some(beat) {
                frame.fill(&circle, if accent { ACCENT_COLOR } else { BEAT_COLOR });
            } else {
                frame.stroke(
                    &circle,
                    Stroke::default().with_width(2.0).with_color(IDLE_COLOR),
                );
            }
        }

        vec![frame.into_geometry()]
    }
}
