//! # Cent Meter Widget
//!
//! This module provides a visual cent deviation meter for string tuning.
//! It displays the tuning accuracy with color-coded feedback and a
//! needle indicator showing how far off the string is from its target.
//!
//! ## Features
//! - Needle position proportional to the smoothed cent offset
//! - Zones colored from the configured tolerance bands (green/yellow/red)
//! - Shaded in-tune window around the center line

use guitar_core::{Classification, ToleranceBands};
use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{Color, Element, Point, Rectangle, Renderer, Size, Theme, mouse};

/// The meter shows deviations from -50 to +50 cents.
const METER_RANGE: f32 = 50.0;

const IN_TUNE_COLOR: Color = Color {
    r: 0.204,
    g: 0.859,
    b: 0.596,
    a: 1.0,
};
const SLIGHTLY_OFF_COLOR: Color = Color {
    r: 1.000,
    g: 0.765,
    b: 0.000,
    a: 1.0,
};
const OFF_COLOR: Color = Color {
    r: 1.000,
    g: 0.200,
    b: 0.200,
    a: 1.0,
};

/// Color for a classification.
pub fn classification_color(classification: Classification) -> Color {
    match classification {
        Classification::InTune => IN_TUNE_COLOR,
        Classification::SlightlyOff => SLIGHTLY_OFF_COLOR,
        Classification::Off => OFF_COLOR,
    }
}

/// Cent meter widget for displaying tuning accuracy.
pub struct CentMeter {
    /// Current cent deviation (None if no pitch detected)
    cents: Option<f32>,
    bands: ToleranceBands,
}

impl CentMeter {
    /// Creates a new cent meter widget.
    ///
    /// # Arguments
    /// * `cents` - Current cent deviation (None if no pitch detected)
    /// * `bands` - Tolerance bands used to color the needle
    pub fn new(cents: Option<f32>, bands: ToleranceBands) -> Self {
        Self { cents, bands }
    }

    /// Creates the view element for the cent meter.
    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(80.0)),
        )
        .into()
    }
}

/// Horizontal position of `cents` on a meter `width` wide.
fn needle_x(cents: f32, width: f32) -> f32 {
    let clamped_cents = cents.clamp(-METER_RANGE, METER_RANGE);
    (clamped_cents + METER_RANGE) / (2.0 * METER_RANGE) * width
}

impl<Message> canvas::Program<Message> for CentMeter {
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

        // Draw meter background
        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        // In-tune window
        let left = needle_x(-self.bands.in_tune_cents, bounds.width);
        let right = needle_x(self.bands.in_tune_cents, bounds.width);
        let window = Path::rectangle(Point::new(left, 0.0), Size::new(right - left, bounds.height));
        frame.fill(&window, Color { a: 0.2, ..IN_TUNE_COLOR });

        // Draw center line
        let center_x = bounds.width / 2.0;
        let center_line = Path::line(
            Point::new(center_x, 0.0),
            Point::new(center_x, bounds.height),
        );
        frame.stroke(
            &center_line,
            Stroke::default().with_width(2.0).with_color(Color::WHITE),
        );

        // Draw needle
        if let Some(c) = self.cents {
            let needle_pos = needle_x(c, bounds.width);
            let color = classification_color(self.bands.classify(c));
            let needle =
                Path::rectangle(Point::new(needle_pos - 2.0, 0.0), Size::new(4.0, bounds.height));
            frame.fill(&needle, color);
        }

        vec![frame.into_geometry()]
    }
}
