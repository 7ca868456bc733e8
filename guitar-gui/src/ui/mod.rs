//! # UI Module
//!
//! This module contains all UI components for the Guitar Blueprint tuner and metronome.

pub mod beat_indicator;
pub mod cent_meter;
pub mod main_display;
