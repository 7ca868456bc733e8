//! # Error Module
//!
//! The error taxonomy shared by the tuner and the metronome. Per-tick
//! conditions such as silence are not errors and never appear here; see
//! [`crate::pitch::PitchEstimate`] instead.

/// Result alias carrying [`TunerError`].
pub type Result<T> = std::result::Result<T, TunerError>;

/// Errors surfaced by the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TunerError {
    /// The audio input could not be opened (no device, permission denied,
    /// unsupported format). The monitor stays idle and does not retry.
    #[error("audio capture unavailable: {reason}")]
    CaptureUnavailable { reason: String },

    /// A tuning profile violated its construction rules (empty, duplicate
    /// or non-positive target frequencies, unknown note names).
    #[error("invalid tuning profile `{profile}`: {reason}")]
    InvalidProfile { profile: String, reason: String },

    /// No built-in or custom profile is registered under this key.
    #[error("unknown tuning profile `{0}`")]
    UnknownProfile(String),

    /// The sample count is not a supported analysis window.
    #[error("unsupported analysis window of {len} samples")]
    UnsupportedWindow { len: usize },

    #[error("invalid sample rate {0} Hz")]
    InvalidSampleRate(u32),

    #[error("invalid time signature `{0}`")]
    InvalidTimeSignature(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TunerError {
    pub(crate) fn invalid_profile(profile: &str, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            profile: profile.to_string(),
            reason: reason.into(),
        }
    }
}
