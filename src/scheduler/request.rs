//! Parsed foreground requests accepted by the scheduler

use std::time::Duration;

use crate::surface::{TextStyle, Transition};

/// Requested duration, before media probing turns it into a [`PlayLength`](super::PlayLength)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestedDuration {
    /// Negative seconds: hold until replaced, drop anything queued
    Indefinite,
    /// Zero: the media's own length where known
    Natural,
    Explicit(Duration),
}

impl RequestedDuration {
    pub fn from_seconds(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds == 0.0 {
            Self::Natural
        } else if seconds < 0.0 {
            Self::Indefinite
        } else {
            Self::Explicit(Duration::from_secs_f64(seconds))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PictureRequest {
    pub path: String,
    pub duration: RequestedDuration,
    pub animation: Transition,
    /// Queue behind a timed item instead of replacing it
    pub enqueue_if_busy: bool,
    /// Still image only, held until replaced
    pub fixed: bool,
}

impl PictureRequest {
    pub fn new(path: impl Into<String>, duration: RequestedDuration) -> Self {
        Self {
            path: path.into(),
            duration,
            animation: Transition::None,
            enqueue_if_busy: false,
            fixed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub text: String,
    pub style: TextStyle,
    pub animation: Transition,
    pub duration: RequestedDuration,
    pub clean_background: bool,
    /// Re-issue before expiry until stopped
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneRequest {
    pub text: Option<String>,
    pub style: TextStyle,
    pub path: Option<String>,
    pub animation_in: Transition,
    pub animation_out: Transition,
    pub duration: RequestedDuration,
    pub clean_background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRequest {
    /// `None` keeps the current count, grown to include `active_player`
    pub player_count: Option<u8>,
    pub active_player: u8,
    pub score: i64,
    pub credits: Option<u32>,
    pub clean_background: bool,
}
