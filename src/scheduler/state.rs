//! Scheduler state and the views handed out of it

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use crate::assets::{AssetDescriptor, MediaKind};
use crate::constants::score::MAX_PLAYERS;
use crate::error::{DisplayError, DisplayResult};
use crate::surface::{Scene, ScoreboardView};

/// How long a foreground item stays up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayLength {
    /// Arms the expiry timer
    Timed(Duration),
    /// Stays until replaced
    Hold,
}

impl PlayLength {
    pub fn pause(self) -> Option<Duration> {
        match self {
            Self::Timed(d) => Some(d),
            Self::Hold => None,
        }
    }
}

/// What is currently in front, for callers and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundKind {
    None,
    Picture,
    Video,
    Text,
    Scoreboard,
}

impl ForegroundKind {
    pub fn of_asset(asset: &AssetDescriptor) -> Self {
        match asset.kind {
            MediaKind::Image => Self::Picture,
            MediaKind::Video => Self::Video,
        }
    }
}

/// A foreground item, either playing or waiting in the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub scene: Scene,
    pub kind: ForegroundKind,
    pub length: PlayLength,
}

impl QueueItem {
    pub fn new(mut scene: Scene, kind: ForegroundKind, length: PlayLength) -> Self {
        scene.pause = length.pause();
        Self { scene, kind, length }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing(QueueItem),
    /// Foreground finished; scoreboard follows after the grace delay
    ScoreDelay,
}

#[derive(Debug)]
pub struct SchedulerState {
    pub marquee: Option<AssetDescriptor>,
    pub player_count: u8,
    /// 1-based
    pub active_player: u8,
    pub scores: [i64; MAX_PLAYERS as usize],
    pub credits: u32,
    pub phase: Phase,
    pub queue: VecDeque<QueueItem>,
    pub scoreboard_visible: bool,
    pub score_background: Option<(AssetDescriptor, u8)>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            marquee: None,
            player_count: 1,
            active_player: 1,
            scores: [0; MAX_PLAYERS as usize],
            credits: 0,
            phase: Phase::Idle,
            queue: VecDeque::new(),
            scoreboard_visible: false,
            score_background: None,
        }
    }
}

impl SchedulerState {
    /// A timed item is playing; the only state in which pictures may queue
    pub fn is_busy(&self) -> bool {
        matches!(&self.phase, Phase::Playing(item) if matches!(item.length, PlayLength::Timed(_)))
    }

    /// Nothing in front except possibly the marquee or the scoreboard
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::ScoreDelay)
    }

    pub fn active_score(&self) -> i64 {
        let index = usize::from(self.active_player.clamp(1, MAX_PLAYERS)) - 1;
        self.scores[index]
    }

    pub fn reset_scores(&mut self) {
        self.scores = [0; MAX_PLAYERS as usize];
        self.active_player = 1;
        self.player_count = 1;
    }

    pub fn scoreboard_view(&self, clean_background: bool) -> ScoreboardView {
        ScoreboardView {
            player_count: self.player_count,
            active_player: self.active_player,
            scores: self.scores,
            credits: self.credits,
            clean_background,
        }
    }

    pub fn foreground(&self) -> ForegroundKind {
        match &self.phase {
            Phase::Playing(item) => item.kind,
            _ if self.scoreboard_visible => ForegroundKind::Scoreboard,
            _ => ForegroundKind::None,
        }
    }

    /// Structural invariants given which timer slots are armed
    pub fn check(&self, expiry_armed: bool, auto_hide_armed: bool, loop_armed: bool) -> DisplayResult<()> {
        let expiry_expected = match &self.phase {
            Phase::Idle => false,
            Phase::Playing(item) => matches!(item.length, PlayLength::Timed(_)),
            Phase::ScoreDelay => true,
        };
        if expiry_expected != expiry_armed {
            return Err(DisplayError::ConcurrencyViolation("expiry timer out of step with phase"));
        }
        if self.scoreboard_visible != auto_hide_armed {
            return Err(DisplayError::ConcurrencyViolation("auto-hide timer out of step with scoreboard"));
        }
        if !self.queue.is_empty() && !self.is_busy() {
            return Err(DisplayError::ConcurrencyViolation("queue holds items while nothing timed plays"));
        }
        if loop_armed && !matches!(&self.phase, Phase::Playing(item) if item.kind == ForegroundKind::Text) {
            return Err(DisplayError::ConcurrencyViolation("text loop armed without text in front"));
        }
        if !(1..=MAX_PLAYERS).contains(&self.player_count) || !(1..=MAX_PLAYERS).contains(&self.active_player) {
            return Err(DisplayError::ConcurrencyViolation("player index out of range"));
        }
        Ok(())
    }
}

/// Read-only copy of the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub foreground: ForegroundKind,
    pub current: Option<Scene>,
    pub score_delay_pending: bool,
    pub queued: usize,
    pub marquee: Option<PathBuf>,
    pub scoreboard_visible: bool,
    pub player_count: u8,
    pub active_player: u8,
    pub scores: [i64; MAX_PLAYERS as usize],
    pub credits: u32,
    pub score_background: Option<(PathBuf, u8)>,
    /// Delays the armed timers were set with
    pub expiry: Option<Duration>,
    pub auto_hide: Option<Duration>,
    pub text_loop: Option<Duration>,
}

#[cfg(test)]
impl Snapshot {
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && !self.score_delay_pending
    }

    pub fn timers_idle(&self) -> bool {
        self.expiry.is_none() && self.auto_hide.is_none() && self.text_loop.is_none()
    }
}
