//! Presentation surface
//!
//! The scheduler never renders. It posts [`Presentation`] descriptors to a
//! [`SurfaceDispatcher`], which hands them to the surface on a worker task in
//! posting order. A surface that is not initialised yet answers
//! [`DisplayError::SurfaceUnavailable`] and the dispatcher retries a bounded
//! number of times before dropping the descriptor. Frames that pile up behind
//! a surface that is not ready are coalesced: only the newest full-frame
//! descriptor survives.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::assets::AssetDescriptor;
use crate::color::HexColor;
use crate::config::Settings;
use crate::constants::score::MAX_PLAYERS;
use crate::error::DisplayError;

// ==============================================================================
// Transitions
// ==============================================================================

/// Entry/exit animation of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    None,
    FadeIn,
    FadeOut,
    ZoomIn,
    ZoomOut,
    ScrollOffLeft,
    ScrollOffRight,
    ScrollOnLeft,
    ScrollOnRight,
    ScrollOffUp,
    ScrollOffDown,
    ScrollOnUp,
    ScrollOnDown,
    /// Continuous scroll across the whole display (text)
    ScrollLeft,
    ScrollRight,
    ScrollUp,
    ScrollDown,
}

/// Name, legacy numeric code, transition
const TRANSITIONS: &[(&str, Option<u8>, Transition)] = &[
    ("none", Some(14), Transition::None),
    ("fadein", Some(0), Transition::FadeIn),
    ("fade", None, Transition::FadeIn),
    ("fadeout", Some(1), Transition::FadeOut),
    ("zoomin", Some(2), Transition::ZoomIn),
    ("zoomout", Some(3), Transition::ZoomOut),
    ("scrolloffleft", Some(4), Transition::ScrollOffLeft),
    ("scrolloffright", Some(5), Transition::ScrollOffRight),
    ("scrollonleft", Some(6), Transition::ScrollOnLeft),
    ("scrollonright", Some(7), Transition::ScrollOnRight),
    ("scrolloffup", Some(8), Transition::ScrollOffUp),
    ("scrolloffdown", Some(9), Transition::ScrollOffDown),
    ("scrollonup", Some(10), Transition::ScrollOnUp),
    ("scrollondown", Some(11), Transition::ScrollOnDown),
    ("scrollleft", None, Transition::ScrollLeft),
    ("scrollright", None, Transition::ScrollRight),
    ("scrollup", None, Transition::ScrollUp),
    ("scrolldown", None, Transition::ScrollDown),
];

impl Transition {
    pub fn name(self) -> &'static str {
        TRANSITIONS
            .iter()
            .find(|(_, _, t)| *t == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("none")
    }
}

impl FromStr for Transition {
    type Err = ();

    /// Accepts names (case-insensitive) and the legacy UltraDMD numeric codes
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return TRANSITIONS
                .iter()
                .find(|(_, c, _)| *c == Some(code))
                .map(|(_, _, t)| *t)
                .ok_or(());
        }
        TRANSITIONS
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, _, t)| *t)
            .ok_or(())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ==============================================================================
// Text
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSize {
    XS,
    S,
    #[default]
    M,
    L,
    XL,
    XXL,
}

impl FromStr for TextSize {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XS" => Ok(Self::XS),
            "S" => Ok(Self::S),
            "M" => Ok(Self::M),
            "L" => Ok(Self::L),
            "XL" => Ok(Self::XL),
            "XXL" => Ok(Self::XXL),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextStyle {
    pub size: TextSize,
    pub color: HexColor,
    pub font: String,
    pub border_color: HexColor,
    pub border_size: u8,
}

impl TextStyle {
    /// Defaults from the settings file; anything a request omits comes from here
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            size: TextSize::default(),
            color: HexColor::parse(&settings.text_color).unwrap_or(HexColor::WHITE),
            font: settings.text_font.clone(),
            border_color: HexColor::parse(&settings.text_border_color).unwrap_or(HexColor::RED),
            border_size: 0,
        }
    }
}

/// Lines of text with their style. `|` in the request becomes a line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub style: TextStyle,
}

impl TextBlock {
    pub fn new(raw: &str, style: TextStyle) -> Self {
        let lines = raw
            .split(['|', '\n'])
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        Self { lines, style }
    }
}

// ==============================================================================
// Descriptors
// ==============================================================================

/// One foreground item: picture, clip, text or any combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub background: Option<AssetDescriptor>,
    pub text: Option<TextBlock>,
    pub animation_in: Transition,
    pub animation_out: Transition,
    /// How long the scene holds between its transitions; `None` = until replaced
    pub pause: Option<Duration>,
    pub clean_background: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreboardView {
    pub player_count: u8,
    pub active_player: u8,
    pub scores: [i64; MAX_PLAYERS as usize],
    pub credits: u32,
    pub clean_background: bool,
}

/// What the scheduler asks the surface to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    Scene(Scene),
    Marquee(AssetDescriptor),
    Scoreboard(ScoreboardView),
    HideScoreboard,
    ScoreBackground { asset: AssetDescriptor, brightness: u8 },
    Clear,
}

impl Presentation {
    /// Replaces the whole frame, making any earlier frame moot
    fn is_full_frame(&self) -> bool {
        matches!(self, Self::Scene(_) | Self::Marquee(_) | Self::Clear)
    }
}

/// Renders presentations. Called from the dispatcher task only.
pub trait PresentationSurface: Send + Sync + 'static {
    /// Show `presentation`. Return [`DisplayError::SurfaceUnavailable`] while
    /// not initialised; the dispatcher will retry.
    fn present(&self, presentation: &Presentation) -> Result<(), DisplayError>;
}

// ==============================================================================
// Dispatcher
// ==============================================================================

/// Non-blocking, order-preserving hand-off to the surface
#[derive(Debug, Clone)]
pub struct SurfaceDispatcher {
    tx: mpsc::UnboundedSender<Presentation>,
}

impl SurfaceDispatcher {
    pub fn spawn(
        surface: Arc<dyn PresentationSurface>,
        runtime: &Handle,
        attempts: u32,
        retry_interval: Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Presentation>();
        let attempts = attempts.max(1);

        runtime.spawn(async move {
            let mut backlog = VecDeque::new();
            loop {
                let presentation = match backlog.pop_front() {
                    Some(presentation) => presentation,
                    None => match rx.recv().await {
                        Some(presentation) => presentation,
                        None => break,
                    },
                };
                if superseded(&presentation, &backlog) {
                    debug!(presentation = ?presentation, "Stale frame skipped");
                    continue;
                }
                let mut pending = Pending {
                    rx: &mut rx,
                    backlog: &mut backlog,
                };
                deliver(surface.as_ref(), &presentation, attempts, retry_interval, &mut pending).await;
            }
            debug!("Surface dispatcher stopped");
        });

        Self { tx }
    }

    /// Queue `presentation` for the surface. Never blocks.
    pub fn post(&self, presentation: Presentation) {
        if self.tx.send(presentation).is_err() {
            warn!("Surface dispatcher is gone, presentation dropped");
        }
    }
}

/// Descriptors posted while a delivery is backing off
struct Pending<'a> {
    rx: &'a mut mpsc::UnboundedReceiver<Presentation>,
    backlog: &'a mut VecDeque<Presentation>,
}

impl Pending<'_> {
    fn collect(&mut self) {
        while let Ok(presentation) = self.rx.try_recv() {
            self.backlog.push_back(presentation);
        }
    }
}

fn superseded(presentation: &Presentation, backlog: &VecDeque<Presentation>) -> bool {
    presentation.is_full_frame() && backlog.iter().any(Presentation::is_full_frame)
}

async fn deliver(
    surface: &dyn PresentationSurface,
    presentation: &Presentation,
    attempts: u32,
    retry_interval: Duration,
    pending: &mut Pending<'_>,
) {
    for attempt in 1..=attempts {
        match surface.present(presentation) {
            Ok(()) => return,
            Err(DisplayError::SurfaceUnavailable) => {
                if attempt < attempts {
                    debug!(attempt = attempt, max = attempts, "Surface not ready, retrying");
                    tokio::time::sleep(retry_interval).await;
                    pending.collect();
                    if superseded(presentation, pending.backlog) {
                        debug!("Newer frame queued, dropping the one waiting for the surface");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Surface rejected presentation");
                return;
            }
        }
    }
    error!(attempts = attempts, presentation = ?presentation, "Surface never became ready, presentation dropped");
}

// ==============================================================================
// Log surface
// ==============================================================================

/// Headless surface: logs every presentation it receives
#[derive(Debug, Clone)]
pub struct LogSurface {
    width: u16,
    height: u16,
}

impl LogSurface {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

impl PresentationSurface for LogSurface {
    fn present(&self, presentation: &Presentation) -> Result<(), DisplayError> {
        match presentation {
            Presentation::Scene(scene) => info!(
                width = self.width,
                height = self.height,
                background = ?scene.background.as_ref().map(|a| a.full_path.display().to_string()),
                text = ?scene.text.as_ref().map(|t| t.lines.join(" / ")),
                animation_in = %scene.animation_in,
                animation_out = %scene.animation_out,
                pause_ms = ?scene.pause.map(|p| p.as_millis() as u64),
                clean_background = scene.clean_background,
                "Scene"
            ),
            Presentation::Marquee(asset) => info!(path = %asset.full_path.display(), "Marquee"),
            Presentation::Scoreboard(view) => info!(
                players = view.player_count,
                active = view.active_player,
                scores = ?view.scores,
                credits = view.credits,
                "Scoreboard"
            ),
            Presentation::HideScoreboard => info!("Scoreboard hidden"),
            Presentation::ScoreBackground { asset, brightness } => {
                info!(path = %asset.full_path.display(), brightness = brightness, "Score background")
            }
            Presentation::Clear => info!("Display cleared"),
        }
        Ok(())
    }
}

// ==============================================================================
// Test surface
// ==============================================================================

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Records presentations; optionally refuses the first N attempts
    #[derive(Default)]
    pub(crate) struct RecordingSurface {
        pub(crate) shown: Mutex<Vec<Presentation>>,
        pub(crate) refuse_first: AtomicU32,
    }

    impl RecordingSurface {
        pub(crate) fn shown(&self) -> Vec<Presentation> {
            self.shown.lock().clone()
        }

        pub(crate) fn last(&self) -> Option<Presentation> {
            self.shown.lock().last().cloned()
        }
    }

    impl PresentationSurface for RecordingSurface {
        fn present(&self, presentation: &Presentation) -> Result<(), DisplayError> {
            let refused = self
                .refuse_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(DisplayError::SurfaceUnavailable);
            }
            self.shown.lock().push(presentation.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingSurface;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_transition_names_and_codes() {
        assert_eq!("ScrollOnLeft".parse::<Transition>(), Ok(Transition::ScrollOnLeft));
        assert_eq!("fade".parse::<Transition>(), Ok(Transition::FadeIn));
        assert_eq!("14".parse::<Transition>(), Ok(Transition::None));
        assert_eq!("4".parse::<Transition>(), Ok(Transition::ScrollOffLeft));
        assert!("12".parse::<Transition>().is_err());
        assert!("wobble".parse::<Transition>().is_err());
        assert_eq!(Transition::ScrollRight.to_string(), "scrollright");
    }

    #[test]
    fn test_text_block_line_breaks() {
        let style = TextStyle {
            size: TextSize::M,
            color: HexColor::WHITE,
            font: "Consolas".to_string(),
            border_color: HexColor::RED,
            border_size: 0,
        };
        let block = TextBlock::new("GAME|OVER\nINSERT COIN", style);
        assert_eq!(block.lines, vec!["GAME", "OVER", "INSERT COIN"]);
    }

    #[test]
    fn test_text_size_parse() {
        assert_eq!("xxl".parse::<TextSize>(), Ok(TextSize::XXL));
        assert!("huge".parse::<TextSize>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_preserves_order() {
        let surface = Arc::new(RecordingSurface::default());
        let dispatcher = SurfaceDispatcher::spawn(surface.clone(), &Handle::current(), 10, Duration::from_secs(1));

        dispatcher.post(Presentation::Clear);
        dispatcher.post(Presentation::HideScoreboard);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(surface.shown(), vec![Presentation::Clear, Presentation::HideScoreboard]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_retries_until_ready() {
        let surface = Arc::new(RecordingSurface::default());
        surface.refuse_first.store(3, Ordering::SeqCst);
        let dispatcher = SurfaceDispatcher::spawn(surface.clone(), &Handle::current(), 10, Duration::from_secs(1));

        dispatcher.post(Presentation::Clear);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(surface.shown().is_empty(), "still backing off");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(surface.shown(), vec![Presentation::Clear]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_drops_after_max_attempts() {
        let surface = Arc::new(RecordingSurface::default());
        surface.refuse_first.store(10, Ordering::SeqCst);
        let dispatcher = SurfaceDispatcher::spawn(surface.clone(), &Handle::current(), 10, Duration::from_secs(1));

        dispatcher.post(Presentation::Clear);
        dispatcher.post(Presentation::HideScoreboard);
        tokio::time::sleep(Duration::from_secs(20)).await;

        // First descriptor used up all ten attempts; the next one goes through
        assert_eq!(surface.shown(), vec![Presentation::HideScoreboard]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_coalesces_frames_while_not_ready() {
        let surface = Arc::new(RecordingSurface::default());
        surface.refuse_first.store(2, Ordering::SeqCst);
        let dispatcher = SurfaceDispatcher::spawn(surface.clone(), &Handle::current(), 10, Duration::from_secs(1));

        dispatcher.post(Presentation::Clear);
        tokio::time::sleep(Duration::from_millis(1)).await;
        for _ in 0..50 {
            dispatcher.post(Presentation::HideScoreboard);
            dispatcher.post(Presentation::Clear);
        }
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // The first frame and all but the last queued frame were superseded
        let shown = surface.shown();
        assert_eq!(shown.len(), 51);
        assert_eq!(shown.iter().filter(|p| **p == Presentation::Clear).count(), 1);
        assert_eq!(shown.last(), Some(&Presentation::Clear));
    }
}
