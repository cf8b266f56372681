//! Display scheduler
//!
//! Owns everything that decides what is in front of the DMD: the foreground
//! phase, the FIFO of deferred pictures, the scoreboard overlay and the
//! marquee. All state sits behind one lock together with the three timer
//! slots that drive it, and timer callbacks claim their ticket under that
//! same lock. Asset resolution and media probing happen before the lock is
//! taken, so a failed lookup never changes anything.

mod request;
mod state;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use request::{PictureRequest, RequestedDuration, SceneRequest, ScoreRequest, TextRequest};
pub use state::{ForegroundKind, PlayLength, Snapshot};
use state::{Phase, QueueItem, SchedulerState};

use crate::assets::{AssetDescriptor, AssetResolver, ExtensionSet, MediaKind, natural_length};
use crate::config::Settings;
use crate::constants::score::{MAX_BRIGHTNESS, MAX_PLAYERS};
use crate::constants::timing::TEXT_LOOP_FRACTION;
use crate::error::{DisplayError, DisplayResult};
use crate::surface::{Presentation, Scene, SurfaceDispatcher, TextBlock, Transition};
use crate::timer::{Ticket, TimerKind, TimerSlot};

/// Handle to the single scheduler instance. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    resolver: AssetResolver,
    settings: Arc<Settings>,
    surface: SurfaceDispatcher,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    state: SchedulerState,
    expiry: TimerSlot,
    auto_hide: TimerSlot,
    text_loop: TimerSlot,
}

impl Scheduler {
    pub fn new(settings: Arc<Settings>, surface: SurfaceDispatcher, runtime: Handle) -> Self {
        let resolver = AssetResolver::new(settings.artwork_path.clone(), settings.fuzzy_cutoff);
        let (shutdown, _) = watch::channel(false);
        let inner = Inner {
            state: SchedulerState::default(),
            expiry: TimerSlot::new(TimerKind::AnimationExpiry, runtime.clone()),
            auto_hide: TimerSlot::new(TimerKind::ScoreAutoHide, runtime.clone()),
            text_loop: TimerSlot::new(TimerKind::TextLoop, runtime),
        };

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                resolver,
                settings,
                surface,
                shutdown,
            }),
        }
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.shared.resolver
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Flips to `true` once `exit` has blanked the display
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shared.shutdown.subscribe()
    }

    // ==========================================================================
    // Foreground
    // ==========================================================================

    pub fn submit_picture(&self, request: PictureRequest) -> DisplayResult<()> {
        let set = if request.fixed {
            ExtensionSet::StillImage
        } else {
            ExtensionSet::Content
        };
        let asset = self.shared.resolver.resolve_set(&request.path, set)?;
        let length = if request.fixed {
            PlayLength::Hold
        } else {
            play_length(request.duration, Some(&asset))
        };
        let kind = ForegroundKind::of_asset(&asset);
        let path = asset.full_path.clone();
        let item = QueueItem::new(
            Scene {
                background: Some(asset),
                text: None,
                animation_in: request.animation,
                animation_out: Transition::None,
                pause: None,
                clean_background: false,
            },
            kind,
            length,
        );

        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        // Only timed items queue; a hold would never hand over to the rest
        let timed = matches!(length, PlayLength::Timed(_));
        if request.enqueue_if_busy && timed && inner.state.is_busy() {
            inner.state.queue.push_back(item);
            info!(path = %path.display(), queued = inner.state.queue.len(), "Picture queued");
            return Ok(());
        }

        info!(path = %path.display(), length = ?length, animation = %request.animation, "Showing picture");
        replace_foreground(&self.shared, inner, item);
        Ok(())
    }

    pub fn submit_text(&self, request: TextRequest) {
        let mut guard = self.shared.inner.lock();
        info!(text = %request.text, looping = request.looping, "Showing text");
        show_text(&self.shared, &mut guard, request);
    }

    /// Text over an optional background with separate in/out transitions
    pub fn submit_scene(&self, request: SceneRequest) -> DisplayResult<()> {
        let path = request.path.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let text = request.text.as_deref().filter(|t| !t.is_empty());
        if path.is_none() && text.is_none() {
            return Err(DisplayError::InvalidParameter {
                name: "text".to_string(),
                value: String::new(),
            });
        }

        let asset = path
            .map(|p| self.shared.resolver.resolve_set(p, ExtensionSet::Content))
            .transpose()?;
        let length = play_length(request.duration, asset.as_ref());
        let kind = match (&asset, text) {
            (_, Some(_)) => ForegroundKind::Text,
            (Some(asset), None) => ForegroundKind::of_asset(asset),
            (None, None) => ForegroundKind::None,
        };
        let item = QueueItem::new(
            Scene {
                background: asset,
                text: text.map(|t| TextBlock::new(t, request.style.clone())),
                animation_in: request.animation_in,
                animation_out: request.animation_out,
                pause: None,
                clean_background: request.clean_background,
            },
            kind,
            length,
        );

        let mut guard = self.shared.inner.lock();
        info!(
            path = ?path,
            text = ?text,
            animation_in = %request.animation_in,
            animation_out = %request.animation_out,
            "Showing scene"
        );
        replace_foreground(&self.shared, &mut guard, item);
        Ok(())
    }

    /// Stop a looping text after its current pass
    pub fn stop_loop(&self) {
        if self.shared.inner.lock().text_loop.cancel() {
            info!("Text loop stopped");
        } else {
            debug!("No text loop to stop");
        }
    }

    // ==========================================================================
    // Marquee and scoreboard
    // ==========================================================================

    /// New idle image; a new marquee means a new game, so scores start over
    pub fn set_marquee(&self, path: &str) -> DisplayResult<()> {
        let asset = self.shared.resolver.resolve_set(path, ExtensionSet::StillImage)?;

        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        info!(path = %asset.full_path.display(), "Marquee set");
        inner.state.marquee = Some(asset);
        inner.state.reset_scores();

        if inner.state.is_idle() {
            inner.expiry.cancel();
            inner.state.phase = Phase::Idle;
            hide_scoreboard(&self.shared, inner);
            post_marquee(&self.shared, inner);
        }
        Ok(())
    }

    pub fn submit_score(&self, request: ScoreRequest) {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        let state = &mut inner.state;

        let player = request.active_player.clamp(1, MAX_PLAYERS);
        state.active_player = player;
        state.player_count = request
            .player_count
            .unwrap_or(state.player_count)
            .max(player)
            .clamp(1, MAX_PLAYERS);
        state.scores[usize::from(player) - 1] = request.score;
        if let Some(credits) = request.credits {
            state.credits = credits;
        }
        debug!(player = player, score = request.score, players = state.player_count, "Score updated");

        if !self.shared.settings.display_score {
            return;
        }
        if state.is_busy() && !request.clean_background {
            debug!("Scoreboard deferred until the animation ends");
            return;
        }
        if state.phase == Phase::ScoreDelay {
            inner.expiry.cancel();
            inner.state.phase = Phase::Idle;
        }
        show_scoreboard(&self.shared, inner, request.clean_background);
    }

    /// Backdrop behind the scoreboard. Leaves timers and the queue alone.
    pub fn set_score_background(&self, path: &str, brightness: u8) -> DisplayResult<()> {
        let asset = self.shared.resolver.resolve_set(path, ExtensionSet::StillImage)?;
        let brightness = brightness.min(MAX_BRIGHTNESS);

        let mut inner = self.shared.inner.lock();
        info!(path = %asset.full_path.display(), brightness = brightness, "Score background set");
        inner.state.score_background = Some((asset.clone(), brightness));
        self.shared
            .surface
            .post(Presentation::ScoreBackground { asset, brightness });
        Ok(())
    }

    // ==========================================================================
    // Lifecycle
    // ==========================================================================

    pub fn blank(&self) {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        inner.expiry.cancel();
        inner.auto_hide.cancel();
        inner.text_loop.cancel();

        let state = &mut inner.state;
        state.queue.clear();
        state.phase = Phase::Idle;
        state.scoreboard_visible = false;
        state.marquee = None;

        self.shared.surface.post(Presentation::Clear);
        info!("Display blanked");
    }

    /// Blank, then tell the process to stop
    pub fn exit(&self) {
        self.blank();
        info!("Exit requested");
        self.shared.shutdown.send_replace(true);
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.shared.inner.lock();
        let state = &inner.state;
        Snapshot {
            foreground: state.foreground(),
            current: match &state.phase {
                Phase::Playing(item) => Some(item.scene.clone()),
                _ => None,
            },
            score_delay_pending: state.phase == Phase::ScoreDelay,
            queued: state.queue.len(),
            marquee: state.marquee.as_ref().map(|m| m.full_path.clone()),
            scoreboard_visible: state.scoreboard_visible,
            player_count: state.player_count,
            active_player: state.active_player,
            scores: state.scores,
            credits: state.credits,
            score_background: state
                .score_background
                .as_ref()
                .map(|(asset, brightness)| (asset.full_path.clone(), *brightness)),
            expiry: inner.expiry.armed_delay(),
            auto_hide: inner.auto_hide.armed_delay(),
            text_loop: inner.text_loop.armed_delay(),
        }
    }

    /// Verify state and timer slots agree with each other
    pub fn check_invariants(&self) -> DisplayResult<()> {
        let inner = self.shared.inner.lock();
        inner.state.check(
            inner.expiry.is_armed(),
            inner.auto_hide.is_armed(),
            inner.text_loop.is_armed(),
        )
    }
}

// ==============================================================================
// Transitions under the lock
// ==============================================================================

fn play_length(duration: RequestedDuration, asset: Option<&AssetDescriptor>) -> PlayLength {
    match duration {
        RequestedDuration::Indefinite => PlayLength::Hold,
        RequestedDuration::Explicit(d) => PlayLength::Timed(d),
        RequestedDuration::Natural => match asset {
            Some(asset) if asset.kind == MediaKind::Video => match natural_length(asset) {
                Some(d) => PlayLength::Timed(d),
                None => {
                    warn!(path = %asset.full_path.display(), "Clip length unknown, holding until replaced");
                    PlayLength::Hold
                }
            },
            _ => PlayLength::Hold,
        },
    }
}

/// Drop whatever is in front (and queued) and show `item`
fn replace_foreground(shared: &Arc<Shared>, inner: &mut Inner, item: QueueItem) {
    inner.expiry.cancel();
    inner.text_loop.cancel();
    inner.state.queue.clear();
    hide_scoreboard(shared, inner);
    start_item(shared, inner, item);
}

fn start_item(shared: &Arc<Shared>, inner: &mut Inner, item: QueueItem) {
    shared.surface.post(Presentation::Scene(item.scene.clone()));
    if let PlayLength::Timed(delay) = item.length {
        arm_expiry(shared, inner, delay);
    }
    inner.state.phase = Phase::Playing(item);
}

fn show_text(shared: &Arc<Shared>, inner: &mut Inner, request: TextRequest) {
    let length = play_length(request.duration, None);
    let item = QueueItem::new(
        Scene {
            background: None,
            text: Some(TextBlock::new(&request.text, request.style.clone())),
            animation_in: request.animation,
            animation_out: Transition::None,
            pause: None,
            clean_background: request.clean_background,
        },
        ForegroundKind::Text,
        length,
    );
    replace_foreground(shared, inner, item);

    if !request.looping {
        return;
    }
    let PlayLength::Timed(duration) = length else {
        warn!(text = %request.text, "Looping text needs a positive duration, showing once");
        return;
    };
    let weak = Arc::downgrade(shared);
    inner.text_loop.arm(duration.mul_f64(TEXT_LOOP_FRACTION), move |ticket| {
        if let Some(shared) = weak.upgrade() {
            on_text_loop(&shared, ticket, request);
        }
    });
}

fn show_scoreboard(shared: &Arc<Shared>, inner: &mut Inner, clean_background: bool) {
    let view = inner.state.scoreboard_view(clean_background);
    debug!(players = view.player_count, active = view.active_player, "Scoreboard shown");
    shared.surface.post(Presentation::Scoreboard(view));
    inner.state.scoreboard_visible = true;

    let weak = Arc::downgrade(shared);
    inner
        .auto_hide
        .arm(shared.settings.display_score_duration(), move |ticket| {
            if let Some(shared) = weak.upgrade() {
                on_auto_hide(&shared, ticket);
            }
        });
}

fn hide_scoreboard(shared: &Shared, inner: &mut Inner) {
    let was_armed = inner.auto_hide.cancel();
    if was_armed || inner.state.scoreboard_visible {
        inner.state.scoreboard_visible = false;
        shared.surface.post(Presentation::HideScoreboard);
    }
}

fn post_marquee(shared: &Shared, inner: &Inner) {
    match &inner.state.marquee {
        Some(marquee) => shared.surface.post(Presentation::Marquee(marquee.clone())),
        None => shared.surface.post(Presentation::Clear),
    }
}

fn arm_expiry(shared: &Arc<Shared>, inner: &mut Inner, delay: Duration) {
    let weak = Arc::downgrade(shared);
    inner.expiry.arm(delay, move |ticket| {
        if let Some(shared) = weak.upgrade() {
            on_expiry(&shared, ticket);
        }
    });
}

// ==============================================================================
// Timer callbacks
// ==============================================================================

fn on_expiry(shared: &Arc<Shared>, ticket: Ticket) {
    let mut guard = shared.inner.lock();
    let inner = &mut *guard;
    if !inner.expiry.claim(ticket) {
        return;
    }

    if inner.state.phase == Phase::ScoreDelay {
        inner.state.phase = Phase::Idle;
        show_scoreboard(shared, inner, false);
        return;
    }

    inner.text_loop.cancel();
    if let Some(next) = inner.state.queue.pop_front() {
        debug!(remaining = inner.state.queue.len(), "Playing next queued item");
        start_item(shared, inner, next);
    } else if shared.settings.display_score && inner.state.active_score() > 0 {
        debug!("Animation ended, scoreboard follows");
        inner.state.phase = Phase::ScoreDelay;
        arm_expiry(shared, inner, shared.settings.score_delay());
    } else {
        debug!("Animation ended, back to marquee");
        inner.state.phase = Phase::Idle;
        post_marquee(shared, inner);
    }
}

fn on_auto_hide(shared: &Arc<Shared>, ticket: Ticket) {
    let mut guard = shared.inner.lock();
    let inner = &mut *guard;
    if !inner.auto_hide.claim(ticket) {
        return;
    }

    debug!("Scoreboard auto-hidden");
    inner.state.scoreboard_visible = false;
    shared.surface.post(Presentation::HideScoreboard);
    if inner.state.phase == Phase::Idle {
        post_marquee(shared, inner);
    }
}

fn on_text_loop(shared: &Arc<Shared>, ticket: Ticket, request: TextRequest) {
    let mut guard = shared.inner.lock();
    let inner = &mut *guard;
    if !inner.text_loop.claim(ticket) {
        return;
    }
    if !inner.state.queue.is_empty() {
        debug!("Queued content waiting, text loop ends");
        return;
    }

    debug!(text = %request.text, "Re-issuing looping text");
    show_text(shared, inner, request);
}
