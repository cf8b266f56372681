//! Control commands
//!
//! Turns a decoded `command` + key/value parameters into a [`DisplayCommand`]
//! and runs it against the scheduler. Parameters that fail to parse fall back
//! to their defaults with a warning; only an unknown command or an asset that
//! cannot be resolved produces a non-`OK` status.

use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, error, warn};

use crate::color::HexColor;
use crate::config::Settings;
use crate::constants::response;
use crate::constants::score::MAX_BRIGHTNESS;
use crate::error::{DisplayError, DisplayResult};
use crate::scheduler::{PictureRequest, RequestedDuration, SceneRequest, Scheduler, ScoreRequest, TextRequest};
use crate::surface::{TextSize, TextStyle, Transition};

/// What a `display/picture` request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PictureRole {
    #[default]
    Content,
    /// Replace the idle marquee (new game)
    Marquee,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCommand {
    ShowPicture { request: PictureRequest, role: PictureRole },
    ShowText(TextRequest),
    ShowScore(ScoreRequest),
    SetScoreBackground { path: String, brightness: u8 },
    ShowScene(SceneRequest),
    Blank,
    StopLoop,
    Exit,
    Version,
}

impl DisplayCommand {
    /// `None` for commands this daemon does not know
    pub fn parse(command: &str, params: &BTreeMap<String, String>, settings: &Settings) -> Option<Self> {
        let name = command.trim().trim_matches('/').to_ascii_lowercase();
        let name = name.strip_prefix("v1/").unwrap_or(&name);
        let p = Params::new(params);

        let parsed = match name {
            "display/picture" | "display/picture2" | "display/video" => {
                let fixed = p.flag("fixed", false);
                let request = PictureRequest {
                    path: p.text("path").unwrap_or_default().to_string(),
                    duration: p.duration(),
                    animation: p.parsed("animation", Transition::None),
                    enqueue_if_busy: p.flag("queue", false),
                    fixed,
                };
                let role = match p.text("role").map(str::to_ascii_lowercase).as_deref() {
                    None | Some("content") => PictureRole::Content,
                    Some("marquee") => PictureRole::Marquee,
                    Some(other) => {
                        invalid("role", other);
                        PictureRole::Content
                    }
                };
                Self::ShowPicture { request, role }
            }
            "display/text" => Self::ShowText(TextRequest {
                text: p.text("text").unwrap_or_default().to_string(),
                style: p.style(settings),
                animation: p.parsed("animation", Transition::None),
                duration: p.duration(),
                clean_background: p.flag("cleanbg", true),
                looping: p.flag("loop", false),
            }),
            "display/score" => {
                let active_player = p.number("player", 1u8);
                Self::ShowScore(ScoreRequest {
                    player_count: p.optional_number("players"),
                    active_player,
                    score: p.number("score", 0i64),
                    credits: p.optional_number("credits"),
                    clean_background: p.flag("cleanbg", false),
                })
            }
            "display/scorebackground" | "display/scorebackgroundimage" => Self::SetScoreBackground {
                path: p.text("path").unwrap_or_default().to_string(),
                brightness: p.number("brightness", MAX_BRIGHTNESS).min(MAX_BRIGHTNESS),
            },
            "display/advanced" => Self::ShowScene(SceneRequest {
                text: p.text("text").map(str::to_string),
                style: p.style(settings),
                path: p.text("path").map(str::to_string),
                animation_in: p.parsed("animationin", Transition::None),
                animation_out: p.parsed("animationout", Transition::None),
                duration: p.duration(),
                clean_background: p.flag("cleanbg", true),
            }),
            "blank" => Self::Blank,
            "loopstop" => Self::StopLoop,
            "exit" => Self::Exit,
            "version" => Self::Version,
            _ => return None,
        };
        Some(parsed)
    }

    /// Run against the scheduler; the status string goes back to the caller
    pub fn execute(self, scheduler: &Scheduler) -> String {
        match self {
            Self::ShowPicture {
                request,
                role: PictureRole::Marquee,
            } => status(scheduler.set_marquee(&request.path)),
            Self::ShowPicture { request, .. } => status(scheduler.submit_picture(request)),
            Self::ShowText(request) => {
                scheduler.submit_text(request);
                response::OK.to_string()
            }
            Self::ShowScore(request) => {
                scheduler.submit_score(request);
                response::OK.to_string()
            }
            Self::SetScoreBackground { path, brightness } => status(scheduler.set_score_background(&path, brightness)),
            Self::ShowScene(request) => status(scheduler.submit_scene(request)),
            Self::Blank => {
                scheduler.blank();
                response::OK.to_string()
            }
            Self::StopLoop => {
                scheduler.stop_loop();
                response::OK.to_string()
            }
            Self::Exit => {
                scheduler.exit();
                response::OK.to_string()
            }
            Self::Version => env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parse and run one control request
pub fn handle(command: &str, params: &BTreeMap<String, String>, scheduler: &Scheduler) -> String {
    match DisplayCommand::parse(command, params, scheduler.settings()) {
        Some(parsed) => {
            debug!(command = %command, parsed = ?parsed, "Control command");
            let status = parsed.execute(scheduler);
            if cfg!(debug_assertions)
                && let Err(e) = scheduler.check_invariants()
            {
                error!(error = %e, "Scheduler state inconsistent");
            }
            status
        }
        None => {
            warn!(command = %command, "Unknown control command");
            response::NOT_IMPLEMENTED.to_string()
        }
    }
}

fn status(result: DisplayResult<()>) -> String {
    match result {
        Ok(()) => response::OK.to_string(),
        Err(e) => e.to_string(),
    }
}

fn invalid(name: &str, value: &str) {
    let error = DisplayError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    };
    warn!(error = %error, "Using default");
}

// ==============================================================================
// Parameter access
// ==============================================================================

/// Case-insensitive view over the request parameters
struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    fn new(raw: &BTreeMap<String, String>) -> Self {
        let values = raw
            .iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        Self { values }
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> T {
        match self.text(name) {
            None | Some("") => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                invalid(name, raw);
                default
            }),
        }
    }

    fn number<T: FromStr>(&self, name: &str, default: T) -> T {
        self.parsed(name, default)
    }

    fn optional_number<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.text(name).filter(|r| !r.is_empty())?;
        raw.parse()
            .inspect_err(|_| invalid(name, raw))
            .ok()
    }

    /// A present key with no value counts as `true`
    fn flag(&self, name: &str, default: bool) -> bool {
        match self.text(name).map(str::to_ascii_lowercase).as_deref() {
            None => default,
            Some("" | "true" | "1" | "yes" | "on") => true,
            Some("false" | "0" | "no" | "off") => false,
            Some(other) => {
                invalid(name, other);
                default
            }
        }
    }

    fn duration(&self) -> RequestedDuration {
        let seconds = match self.text("duration") {
            None | Some("") => 0.0,
            Some(raw) => match raw.parse::<f64>() {
                Ok(s) if s.is_finite() => s,
                _ => {
                    invalid("duration", raw);
                    0.0
                }
            },
        };
        RequestedDuration::from_seconds(seconds)
    }

    fn color(&self, name: &str, default: HexColor) -> HexColor {
        match self.text(name) {
            None | Some("") => default,
            Some(raw) => HexColor::parse(raw).unwrap_or_else(|| {
                invalid(name, raw);
                default
            }),
        }
    }

    fn style(&self, settings: &Settings) -> TextStyle {
        let defaults = TextStyle::from_settings(settings);
        TextStyle {
            size: self.parsed::<TextSize>("size", defaults.size),
            color: self.color("color", defaults.color),
            font: self.text("font").filter(|f| !f.is_empty()).map_or(defaults.font, str::to_string),
            border_color: self.color("bordercolor", defaults.border_color),
            border_size: self.number("bordersize", defaults.border_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn parse(command: &str, pairs: &[(&str, &str)]) -> Option<DisplayCommand> {
        DisplayCommand::parse(command, &params(pairs), &Settings::default())
    }

    #[test]
    fn test_parse_picture() {
        let cmd = parse(
            "display/picture",
            &[("path", "mame/galaga"), ("duration", "2.5"), ("animation", "ScrollOnLeft"), ("queue", "")],
        );
        let Some(DisplayCommand::ShowPicture { request, role }) = cmd else {
            panic!("expected picture, got {cmd:?}");
        };
        assert_eq!(role, PictureRole::Content);
        assert_eq!(request.path, "mame/galaga");
        assert_eq!(request.duration, RequestedDuration::Explicit(Duration::from_millis(2500)));
        assert_eq!(request.animation, Transition::ScrollOnLeft);
        assert!(request.enqueue_if_busy);
        assert!(!request.fixed);
    }

    #[test]
    fn test_parse_marquee_role() {
        let cmd = parse("/v1/display/picture", &[("path", "galaga"), ("role", "Marquee")]);
        assert!(matches!(
            cmd,
            Some(DisplayCommand::ShowPicture {
                role: PictureRole::Marquee,
                ..
            })
        ));
    }

    #[test]
    fn test_bad_values_fall_back_to_defaults() {
        let cmd = parse(
            "display/picture",
            &[("path", "galaga"), ("duration", "soon"), ("animation", "wobble"), ("queue", "maybe")],
        );
        let Some(DisplayCommand::ShowPicture { request, .. }) = cmd else {
            panic!("expected picture");
        };
        assert_eq!(request.duration, RequestedDuration::Natural);
        assert_eq!(request.animation, Transition::None);
        assert!(!request.enqueue_if_busy);
    }

    #[test]
    fn test_parse_text_with_style() {
        let cmd = parse(
            "display/text",
            &[
                ("text", "GAME|OVER"),
                ("size", "xl"),
                ("color", "yellow"),
                ("bordercolor", "#000000"),
                ("bordersize", "2"),
                ("duration", "-1"),
                ("loop", "true"),
            ],
        );
        let Some(DisplayCommand::ShowText(request)) = cmd else {
            panic!("expected text");
        };
        assert_eq!(request.style.size, TextSize::XL);
        assert_eq!(request.style.color, HexColor::parse("yellow").unwrap());
        assert_eq!(request.style.border_size, 2);
        assert_eq!(request.style.font, "Consolas");
        assert_eq!(request.duration, RequestedDuration::Indefinite);
        assert!(request.looping);
        assert!(request.clean_background);
    }

    #[test]
    fn test_parse_score() {
        let cmd = parse(
            "display/score",
            &[("players", "3"), ("player", "2"), ("score", "123456789012"), ("credits", "x")],
        );
        assert_eq!(
            cmd,
            Some(DisplayCommand::ShowScore(ScoreRequest {
                player_count: Some(3),
                active_player: 2,
                score: 123_456_789_012,
                credits: None,
                clean_background: false,
            }))
        );
    }

    #[test]
    fn test_parse_score_background_clamps_brightness() {
        let cmd = parse("display/scorebackgroundimage", &[("path", "bg"), ("brightness", "40")]);
        assert_eq!(
            cmd,
            Some(DisplayCommand::SetScoreBackground {
                path: "bg".to_string(),
                brightness: MAX_BRIGHTNESS,
            })
        );
    }

    #[test]
    fn test_parse_advanced() {
        let cmd = parse(
            "display/advanced",
            &[("text", "EXTRA BALL"), ("animationin", "6"), ("animationout", "FadeOut"), ("duration", "3")],
        );
        let Some(DisplayCommand::ShowScene(request)) = cmd else {
            panic!("expected scene");
        };
        assert_eq!(request.animation_in, Transition::ScrollOnLeft);
        assert_eq!(request.animation_out, Transition::FadeOut);
        assert_eq!(request.path, None);
    }

    #[test]
    fn test_simple_and_unknown_commands() {
        assert_eq!(parse("blank", &[]), Some(DisplayCommand::Blank));
        assert_eq!(parse("loopstop", &[]), Some(DisplayCommand::StopLoop));
        assert_eq!(parse("EXIT", &[]), Some(DisplayCommand::Exit));
        assert_eq!(parse("v1/version", &[]), Some(DisplayCommand::Version));
        assert_eq!(parse("display/hologram", &[]), None);
    }

    mod execute {
        use super::*;
        use crate::surface::SurfaceDispatcher;
        use crate::surface::recording::RecordingSurface;
        use std::sync::Arc;
        use tokio::runtime::Handle;

        fn scheduler(dir: &std::path::Path) -> Scheduler {
            let settings = Settings {
                artwork_path: dir.to_path_buf(),
                ..Settings::default()
            };
            let surface = Arc::new(RecordingSurface::default());
            let dispatcher = SurfaceDispatcher::spawn(surface, &Handle::current(), 1, Duration::from_millis(10));
            Scheduler::new(Arc::new(settings), dispatcher, Handle::current())
        }

        #[tokio::test(start_paused = true)]
        async fn test_handle_statuses() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("galaga.png"), b"").unwrap();
            let scheduler = scheduler(dir.path());

            let ok = handle("display/picture", &params(&[("path", "galaga"), ("duration", "5")]), &scheduler);
            assert_eq!(ok, response::OK);
            assert_eq!(scheduler.snapshot().expiry, Some(Duration::from_secs(5)));

            let missing = handle("display/picture", &params(&[("path", "nothing-here")]), &scheduler);
            assert!(missing.contains("nothing-here"), "{missing}");

            assert_eq!(handle("version", &params(&[]), &scheduler), env!("CARGO_PKG_VERSION"));
            assert_eq!(handle("display/hologram", &params(&[]), &scheduler), response::NOT_IMPLEMENTED);

            assert_eq!(handle("blank", &params(&[]), &scheduler), response::OK);
            assert!(scheduler.snapshot().is_idle());
        }

        #[tokio::test(start_paused = true)]
        async fn test_handle_marquee_role() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("galaga.png"), b"").unwrap();
            let scheduler = scheduler(dir.path());

            let status = handle(
                "display/picture",
                &params(&[("path", "galaga"), ("role", "marquee")]),
                &scheduler,
            );
            assert_eq!(status, response::OK);
            let snap = scheduler.snapshot();
            assert!(snap.marquee.is_some());
            assert!(snap.is_idle());
        }
    }
}
