//! Daemon settings
//!
//! Flat TOML file loaded once at startup. Missing keys are backfilled into
//! the file (comments and ordering preserved via `toml_edit`), environment
//! variables override file values, and everything is clamped to safe ranges
//! before the scheduler sees it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use toml_edit::DocumentMut;
use tracing::{error, info, warn};

use crate::color::HexColor;
use crate::constants::fuzzy;

// ==============================================================================
// Validation limits
// ==============================================================================

const MAX_SCORE_DURATION_S: u32 = 600;
const MAX_SCORE_DELAY_MS: u64 = 10_000;
const MIN_DMD_DIMENSION: u16 = 8;
const MAX_DMD_DIMENSION: u16 = 1024;
const MIN_ATTRACT_CYCLE_S: u32 = 1;
const MAX_RETRY_ATTEMPTS: u32 = 100;
const MAX_EXIT_GRACE_MS: u64 = 10_000;

/// Settings consumed by the scheduler, the attract module and the control socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory holding pictures, clips and the marquee
    #[serde(default = "default_artwork_path")]
    pub artwork_path: PathBuf,

    /// Marquee shown at startup (logical path, no extension)
    #[serde(default = "default_start_picture")]
    pub start_picture: String,

    /// Show the scoreboard at all
    #[serde(default = "default_true")]
    pub display_score: bool,

    /// Seconds the scoreboard stays up before the marquee returns
    #[serde(default = "default_display_score_duration_s")]
    pub display_score_duration_s: u32,

    /// Grace between an animation ending and the scoreboard appearing
    #[serde(default = "default_score_delay_ms")]
    pub score_delay_ms: u64,

    #[serde(default = "default_dmd_width")]
    pub dmd_width: u16,
    #[serde(default = "default_dmd_height")]
    pub dmd_height: u16,

    /// Minimum similarity (0-100) for fuzzy asset matches
    #[serde(default = "default_fuzzy_cutoff")]
    pub fuzzy_cutoff: u8,

    /// Enable autonomous content after inactivity
    #[serde(default)]
    pub attract_mode: bool,
    #[serde(default = "default_attract_inactivity_s")]
    pub attract_inactivity_s: u32,
    #[serde(default = "default_attract_cycle_s")]
    pub attract_cycle_s: u32,

    /// 12 or 24
    #[serde(default = "default_hour_format")]
    pub hour_format: u8,

    #[serde(default = "default_surface_retry_attempts")]
    pub surface_retry_attempts: u32,
    #[serde(default = "default_surface_retry_interval_ms")]
    pub surface_retry_interval_ms: u64,

    /// Delay between `exit` blanking the display and the process stopping
    #[serde(default = "default_exit_grace_ms")]
    pub exit_grace_ms: u64,

    /// Override for the control socket location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_socket: Option<PathBuf>,

    /// Force debug-level logging
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_text_font")]
    pub text_font: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    #[serde(default = "default_text_border_color")]
    pub text_border_color: String,
}

fn default_artwork_path() -> PathBuf {
    PathBuf::from("artwork")
}

fn default_start_picture() -> String {
    "DOF2DMD".to_string()
}

fn default_true() -> bool {
    true
}

fn default_display_score_duration_s() -> u32 {
    5
}

fn default_score_delay_ms() -> u64 {
    1000
}

fn default_dmd_width() -> u16 {
    128
}

fn default_dmd_height() -> u16 {
    32
}

fn default_fuzzy_cutoff() -> u8 {
    fuzzy::DEFAULT_CUTOFF
}

fn default_attract_inactivity_s() -> u32 {
    60
}

fn default_attract_cycle_s() -> u32 {
    10
}

fn default_hour_format() -> u8 {
    24
}

fn default_surface_retry_attempts() -> u32 {
    10
}

fn default_surface_retry_interval_ms() -> u64 {
    1000
}

fn default_exit_grace_ms() -> u64 {
    500
}

fn default_text_font() -> String {
    "Consolas".to_string()
}

fn default_text_color() -> String {
    HexColor::WHITE.to_hex_string()
}

fn default_text_border_color() -> String {
    HexColor::RED.to_hex_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            artwork_path: default_artwork_path(),
            start_picture: default_start_picture(),
            display_score: true,
            display_score_duration_s: default_display_score_duration_s(),
            score_delay_ms: default_score_delay_ms(),
            dmd_width: default_dmd_width(),
            dmd_height: default_dmd_height(),
            fuzzy_cutoff: default_fuzzy_cutoff(),
            attract_mode: false,
            attract_inactivity_s: default_attract_inactivity_s(),
            attract_cycle_s: default_attract_cycle_s(),
            hour_format: default_hour_format(),
            surface_retry_attempts: default_surface_retry_attempts(),
            surface_retry_interval_ms: default_surface_retry_interval_ms(),
            exit_grace_ms: default_exit_grace_ms(),
            control_socket: None,
            debug: false,
            text_font: default_text_font(),
            text_color: default_text_color(),
            text_border_color: default_text_border_color(),
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    /// Load settings from `path` (or the default location).
    ///
    /// A missing file is created with defaults. A file that fails to parse is
    /// an error: the user's file is left untouched so they can fix it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let mut settings = match fs::read_to_string(&path) {
            Ok(contents) => {
                let settings = toml::from_str::<Settings>(&contents)
                    .with_context(|| format!("Failed to parse settings file {}", path.display()))?;

                let (new_contents, added) = Self::add_missing_defaults_to_document(&contents, &settings);
                if !added.is_empty() {
                    info!(added_keys = ?added, path = %path.display(), "Added missing default(s) to settings file");
                    if let Err(e) = fs::write(&path, new_contents) {
                        error!(error = ?e, path = %path.display(), "Failed to persist settings backfill");
                    }
                }
                settings
            }
            Err(_) => {
                info!(path = %path.display(), "No settings file found, writing defaults");
                let settings = Self::default();
                if let Err(e) = settings.save(&path) {
                    warn!(error = %e, "Failed to write default settings, continuing with defaults");
                }
                settings
            }
        };

        settings.apply_env_overrides();
        settings.validate_and_clamp();
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create settings directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;
        fs::write(path, contents).context(format!("Failed to write settings file to {}", path.display()))?;
        Ok(())
    }

    /// Add every top-level key missing from `contents`, using values from
    /// `settings`. Returns the updated TOML text and the keys that were added.
    /// Existing keys, comments and ordering are left alone.
    pub(crate) fn add_missing_defaults_to_document(contents: &str, settings: &Settings) -> (String, Vec<String>) {
        let mut doc = DocumentMut::from_str(contents).unwrap_or_else(|_| DocumentMut::new());
        let mut added = Vec::new();

        let Some(full) = toml::to_string(settings)
            .ok()
            .and_then(|s| DocumentMut::from_str(&s).ok())
        else {
            return (doc.to_string(), added);
        };

        for (key, item) in full.as_table().iter() {
            if !doc.as_table().contains_key(key) {
                doc[key] = item.clone();
                added.push(key.to_string());
            }
        }

        (doc.to_string(), added)
    }

    fn parse_env<T: FromStr>(var: &str) -> Option<T>
    where
        <T as FromStr>::Err: std::fmt::Debug,
    {
        let raw = env::var(var).ok()?;
        raw.trim()
            .parse::<T>()
            .inspect_err(|e| error!(var = %var, value = %raw, error = ?e, "failed to parse env var"))
            .ok()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("ARTWORK_PATH") {
            self.artwork_path = PathBuf::from(path);
        }
        if let Ok(picture) = env::var("START_PICTURE") {
            self.start_picture = picture;
        }
        if let Some(enabled) = Self::parse_env("DISPLAY_SCORE") {
            self.display_score = enabled;
        }
        if let Some(seconds) = Self::parse_env("DISPLAY_SCORE_DURATION_S") {
            self.display_score_duration_s = seconds;
        }
        if let Some(enabled) = Self::parse_env("ATTRACT_MODE") {
            self.attract_mode = enabled;
        }
        if let Some(seconds) = Self::parse_env("ATTRACT_INACTIVITY_S") {
            self.attract_inactivity_s = seconds;
        }
        if let Ok(socket) = env::var("CONTROL_SOCKET") {
            self.control_socket = Some(PathBuf::from(socket));
        }
    }

    /// Clamp values to ranges the scheduler can work with
    pub(crate) fn validate_and_clamp(&mut self) {
        if self.display_score_duration_s == 0 {
            warn!(using = default_display_score_duration_s(), "display_score_duration_s is 0, using default");
            self.display_score_duration_s = default_display_score_duration_s();
        } else if self.display_score_duration_s > MAX_SCORE_DURATION_S {
            warn!(display_score_duration_s = self.display_score_duration_s, max = MAX_SCORE_DURATION_S, "display_score_duration_s exceeds maximum, clamping");
            self.display_score_duration_s = MAX_SCORE_DURATION_S;
        }

        if self.score_delay_ms > MAX_SCORE_DELAY_MS {
            warn!(score_delay_ms = self.score_delay_ms, max = MAX_SCORE_DELAY_MS, "score_delay_ms exceeds maximum, clamping");
            self.score_delay_ms = MAX_SCORE_DELAY_MS;
        }

        for (name, value, default) in [
            ("dmd_width", &mut self.dmd_width, default_dmd_width()),
            ("dmd_height", &mut self.dmd_height, default_dmd_height()),
        ] {
            if *value < MIN_DMD_DIMENSION {
                warn!(setting = name, value = *value, using = default, "dimension below minimum, using default");
                *value = default;
            } else if *value > MAX_DMD_DIMENSION {
                warn!(setting = name, value = *value, max = MAX_DMD_DIMENSION, "dimension exceeds maximum, clamping");
                *value = MAX_DMD_DIMENSION;
            }
        }

        if self.fuzzy_cutoff > 100 {
            warn!(fuzzy_cutoff = self.fuzzy_cutoff, "fuzzy_cutoff exceeds 100, clamping");
            self.fuzzy_cutoff = 100;
        }

        if self.attract_cycle_s < MIN_ATTRACT_CYCLE_S {
            warn!(using = default_attract_cycle_s(), "attract_cycle_s is 0, using default");
            self.attract_cycle_s = default_attract_cycle_s();
        }
        if self.attract_inactivity_s == 0 {
            warn!(using = default_attract_inactivity_s(), "attract_inactivity_s is 0, using default");
            self.attract_inactivity_s = default_attract_inactivity_s();
        }

        if self.hour_format != 12 && self.hour_format != 24 {
            warn!(hour_format = self.hour_format, "hour_format must be 12 or 24, using 24");
            self.hour_format = 24;
        }

        if self.surface_retry_attempts == 0 {
            warn!("surface_retry_attempts is 0, a presentation gets one attempt");
            self.surface_retry_attempts = 1;
        } else if self.surface_retry_attempts > MAX_RETRY_ATTEMPTS {
            warn!(surface_retry_attempts = self.surface_retry_attempts, max = MAX_RETRY_ATTEMPTS, "surface_retry_attempts exceeds maximum, clamping");
            self.surface_retry_attempts = MAX_RETRY_ATTEMPTS;
        }

        if self.exit_grace_ms > MAX_EXIT_GRACE_MS {
            warn!(exit_grace_ms = self.exit_grace_ms, max = MAX_EXIT_GRACE_MS, "exit_grace_ms exceeds maximum, clamping");
            self.exit_grace_ms = MAX_EXIT_GRACE_MS;
        }

        for (name, value, default) in [
            ("text_color", &mut self.text_color, default_text_color()),
            ("text_border_color", &mut self.text_border_color, default_text_border_color()),
        ] {
            if HexColor::parse(value).is_none() {
                error!(setting = name, value = %value, using = %default, "Invalid colour, using default");
                *value = default;
            }
        }
    }

    pub fn display_score_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.display_score_duration_s))
    }

    pub fn score_delay(&self) -> Duration {
        Duration::from_millis(self.score_delay_ms)
    }

    pub fn attract_inactivity(&self) -> Duration {
        Duration::from_secs(u64::from(self.attract_inactivity_s))
    }

    pub fn attract_cycle(&self) -> Duration {
        Duration::from_secs(u64::from(self.attract_cycle_s))
    }

    pub fn surface_retry_interval(&self) -> Duration {
        Duration::from_millis(self.surface_retry_interval_ms)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}
