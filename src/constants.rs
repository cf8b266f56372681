//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Configuration file locations
pub mod config {
    /// Directory under the user config dir
    pub const APP_DIR: &str = "dmd-marquee";

    /// Settings file name
    pub const FILENAME: &str = "settings.toml";
}

/// Control socket constants
pub mod ipc {
    /// Socket path relative to XDG_RUNTIME_DIR (or the cache dir fallback)
    pub const SOCKET_RELATIVE_PATH: &str = "dmd-marquee/control.sock";

    /// Maximum message size (1 MB); control payloads are tiny
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
}

/// Asset file extensions, in resolution priority order
pub mod extensions {
    /// Animated / video kinds. Listed first so they win over a still image
    /// with the same base name.
    pub const VIDEO: &[&str] = &["gif", "avi", "mp4", "mkv", "mov", "webm"];

    /// Still image kinds (the only kinds allowed for the marquee)
    pub const IMAGE: &[&str] = &["png", "jpg", "jpeg", "bmp"];

    /// Character that the downstream path encoding cannot carry
    pub const DISALLOWED_CHAR: char = '&';
}

/// Scheduler timing
pub mod timing {
    use std::time::Duration;

    /// Text loop re-issues its command at this fraction of its duration
    pub const TEXT_LOOP_FRACTION: f64 = 0.85;

    /// Minimum delay of a single GIF frame (browsers and FlexDMD agree on 100 ms)
    pub const MIN_GIF_FRAME_DELAY: Duration = Duration::from_millis(100);
}

/// Scoreboard limits
pub mod score {
    /// Maximum number of players on the scoreboard
    pub const MAX_PLAYERS: u8 = 4;

    /// Highest scoreboard background brightness
    pub const MAX_BRIGHTNESS: u8 = 15;
}

/// Fuzzy matching
pub mod fuzzy {
    /// Default similarity cutoff (0-100) for the fallback match
    pub const DEFAULT_CUTOFF: u8 = 65;
}

/// Responses returned on the control channel
pub mod response {
    pub const OK: &str = "OK";
    pub const NOT_IMPLEMENTED: &str = "Not implemented";
}
