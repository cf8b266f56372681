//! Colour parsing for text and border colours
//!
//! Control requests carry colours as hex strings (`RRGGBB`, `AARRGGBB`, with
//! or without `#`). A handful of plain names are accepted as well because
//! front-end scripts commonly send them.

use std::fmt;

/// ARGB colour parsed from a hex string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexColor(u32);

const NAMED: &[(&str, u32)] = &[
    ("white", 0xFF_FF_FF_FF),
    ("black", 0xFF_00_00_00),
    ("red", 0xFF_FF_00_00),
    ("green", 0xFF_00_FF_00),
    ("blue", 0xFF_00_00_FF),
    ("yellow", 0xFF_FF_FF_00),
    ("orange", 0xFF_FF_A5_00),
    ("cyan", 0xFF_00_FF_FF),
    ("magenta", 0xFF_FF_00_FF),
];

impl HexColor {
    pub const WHITE: Self = Self(0xFF_FF_FF_FF);
    pub const RED: Self = Self(0xFF_FF_00_00);

    /// Parse `RRGGBB` / `AARRGGBB` (optional `#`) or a known colour name.
    /// 6-digit values get full opacity.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some((_, argb)) = NAMED.iter().find(|(name, _)| name.eq_ignore_ascii_case(raw)) {
            return Some(Self(*argb));
        }

        let hex = raw.strip_prefix('#').unwrap_or(raw);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            6 => u32::from_str_radix(hex, 16).ok().map(|rgb| Self(0xFF00_0000 | rgb)),
            8 => u32::from_str_radix(hex, 16).ok().map(Self),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn from_argb32(argb: u32) -> Self {
        Self(argb)
    }

    /// `#RRGGBB` when opaque, `#AARRGGBB` otherwise
    pub fn to_hex_string(self) -> String {
        if self.0 >> 24 == 0xFF {
            format!("#{:06X}", self.0 & 0x00FF_FFFF)
        } else {
            format!("#{:08X}", self.0)
        }
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}
