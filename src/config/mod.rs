//! Configuration management for dmd-marquee
//!
//! A single flat TOML settings file, loaded once at startup and shared
//! read-only by every component.

pub mod settings;

pub use settings::Settings;
