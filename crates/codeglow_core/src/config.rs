//! Configuration loading from environment variables.

use crate::constants::{
    DEFAULT_DEFER_DEBOUNCE, DEFAULT_DEFER_IDLE_TIMEOUT, DEFAULT_DEFER_ROOT_MARGIN, DEFAULT_THEME,
};
use std::env;
use std::time::Duration;

/// Runtime defaults for highlight bindings and render gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightConfig {
    /// Single theme substituted for empty or invalid variant maps.
    pub default_theme: String,
    /// Emit per-pass tracing events.
    pub trace: bool,
    pub defer_debounce: Duration,
    pub defer_idle_timeout: Duration,
    pub defer_root_margin: String,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            default_theme: DEFAULT_THEME.to_string(),
            trace: false,
            defer_debounce: DEFAULT_DEFER_DEBOUNCE,
            defer_idle_timeout: DEFAULT_DEFER_IDLE_TIMEOUT,
            defer_root_margin: DEFAULT_DEFER_ROOT_MARGIN.to_string(),
        }
    }
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

fn env_millis(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn env_non_blank(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl HighlightConfig {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`HighlightConfig`] with defaults applied when env vars are
    /// missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_theme: env_non_blank("CODEGLOW_DEFAULT_THEME")
                .unwrap_or(defaults.default_theme),
            trace: env_flag_enabled("CODEGLOW_HIGHLIGHT_TRACE"),
            defer_debounce: env_millis("CODEGLOW_DEFER_DEBOUNCE_MS")
                .unwrap_or(defaults.defer_debounce),
            defer_idle_timeout: env_millis("CODEGLOW_DEFER_IDLE_TIMEOUT_MS")
                .unwrap_or(defaults.defer_idle_timeout),
            defer_root_margin: env_non_blank("CODEGLOW_DEFER_ROOT_MARGIN")
                .unwrap_or(defaults.defer_root_margin),
        }
    }
}
