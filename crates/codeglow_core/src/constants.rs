//! Shared constants used across codeglow crates.

use std::time::Duration;

/// Engine-facing id for unstyled output.
pub const PLAINTEXT: &str = "plaintext";

/// Language tokens that always mean "no highlighting".
pub const PLAINTEXT_MARKERS: &[&str] = &["plaintext", "text", "txt", "plain"];

/// Theme used when a request carries no usable theme.
pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Sentinel cache id for single custom themes without a name and for empty variant maps.
pub const CUSTOM_THEME_ID: &str = "custom";

/// Prefix marking a composite multi-theme cache id.
pub const MULTI_THEME_PREFIX: &str = "multi-";

/// Default prefix for per-variant CSS custom properties.
pub const DEFAULT_CSS_VARIABLE_PREFIX: &str = "--shiki-";

/// Default first line number when line numbering is enabled.
pub const DEFAULT_STARTING_LINE_NUMBER: u32 = 1;

/// Default deferred-render debounce window.
pub const DEFAULT_DEFER_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default upper bound on waiting for idle time before forcing a render.
pub const DEFAULT_DEFER_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default margin grown around the viewport when observing intersection.
pub const DEFAULT_DEFER_ROOT_MARGIN: &str = "200px";

/// Delay used to approximate idle time when the host has no idle callbacks.
pub const FALLBACK_IDLE_DELAY: Duration = Duration::from_millis(1);

/// Time budget reported by the fallback idle scheduler.
pub const FALLBACK_IDLE_BUDGET: Duration = Duration::from_millis(50);

/// Minimum remaining idle time accepted as "enough" to render.
pub const MIN_IDLE_BUDGET: Duration = Duration::from_millis(1);

/// Tracing target for pipeline events.
pub const TRACE_TARGET: &str = "codeglow::highlight";
