//! Bundled syntect grammar and theme sets.

use std::sync::{Arc, OnceLock};
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;

/// Default syntect sets, loaded once per process.
pub struct SyntectSettings {
    pub ps: Arc<SyntaxSet>,
    pub ts: ThemeSet,
}

impl Default for SyntectSettings {
    fn default() -> Self {
        Self {
            ps: Arc::new(SyntaxSet::load_defaults_newlines()),
            ts: ThemeSet::load_defaults(),
        }
    }
}

impl SyntectSettings {
    /// Process-wide instance; loading the dumps is the expensive part of
    /// provisioning.
    pub fn shared() -> &'static SyntectSettings {
        static SHARED: OnceLock<SyntectSettings> = OnceLock::new();
        SHARED.get_or_init(SyntectSettings::default)
    }
}

impl std::fmt::Debug for SyntectSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntectSettings")
            .field("syntaxes", &self.ps.syntaxes().len())
            .field("themes", &self.ts.themes.len())
            .finish()
    }
}
