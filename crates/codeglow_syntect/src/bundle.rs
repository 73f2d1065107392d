//! Grammar/theme bundles backed by syntect's default sets.

use crate::engine::SyntectEngine;
use crate::settings::SyntectSettings;
use crate::syntax::resolve_syntax;
use codeglow_core::bundle::{EngineProvisioner, ProvisionRequest, RegexBackend};
use codeglow_core::constants::TRACE_TARGET;
use codeglow_core::engine::HighlightEngine;
use codeglow_core::error::HighlightError;
use codeglow_core::language::is_plaintext;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Syntax names carried by the web bundle.
pub const WEB_LANGUAGES: &[&str] = &[
    "HTML",
    "CSS",
    "JavaScript",
    "JSON",
    "Markdown",
    "XML",
    "YAML",
    "Bourne Again Shell (bash)",
    "Python",
    "SQL",
    "PHP",
    "Diff",
    "Plain Text",
];

/// Regex engine syntect was compiled with; one per build.
pub fn compiled_backend() -> RegexBackend {
    if cfg!(feature = "onig") {
        RegexBackend::Oniguruma
    } else {
        RegexBackend::Fancy
    }
}

/// Every bundled grammar and theme.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullProvisioner;

/// Web-oriented grammar subset with every bundled theme.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebProvisioner;

impl EngineProvisioner for FullProvisioner {
    fn bundle(&self) -> &str {
        "full"
    }

    fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
        build_engine(self.bundle(), None, request)
    }
}

impl EngineProvisioner for WebProvisioner {
    fn bundle(&self) -> &str {
        "web"
    }

    fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
        build_engine(self.bundle(), Some(WEB_LANGUAGES), request)
    }
}

/// Build an engine restricted to the bundle and to the request's ids.
///
/// # Arguments
/// - `bundle`: Bundle name, for logging.
/// - `carried`: Syntax names the bundle carries, or `None` for all.
/// - `request`: Requested languages/themes; `None` means the whole bundle.
///
/// # Errors
/// [`HighlightError::LanguageNotFound`] or [`HighlightError::ThemeNotFound`]
/// for ids outside the bundle.
fn build_engine(
    bundle: &str,
    carried: Option<&[&str]>,
    request: &ProvisionRequest,
) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
    let settings = SyntectSettings::shared();
    if request.backend != compiled_backend() {
        warn!(
            target: TRACE_TARGET,
            event = "backend_unavailable",
            requested = request.backend.name(),
            compiled = compiled_backend().name(),
            "regex backend is fixed at build time; using the compiled one"
        );
    }
    let carried: Option<BTreeSet<String>> =
        carried.map(|names| names.iter().map(|name| name.to_string()).collect());

    let allowed = match &request.languages {
        None => carried,
        Some(ids) => {
            let mut names = BTreeSet::new();
            for id in ids.iter().filter(|id| !is_plaintext(id)) {
                let name = resolve_syntax(&settings.ps, id)
                    .map(|syntax| syntax.name.clone())
                    .filter(|name| carried.as_ref().map_or(true, |set| set.contains(name)))
                    .ok_or_else(|| HighlightError::LanguageNotFound(id.clone()))?;
                names.insert(name);
            }
            Some(names)
        }
    };

    let themes: BTreeMap<String, _> = match &request.themes {
        None => settings.ts.themes.clone(),
        Some(ids) => ids
            .iter()
            .map(|id| {
                settings
                    .ts
                    .themes
                    .get(id)
                    .map(|theme| (id.clone(), theme.clone()))
                    .ok_or_else(|| HighlightError::ThemeNotFound(id.clone()))
            })
            .collect::<Result<_, _>>()?,
    };

    debug!(
        target: TRACE_TARGET,
        event = "engine_built",
        bundle = bundle,
        languages = allowed.as_ref().map(BTreeSet::len),
        themes = themes.len(),
        backend = compiled_backend().name(),
        precompiled = request.precompiled,
        "syntect engine ready"
    );
    Ok(Arc::new(SyntectEngine::new(
        settings.ps.clone(),
        themes,
        allowed,
    )))
}
