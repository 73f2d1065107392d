//! Highlighting backed by every bundled grammar and theme.
//!
//! The engine is built once per process on first use and shared through
//! [`EngineRegistry::global`].

use codeglow_core::{
    EngineConfig, EngineRegistry, EngineSource, HighlightBinding, HighlightEngine,
    HighlightError, HighlightRequest, Highlighted,
};
use codeglow_syntect::FullProvisioner;
use std::sync::Arc;

pub fn source() -> EngineSource {
    EngineSource::bundled(Arc::new(FullProvisioner))
}

/// Reactive binding over the shared full engine.
pub fn binding() -> HighlightBinding {
    HighlightBinding::new(source())
}

/// Highlight once with the shared full engine.
///
/// # Errors
/// Returns an error when the engine cannot be provisioned or tokenizing fails.
pub async fn highlight(request: &HighlightRequest) -> Result<Highlighted, HighlightError> {
    codeglow_core::highlight(&source(), request).await
}

/// Engine limited to the languages and themes of `config`.
///
/// Configurations that differ only in ordering share one construction.
///
/// # Errors
/// Returns [`HighlightError::LanguageNotFound`] or
/// [`HighlightError::ThemeNotFound`] for ids the bundle does not carry.
pub async fn create_engine(
    config: EngineConfig,
) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
    codeglow_core::create_engine(Arc::new(FullProvisioner), &EngineRegistry::global(), config).await
}
