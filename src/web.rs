//! Highlighting backed by the web grammar subset
//! ([`codeglow_syntect::WEB_LANGUAGES`]) and every bundled theme.

use codeglow_core::{
    EngineConfig, EngineRegistry, EngineSource, HighlightBinding, HighlightEngine,
    HighlightError, HighlightRequest, Highlighted,
};
use codeglow_syntect::WebProvisioner;
use std::sync::Arc;

pub fn source() -> EngineSource {
    EngineSource::bundled(Arc::new(WebProvisioner))
}

pub fn binding() -> HighlightBinding {
    HighlightBinding::new(source())
}

/// # Errors
/// Returns an error when the engine cannot be provisioned or tokenizing fails.
pub async fn highlight(request: &HighlightRequest) -> Result<Highlighted, HighlightError> {
    codeglow_core::highlight(&source(), request).await
}

/// # Errors
/// Returns [`HighlightError::LanguageNotFound`] for languages outside the web
/// bundle and [`HighlightError::ThemeNotFound`] for unknown themes.
pub async fn create_engine(
    config: EngineConfig,
) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
    codeglow_core::create_engine(Arc::new(WebProvisioner), &EngineRegistry::global(), config).await
}
