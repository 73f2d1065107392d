//! Highlighting with an engine the caller owns.
//!
//! Every request must carry [`HighlighterOptions::highlighter`]; without it
//! [`HighlightBinding::update`] and [`highlight`] fail with
//! [`HighlightError::MissingEngine`].

use codeglow_core::{
    EngineSource, HighlightBinding, HighlightEngine, HighlightError, HighlightRequest,
    Highlighted, HighlighterOptions,
};
use codeglow_syntect::{SyntectEngine, SyntectSettings};
use std::sync::Arc;

pub fn source() -> EngineSource {
    EngineSource::Supplied
}

pub fn binding() -> HighlightBinding {
    HighlightBinding::new(source())
}

/// # Errors
/// Returns [`HighlightError::MissingEngine`] when the request carries no engine.
pub async fn highlight(request: &HighlightRequest) -> Result<Highlighted, HighlightError> {
    codeglow_core::highlight(&source(), request).await
}

/// A new, unshared syntect engine with every bundled grammar and theme.
pub fn syntect_engine() -> Arc<dyn HighlightEngine> {
    let settings = SyntectSettings::shared();
    Arc::new(SyntectEngine::new(
        settings.ps.clone(),
        settings.ts.themes.clone(),
        None,
    ))
}

/// Options carrying `engine`, for use with [`HighlightRequest::with_options`].
pub fn options_with(engine: Arc<dyn HighlightEngine>) -> HighlighterOptions {
    HighlighterOptions {
        highlighter: Some(engine),
        ..Default::default()
    }
}
