//! Syntax highlighting orchestration with shared, lazily provisioned engines.
//!
//! Three entry points pick where the engine comes from: [`full`] carries every
//! bundled grammar and theme, [`web`] a web-oriented grammar subset, and
//! [`core`] uses the engine passed in [`HighlighterOptions::highlighter`].

/// Caller-supplied engine entry point.
pub mod core;
/// Full bundle entry point.
pub mod full;
/// Web bundle entry point.
pub mod web;

pub use codeglow_core::{
    binding, bundle, config, constants, engine, error, gate, hast, language, markdown, registry,
    render, scheduler, stable, theme, transform,
};
pub use codeglow_core::{
    create_engine, highlight, highlight_with_config, EngineConfig, EngineProvisioner,
    EngineRegistry, EngineSource, HighlightBinding, HighlightConfig, HighlightEngine,
    HighlightError, HighlightOutput, HighlightRequest, Highlighted, HighlighterOptions,
    LanguageInput, OutputFormat, RegexBackend, RenderGate, ThemeDefinition, ThemeInput,
};
pub use codeglow_syntect::{FullProvisioner, SyntectEngine, SyntectSettings, WebProvisioner};
