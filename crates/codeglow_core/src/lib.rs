//! Core highlighting pipeline for codeglow (resolution, scheduling, output).

/// Reactive binding, request types and the one-shot pipeline.
pub mod binding;
/// Engine acquisition strategies and fine-grained engine construction.
pub mod bundle;
/// Configuration loading and defaults.
pub mod config;
/// Shared constants.
pub mod constants;
/// Engine contract and tokenize options.
pub mod engine;
/// Error types.
pub mod error;
/// Viewport-aware deferred render gate.
pub mod gate;
/// Minimal HTML tree.
pub mod hast;
/// Language resolution.
pub mod language;
/// Inline-code tagging for markdown trees.
pub mod markdown;
/// Engine instance cache.
pub mod registry;
/// Token-to-tree rendering shared by engines.
pub mod render;
/// Throttled scheduling of highlight runs.
pub mod scheduler;
/// Content-stable values with revisions.
pub mod stable;
/// Theme classification and resolution.
pub mod theme;
/// Output formats and line numbering.
pub mod transform;

#[cfg(test)]
pub(crate) mod test_support;

pub use binding::{
    highlight, highlight_with_config, EngineOptions, HighlightBinding, HighlightRequest,
    Highlighted, HighlighterOptions,
};
pub use bundle::{create_engine, EngineConfig, EngineProvisioner, EngineSource, RegexBackend};
pub use config::HighlightConfig;
pub use engine::HighlightEngine;
pub use error::HighlightError;
pub use gate::{DeferredRenderOptions, RenderGate};
pub use language::{CustomGrammar, LanguageInput};
pub use registry::EngineRegistry;
pub use theme::{ThemeDefinition, ThemeInput};
pub use transform::{HighlightOutput, OutputFormat};
