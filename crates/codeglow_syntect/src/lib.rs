//! Syntect-backed highlighting engines and bundles for codeglow.

/// Full and web bundle provisioners.
pub mod bundle;
/// [`codeglow_core::HighlightEngine`] over syntect.
pub mod engine;
/// Process-wide default grammar and theme sets.
pub mod settings;
mod syntax;
mod theme;

pub use bundle::{compiled_backend, FullProvisioner, WebProvisioner, WEB_LANGUAGES};
pub use engine::SyntectEngine;
pub use settings::SyntectSettings;
