//! Highlighting engine contract consumed by the pipeline.
//!
//! Engines tokenize; the pipeline never does. Tree and markup output have
//! default implementations built from [`HighlightEngine::code_to_tokens`] so
//! an engine only has to provide tokens, theme metadata and loading.

use crate::error::HighlightError;
use crate::hast::{Element, Root};
use crate::language::CustomGrammar;
use crate::render;
use crate::theme::{ThemeDefinition, ThemeKind};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Font style flags carried by a token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FontStyle {
    pub italic: bool,
    pub bold: bool,
    pub underline: bool,
}

impl FontStyle {
    pub fn is_empty(&self) -> bool {
        !(self.italic || self.bold || self.underline)
    }

    /// CSS declarations equivalent to these flags.
    pub fn css(&self) -> Vec<(&'static str, &'static str)> {
        let mut out = Vec::new();
        if self.italic {
            out.push(("font-style", "italic"));
        }
        if self.bold {
            out.push(("font-weight", "bold"));
        }
        if self.underline {
            out.push(("text-decoration", "underline"));
        }
        out
    }
}

/// One styled run of source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemedToken {
    pub content: String,
    /// Byte offset of `content` within the whole input.
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(skip_serializing_if = "FontStyle::is_empty")]
    pub font_style: FontStyle,
    /// Per-variant declarations for multi-theme output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub html_style: Vec<(String, String)>,
}

impl ThemedToken {
    /// Unstyled token.
    pub fn plain(content: impl Into<String>, offset: usize) -> Self {
        Self {
            content: content.into(),
            offset,
            ..Default::default()
        }
    }

    /// Inline style for this token, or `None` when it carries no styling.
    pub fn style(&self) -> Option<String> {
        let declarations: Vec<String> = if self.html_style.is_empty() {
            let mut out = Vec::new();
            if let Some(color) = &self.color {
                out.push(format!("color:{color}"));
            }
            if let Some(bg) = &self.bg_color {
                out.push(format!("background-color:{bg}"));
            }
            out.extend(
                self.font_style
                    .css()
                    .into_iter()
                    .map(|(name, value)| format!("{name}:{value}")),
            );
            out
        } else {
            self.html_style
                .iter()
                .map(|(name, value)| format!("{name}:{value}"))
                .collect()
        };
        (!declarations.is_empty()).then(|| declarations.join(";"))
    }

    pub fn is_styled(&self) -> bool {
        self.style().is_some()
    }
}

/// Tokens grouped by source line.
pub type TokenLines = Vec<Vec<ThemedToken>>;

/// Full token result with theme metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensResult {
    pub tokens: TokenLines,
    pub fg: String,
    pub bg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_name: Option<String>,
    /// Root inline style for multi-theme output (variables per variant).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeMetadata {
    pub name: String,
    pub foreground: String,
    pub background: String,
    pub kind: ThemeKind,
}

/// Which variant of a multi-theme request renders as plain `color`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DefaultColor {
    /// `light` when present, otherwise the first variant.
    #[default]
    Auto,
    Variant(String),
    /// Every variant is emitted as a CSS variable only.
    None,
}

/// Theme(s) a tokenize call renders with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeSelection {
    Single(String),
    Multi {
        /// `(variant, theme id)` in caller order.
        variants: Vec<(String, String)>,
        default_color: DefaultColor,
        css_variable_prefix: String,
    },
}

impl ThemeSelection {
    /// Theme ids in render order.
    pub fn theme_ids(&self) -> Vec<&str> {
        match self {
            Self::Single(id) => vec![id.as_str()],
            Self::Multi { variants, .. } => variants.iter().map(|(_, id)| id.as_str()).collect(),
        }
    }

    /// Index of the variant rendered as plain `color`, if any.
    pub fn default_variant_index(&self) -> Option<usize> {
        match self {
            Self::Single(_) => Some(0),
            Self::Multi {
                variants,
                default_color,
                ..
            } => match default_color {
                DefaultColor::None => None,
                DefaultColor::Variant(name) => variants.iter().position(|(key, _)| key == name),
                DefaultColor::Auto => variants
                    .iter()
                    .position(|(key, _)| key == "light")
                    .or((!variants.is_empty()).then_some(0)),
            },
        }
    }
}

/// How whitespace-only tokens are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeWhitespaces {
    /// Fold whitespace-only tokens into the following token.
    #[default]
    Merge,
    /// Leave tokens as the grammar produced them.
    Keep,
    /// Split leading and trailing whitespace into their own tokens.
    Never,
}

/// Layout of the produced tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Structure {
    /// `pre > code > span.line > span`.
    #[default]
    Classic,
    /// Token spans directly under the root, lines separated by `<br>`.
    Inline,
}

/// Zero-based position: line index and byte column within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

/// Extra class/properties applied to a source range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub start: Position,
    pub end: Position,
    pub class: Option<String>,
    pub properties: Vec<(String, String)>,
}

/// Hooks run while an engine builds its output.
///
/// Every hook defaults to a no-op. Hooks run in the order `tokens`, `span`,
/// `line`, `code`, `pre`, `root`, and `postprocess` for markup output.
pub trait Transformer: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn tokens(&self, _lines: &mut TokenLines) {}

    /// `line` is 1-based; `column` is the token index within the line.
    fn span(&self, _span: &mut Element, _line: usize, _column: usize) {}

    fn line(&self, _line: &mut Element, _line_number: usize) {}

    fn code(&self, _code: &mut Element) {}

    fn pre(&self, _pre: &mut Element) {}

    fn root(&self, _root: &mut Root) {}

    fn postprocess(&self, html: String) -> String {
        html
    }
}

/// Options for a single tokenize call.
#[derive(Debug, Clone)]
pub struct TokenizeOptions {
    pub lang: String,
    pub theme: ThemeSelection,
    pub transformers: Vec<Arc<dyn Transformer>>,
    pub decorations: Vec<Decoration>,
    pub merge_whitespaces: MergeWhitespaces,
    pub structure: Structure,
    /// Lines longer than this many bytes are emitted unstyled.
    pub tokenize_max_line_length: Option<usize>,
    /// Once tokenizing has taken this long, remaining lines are emitted unstyled.
    pub tokenize_time_limit: Option<Duration>,
}

impl TokenizeOptions {
    pub fn new(lang: impl Into<String>, theme: ThemeSelection) -> Self {
        Self {
            lang: lang.into(),
            theme,
            transformers: Vec::new(),
            decorations: Vec::new(),
            merge_whitespaces: MergeWhitespaces::default(),
            structure: Structure::default(),
            tokenize_max_line_length: None,
            tokenize_time_limit: None,
        }
    }
}

/// A loaded highlighting engine.
///
/// Calls are synchronous and may be slow; the pipeline runs them on blocking
/// worker threads. Loading calls mutate internal registries and must be safe
/// under concurrent use.
pub trait HighlightEngine: Send + Sync {
    /// Tokenize with theme metadata (multi-theme aware).
    ///
    /// # Errors
    /// Returns [`HighlightError::LanguageNotFound`] or
    /// [`HighlightError::ThemeNotFound`] for unknown ids and
    /// [`HighlightError::Tokenize`] when the grammar fails.
    fn code_to_tokens(
        &self,
        code: &str,
        options: &TokenizeOptions,
    ) -> Result<TokensResult, HighlightError>;

    /// Per-line tokens without theme metadata.
    fn code_to_tokens_base(
        &self,
        code: &str,
        options: &TokenizeOptions,
    ) -> Result<TokenLines, HighlightError> {
        self.code_to_tokens(code, options).map(|result| result.tokens)
    }

    /// Syntax tree for `code`, with transformer hooks applied.
    fn code_to_tree(&self, code: &str, options: &TokenizeOptions) -> Result<Root, HighlightError> {
        let result = self.code_to_tokens(code, options)?;
        Ok(render::tokens_to_tree(&result, options))
    }

    /// HTML markup for `code`, with `postprocess` hooks applied.
    fn code_to_markup(
        &self,
        code: &str,
        options: &TokenizeOptions,
    ) -> Result<String, HighlightError> {
        let html = self.code_to_tree(code, options)?.to_html();
        Ok(options
            .transformers
            .iter()
            .fold(html, |html, transformer| transformer.postprocess(html)))
    }

    /// Ids of every language this instance can tokenize right now.
    fn loaded_languages(&self) -> Vec<String>;

    /// Whether `id` can be tokenized without loading anything.
    fn supports_language(&self, id: &str) -> bool {
        self.loaded_languages()
            .iter()
            .any(|loaded| loaded.eq_ignore_ascii_case(id.trim()))
    }

    fn has_theme(&self, id: &str) -> bool;

    /// # Errors
    /// Returns [`HighlightError::ThemeNotFound`] when `id` is not loaded.
    fn theme_metadata(&self, id: &str) -> Result<ThemeMetadata, HighlightError>;

    /// Compile and register an inline grammar; loading twice is a no-op.
    fn load_language(&self, grammar: &CustomGrammar) -> Result<(), HighlightError>;

    /// Register an inline theme under [`ThemeDefinition::id`].
    fn load_theme(&self, theme: &ThemeDefinition) -> Result<(), HighlightError>;
}

impl fmt::Debug for dyn HighlightEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HighlightEngine")
    }
}
