//! Syntect-backed [`HighlightEngine`].
//!
//! Lines are parsed one at a time with a trailing newline so grammars built
//! for newline-terminated input behave; the scope stack is carried across
//! lines and every theme of the request styles the same stack.

use crate::syntax::{resolve_syntax, PLAIN_TEXT_SYNTAX};
use crate::theme::{color_hex, definition_kind, luminance_kind, to_syntect_theme};
use codeglow_core::constants::TRACE_TARGET;
use codeglow_core::engine::{
    FontStyle, HighlightEngine, ThemeMetadata, ThemeSelection, ThemedToken, TokenLines,
    TokenizeOptions, TokensResult,
};
use codeglow_core::error::HighlightError;
use codeglow_core::language::{is_plaintext, CustomGrammar};
use codeglow_core::render;
use codeglow_core::theme::{ThemeDefinition, ThemeKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use syntect::highlighting::{self, Highlighter, Style, Theme};
use syntect::parsing::{ParseState, ScopeStack, SyntaxDefinition, SyntaxReference, SyntaxSet};
use tracing::debug;

struct LoadedTheme {
    theme: Arc<Theme>,
    kind: ThemeKind,
}

/// Custom grammars loaded into one engine.
#[derive(Default)]
struct CustomSyntaxes {
    /// Lowercased grammar name to the grammar and its compiled definition.
    grammars: BTreeMap<String, (CustomGrammar, SyntaxDefinition)>,
    /// Lowercased name, alias or file type to syntax name.
    aliases: BTreeMap<String, String>,
}

impl CustomSyntaxes {
    fn reindex(&mut self) {
        self.aliases.clear();
        for (grammar, _) in self.grammars.values() {
            let keys = std::iter::once(grammar.name.as_str())
                .chain(grammar.aliases.iter().map(String::as_str))
                .chain(grammar.file_types.iter().map(String::as_str));
            for alias in keys {
                let alias = alias.trim().to_ascii_lowercase();
                if !alias.is_empty() {
                    self.aliases.insert(alias, grammar.name.clone());
                }
            }
        }
    }
}

/// Highlighting engine over a syntect syntax set and a theme table.
pub struct SyntectEngine {
    /// Grammar set the engine was built with.
    base: Arc<SyntaxSet>,
    /// `base` plus every loaded custom grammar.
    syntaxes: RwLock<Arc<SyntaxSet>>,
    custom: RwLock<CustomSyntaxes>,
    themes: RwLock<BTreeMap<String, LoadedTheme>>,
    /// Syntax names this instance may use; `None` allows the whole set.
    allowed: Option<BTreeSet<String>>,
}

impl fmt::Debug for SyntectEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntectEngine")
            .field("languages", &self.loaded_languages().len())
            .field("themes", &self.theme_ids())
            .finish()
    }
}

impl SyntectEngine {
    /// Build an engine over `syntaxes` with `themes` keyed by id.
    ///
    /// # Arguments
    /// - `syntaxes`: Grammar set, shared with other engines until a custom
    ///   grammar is loaded.
    /// - `themes`: Theme id to theme.
    /// - `allowed`: Syntax names this engine exposes, or `None` for all.
    pub fn new(
        syntaxes: Arc<SyntaxSet>,
        themes: BTreeMap<String, Theme>,
        allowed: Option<BTreeSet<String>>,
    ) -> Self {
        let themes = themes
            .into_iter()
            .map(|(id, theme)| {
                let kind = luminance_kind(theme.settings.background);
                (
                    id,
                    LoadedTheme {
                        theme: Arc::new(theme),
                        kind,
                    },
                )
            })
            .collect();
        Self {
            base: syntaxes.clone(),
            syntaxes: RwLock::new(syntaxes),
            custom: RwLock::new(CustomSyntaxes::default()),
            themes: RwLock::new(themes),
            allowed,
        }
    }

    pub fn theme_ids(&self) -> Vec<String> {
        self.themes
            .read()
            .map(|themes| themes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn syntax_set(&self) -> Result<Arc<SyntaxSet>, HighlightError> {
        self.syntaxes
            .read()
            .map(|set| set.clone())
            .map_err(|_| HighlightError::Poisoned)
    }

    fn theme(&self, id: &str) -> Result<Arc<Theme>, HighlightError> {
        self.themes
            .read()
            .map_err(|_| HighlightError::Poisoned)?
            .get(id)
            .map(|loaded| loaded.theme.clone())
            .ok_or_else(|| HighlightError::ThemeNotFound(id.to_string()))
    }

    fn find_syntax<'a>(&self, ps: &'a SyntaxSet, id: &str) -> Option<&'a SyntaxReference> {
        let key = id.trim().to_ascii_lowercase();
        let custom = self
            .custom
            .read()
            .ok()
            .and_then(|custom| custom.aliases.get(&key).cloned());
        if let Some(name) = custom {
            return ps.find_syntax_by_name(&name);
        }
        resolve_syntax(ps, id).filter(|syntax| self.is_allowed(&syntax.name))
    }

    fn is_allowed(&self, syntax_name: &str) -> bool {
        self.allowed
            .as_ref()
            .map_or(true, |allowed| allowed.contains(syntax_name))
    }
}

/// Adjacent byte ranges of one line that share a style per theme.
fn styled_segments(
    state: &mut ParseState,
    stack: &mut ScopeStack,
    ps: &SyntaxSet,
    line: &str,
    highlighters: &[Highlighter<'_>],
) -> Result<Vec<(usize, usize, Vec<Style>)>, HighlightError> {
    let text = format!("{line}\n");
    let ops = state
        .parse_line(&text, ps)
        .map_err(|err| HighlightError::Tokenize(err.to_string()))?;

    let mut segments: Vec<(usize, usize, Vec<Style>)> = Vec::new();
    let mut push = |start: usize, end: usize, stack: &ScopeStack| {
        if start >= end {
            return;
        }
        let styles: Vec<Style> = highlighters
            .iter()
            .map(|highlighter| highlighter.style_for_stack(stack.as_slice()))
            .collect();
        match segments.last_mut() {
            Some(last) if last.1 == start && last.2 == styles => last.1 = end,
            _ => segments.push((start, end, styles)),
        }
    };

    let mut cursor = 0;
    for (position, op) in ops {
        let position = position.min(line.len());
        push(cursor, position, stack);
        cursor = cursor.max(position);
        stack
            .apply(&op)
            .map_err(|err| HighlightError::Tokenize(format!("{err:?}")))?;
    }
    push(cursor, line.len(), stack);
    Ok(segments)
}

fn font_style(style: highlighting::FontStyle) -> FontStyle {
    FontStyle {
        italic: style.contains(highlighting::FontStyle::ITALIC),
        bold: style.contains(highlighting::FontStyle::BOLD),
        underline: style.contains(highlighting::FontStyle::UNDERLINE),
    }
}

/// Default foreground and background per theme, as hex.
struct ThemeDefaults {
    fg: String,
    bg: String,
    bg_color: highlighting::Color,
}

impl ThemeDefaults {
    fn of(highlighter: &Highlighter<'_>) -> Self {
        let style = highlighter.get_default();
        Self {
            fg: color_hex(style.foreground),
            bg: color_hex(style.background),
            bg_color: style.background,
        }
    }
}

fn styled_token(
    content: &str,
    offset: usize,
    styles: &[Style],
    defaults: &[ThemeDefaults],
    selection: &ThemeSelection,
) -> ThemedToken {
    let mut token = ThemedToken::plain(content, offset);
    match selection {
        ThemeSelection::Single(_) => {
            let (Some(style), Some(defaults)) = (styles.first(), defaults.first()) else {
                return token;
            };
            token.color = Some(color_hex(style.foreground));
            if style.background != defaults.bg_color {
                token.bg_color = Some(color_hex(style.background));
            }
            token.font_style = font_style(style.font_style);
        }
        ThemeSelection::Multi {
            variants,
            css_variable_prefix,
            ..
        } => {
            let default_index = selection.default_variant_index();
            let font_index = default_index.unwrap_or(0);
            for (index, ((variant, _), style)) in variants.iter().zip(styles).enumerate() {
                let color = color_hex(style.foreground);
                if Some(index) == default_index {
                    token.color = Some(color.clone());
                    token.html_style.push(("color".to_string(), color));
                } else {
                    token
                        .html_style
                        .push((format!("{css_variable_prefix}{variant}"), color));
                }
            }
            if let Some(style) = styles.get(font_index) {
                token.font_style = font_style(style.font_style);
                token.html_style.extend(
                    token
                        .font_style
                        .css()
                        .into_iter()
                        .map(|(name, value)| (name.to_string(), value.to_string())),
                );
            }
        }
    }
    token
}

fn plain_line(line: &str, offset: usize) -> Vec<ThemedToken> {
    if line.is_empty() {
        Vec::new()
    } else {
        vec![ThemedToken::plain(line, offset)]
    }
}

/// Root declarations for a multi-theme result: the default variant as plain
/// colors, every other variant as `{prefix}{variant}` and `{prefix}{variant}-bg`.
fn multi_root_style(selection: &ThemeSelection, defaults: &[ThemeDefaults]) -> Option<String> {
    let ThemeSelection::Multi {
        variants,
        css_variable_prefix,
        ..
    } = selection
    else {
        return None;
    };
    let default_index = selection.default_variant_index();
    let mut declarations = Vec::new();
    for (index, ((variant, _), theme)) in variants.iter().zip(defaults).enumerate() {
        if Some(index) == default_index {
            declarations.push(format!("background-color:{}", theme.bg));
            declarations.push(format!("color:{}", theme.fg));
        } else {
            declarations.push(format!("{css_variable_prefix}{variant}:{}", theme.fg));
            declarations.push(format!("{css_variable_prefix}{variant}-bg:{}", theme.bg));
        }
    }
    Some(declarations.join(";"))
}

impl HighlightEngine for SyntectEngine {
    fn code_to_tokens(
        &self,
        code: &str,
        options: &TokenizeOptions,
    ) -> Result<TokensResult, HighlightError> {
        let ps = self.syntax_set()?;
        let syntax = if is_plaintext(&options.lang) {
            None
        } else {
            let syntax = self
                .find_syntax(&ps, &options.lang)
                .ok_or_else(|| HighlightError::LanguageNotFound(options.lang.clone()))?;
            (syntax.name != PLAIN_TEXT_SYNTAX).then_some(syntax)
        };

        let theme_ids = options.theme.theme_ids();
        let themes = theme_ids
            .iter()
            .map(|id| self.theme(id))
            .collect::<Result<Vec<_>, _>>()?;
        if themes.is_empty() {
            return Err(HighlightError::ThemeNotFound(String::new()));
        }
        let highlighters: Vec<Highlighter<'_>> = themes
            .iter()
            .map(|theme| Highlighter::new(theme))
            .collect();
        let defaults: Vec<ThemeDefaults> = highlighters.iter().map(ThemeDefaults::of).collect();

        let started = Instant::now();
        let mut state = syntax.map(ParseState::new);
        let mut stack = ScopeStack::new();
        let mut tokens: TokenLines = Vec::new();
        let mut offset = 0;
        let mut timed_out = false;
        for line in code.split('\n') {
            let too_long = options
                .tokenize_max_line_length
                .is_some_and(|max| line.len() > max);
            timed_out = timed_out
                || options
                    .tokenize_time_limit
                    .is_some_and(|limit| started.elapsed() >= limit);
            let line_tokens = match state.as_mut() {
                Some(state) if !too_long && !timed_out => {
                    styled_segments(state, &mut stack, &ps, line, &highlighters)?
                        .into_iter()
                        .map(|(start, end, styles)| {
                            styled_token(
                                &line[start..end],
                                offset + start,
                                &styles,
                                &defaults,
                                &options.theme,
                            )
                        })
                        .collect()
                }
                _ => plain_line(line, offset),
            };
            tokens.push(line_tokens);
            offset += line.len() + 1;
        }
        if timed_out {
            debug!(
                target: TRACE_TARGET,
                event = "tokenize_time_limit",
                lang = %options.lang,
                "remaining lines emitted unstyled"
            );
        }

        render::merge_whitespace_tokens(&mut tokens, options.merge_whitespaces);
        render::apply_token_hooks(&mut tokens, &options.transformers);

        let primary = options
            .theme
            .default_variant_index()
            .and_then(|index| defaults.get(index))
            .or_else(|| defaults.first());
        Ok(TokensResult {
            tokens,
            fg: primary.map(|theme| theme.fg.clone()).unwrap_or_default(),
            bg: primary.map(|theme| theme.bg.clone()).unwrap_or_default(),
            theme_name: theme_ids.first().map(|id| id.to_string()),
            root_style: multi_root_style(&options.theme, &defaults),
        })
    }

    fn loaded_languages(&self) -> Vec<String> {
        let mut languages: BTreeSet<String> = match &self.allowed {
            Some(allowed) => allowed.clone(),
            None => self
                .syntax_set()
                .map(|ps| ps.syntaxes().iter().map(|syntax| syntax.name.clone()).collect())
                .unwrap_or_default(),
        };
        if let Ok(custom) = self.custom.read() {
            languages.extend(custom.grammars.values().map(|(grammar, _)| grammar.name.clone()));
        }
        languages.into_iter().collect()
    }

    fn supports_language(&self, id: &str) -> bool {
        is_plaintext(id)
            || self
                .syntax_set()
                .map(|ps| self.find_syntax(&ps, id).is_some())
                .unwrap_or(false)
    }

    fn has_theme(&self, id: &str) -> bool {
        self.themes
            .read()
            .map(|themes| themes.contains_key(id))
            .unwrap_or(false)
    }

    fn theme_metadata(&self, id: &str) -> Result<ThemeMetadata, HighlightError> {
        let themes = self.themes.read().map_err(|_| HighlightError::Poisoned)?;
        let loaded = themes
            .get(id)
            .ok_or_else(|| HighlightError::ThemeNotFound(id.to_string()))?;
        let defaults = ThemeDefaults::of(&Highlighter::new(&loaded.theme));
        Ok(ThemeMetadata {
            name: id.to_string(),
            foreground: defaults.fg,
            background: defaults.bg,
            kind: loaded.kind,
        })
    }

    /// Compile a sublime-syntax grammar and register it under its name,
    /// aliases and file types.
    ///
    /// Loading an identical grammar again is a no-op; a grammar with the name
    /// of a loaded one but a different definition replaces it.
    ///
    /// # Errors
    /// Returns [`HighlightError::InvalidGrammar`] when the definition does not
    /// compile.
    fn load_language(&self, grammar: &CustomGrammar) -> Result<(), HighlightError> {
        let mut syntaxes = self.syntaxes.write().map_err(|_| HighlightError::Poisoned)?;
        let mut custom = self.custom.write().map_err(|_| HighlightError::Poisoned)?;
        let key = grammar.name.trim().to_ascii_lowercase();
        let replacing = match custom.grammars.get(&key) {
            Some((loaded, _)) if loaded == grammar => return Ok(()),
            Some(_) => true,
            None => false,
        };

        let mut definition = SyntaxDefinition::load_from_str(&grammar.definition, true, None)
            .map_err(|err| HighlightError::InvalidGrammar {
                name: grammar.name.clone(),
                message: err.to_string(),
            })?;
        definition.name = grammar.name.clone();
        definition
            .file_extensions
            .extend(grammar.file_types.iter().cloned());
        custom.grammars.insert(key, (grammar.clone(), definition));
        custom.reindex();

        let mut builder = SyntaxSet::clone(&self.base).into_builder();
        for (_, definition) in custom.grammars.values() {
            builder.add(definition.clone());
        }
        *syntaxes = Arc::new(builder.build());

        debug!(
            target: TRACE_TARGET,
            event = "grammar_loaded",
            name = %grammar.name,
            replaced = replacing,
            "custom grammar registered"
        );
        Ok(())
    }

    fn load_theme(&self, definition: &ThemeDefinition) -> Result<(), HighlightError> {
        let theme = to_syntect_theme(definition)?;
        let kind = definition_kind(definition, &theme);
        self.themes
            .write()
            .map_err(|_| HighlightError::Poisoned)?
            .insert(
                definition.id().to_string(),
                LoadedTheme {
                    theme: Arc::new(theme),
                    kind,
                },
            );
        Ok(())
    }
}
