//! Shared test-only helpers for codeglow_core.

use crate::bundle::{EngineProvisioner, ProvisionRequest};
use crate::engine::{
    HighlightEngine, ThemeMetadata, ThemeSelection, ThemedToken, TokenizeOptions, TokensResult,
};
use crate::error::HighlightError;
use crate::language::{is_plaintext, CustomGrammar};
use crate::render;
use crate::theme::{ThemeDefinition, ThemeKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const KEYWORD_COLOR: &str = "#c678dd";

/// Word-splitting engine: every non-whitespace run of a loaded language is
/// colored, plaintext is emitted as one unstyled token per line.
#[derive(Debug)]
pub(crate) struct StubEngine {
    languages: Mutex<BTreeSet<String>>,
    themes: Mutex<BTreeMap<String, ThemeMetadata>>,
    pub(crate) tokenize_calls: AtomicUsize,
    pub(crate) fail_tokenize: bool,
}

impl StubEngine {
    pub(crate) fn new(languages: &[&str], themes: &[&str]) -> Self {
        let themes = themes
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    ThemeMetadata {
                        name: name.to_string(),
                        foreground: "#eeeeee".to_string(),
                        background: "#222222".to_string(),
                        kind: ThemeKind::Dark,
                    },
                )
            })
            .collect();
        Self {
            languages: Mutex::new(languages.iter().map(|id| id.to_string()).collect()),
            themes: Mutex::new(themes),
            tokenize_calls: AtomicUsize::new(0),
            fail_tokenize: false,
        }
    }

    pub(crate) fn failing(languages: &[&str], themes: &[&str]) -> Self {
        Self {
            fail_tokenize: true,
            ..Self::new(languages, themes)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.tokenize_calls.load(Ordering::SeqCst)
    }
}

fn split_words(
    line: &str,
    offset: usize,
    colored: bool,
    selection: &ThemeSelection,
) -> Vec<ThemedToken> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space = None;
    for (index, ch) in line.char_indices() {
        let space = ch.is_whitespace();
        if in_space.is_some_and(|previous| previous != space) {
            tokens.push(make_token(&line[start..index], offset + start, colored, selection));
            start = index;
        }
        in_space = Some(space);
    }
    if start < line.len() {
        tokens.push(make_token(&line[start..], offset + start, colored, selection));
    }
    tokens
}

fn make_token(
    content: &str,
    offset: usize,
    colored: bool,
    selection: &ThemeSelection,
) -> ThemedToken {
    let mut token = ThemedToken::plain(content, offset);
    if !colored || content.trim().is_empty() {
        return token;
    }
    match selection {
        ThemeSelection::Single(_) => token.color = Some(KEYWORD_COLOR.to_string()),
        ThemeSelection::Multi {
            variants,
            css_variable_prefix,
            ..
        } => {
            token.html_style = variants
                .iter()
                .map(|(variant, _)| {
                    (
                        format!("{css_variable_prefix}{variant}"),
                        KEYWORD_COLOR.to_string(),
                    )
                })
                .collect();
        }
    }
    token
}

impl HighlightEngine for StubEngine {
    fn code_to_tokens(
        &self,
        code: &str,
        options: &TokenizeOptions,
    ) -> Result<TokensResult, HighlightError> {
        self.tokenize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tokenize {
            return Err(HighlightError::Tokenize("stub failure".to_string()));
        }
        let colored = !is_plaintext(&options.lang);
        if colored && !self.supports_language(&options.lang) {
            return Err(HighlightError::LanguageNotFound(options.lang.clone()));
        }
        for id in options.theme.theme_ids() {
            if !self.has_theme(id) {
                return Err(HighlightError::ThemeNotFound(id.to_string()));
            }
        }
        let mut offset = 0;
        let mut lines = Vec::new();
        for line in code.split('\n') {
            lines.push(split_words(line, offset, colored, &options.theme));
            offset += line.len() + 1;
        }
        let mut tokens = lines;
        render::apply_token_hooks(&mut tokens, &options.transformers);
        Ok(TokensResult {
            tokens,
            fg: "#eeeeee".to_string(),
            bg: "#222222".to_string(),
            theme_name: options.theme.theme_ids().first().map(|id| id.to_string()),
            root_style: None,
        })
    }

    fn loaded_languages(&self) -> Vec<String> {
        self.languages
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn has_theme(&self, id: &str) -> bool {
        self.themes
            .lock()
            .map(|themes| themes.contains_key(id))
            .unwrap_or(false)
    }

    fn theme_metadata(&self, id: &str) -> Result<ThemeMetadata, HighlightError> {
        self.themes
            .lock()
            .map_err(|_| HighlightError::Poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| HighlightError::ThemeNotFound(id.to_string()))
    }

    fn load_language(&self, grammar: &CustomGrammar) -> Result<(), HighlightError> {
        if grammar.definition.trim().is_empty() {
            return Err(HighlightError::InvalidGrammar {
                name: grammar.name.clone(),
                message: "empty definition".to_string(),
            });
        }
        self.languages
            .lock()
            .map_err(|_| HighlightError::Poisoned)?
            .insert(grammar.name.clone());
        Ok(())
    }

    fn load_theme(&self, theme: &ThemeDefinition) -> Result<(), HighlightError> {
        let metadata = ThemeMetadata {
            name: theme.id().to_string(),
            foreground: theme.foreground().unwrap_or("#000000").to_string(),
            background: theme.background().unwrap_or("#ffffff").to_string(),
            kind: theme.kind,
        };
        self.themes
            .lock()
            .map_err(|_| HighlightError::Poisoned)?
            .insert(metadata.name.clone(), metadata);
        Ok(())
    }
}

/// Provisioner that counts constructions and returns a fresh [`StubEngine`].
#[derive(Debug)]
pub(crate) struct CountingProvisioner {
    pub(crate) constructions: AtomicUsize,
    pub(crate) requests: Mutex<Vec<ProvisionRequest>>,
    languages: Vec<&'static str>,
    themes: Vec<&'static str>,
}

impl CountingProvisioner {
    pub(crate) fn new(languages: &[&'static str], themes: &[&'static str]) -> Self {
        Self {
            constructions: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            languages: languages.to_vec(),
            themes: themes.to_vec(),
        }
    }

    pub(crate) fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl EngineProvisioner for CountingProvisioner {
    fn bundle(&self) -> &str {
        "stub"
    }

    fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        std::thread::sleep(std::time::Duration::from_millis(20));
        Ok(Arc::new(StubEngine::new(&self.languages, &self.themes)))
    }
}
