//! Language input classification and resolution.

use crate::constants::{PLAINTEXT, PLAINTEXT_MARKERS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Caller-supplied alias table: user-facing token to engine language id.
pub type AliasTable = BTreeMap<String, String>;

/// Inline grammar supplied by the caller instead of a bundled language.
///
/// `definition` is a sublime-syntax YAML document; the engine compiles it
/// when the grammar is first loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomGrammar {
    pub name: String,
    #[serde(default)]
    pub scope_name: String,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub definition: String,
}

impl CustomGrammar {
    /// Whether `token` names this grammar by name, scope, alias or file type.
    ///
    /// Comparison is case-insensitive; the scope matches either in full or by
    /// its final dot-separated segment (`source.mylang` matches `mylang`).
    pub fn matches(&self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() {
            return false;
        }
        if self.name.eq_ignore_ascii_case(token) {
            return true;
        }
        if !self.scope_name.is_empty() {
            if self.scope_name.eq_ignore_ascii_case(token) {
                return true;
            }
            let last_segment = self.scope_name.rsplit('.').next().unwrap_or_default();
            if last_segment.eq_ignore_ascii_case(token) {
                return true;
            }
        }
        self.aliases
            .iter()
            .chain(self.file_types.iter())
            .any(|candidate| candidate.eq_ignore_ascii_case(token))
    }
}

/// Language requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageInput {
    /// Bundled id, plaintext marker, alias, or a custom grammar's name.
    Name(String),
    /// Inline grammar definition.
    Grammar(Arc<CustomGrammar>),
}

impl From<&str> for LanguageInput {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for LanguageInput {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<CustomGrammar> for LanguageInput {
    fn from(value: CustomGrammar) -> Self {
        Self::Grammar(Arc::new(value))
    }
}

impl LanguageInput {
    /// Classify an untyped JSON language value.
    ///
    /// Strings become [`LanguageInput::Name`]. Objects that deserialize as a
    /// [`CustomGrammar`] become [`LanguageInput::Grammar`]. Everything else
    /// becomes an empty name, which resolves to plaintext.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(name) => Self::Name(name.clone()),
            Value::Object(_) => serde_json::from_value::<CustomGrammar>(value.clone())
                .map(|grammar| Self::Grammar(Arc::new(grammar)))
                .unwrap_or_else(|_| Self::Name(String::new())),
            _ => Self::Name(String::new()),
        }
    }
}

/// What the engine must load before tokenizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPayload {
    Bundled(String),
    Custom(Arc<CustomGrammar>),
    None,
}

/// Outcome of resolving a [`LanguageInput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageResolution {
    /// Id the engine tokenizes with.
    pub language_id: String,
    /// Label for display; keeps what the user typed.
    pub display_language_id: Option<String>,
    pub load_payload: LoadPayload,
}

impl LanguageResolution {
    fn plaintext(display: Option<String>) -> Self {
        Self {
            language_id: PLAINTEXT.to_string(),
            display_language_id: display,
            load_payload: LoadPayload::None,
        }
    }
}

/// Whether `id` is one of the plaintext markers.
pub fn is_plaintext(id: &str) -> bool {
    let id = id.trim();
    PLAINTEXT_MARKERS
        .iter()
        .any(|marker| marker.eq_ignore_ascii_case(id))
}

/// Resolve a language input to engine-facing and display ids.
///
/// Never fails: anything unresolvable is passed through for the engine layer
/// to replace with plaintext.
///
/// # Arguments
/// - `language`: Requested language, if any.
/// - `custom_languages`: Inline grammars the caller registered.
/// - `aliases`: Alias table applied after custom grammar matching.
///
/// # Returns
/// A usable [`LanguageResolution`].
pub fn resolve_language(
    language: Option<&LanguageInput>,
    custom_languages: &[Arc<CustomGrammar>],
    aliases: &AliasTable,
) -> LanguageResolution {
    let name = match language {
        None => return LanguageResolution::plaintext(None),
        Some(LanguageInput::Grammar(grammar)) => {
            return LanguageResolution {
                language_id: grammar.name.clone(),
                display_language_id: Some(grammar.name.clone()),
                load_payload: LoadPayload::Custom(grammar.clone()),
            };
        }
        Some(LanguageInput::Name(name)) => name,
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return LanguageResolution::plaintext(None);
    }

    if let Some(grammar) = custom_languages
        .iter()
        .find(|grammar| grammar.matches(trimmed))
    {
        return LanguageResolution {
            language_id: grammar.name.clone(),
            display_language_id: Some(name.clone()),
            load_payload: LoadPayload::Custom(grammar.clone()),
        };
    }

    if let Some(target) = aliases.get(name).or_else(|| aliases.get(trimmed)) {
        return LanguageResolution {
            language_id: target.clone(),
            display_language_id: Some(name.clone()),
            load_payload: LoadPayload::Bundled(target.clone()),
        };
    }

    if is_plaintext(trimmed) {
        return LanguageResolution::plaintext(Some(name.clone()));
    }

    LanguageResolution {
        language_id: name.clone(),
        display_language_id: Some(name.clone()),
        load_payload: LoadPayload::Bundled(name.clone()),
    }
}
