//! Theme input classification and resolution.

use crate::constants::{CUSTOM_THEME_ID, MULTI_THEME_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Light/dark flavor declared by a theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeKind {
    Light,
    #[default]
    Dark,
}

/// One or many scope selectors, as written in theme files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeSpec {
    One(String),
    Many(Vec<String>),
}

impl ScopeSpec {
    /// Flatten into individual selectors; comma lists are split.
    pub fn selectors(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::One(scope) => vec![scope.as_str()],
            Self::Many(scopes) => scopes.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .flat_map(|scope| scope.split(','))
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSettings {
    #[serde(default)]
    pub foreground: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    /// Space separated subset of `italic bold underline`.
    #[serde(default)]
    pub font_style: Option<String>,
}

/// A single token-color rule. Rules without a scope set the theme defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenColorRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scope: Option<ScopeSpec>,
    #[serde(default)]
    pub settings: TokenSettings,
}

/// Inline theme definition in the VS Code / TextMate JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: ThemeKind,
    #[serde(default)]
    pub fg: Option<String>,
    #[serde(default)]
    pub bg: Option<String>,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(alias = "token_colors")]
    pub token_colors: Vec<TokenColorRule>,
}

impl ThemeDefinition {
    /// Declared name, or the `custom` sentinel.
    pub fn id(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(CUSTOM_THEME_ID)
    }

    /// Default foreground from `fg`, `editor.foreground`, or a scopeless rule.
    pub fn foreground(&self) -> Option<&str> {
        self.fg
            .as_deref()
            .or_else(|| self.colors.get("editor.foreground").map(String::as_str))
            .or_else(|| self.global_settings().and_then(|s| s.foreground.as_deref()))
    }

    /// Default background from `bg`, `editor.background`, or a scopeless rule.
    pub fn background(&self) -> Option<&str> {
        self.bg
            .as_deref()
            .or_else(|| self.colors.get("editor.background").map(String::as_str))
            .or_else(|| self.global_settings().and_then(|s| s.background.as_deref()))
    }

    fn global_settings(&self) -> Option<&TokenSettings> {
        self.token_colors
            .iter()
            .find(|rule| rule.scope.is_none())
            .map(|rule| &rule.settings)
    }
}

/// Theme requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeInput {
    /// Bundled theme id.
    Named(String),
    /// Inline theme definition.
    Custom(Arc<ThemeDefinition>),
    /// Variant name (`light`, `dark`, ...) to theme, in caller order.
    Variants(Vec<(String, ThemeInput)>),
}

impl From<&str> for ThemeInput {
    fn from(value: &str) -> Self {
        Self::Named(value.to_string())
    }
}

impl From<String> for ThemeInput {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}

impl From<ThemeDefinition> for ThemeInput {
    fn from(value: ThemeDefinition) -> Self {
        Self::Custom(Arc::new(value))
    }
}

impl ThemeInput {
    /// Build a variant map from `(variant, theme id)` pairs.
    pub fn variants<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ThemeInput>,
    {
        Self::Variants(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Classify an untyped JSON theme value.
    ///
    /// This is the only place object shapes are inspected: a string is a
    /// named theme; an object carrying a `tokenColors` array is one custom
    /// theme; any other object is a variant map whose entries are classified
    /// the same way. Values of any other type become an empty variant map.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(name) => Self::Named(name.clone()),
            Value::Object(map) if is_theme_definition(value) => {
                serde_json::from_value::<ThemeDefinition>(value.clone())
                    .map(|definition| Self::Custom(Arc::new(definition)))
                    .unwrap_or_else(|_| {
                        tracing::debug!(keys = map.len(), "unparsable inline theme object");
                        Self::Variants(Vec::new())
                    })
            }
            Value::Object(map) => Self::Variants(
                map.iter()
                    .map(|(key, entry)| (key.clone(), Self::from_json(entry)))
                    .collect(),
            ),
            _ => Self::Variants(Vec::new()),
        }
    }
}

fn is_theme_definition(value: &Value) -> bool {
    ["tokenColors", "token_colors"]
        .iter()
        .any(|key| value.get(key).is_some_and(Value::is_array))
}

/// A theme the engine must have loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeSource {
    Named(String),
    Custom(Arc<ThemeDefinition>),
}

impl ThemeSource {
    /// Id the engine knows this theme by.
    pub fn id(&self) -> &str {
        match self {
            Self::Named(name) => name.as_str(),
            Self::Custom(definition) => definition.id(),
        }
    }

    fn from_input(input: &ThemeInput) -> Option<Self> {
        match input {
            ThemeInput::Named(name) if !name.trim().is_empty() => Some(Self::Named(name.clone())),
            ThemeInput::Custom(definition) => Some(Self::Custom(definition.clone())),
            _ => None,
        }
    }
}

/// Outcome of resolving a [`ThemeInput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeResolution {
    pub is_multi_theme: bool,
    /// Cache key; order-independent for variant maps.
    pub theme_id: String,
    pub themes_to_load: Vec<ThemeSource>,
    /// Valid `(variant, theme)` entries in caller order; empty for single themes.
    pub variants: Vec<(String, ThemeSource)>,
}

impl ThemeResolution {
    /// True for a variant map without a single usable entry.
    pub fn is_empty_variant_map(&self) -> bool {
        self.is_multi_theme && self.themes_to_load.is_empty()
    }
}

/// Resolve a theme input into a cache key and the themes to load.
///
/// Variant maps keep only entries with a non-blank key and a named or custom
/// value. A map with no such entry still reports `is_multi_theme` with an
/// empty load list and the `custom` sentinel id; the caller substitutes its
/// default theme.
///
/// # Returns
/// The [`ThemeResolution`] for `theme`.
pub fn resolve_theme(theme: &ThemeInput) -> ThemeResolution {
    match theme {
        ThemeInput::Named(_) | ThemeInput::Custom(_) => {
            let source = ThemeSource::from_input(theme);
            ThemeResolution {
                is_multi_theme: false,
                theme_id: source
                    .as_ref()
                    .map(|source| source.id().to_string())
                    .unwrap_or_else(|| CUSTOM_THEME_ID.to_string()),
                themes_to_load: source.into_iter().collect(),
                variants: Vec::new(),
            }
        }
        ThemeInput::Variants(entries) => {
            let variants: Vec<(String, ThemeSource)> = entries
                .iter()
                .filter(|(key, _)| !key.trim().is_empty())
                .filter_map(|(key, value)| {
                    ThemeSource::from_input(value).map(|source| (key.clone(), source))
                })
                .collect();
            if variants.is_empty() {
                return ThemeResolution {
                    is_multi_theme: true,
                    theme_id: CUSTOM_THEME_ID.to_string(),
                    themes_to_load: Vec::new(),
                    variants,
                };
            }
            let mut names: Vec<&str> = variants.iter().map(|(_, source)| source.id()).collect();
            names.sort_unstable();
            ThemeResolution {
                is_multi_theme: true,
                theme_id: format!("{MULTI_THEME_PREFIX}{}", names.join("-")),
                themes_to_load: variants.iter().map(|(_, source)| source.clone()).collect(),
                variants,
            }
        }
    }
}
