//! Conversion between inline theme definitions and syntect themes.

use codeglow_core::constants::TRACE_TARGET;
use codeglow_core::error::HighlightError;
use codeglow_core::theme::{ThemeDefinition, ThemeKind};
use std::str::FromStr;
use syntect::highlighting::{
    Color, FontStyle, ScopeSelectors, StyleModifier, Theme, ThemeItem, ThemeSettings,
};
use tracing::warn;

/// Parse `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`.
pub(crate) fn parse_hex_color(value: &str) -> Option<Color> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 | 4 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
        6 | 8 => hex.to_string(),
        _ => return None,
    };
    let channel = |index: usize| u8::from_str_radix(&expanded[index..index + 2], 16).ok();
    Some(Color {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
        a: if expanded.len() == 8 { channel(6)? } else { 0xff },
    })
}

/// `#rrggbb`, or `#rrggbbaa` when not fully opaque.
pub(crate) fn color_hex(color: Color) -> String {
    if color.a == 0xff {
        format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", color.r, color.g, color.b, color.a)
    }
}

fn parse_font_style(value: &str) -> FontStyle {
    value
        .split_whitespace()
        .fold(FontStyle::empty(), |style, word| match word {
            "bold" => style | FontStyle::BOLD,
            "italic" => style | FontStyle::ITALIC,
            "underline" => style | FontStyle::UNDERLINE,
            _ => style,
        })
}

/// Light or dark, judged by background luminance.
pub(crate) fn luminance_kind(background: Option<Color>) -> ThemeKind {
    let Some(bg) = background else {
        return ThemeKind::Dark;
    };
    let luminance = 0.2126 * f64::from(bg.r) + 0.7152 * f64::from(bg.g) + 0.0722 * f64::from(bg.b);
    if luminance > 127.5 {
        ThemeKind::Light
    } else {
        ThemeKind::Dark
    }
}

fn color_field(theme: &str, field: &str, value: Option<&str>) -> Option<Color> {
    let value = value?;
    let parsed = parse_hex_color(value);
    if parsed.is_none() {
        warn!(
            target: TRACE_TARGET,
            event = "theme_color_ignored",
            theme = theme,
            field = field,
            value = value,
            "unparsable theme color"
        );
    }
    parsed
}

/// Build a syntect theme from an inline definition.
///
/// Rules with unparsable selectors or colors are skipped rather than failing
/// the whole theme.
///
/// # Errors
/// Returns [`HighlightError::InvalidTheme`] when the definition has neither a
/// usable foreground nor background nor any rule.
pub(crate) fn to_syntect_theme(definition: &ThemeDefinition) -> Result<Theme, HighlightError> {
    let id = definition.id();
    let settings = ThemeSettings {
        foreground: color_field(id, "foreground", definition.foreground()),
        background: color_field(id, "background", definition.background()),
        ..Default::default()
    };

    let mut scopes = Vec::new();
    for rule in &definition.token_colors {
        let Some(scope) = &rule.scope else {
            continue;
        };
        let selectors = scope.selectors().join(", ");
        let Ok(scope) = ScopeSelectors::from_str(&selectors) else {
            warn!(
                target: TRACE_TARGET,
                event = "theme_rule_ignored",
                theme = id,
                selectors = %selectors,
                "unparsable scope selector"
            );
            continue;
        };
        scopes.push(ThemeItem {
            scope,
            style: StyleModifier {
                foreground: color_field(id, "rule.foreground", rule.settings.foreground.as_deref()),
                background: color_field(id, "rule.background", rule.settings.background.as_deref()),
                font_style: rule.settings.font_style.as_deref().map(parse_font_style),
            },
        });
    }

    if settings.foreground.is_none() && settings.background.is_none() && scopes.is_empty() {
        return Err(HighlightError::InvalidTheme {
            name: id.to_string(),
            message: "no colors or token rules".to_string(),
        });
    }

    Ok(Theme {
        name: Some(id.to_string()),
        settings,
        scopes,
        ..Default::default()
    })
}

/// Declared kind, with undeclared (dark) themes checked against their background.
pub(crate) fn definition_kind(definition: &ThemeDefinition, theme: &Theme) -> ThemeKind {
    match definition.kind {
        ThemeKind::Light => ThemeKind::Light,
        // `type` deserializes to dark when omitted.
        ThemeKind::Dark => luminance_kind(theme.settings.background),
    }
}
