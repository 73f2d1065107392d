//! Language id to syntect grammar resolution.

use syntect::parsing::{SyntaxReference, SyntaxSet};

/// Name syntect gives its plain-text grammar.
pub(crate) const PLAIN_TEXT_SYNTAX: &str = "Plain Text";

/// Lowercased ASCII letters and digits of `value` (`C++` and `c` differ,
/// `Objective-C` and `objectivec` do not).
fn alphanumeric_key(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// Grammar named by `candidate`, trying in order: exact name, exact
/// extension, case-insensitive name, punctuation-insensitive name and
/// case-insensitive extension.
fn lookup<'a>(ps: &'a SyntaxSet, candidate: &str) -> Option<&'a SyntaxReference> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    if let Some(syntax) = ps
        .find_syntax_by_name(candidate)
        .or_else(|| ps.find_syntax_by_extension(candidate))
    {
        return Some(syntax);
    }

    let syntaxes = ps.syntaxes();
    let key = alphanumeric_key(candidate);
    syntaxes
        .iter()
        .find(|syntax| syntax.name.eq_ignore_ascii_case(candidate))
        .or_else(|| {
            syntaxes
                .iter()
                .find(|syntax| !key.is_empty() && alphanumeric_key(&syntax.name) == key)
        })
        .or_else(|| {
            syntaxes.iter().find(|syntax| {
                syntax
                    .file_extensions
                    .iter()
                    .any(|ext| ext.eq_ignore_ascii_case(candidate))
            })
        })
}

/// Other spellings of a language whose grammar syntect files under a
/// different name. Ids of languages without a bundled grammar are not mapped
/// to a neighbouring grammar; they stay unresolved and render as plaintext.
fn spellings(id_lower: &str) -> &'static [&'static str] {
    match id_lower {
        "csharp" | "c#" => &["C#", "cs"],
        "shell" | "shellscript" | "bash" | "zsh" | "console" => {
            &["Bourne Again Shell (bash)", "sh"]
        }
        "c++" => &["C++", "cpp"],
        "objc" => &["Objective-C", "m"],
        "makefile" => &["Makefile", "make"],
        "latex" => &["LaTeX", "tex"],
        "regex" | "regexp" => &["Regular Expression", "re"],
        _ => &[],
    }
}

/// Resolve a language id to a grammar of `ps`.
///
/// # Arguments
/// - `ps`: Loaded syntax set.
/// - `id`: Engine-facing language id (name, extension or common spelling).
///
/// # Returns
/// The matching grammar, or `None` when `ps` has nothing for `id`. Plaintext
/// markers are not handled here.
pub(crate) fn resolve_syntax<'a>(ps: &'a SyntaxSet, id: &str) -> Option<&'a SyntaxReference> {
    lookup(ps, id).or_else(|| {
        spellings(id.trim().to_ascii_lowercase().as_str())
            .iter()
            .find_map(|spelling| lookup(ps, spelling))
    })
}

#[cfg(test)]
mod tests {
    use super::{resolve_syntax, PLAIN_TEXT_SYNTAX};
    use crate::settings::SyntectSettings;

    #[test]
    fn resolves_common_ids_names_and_extensions() {
        let settings = SyntectSettings::shared();
        let ids = [
            "rust", "rs", "python", "py", "javascript", "js", "go", "html", "css", "json", "yaml",
            "sql",
        ];
        for id in ids {
            let syntax = resolve_syntax(&settings.ps, id).unwrap_or_else(|| panic!("id: {id}"));
            assert_ne!(syntax.name, PLAIN_TEXT_SYNTAX, "id: {id}");
        }
    }

    #[test]
    fn resolves_other_spellings_of_bundled_languages() {
        let settings = SyntectSettings::shared();
        for (id, expected) in [
            ("csharp", "C#"),
            ("shell", "Bourne Again Shell (bash)"),
            ("objectivec", "Objective-C"),
            ("c++", "C++"),
        ] {
            let syntax = resolve_syntax(&settings.ps, id).unwrap_or_else(|| panic!("id: {id}"));
            assert_eq!(syntax.name, expected, "id: {id}");
        }
    }

    #[test]
    fn unknown_and_blank_ids_resolve_to_nothing() {
        let settings = SyntectSettings::shared();
        assert!(resolve_syntax(&settings.ps, "somethingtotallyunknown").is_none());
        assert!(resolve_syntax(&settings.ps, "   ").is_none());
        for id in ["zig", "kotlin", "elixir", "typescript", "tsx"] {
            assert!(resolve_syntax(&settings.ps, id).is_none(), "id: {id}");
        }
    }
}
