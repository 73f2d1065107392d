//! Output formats and the transforms applied uniformly across them.

use crate::constants::DEFAULT_STARTING_LINE_NUMBER;
use crate::engine::{HighlightEngine, TokenizeOptions, TokensResult, Transformer};
use crate::error::HighlightError;
use crate::hast::{Element, Node, Root};
use serde::Serialize;
use std::sync::Arc;

/// Representation a request asks for; fixed per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Tree,
    Markup,
    Tokens,
}

impl OutputFormat {
    /// Parse `tree`, `markup`/`html` or `tokens` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tree" | "react" => Some(Self::Tree),
            "markup" | "html" => Some(Self::Markup),
            "tokens" => Some(Self::Tokens),
            _ => None,
        }
    }
}

/// Host-side UI node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UiNode {
    Element(UiElement),
    Text(String),
    Fragment(Vec<UiNode>),
}

/// Element with attributes split the way UI frameworks expect them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiElement {
    pub tag: String,
    pub class_names: Vec<String>,
    /// Parsed `name: value` declarations in source order.
    pub style: Vec<(String, String)>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<UiNode>,
}

impl UiElement {
    pub fn style_value(&self, name: &str) -> Option<&str> {
        self.style
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_names.iter().any(|existing| existing == class)
    }
}

impl UiNode {
    /// Adapt an engine tree into UI nodes.
    pub fn from_root(root: &Root) -> Self {
        Self::Fragment(root.children.iter().map(Self::from_node).collect())
    }

    fn from_node(node: &Node) -> Self {
        match node {
            Node::Text(text) => Self::Text(text.clone()),
            Node::Element(element) => Self::Element(adapt_element(element)),
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text(text) => out.push_str(text),
            Self::Element(element) => element
                .children
                .iter()
                .for_each(|child| child.collect_text(out)),
            Self::Fragment(children) => children.iter().for_each(|child| child.collect_text(out)),
        }
    }

    /// Depth-first list of elements matching `predicate`.
    pub fn find_all(&self, predicate: &dyn Fn(&UiElement) -> bool) -> Vec<&UiElement> {
        let mut found = Vec::new();
        self.find_into(predicate, &mut found);
        found
    }

    fn find_into<'a>(
        &'a self,
        predicate: &dyn Fn(&UiElement) -> bool,
        found: &mut Vec<&'a UiElement>,
    ) {
        let children = match self {
            Self::Text(_) => return,
            Self::Element(element) => {
                if predicate(element) {
                    found.push(element);
                }
                &element.children
            }
            Self::Fragment(children) => children,
        };
        for child in children {
            child.find_into(predicate, found);
        }
    }
}

fn adapt_element(element: &Element) -> UiElement {
    let mut adapted = UiElement {
        tag: element.tag.clone(),
        ..Default::default()
    };
    for (name, value) in &element.properties {
        match name.as_str() {
            "class" => adapted
                .class_names
                .extend(value.split_whitespace().map(str::to_string)),
            "style" => adapted.style.extend(parse_style(value)),
            "tabindex" => adapted.attributes.push(("tabIndex".to_string(), value.clone())),
            _ => adapted.attributes.push((name.clone(), value.clone())),
        }
    }
    adapted.children = element.children.iter().map(UiNode::from_node).collect();
    adapted
}

/// Split an inline style string into trimmed `(name, value)` pairs.
pub fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Result of one highlight run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", content = "value", rename_all = "lowercase")]
pub enum HighlightOutput {
    Tree(UiNode),
    Markup(String),
    Tokens(TokensResult),
}

impl HighlightOutput {
    pub fn format(&self) -> OutputFormat {
        match self {
            Self::Tree(_) => OutputFormat::Tree,
            Self::Markup(_) => OutputFormat::Markup,
            Self::Tokens(_) => OutputFormat::Tokens,
        }
    }

    /// Visible text of the output (tags stripped for markup).
    pub fn text_content(&self) -> String {
        match self {
            Self::Tree(node) => node.text_content(),
            Self::Markup(html) => strip_markup(html),
            Self::Tokens(result) => result
                .tokens
                .iter()
                .map(|line| line.iter().map(|token| token.content.as_str()).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Tags the output as line-numbered.
///
/// Adds `has-line-numbers` to `<code>` and `line-numbers` to every line. A
/// `--line-start` style is only emitted for a non-default first line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumbers {
    pub start: u32,
}

impl Default for LineNumbers {
    fn default() -> Self {
        Self {
            start: DEFAULT_STARTING_LINE_NUMBER,
        }
    }
}

impl Transformer for LineNumbers {
    fn name(&self) -> &str {
        "codeglow:line-numbers"
    }

    fn line(&self, line: &mut Element, _line_number: usize) {
        line.add_class("line-numbers");
    }

    fn code(&self, code: &mut Element) {
        code.add_class("has-line-numbers");
        if self.start != DEFAULT_STARTING_LINE_NUMBER {
            code.append_style(&format!("--line-start: {}", self.start));
        }
    }
}

/// Run the engine call matching `format`.
///
/// Synchronous; callers run it on a blocking thread.
///
/// # Arguments
/// - `format`: Requested representation.
/// - `engine`: Engine with language and themes loaded.
/// - `code`: Source text.
/// - `options`: Tokenize options; `line_numbers` is appended to its transformers.
/// - `is_multi_theme`: Selects the token call for [`OutputFormat::Tokens`].
/// - `line_numbers`: Line-number transform, when enabled.
///
/// # Returns
/// The [`HighlightOutput`] for `format`.
///
/// # Errors
/// Propagates engine errors.
pub fn transform_output(
    format: OutputFormat,
    engine: &dyn HighlightEngine,
    code: &str,
    mut options: TokenizeOptions,
    is_multi_theme: bool,
    line_numbers: Option<LineNumbers>,
) -> Result<HighlightOutput, HighlightError> {
    if let Some(line_numbers) = line_numbers {
        options.transformers.push(Arc::new(line_numbers));
    }
    match format {
        OutputFormat::Tree => {
            let root = engine.code_to_tree(code, &options)?;
            Ok(HighlightOutput::Tree(UiNode::from_root(&root)))
        }
        OutputFormat::Markup => engine.code_to_markup(code, &options).map(HighlightOutput::Markup),
        OutputFormat::Tokens if is_multi_theme => {
            engine.code_to_tokens(code, &options).map(HighlightOutput::Tokens)
        }
        OutputFormat::Tokens => {
            let tokens = engine.code_to_tokens_base(code, &options)?;
            let theme_id = options.theme.theme_ids().first().copied().unwrap_or_default();
            let metadata = engine.theme_metadata(theme_id)?;
            Ok(HighlightOutput::Tokens(TokensResult {
                tokens,
                fg: metadata.foreground,
                bg: metadata.background,
                theme_name: Some(metadata.name),
                root_style: None,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DefaultColor, ThemeSelection};
    use crate::test_support::{StubEngine, KEYWORD_COLOR};

    const CODE: &str = "let a = 1;\nlet b = 2;";

    fn options() -> TokenizeOptions {
        TokenizeOptions::new("rust", ThemeSelection::Single("dark".to_string()))
    }

    fn engine() -> StubEngine {
        StubEngine::new(&["rust"], &["dark", "light"])
    }

    fn line_start_styles(node: &UiNode) -> usize {
        node.find_all(&|element| element.style_value("--line-start").is_some())
            .len()
    }

    #[test]
    fn default_start_emits_no_offset_style() {
        let output = transform_output(
            OutputFormat::Tree,
            &engine(),
            CODE,
            options(),
            false,
            Some(LineNumbers { start: 1 }),
        )
        .expect("tree");
        let HighlightOutput::Tree(node) = output else {
            panic!("expected tree output");
        };
        assert_eq!(line_start_styles(&node), 0);
        let code = node.find_all(&|element| element.tag == "code");
        assert_eq!(code.len(), 1);
        assert!(code[0].has_class("has-line-numbers"));
        let lines = node.find_all(&|element| element.has_class("line"));
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.has_class("line-numbers")));
    }

    #[test]
    fn custom_start_is_carried_in_tree_and_markup() {
        let output = transform_output(
            OutputFormat::Tree,
            &engine(),
            CODE,
            options(),
            false,
            Some(LineNumbers { start: 42 }),
        )
        .expect("tree");
        let HighlightOutput::Tree(node) = output else {
            panic!("expected tree output");
        };
        let styled = node.find_all(&|element| element.style_value("--line-start") == Some("42"));
        assert_eq!(styled.len(), 1);
        assert_eq!(styled[0].tag, "code");

        let markup = transform_output(
            OutputFormat::Markup,
            &engine(),
            CODE,
            options(),
            false,
            Some(LineNumbers { start: 42 }),
        )
        .expect("markup");
        let HighlightOutput::Markup(html) = markup else {
            panic!("expected markup output");
        };
        assert!(html.contains("--line-start: 42"));
        assert!(html.contains("class=\"has-line-numbers\""));
    }

    #[test]
    fn tree_adaptation_splits_classes_and_parses_style() {
        let output = transform_output(OutputFormat::Tree, &engine(), CODE, options(), false, None)
            .expect("tree");
        let HighlightOutput::Tree(node) = output else {
            panic!("expected tree output");
        };
        let pre = node.find_all(&|element| element.tag == "pre");
        assert_eq!(pre[0].class_names, vec!["shiki".to_string(), "dark".to_string()]);
        assert_eq!(pre[0].attribute("tabIndex"), Some("0"));
        assert_eq!(pre[0].attribute("tabindex"), None);
        assert_eq!(pre[0].style_value("background-color"), Some("#222222"));
        let colored = node.find_all(&|element| element.style_value("color") == Some(KEYWORD_COLOR));
        assert!(!colored.is_empty());
        assert_eq!(node.text_content(), CODE);
    }

    #[test]
    fn single_theme_tokens_are_assembled_from_metadata() {
        let output = transform_output(OutputFormat::Tokens, &engine(), CODE, options(), false, None)
            .expect("tokens");
        let HighlightOutput::Tokens(result) = &output else {
            panic!("expected tokens output");
        };
        assert_eq!(result.fg, "#eeeeee");
        assert_eq!(result.bg, "#222222");
        assert_eq!(result.theme_name.as_deref(), Some("dark"));
        assert_eq!(result.tokens.len(), 2);
        assert_eq!(output.text_content(), CODE);
    }

    #[test]
    fn multi_theme_tokens_carry_variant_styles() {
        let mut options = options();
        options.theme = ThemeSelection::Multi {
            variants: vec![
                ("light".to_string(), "light".to_string()),
                ("dark".to_string(), "dark".to_string()),
            ],
            default_color: DefaultColor::Auto,
            css_variable_prefix: "--shiki-".to_string(),
        };
        let output = transform_output(OutputFormat::Tokens, &engine(), CODE, options, true, None)
            .expect("tokens");
        let HighlightOutput::Tokens(result) = output else {
            panic!("expected tokens output");
        };
        let first = &result.tokens[0][0];
        assert_eq!(first.content, "let");
        assert_eq!(
            first.html_style,
            vec![
                ("--shiki-light".to_string(), KEYWORD_COLOR.to_string()),
                ("--shiki-dark".to_string(), KEYWORD_COLOR.to_string()),
            ]
        );
    }

    #[test]
    fn style_parsing_skips_empty_declarations() {
        assert_eq!(
            parse_style("color:#fff; ;--line-start: 42;"),
            vec![
                ("color".to_string(), "#fff".to_string()),
                ("--line-start".to_string(), "42".to_string()),
            ]
        );
        assert_eq!(OutputFormat::parse(" HTML "), Some(OutputFormat::Markup));
        assert_eq!(OutputFormat::parse("svg"), None);
    }
}
