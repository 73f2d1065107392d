//! Token post-processing and token-to-tree rendering shared by engines.

use crate::engine::{
    Decoration, MergeWhitespaces, Structure, ThemeSelection, ThemedToken, TokenLines,
    TokenizeOptions, TokensResult, Transformer,
};
use crate::hast::{Element, Node, Root};
use std::sync::Arc;

/// Run every transformer's `tokens` hook in order.
pub fn apply_token_hooks(lines: &mut TokenLines, transformers: &[Arc<dyn Transformer>]) {
    for transformer in transformers {
        transformer.tokens(lines);
    }
}

/// Normalize whitespace-only tokens according to `mode`.
pub fn merge_whitespace_tokens(lines: &mut TokenLines, mode: MergeWhitespaces) {
    match mode {
        MergeWhitespaces::Keep => {}
        MergeWhitespaces::Merge => {
            for line in lines.iter_mut() {
                *line = merge_line(std::mem::take(line));
            }
        }
        MergeWhitespaces::Never => {
            for line in lines.iter_mut() {
                *line = split_line(std::mem::take(line));
            }
        }
    }
}

fn is_blank(token: &ThemedToken) -> bool {
    !token.content.is_empty() && token.content.chars().all(char::is_whitespace)
}

fn merge_line(line: Vec<ThemedToken>) -> Vec<ThemedToken> {
    let mut merged: Vec<ThemedToken> = Vec::with_capacity(line.len());
    let mut carry: Option<ThemedToken> = None;
    for mut token in line {
        if is_blank(&token) && !token.font_style.underline {
            match carry.as_mut() {
                Some(pending) => pending.content.push_str(&token.content),
                None => carry = Some(token),
            }
            continue;
        }
        if let Some(pending) = carry.take() {
            token.content.insert_str(0, &pending.content);
            token.offset = pending.offset;
        }
        merged.push(token);
    }
    if let Some(pending) = carry {
        match merged.last_mut() {
            Some(last) => last.content.push_str(&pending.content),
            None => merged.push(pending),
        }
    }
    merged
}

fn split_line(line: Vec<ThemedToken>) -> Vec<ThemedToken> {
    let mut out = Vec::with_capacity(line.len());
    for token in line {
        if is_blank(&token) {
            out.push(token);
            continue;
        }
        let content = token.content.as_str();
        let trimmed_start = content.trim_start();
        let lead = content.len() - trimmed_start.len();
        let body = trimmed_start.trim_end();
        let trail = trimmed_start.len() - body.len();
        if lead == 0 && trail == 0 {
            out.push(token);
            continue;
        }
        let piece = |text: &str, at: usize| ThemedToken {
            content: text.to_string(),
            offset: token.offset + at,
            ..token.clone()
        };
        if lead > 0 {
            out.push(piece(&content[..lead], 0));
        }
        out.push(piece(body, lead));
        if trail > 0 {
            out.push(piece(&content[lead + body.len()..], lead + body.len()));
        }
    }
    out
}

/// Build the HTML tree for a token result and run transformer hooks.
///
/// # Arguments
/// - `result`: Tokens plus root colors from the engine.
/// - `options`: The tokenize options (theme, structure, decorations, transformers).
///
/// # Returns
/// Root whose text content equals the tokenized source.
pub fn tokens_to_tree(result: &TokensResult, options: &TokenizeOptions) -> Root {
    let lines = decorate(&result.tokens, &options.decorations);
    let transformers = &options.transformers;

    let mut root = Root::default();
    match options.structure {
        Structure::Inline => {
            for (idx, line) in lines.iter().enumerate() {
                if idx > 0 {
                    root.children.push(Node::Element(Element::new("br")));
                }
                for (column, (token, decorations)) in line.iter().enumerate() {
                    let span = token_span(token, decorations, transformers, idx + 1, column);
                    root.children.push(Node::Element(span));
                }
            }
        }
        Structure::Classic => {
            let mut code = Element::new("code");
            for (idx, line) in lines.iter().enumerate() {
                if idx > 0 {
                    code.children.push(Node::Text("\n".to_string()));
                }
                let mut line_el = Element::new("span");
                line_el.add_class("line");
                for (column, (token, decorations)) in line.iter().enumerate() {
                    let span = token_span(token, decorations, transformers, idx + 1, column);
                    line_el.children.push(Node::Element(span));
                }
                for transformer in transformers {
                    transformer.line(&mut line_el, idx + 1);
                }
                code.children.push(Node::Element(line_el));
            }
            for transformer in transformers {
                transformer.code(&mut code);
            }

            let mut pre = Element::new("pre");
            pre.set_property("class", pre_class(&options.theme));
            let root_style = result
                .root_style
                .clone()
                .unwrap_or_else(|| format!("background-color:{};color:{}", result.bg, result.fg));
            pre.set_property("style", root_style);
            pre.set_property("tabindex", "0");
            pre.children.push(Node::Element(code));
            for transformer in transformers {
                transformer.pre(&mut pre);
            }
            root.children.push(Node::Element(pre));
        }
    }

    for transformer in transformers {
        transformer.root(&mut root);
    }
    root
}

fn class_token(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("-")
}

fn pre_class(theme: &ThemeSelection) -> String {
    match theme {
        ThemeSelection::Single(id) => format!("shiki {}", class_token(id)),
        ThemeSelection::Multi { variants, .. } => {
            let names: Vec<String> = variants.iter().map(|(_, id)| class_token(id)).collect();
            format!("shiki shiki-themes {}", names.join(" "))
        }
    }
}

fn token_span(
    token: &ThemedToken,
    decorations: &[&Decoration],
    transformers: &[Arc<dyn Transformer>],
    line: usize,
    column: usize,
) -> Element {
    let mut span = Element::new("span");
    if let Some(style) = token.style() {
        span.set_property("style", style);
    }
    for decoration in decorations {
        if let Some(class) = &decoration.class {
            for class in class.split_whitespace() {
                span.add_class(class);
            }
        }
        for (name, value) in &decoration.properties {
            span.set_property(name, value.clone());
        }
    }
    span.children.push(Node::Text(token.content.clone()));
    for transformer in transformers {
        transformer.span(&mut span, line, column);
    }
    span
}

type DecoratedLine<'a> = Vec<(ThemedToken, Vec<&'a Decoration>)>;

/// Split tokens at decoration boundaries and attach covering decorations.
///
/// Decorations that end before they start, or that start past the last line,
/// are ignored.
fn decorate<'a>(lines: &TokenLines, decorations: &'a [Decoration]) -> Vec<DecoratedLine<'a>> {
    let valid: Vec<&Decoration> = decorations
        .iter()
        .filter(|decoration| {
            decoration.start <= decoration.end && decoration.start.line < lines.len()
        })
        .collect();

    lines
        .iter()
        .enumerate()
        .map(|(line_idx, tokens)| {
            let line_len: usize = tokens.iter().map(|token| token.content.len()).sum();
            let spans: Vec<(usize, usize, &Decoration)> = valid
                .iter()
                .filter(|d| d.start.line <= line_idx && d.end.line >= line_idx)
                .map(|d| {
                    let start = if d.start.line == line_idx { d.start.character } else { 0 };
                    let end = if d.end.line == line_idx { d.end.character } else { line_len };
                    (start.min(line_len), end.min(line_len), *d)
                })
                .filter(|(start, end, _)| start < end)
                .collect();
            if spans.is_empty() {
                return tokens
                    .iter()
                    .map(|token| (token.clone(), Vec::new()))
                    .collect::<DecoratedLine<'a>>();
            }

            let mut out: DecoratedLine<'a> = Vec::with_capacity(tokens.len() + spans.len() * 2);
            let mut column = 0usize;
            for token in tokens {
                let token_start = column;
                let token_end = column + token.content.len();
                let mut cuts: Vec<usize> = spans
                    .iter()
                    .flat_map(|(start, end, _)| [*start, *end])
                    .filter(|cut| *cut > token_start && *cut < token_end)
                    .map(|cut| cut - token_start)
                    .filter(|cut| token.content.is_char_boundary(*cut))
                    .collect();
                cuts.sort_unstable();
                cuts.dedup();

                let mut piece_start = 0usize;
                for piece_end in cuts.into_iter().chain(std::iter::once(token.content.len())) {
                    let abs_start = token_start + piece_start;
                    let abs_end = token_start + piece_end;
                    let covering: Vec<&'a Decoration> = spans
                        .iter()
                        .filter(|(start, end, _)| *start <= abs_start && abs_end <= *end)
                        .map(|(_, _, decoration)| *decoration)
                        .collect();
                    out.push((
                        ThemedToken {
                            content: token.content[piece_start..piece_end].to_string(),
                            offset: token.offset + piece_start,
                            ..token.clone()
                        },
                        covering,
                    ));
                    piece_start = piece_end;
                }
                column = token_end;
            }
            out
        })
        .collect()
}
