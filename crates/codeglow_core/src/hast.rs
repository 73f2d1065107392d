//! Minimal HTML syntax tree produced by engines and consumed by transformers.

use std::fmt::Write as _;

/// Tree node: an element or a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// HTML element with ordered properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub properties: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Document root holding top-level nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Root {
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Insert or replace a property, keeping its original position.
    pub fn set_property(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.properties.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name.to_string(), value)),
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.property("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|existing| existing == class)
    }

    /// Append a class unless already present.
    pub fn add_class(&mut self, class: &str) {
        if class.trim().is_empty() || self.has_class(class) {
            return;
        }
        let merged = match self.property("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.set_property("class", merged);
    }

    /// Append one `name:value` declaration to the inline style.
    pub fn append_style(&mut self, declaration: &str) {
        let declaration = declaration.trim().trim_end_matches(';');
        if declaration.is_empty() {
            return;
        }
        let merged = match self.property("style") {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{};{declaration}", existing.trim_end_matches(';'))
            }
            _ => declaration.to_string(),
        };
        self.set_property("style", merged);
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Child elements, skipping text.
    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }
}

impl Root {
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Depth-first search for elements matching `predicate`.
    pub fn find_all<'a>(&'a self, predicate: impl Fn(&Element) -> bool) -> Vec<&'a Element> {
        let mut found = Vec::new();
        find_in(&self.children, &predicate, &mut found);
        found
    }

    /// Serialize to an HTML string.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(child, &mut out);
        }
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
        }
    }
}

fn find_in<'a>(
    nodes: &'a [Node],
    predicate: &dyn Fn(&Element) -> bool,
    found: &mut Vec<&'a Element>,
) {
    for node in nodes {
        if let Node::Element(element) = node {
            if predicate(element) {
                found.push(element);
            }
            find_in(&element.children, predicate, found);
        }
    }
}

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta", "link"];

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => escape_into(text, false, out),
        Node::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.properties {
                let _ = write!(out, " {name}=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            out.push('>');
            if VOID_TAGS.contains(&element.tag.as_str()) {
                return;
            }
            for child in &element.children {
                write_node(child, out);
            }
            let _ = write!(out, "</{}>", element.tag);
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
