//! Inline-code tagging for rendered markdown trees.

use crate::hast::{Element, Node, Root};

/// Mark every `<code>` not directly inside a `<pre>` with `inline="true"`.
pub fn tag_inline_code(root: &mut Root) {
    for child in &mut root.children {
        if let Node::Element(element) = child {
            tag_element(element, false);
        }
    }
}

fn tag_element(element: &mut Element, parent_is_pre: bool) {
    if element.tag == "code" && !parent_is_pre {
        element.set_property("inline", "true");
    }
    let is_pre = element.tag == "pre";
    for child in element.child_elements_mut() {
        tag_element(child, is_pre);
    }
}

/// Whether a code element renders inline: its text has no line break.
pub fn is_inline_code(element: &Element) -> bool {
    !element.text_content().contains('\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(text: &str) -> Element {
        let mut code = Element::new("code");
        code.children.push(Node::Text(text.to_string()));
        code
    }

    #[test]
    fn only_code_outside_pre_is_tagged() {
        let mut pre = Element::new("pre");
        pre.children.push(Node::Element(code("fn main() {}\n")));
        let mut paragraph = Element::new("p");
        paragraph.children.push(Node::Text("call ".to_string()));
        paragraph.children.push(Node::Element(code("main()")));
        let mut root = Root {
            children: vec![Node::Element(pre), Node::Element(paragraph)],
        };

        tag_inline_code(&mut root);

        let tagged = root.find_all(|element| element.property("inline") == Some("true"));
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].text_content(), "main()");
        let block = root
            .find_all(|element| element.tag == "code" && element.property("inline").is_none());
        assert_eq!(block.len(), 1);
    }

    #[test]
    fn line_breaks_decide_inline_rendering() {
        assert!(is_inline_code(&code("let x = 1;")));
        assert!(!is_inline_code(&code("let x = 1;\nlet y = 2;")));
        let mut nested = Element::new("code");
        let mut span = Element::new("span");
        span.children.push(Node::Text("a\nb".to_string()));
        nested.children.push(Node::Element(span));
        assert!(!is_inline_code(&nested));
    }
}
