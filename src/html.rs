//! Code-preserving HTML → text extraction.
//!
//! Text nodes are emitted in document order. A preserved element (by default `code`)
//! whose serialized content spans more than one line is emitted as its full serialized
//! markup instead, and its descendants are not visited. Single-line preserved elements
//! are flattened like any other markup, which keeps inline snippets as plain text.

use scraper::{ElementRef, Html, Node};

/// What to do with an element encountered during the walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Treatment {
    Preserve,
    Flatten,
}

#[derive(Clone, Debug)]
pub struct HtmlTextExtractor {
    preserve: Vec<String>,
    skip_blank: bool,
}

impl Default for HtmlTextExtractor {
    fn default() -> Self {
        Self { preserve: vec!["code".to_string()], skip_blank: false }
    }
}

impl HtmlTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// No preserved elements: every element is flattened.
    pub fn plain() -> Self {
        Self { preserve: Vec::new(), skip_blank: false }
    }

    pub fn preserve<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.preserve = names.into_iter().map(|s| s.as_ref().to_lowercase()).collect();
        self
    }

    /// Drop text nodes that are empty after trimming.
    pub fn skip_blank(mut self, yes: bool) -> Self {
        self.skip_blank = yes;
        self
    }

    fn treatment(&self, el: ElementRef<'_>) -> Treatment {
        let name = el.value().name();
        if self.preserve.iter().any(|p| p == name) && el.inner_html().contains('\n') {
            Treatment::Preserve
        } else {
            Treatment::Flatten
        }
    }

    /// Emitted units in document order.
    pub fn fragments(&self, markup: &str) -> Vec<String> {
        let doc = Html::parse_fragment(markup);
        let mut out = Vec::new();
        let mut stack: Vec<_> = doc.root_element().children().collect();
        stack.reverse();

        while let Some(node) = stack.pop() {
            match node.value() {
                Node::Text(text) => {
                    let s: &str = text;
                    if self.skip_blank && s.trim().is_empty() {
                        continue;
                    }
                    out.push(s.to_string());
                }
                Node::Element(_) => {
                    let Some(el) = ElementRef::wrap(node) else { continue };
                    match self.treatment(el) {
                        Treatment::Preserve => out.push(el.html()),
                        Treatment::Flatten => {
                            let mark = stack.len();
                            stack.extend(node.children());
                            stack[mark..].reverse();
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }

    pub fn text(&self, markup: &str) -> String {
        self.fragments(markup).concat()
    }
}
