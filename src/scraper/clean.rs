use ::scraper::{ElementRef, Node, Selector};
use html_escape::{encode_double_quoted_attribute, encode_text};
use url::Url;

use crate::scraper::images::{image_source, SOURCE_ATTRS};

/// Dropped wherever they appear.
const ALWAYS_REMOVED: &[&str] = &["script", "style", "iframe", "noscript", "nav", "form"];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "blockquote", "pre", "tr", "td", "th", "figure", "figcaption", "table",
];

/// Inner HTML and visible text of an element after cleaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cleaned {
    pub html: String,
    pub text: String,
}

impl Cleaned {
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Serializes a subtree without scripts, comments and unwanted chrome.
pub struct Cleaner {
    remove: Vec<Selector>,
}

impl Cleaner {
    pub fn new(remove_selectors: &[String]) -> Self {
        let remove = remove_selectors
            .iter()
            .filter_map(|s| match Selector::parse(s) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    tracing::warn!("Ignoring invalid remove selector {}: {:?}", s, e);
                    None
                }
            })
            .collect();
        Self { remove }
    }

    pub fn clean(&self, root: ElementRef<'_>) -> Cleaned {
        self.clean_at(root, None)
    }

    /// Like [`clean`](Self::clean), with `<img>` sources resolved against
    /// `base` and lazy-load attributes folded into `src`.
    pub fn clean_at(&self, root: ElementRef<'_>, base: Option<&Url>) -> Cleaned {
        let mut html = String::new();
        let mut text = String::new();
        self.walk(root, base, &mut html, &mut text);
        Cleaned {
            html: html.trim().to_string(),
            text: collapse_whitespace(&text),
        }
    }

    /// True when the element or one of its ancestors would be dropped.
    pub fn is_excluded(&self, element: &ElementRef<'_>) -> bool {
        self.is_removed(element)
            || element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| self.is_removed(&a))
    }

    fn is_removed(&self, element: &ElementRef<'_>) -> bool {
        ALWAYS_REMOVED.contains(&element.value().name())
            || self.remove.iter().any(|s| s.matches(element))
    }

    fn walk(&self, element: ElementRef<'_>, base: Option<&Url>, html: &mut String, text: &mut String) {
        for child in element.children() {
            match child.value() {
                Node::Text(t) => {
                    html.push_str(&encode_text(&**t));
                    text.push_str(t);
                }
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_removed(&child_el) {
                        continue;
                    }
                    let name = child_el.value().name();
                    let is_block = BLOCK_ELEMENTS.contains(&name);
                    if is_block {
                        text.push(' ');
                    }

                    let source = match base {
                        Some(base) if name == "img" => image_source(child_el.value(), base),
                        _ => None,
                    };

                    html.push('<');
                    html.push_str(name);
                    if let Some(source) = &source {
                        html.push_str(" src=\"");
                        html.push_str(&encode_double_quoted_attribute(source.as_str()));
                        html.push('"');
                    }
                    for (attr, value) in child_el.value().attrs() {
                        if source.is_some() && SOURCE_ATTRS.contains(&attr) {
                            continue;
                        }
                        html.push(' ');
                        html.push_str(attr);
                        html.push_str("=\"");
                        html.push_str(&encode_double_quoted_attribute(value));
                        html.push('"');
                    }
                    html.push('>');

                    if VOID_ELEMENTS.contains(&name) {
                        continue;
                    }

                    self.walk(child_el, base, html, text);
                    html.push_str("</");
                    html.push_str(name);
                    html.push('>');
                    if is_block {
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain-text excerpt cut at a word boundary.
pub fn make_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end(),
        _ => cut.as_str(),
    };
    format!("{}...", trimmed)
}
