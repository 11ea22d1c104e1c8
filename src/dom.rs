// Lenient element-tree loader for XBRL and inline-XBRL markup
use crate::{Error, Result};
use compact_str::CompactString;
use quick_xml::events::Event;
use quick_xml::Reader;

/// One element of the parsed document: qualified name as written in the
/// source (prefix included), attributes in document order, and child nodes.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: CompactString,
    pub attrs: Vec<(CompactString, CompactString)>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Element(Element),
}

impl Element {
    fn named(name: CompactString) -> Self {
        Element {
            name,
            attrs: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Local part of the qualified name.
    pub fn local_name(&self) -> &str {
        match self.name.rfind(':') {
            Some(pos) => &self.name[pos + 1..],
            None => &self.name,
        }
    }

    /// Direct text content, concatenated.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children().find(|c| c.name == name)
    }

    /// Depth-first traversal of the subtree, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children().collect::<Vec<_>>().into_iter().rev().collect(),
        }
    }

    /// Text of this element and all descendants, in document order.
    /// Used where a value is nested under formatting wrapper elements.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let el = self.stack.pop()?;
        let mut children: Vec<&Element> = el.children().collect();
        children.reverse();
        self.stack.extend(children);
        Some(el)
    }
}

/// Parse document bytes into an element tree.
///
/// Real-world inline-XBRL HTML is frequently sloppy: stray closing tags,
/// unclosed formatting elements, raw entities. The loader recovers from all
/// of those; only errors from the underlying reader (truncated or genuinely
/// unparseable markup) surface as `Error::Parse`.
pub fn parse(data: &[u8]) -> Result<Element> {
    // Skip BOM if present
    let data = if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    };

    let mut reader = Reader::from_reader(data);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let mut element = Element::named(qname_of(e.name().as_ref()));
                read_attrs(e, &mut element);
                stack.push(element);
            }
            Ok(Event::Empty(ref e)) => {
                let mut element = Element::named(qname_of(e.name().as_ref()));
                read_attrs(e, &mut element);
                attach(element, &mut stack, &mut root);
            }
            Ok(Event::End(ref e)) => {
                let name = qname_of(e.name().as_ref());
                // Close the nearest matching open element; a stray closing
                // tag with no open counterpart is dropped.
                if let Some(pos) = stack.iter().rposition(|el| el.name == name) {
                    while stack.len() > pos {
                        let element = stack.pop().unwrap();
                        attach(element, &mut stack, &mut root);
                    }
                }
            }
            Ok(Event::Text(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        // Undeclared entity or bad escape: keep the raw text
                        Err(_) => String::from_utf8_lossy(t.as_ref()).into_owned(),
                    };
                    top.nodes.push(Node::Text(text));
                }
            }
            Ok(Event::CData(ref c)) => {
                if let Some(top) = stack.last_mut() {
                    top.nodes
                        .push(Node::Text(String::from_utf8_lossy(c.as_ref()).into_owned()));
                }
            }
            Ok(Event::Decl(_)) | Ok(Event::PI(_)) | Ok(Event::DocType(_)) | Ok(Event::Comment(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(e.to_string())),
        }
        buf.clear();
    }

    // Unwind anything left open at EOF
    while let Some(element) = stack.pop() {
        attach(element, &mut stack, &mut root);
    }

    root.ok_or_else(|| Error::Parse("no root element".to_string()))
}

fn attach(element: Element, stack: &mut Vec<Element>, root: &mut Option<Element>) {
    if let Some(parent) = stack.last_mut() {
        parent.nodes.push(Node::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    }
}

fn qname_of(raw: &[u8]) -> CompactString {
    CompactString::from(String::from_utf8_lossy(raw))
}

fn read_attrs(e: &quick_xml::events::BytesStart, element: &mut Element) {
    for attr in e.attributes().with_checks(false).flatten() {
        let key = CompactString::from(String::from_utf8_lossy(attr.key.as_ref()));
        let value = match attr.unescape_value() {
            Ok(v) => CompactString::from(v.as_ref()),
            Err(_) => CompactString::from(String::from_utf8_lossy(&attr.value)),
        };
        element.attrs.push((key, value));
    }
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn squash_ws(text: &str) -> CompactString {
    let mut out = CompactString::default();
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}
