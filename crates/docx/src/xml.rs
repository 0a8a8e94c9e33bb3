//! Minimal owned XML tree used for package parts.
//!
//! Parts of a word-processing package are small enough to hold in memory, so every part the
//! engine touches is parsed into an [`XmlElement`] tree, edited, and written back. Markup the
//! engine does not understand is kept as-is so a round-trip never loses template content.

use crate::{DocxError, DocxResult};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Declaration written at the top of every serialised part.
pub(crate) const XML_DECLARATION: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// A node of the owned XML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Pre-serialised markup written verbatim (used for generated drawings).
    Raw(String),
}

/// An element with its qualified name, attributes in document order and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an element with no attributes and no children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child appender.
    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder-style text appender.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Returns the value of an attribute by qualified name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value with the same key.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Iterates over child elements, skipping text and raw nodes.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Returns the first child element with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Serialises this element (without a declaration).
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

fn collect_text(element: &XmlElement, out: &mut String) {
    for node in &element.children {
        match node {
            XmlNode::Element(e) => collect_text(e, out),
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Raw(_) => {}
        }
    }
}

fn element_from_start(start: &BytesStart<'_>) -> DocxResult<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocxError::Xml(format!("invalid attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocxError::Xml(format!("invalid attribute value: {}", e)))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Parses a complete XML part and returns its root element.
///
/// Declarations, comments and processing instructions are dropped; the writer emits its own
/// declaration.
///
/// # Errors
///
/// Returns [`DocxError::Xml`] if the markup is malformed or has no root element.
pub fn parse(xml: &str) -> DocxResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DocxError::Xml(format!("at byte {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DocxError::Xml("unbalanced closing tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| DocxError::Xml(format!("invalid text: {}", e)))?;
                    parent.children.push(XmlNode::Text(text.into_owned()));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    parent.children.push(XmlNode::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DocxError::Xml("unexpected end of document".into()));
    }
    root.ok_or_else(|| DocxError::Xml("document has no root element".into()))
}

/// Serialises a root element as a complete part, declaration included.
pub fn write_document(root: &XmlElement) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(XML_DECLARATION);
    out.push_str("\r\n");
    write_element(root, &mut out);
    out
}

fn write_element(element: &XmlElement, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for node in &element.children {
        match node {
            XmlNode::Element(child) => write_element(child, out),
            XmlNode::Text(text) => out.push_str(&escape(text.as_str())),
            XmlNode::Raw(raw) => out.push_str(raw),
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_keeps_attributes_and_text() {
        let root = parse(r#"<?xml version="1.0"?><a x="1"><b>hi &amp; bye</b><c/></a>"#).unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.child("b").unwrap().text_content(), "hi & bye");
        assert!(root.child("c").is_some());
    }

    #[test]
    fn test_write_escapes_text_and_attributes() {
        let element = XmlElement::new("w:t")
            .with_attr("note", "a\"b")
            .with_text("1 < 2");
        assert_eq!(
            element.to_xml_string(),
            "<w:t note=\"a&quot;b\">1 &lt; 2</w:t>"
        );
    }

    #[test]
    fn test_parse_rejects_unbalanced_markup() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_reparse_of_written_tree_is_identical() {
        let source = r#"<w:p xmlns:w="urn:w"><w:r><w:t xml:space="preserve"> x </w:t></w:r></w:p>"#;
        let root = parse(source).unwrap();
        let again = parse(&write_document(&root)).unwrap();
        assert_eq!(root, again);
    }
}
