//! Minimal XML element tree used by the reply parser and tree decoder.
//!
//! Only what device payloads need: elements, attributes, namespace
//! declarations and text. Comments, processing instructions and the XML
//! declaration are skipped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::node::Namespace;
use crate::error::ParseError;

/// Base NETCONF namespace.
pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// An attribute with its prefix resolved to a namespace URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

/// One parsed XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, without prefix.
    pub name: String,
    /// Prefix the element was written with.
    pub prefix: Option<String>,
    /// Namespace declarations made on this element.
    pub namespaces: Vec<Namespace>,
    /// Ordinary attributes.
    pub attributes: Vec<Attribute>,
    pub children: Vec<Element>,
    /// Concatenated character data directly inside this element.
    pub text: String,
}

impl Element {
    /// Parse a document that must have exactly one root element.
    pub fn parse(xml: &str) -> Result<Element, ParseError> {
        let mut roots = Self::parse_fragment(xml)?;
        match roots.len() {
            0 => Err(ParseError::Empty),
            1 => Ok(roots.remove(0)),
            n => Err(ParseError::MultipleRoots(n)),
        }
    }

    /// Parse a sequence of sibling root elements.
    pub fn parse_fragment(xml: &str) -> Result<Vec<Element>, ParseError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut roots = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut scopes: Vec<Vec<Namespace>> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = open_element(&start, &mut scopes)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = open_element(&start, &mut scopes)?;
                    scopes.pop();
                    attach(element, &mut stack, &mut roots);
                }
                Event::End(_) => {
                    scopes.pop();
                    let element = stack
                        .pop()
                        .ok_or_else(|| ParseError::Xml("unbalanced end tag".to_string()))?;
                    attach(element, &mut stack, &mut roots);
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    match stack.last_mut() {
                        Some(parent) => parent.text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(ParseError::Xml(format!(
                                "text outside of any element: {:?}",
                                text.trim()
                            )));
                        }
                    }
                }
                Event::CData(data) => {
                    let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.text.push_str(&data);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(ParseError::Xml(format!("unclosed element <{}>", open.name)));
        }
        Ok(roots)
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text content.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Whether the element carries `operation="delete"` in the base
    /// NETCONF namespace. Unqualified `operation` attributes are accepted
    /// as well, since devices echo them both ways.
    pub fn is_delete(&self) -> bool {
        self.attributes.iter().any(|a| {
            a.name == "operation"
                && a.value == "delete"
                && a.namespace.as_deref().is_none_or(|ns| ns == NETCONF_BASE_NS)
        })
    }
}

fn attach(element: Element, stack: &mut [Element], roots: &mut Vec<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => roots.push(element),
    }
}

fn split_qname(raw: &[u8]) -> (Option<String>, String) {
    let raw = String::from_utf8_lossy(raw);
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, raw.into_owned()),
    }
}

fn resolve(prefix: &str, scopes: &[Vec<Namespace>]) -> Option<String> {
    if prefix == "xml" {
        return Some("http://www.w3.org/XML/1998/namespace".to_string());
    }
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter())
        .find(|ns| ns.prefix.as_deref() == Some(prefix))
        .map(|ns| ns.uri.clone())
}

/// Build an element from its start tag and push its namespace scope.
fn open_element(
    start: &BytesStart<'_>,
    scopes: &mut Vec<Vec<Namespace>>,
) -> Result<Element, ParseError> {
    let (prefix, name) = split_qname(start.name().as_ref());

    let mut namespaces = Vec::new();
    let mut raw_attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        if key == "xmlns" {
            namespaces.push(Namespace { prefix: None, uri: value });
        } else if let Some(ns_prefix) = key.strip_prefix("xmlns:") {
            namespaces.push(Namespace {
                prefix: Some(ns_prefix.to_string()),
                uri: value,
            });
        } else {
            raw_attributes.push((key, value));
        }
    }
    scopes.push(namespaces.clone());

    let attributes = raw_attributes
        .into_iter()
        .map(|(key, value)| {
            let (attr_prefix, attr_name) = split_qname(key.as_bytes());
            Attribute {
                namespace: attr_prefix.and_then(|p| resolve(&p, scopes)),
                name: attr_name,
                value,
            }
        })
        .collect();

    Ok(Element {
        name,
        prefix,
        namespaces,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}
