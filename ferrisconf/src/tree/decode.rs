//! Document to tree decoding, for XML and JSON sources.

use log::trace;
use serde_json::{Map as JsonMap, Value as Json};

use super::element::Element;
use super::node::{ConfigNode, ConfigTree, Namespace, Scalar, Value, group_children};
use super::rule::DecodeOptions;
use crate::error::ParseError;

/// Decode one XML element (and everything below it).
pub fn decode_element(element: &Element, options: &DecodeOptions) -> ConfigTree {
    ConfigTree::new(element.name.clone(), decode_node(element, options))
}

fn decode_node(element: &Element, options: &DecodeOptions) -> ConfigNode {
    let mut node = if element.children.is_empty() {
        ConfigNode::leaf(Scalar::from_text(&element.text))
    } else if let Some(child_name) = common_child_name(element)
        .filter(|child| options.list_rule.is_list_wrapper(&element.name, child))
    {
        trace!("decoding <{}> as a list of <{}>", element.name, child_name);
        let items = element
            .children
            .iter()
            .map(|child| decode_node(child, options))
            .collect::<Vec<_>>();
        ConfigNode::map([(child_name.to_string(), ConfigNode::list(items))])
    } else {
        let children = element
            .children
            .iter()
            .map(|child| (child.name.clone(), decode_node(child, options)));
        ConfigNode::new(Value::Map(group_children(children)))
    };

    node.meta.delete = element.is_delete();
    if options.keep_namespaces {
        node.meta.namespaces = element.namespaces.clone();
        node.meta.prefix = element.prefix.clone();
    }
    node
}

/// The child name shared by every child, if there is exactly one.
fn common_child_name(element: &Element) -> Option<&str> {
    let first = element.children.first()?.name.as_str();
    element
        .children
        .iter()
        .all(|c| c.name == first)
        .then_some(first)
}

/// Decode an XML document with a single root.
pub fn from_xml(xml: &str, options: &DecodeOptions) -> Result<ConfigTree, ParseError> {
    let root = Element::parse(xml)?;
    Ok(decode_element(&root, options))
}

/// Decode an XML fragment with any number of roots.
pub fn from_xml_fragment(xml: &str, options: &DecodeOptions) -> Result<Vec<ConfigTree>, ParseError> {
    Ok(Element::parse_fragment(xml)?
        .iter()
        .map(|root| decode_element(root, options))
        .collect())
}

/// Decode a JSON document. Every member of the top-level object becomes a
/// root tree.
///
/// Members may be module-qualified (`"Cisco-IOS-XR-infra-rsi-cfg:vrfs"`);
/// the module is kept as namespace metadata and the local name is used as
/// the key. RFC 7951 metadata (`"@"` members) carrying
/// `operation: "delete"` marks the owning node for deletion.
pub fn from_json(json: &str, options: &DecodeOptions) -> Result<Vec<ConfigTree>, ParseError> {
    let value: Json = serde_json::from_str(json)?;
    match value {
        Json::Object(members) => Ok(decode_members(&members, options)
            .into_iter()
            .map(|(name, node)| ConfigTree::new(name, node))
            .collect()),
        Json::Null => Ok(Vec::new()),
        other => Err(ParseError::JsonShape(json_kind(&other))),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn split_module(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((module, local)) => (Some(module), local),
        None => (None, name),
    }
}

fn is_delete_metadata(value: &Json) -> bool {
    value.as_object().is_some_and(|annotations| {
        annotations.iter().any(|(key, v)| {
            split_module(key).1 == "operation" && v.as_str() == Some("delete")
        })
    })
}

fn decode_members(members: &JsonMap<String, Json>, options: &DecodeOptions) -> Vec<(String, ConfigNode)> {
    let mut decoded = Vec::new();
    for (key, value) in members {
        if key.starts_with('@') {
            continue;
        }
        let (module, local) = split_module(key);
        let mut node = decode_json(value, options);
        if let Some(module) = module.filter(|_| options.keep_namespaces) {
            node.meta.namespaces.push(Namespace {
                prefix: None,
                uri: module.to_string(),
            });
        }
        let annotation = members.get(&format!("@{}", key)).or_else(|| {
            module.and_then(|_| members.get(&format!("@{}", local)))
        });
        if let Some(annotation) = annotation {
            apply_annotation(&mut node, annotation);
        }
        decoded.push((local.to_string(), node));
    }
    decoded
}

/// Apply a member's `"@name"` annotation. An array annotates the items of
/// a repeated value one by one.
fn apply_annotation(node: &mut ConfigNode, annotation: &Json) {
    match (annotation, &mut node.value) {
        (Json::Array(marks), Value::List(items)) => {
            for (item, mark) in items.iter_mut().zip(marks) {
                if is_delete_metadata(mark) {
                    item.meta.delete = true;
                }
            }
        }
        (Json::Array(marks), _) => {
            if marks.first().is_some_and(is_delete_metadata) {
                node.meta.delete = true;
            }
        }
        (mark, _) => {
            if is_delete_metadata(mark) {
                node.meta.delete = true;
            }
        }
    }
}

fn decode_json(value: &Json, options: &DecodeOptions) -> ConfigNode {
    match value {
        Json::Null => ConfigNode::nil(),
        Json::Bool(b) => ConfigNode::leaf(b.to_string()),
        Json::Number(n) => match n.as_i64() {
            Some(i) => ConfigNode::leaf(i),
            None => ConfigNode::leaf(n.to_string()),
        },
        Json::String(s) => ConfigNode::leaf(Scalar::from_text(s)),
        Json::Array(items) => {
            if items.iter().all(Json::is_null) {
                return ConfigNode::nil();
            }
            ConfigNode::list(items.iter().map(|item| decode_json(item, options)))
        }
        Json::Object(members) => {
            let entries = decode_members(members, options);
            let mut node = if entries.is_empty() {
                ConfigNode::nil()
            } else {
                ConfigNode::map(entries)
            };
            if members.get("@").is_some_and(is_delete_metadata) {
                node.meta.delete = true;
            }
            node
        }
    }
}
