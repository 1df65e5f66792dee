//! Tree to document encoding.
//!
//! XML output re-emits element prefixes and namespace declarations from the
//! sidecar metadata. JSON output follows RFC 7951 closely enough for device
//! payloads: empty leaves become `[null]`, delete markers become `"@"`
//! annotations (one array entry per item for repeated values) and bare
//! module namespaces qualify member names.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::element::NETCONF_BASE_NS;
use super::node::{ConfigNode, ConfigTree, Scalar, Value};
use crate::error::ParseError;

const DELETE_PREFIX: &str = "xc";
const DELETE_ANNOTATION: &str = "ietf-netconf:operation";

impl ConfigTree {
    /// Serialize as an XML element.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        write_named(&mut out, &self.name, &self.root, false);
        out
    }

    /// Serialize as a JSON object with a single member.
    pub fn to_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Serialize several root trees as consecutive XML elements.
pub fn forest_to_xml(trees: &[ConfigTree]) -> String {
    let mut out = String::new();
    for tree in trees {
        write_named(&mut out, &tree.name, &tree.root, false);
    }
    out
}

/// Serialize several root trees as the members of one JSON object.
pub fn forest_to_json(trees: &[ConfigTree]) -> Result<String, ParseError> {
    Ok(serde_json::to_string(&Forest(trees))?)
}

fn write_named(out: &mut String, name: &str, node: &ConfigNode, xc_in_scope: bool) {
    match &node.value {
        Value::List(items) => {
            for item in items {
                if node.meta.delete && !item.meta.delete {
                    let item = item.clone().deleted();
                    write_element(out, name, &item, xc_in_scope);
                } else {
                    write_element(out, name, item, xc_in_scope);
                }
            }
        }
        _ => write_element(out, name, node, xc_in_scope),
    }
}

fn write_element(out: &mut String, name: &str, node: &ConfigNode, xc_in_scope: bool) {
    let tag = match &node.meta.prefix {
        Some(prefix) => format!("{}:{}", prefix, name),
        None => name.to_string(),
    };

    out.push('<');
    out.push_str(&tag);
    let mut xc_declared = xc_in_scope;
    for ns in &node.meta.namespaces {
        match &ns.prefix {
            Some(prefix) => {
                let _ = write!(out, " xmlns:{}=\"{}\"", prefix, escape(ns.uri.as_str()));
                if prefix == DELETE_PREFIX {
                    xc_declared = ns.uri == NETCONF_BASE_NS;
                }
            }
            None => {
                let _ = write!(out, " xmlns=\"{}\"", escape(ns.uri.as_str()));
            }
        }
    }
    if node.meta.delete {
        if !xc_declared {
            let _ = write!(out, " xmlns:{}=\"{}\"", DELETE_PREFIX, NETCONF_BASE_NS);
            xc_declared = true;
        }
        let _ = write!(out, " {}:operation=\"delete\"", DELETE_PREFIX);
    }

    match &node.value {
        Value::Leaf(Scalar::Nil) => out.push_str("/>"),
        Value::Leaf(scalar) => {
            out.push('>');
            out.push_str(&escape(scalar.to_string().as_str()));
            let _ = write!(out, "</{}>", tag);
        }
        Value::Map(children) if children.is_empty() => out.push_str("/>"),
        Value::Map(children) => {
            out.push('>');
            for (child_name, child) in children {
                write_named(out, child_name, child, xc_declared);
            }
            let _ = write!(out, "</{}>", tag);
        }
        Value::List(items) => {
            // A list directly under a list has no element name of its own.
            out.push('>');
            for item in items {
                write_named(out, name, item, xc_declared);
            }
            let _ = write!(out, "</{}>", tag);
        }
    }
}

/// JSON member name for `name`, qualified with a bare module namespace.
fn member_name(name: &str, node: &ConfigNode) -> String {
    let module = node
        .meta
        .namespaces
        .iter()
        .find(|ns| ns.prefix.is_none() && !ns.uri.contains([':', '/']));
    match module {
        Some(ns) => format!("{}:{}", ns.uri, name),
        None => name.to_string(),
    }
}

struct DeleteAnnotation;

impl Serialize for DeleteAnnotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(DELETE_ANNOTATION, "delete")?;
        map.end()
    }
}

/// The `"@name"` sibling annotation of a non-container member.
enum MemberAnnotation<'a> {
    Whole,
    PerItem(&'a [ConfigNode]),
}

impl<'a> MemberAnnotation<'a> {
    /// Containers carry their marker inside as `"@"`, so only leaves and
    /// lists are annotated from outside.
    fn of(node: &'a ConfigNode) -> Option<Self> {
        match &node.value {
            Value::Map(_) => None,
            _ if node.meta.delete => Some(MemberAnnotation::Whole),
            Value::List(items) => items
                .iter()
                .any(|item| item.meta.delete && !matches!(item.value, Value::Map(_)))
                .then_some(MemberAnnotation::PerItem(items)),
            Value::Leaf(_) => None,
        }
    }
}

impl Serialize for MemberAnnotation<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MemberAnnotation::Whole => DeleteAnnotation.serialize(serializer),
            MemberAnnotation::PerItem(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    let marked = item.meta.delete && !matches!(item.value, Value::Map(_));
                    seq.serialize_element(&marked.then_some(DeleteAnnotation))?;
                }
                seq.end()
            }
        }
    }
}

fn serialize_member<M: SerializeMap>(map: &mut M, name: &str, node: &ConfigNode) -> Result<(), M::Error> {
    let member = member_name(name, node);
    if let Some(annotation) = MemberAnnotation::of(node) {
        map.serialize_entry(&format!("@{}", member), &annotation)?;
    }
    map.serialize_entry(&member, node)
}

struct Nil;

impl Serialize for Nil {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(1))?;
        seq.serialize_element(&())?;
        seq.end()
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Nil => Nil.serialize(serializer),
            Scalar::Int(n) => serializer.serialize_i64(*n),
            Scalar::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.value {
            Value::Leaf(scalar) => scalar.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(children) => {
                let mut map = serializer.serialize_map(None)?;
                if self.meta.delete {
                    map.serialize_entry("@", &DeleteAnnotation)?;
                }
                for (name, child) in children {
                    serialize_member(&mut map, name, child)?;
                }
                map.end()
            }
        }
    }
}

impl Serialize for ConfigTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Forest(std::slice::from_ref(self)).serialize(serializer)
    }
}

struct Forest<'a>(&'a [ConfigTree]);

impl Serialize for Forest<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for tree in self.0 {
            serialize_member(&mut map, &tree.name, &tree.root)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::decode::{from_json, from_xml};
    use proptest::prelude::*;
    use crate::tree::rule::DecodeOptions;

    fn blue() -> ConfigTree {
        ConfigTree::new(
            "vrfs",
            ConfigNode::map([(
                "vrf",
                ConfigNode::list([ConfigNode::map([
                    ("vrf-name", ConfigNode::leaf("BLUE")),
                    ("create", ConfigNode::nil()),
                    ("description", ConfigNode::leaf("a < b & c")),
                    (
                        "vpn-id",
                        ConfigNode::map([
                            ("vpn-oui", ConfigNode::leaf(0)),
                            ("vpn-index", ConfigNode::leaf(7)),
                        ]),
                    ),
                ])]),
            )])
            .with_namespace(None, "http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg"),
        )
    }

    #[test]
    fn test_xml_output() {
        let xml = blue().to_xml();
        assert_eq!(
            xml,
            "<vrfs xmlns=\"http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg\"><vrf>\
             <vrf-name>BLUE</vrf-name><create/><description>a &lt; b &amp; c</description>\
             <vpn-id><vpn-oui>0</vpn-oui><vpn-index>7</vpn-index></vpn-id></vrf></vrfs>"
        );
    }

    #[test]
    fn test_xml_decodes_back() {
        let tree = blue();
        let decoded = from_xml(&tree.to_xml(), &DecodeOptions::default()).unwrap();
        assert!(decoded.equivalent(&tree));
        assert_eq!(decoded.root.meta.namespaces, tree.root.meta.namespaces);
    }

    #[test]
    fn test_xml_delete_marker_declares_namespace_once() {
        let tree = ConfigTree::new(
            "vrfs",
            ConfigNode::map([(
                "vrf",
                ConfigNode::list([
                    ConfigNode::map([(
                        "vrf-name",
                        ConfigNode::leaf("BLUE"),
                    )])
                    .deleted(),
                    ConfigNode::map([("vrf-name", ConfigNode::leaf("RED"))]),
                ]),
            )]),
        );
        let xml = tree.to_xml();
        assert_eq!(xml.matches("xmlns:xc=").count(), 1);
        assert!(xml.contains("xc:operation=\"delete\""));

        let decoded = from_xml(&xml, &DecodeOptions::default()).unwrap();
        assert!(decoded.equivalent(&tree));
    }

    #[test]
    fn test_json_output() {
        let tree = ConfigTree::new(
            "srlg",
            ConfigNode::map([
                ("enable", ConfigNode::nil()),
                ("name", ConfigNode::leaf("GE0")),
                ("value", ConfigNode::leaf(100)),
            ])
            .with_namespace(None, "Cisco-IOS-XR-infra-rsi-cfg"),
        );
        assert_eq!(
            tree.to_json().unwrap(),
            r#"{"Cisco-IOS-XR-infra-rsi-cfg:srlg":{"enable":[null],"name":"GE0","value":100}}"#
        );
    }

    #[test]
    fn test_json_decodes_back() {
        let tree = blue();
        let decoded = from_json(&tree.to_json().unwrap(), &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].equivalent(&tree));
    }

    #[test]
    fn test_json_delete_annotation() {
        let tree = ConfigTree::new(
            "vrfs",
            ConfigNode::map([(
                "vrf",
                ConfigNode::list([ConfigNode::map([("vrf-name", ConfigNode::leaf("BLUE"))]).deleted()]),
            )]),
        );
        let json = tree.to_json().unwrap();
        assert!(json.contains(r#""@":{"ietf-netconf:operation":"delete"}"#));
        let decoded = from_json(&json, &DecodeOptions::default()).unwrap();
        assert!(decoded[0].equivalent(&tree));
    }

    #[test]
    fn test_single_repeated_value_survives_xml() {
        let tree = ConfigTree::new(
            "interface",
            ConfigNode::map([
                ("name", ConfigNode::leaf("Gi0")),
                ("address", ConfigNode::list([ConfigNode::leaf("10.0.0.1")])),
            ]),
        );
        let xml = tree.to_xml();
        assert_eq!(
            xml,
            "<interface><name>Gi0</name><address>10.0.0.1</address></interface>"
        );
        let decoded = from_xml(&xml, &DecodeOptions::default()).unwrap();
        assert!(decoded.equivalent(&tree));
    }

    #[test]
    fn test_deleted_list_survives_xml() {
        let tree = ConfigTree::new(
            "srlg",
            ConfigNode::map([(
                "interface",
                ConfigNode::list([ConfigNode::leaf("GE0"), ConfigNode::leaf("GE1")]).deleted(),
            )]),
        );
        let decoded = from_xml(&tree.to_xml(), &DecodeOptions::default()).unwrap();
        assert!(decoded.equivalent(&tree));
    }

    #[test]
    fn test_json_annotates_repeated_leaves_per_item() {
        let tree = ConfigTree::new(
            "srlg",
            ConfigNode::map([(
                "value",
                ConfigNode::list([ConfigNode::leaf(100), ConfigNode::leaf(200).deleted()]),
            )]),
        );
        let json = tree.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"srlg":{"@value":[null,{"ietf-netconf:operation":"delete"}],"value":[100,200]}}"#
        );
        let decoded = from_json(&json, &DecodeOptions::default()).unwrap();
        assert!(decoded[0].equivalent(&tree));
        let items = decoded[0].root.get("value").unwrap().as_list().unwrap();
        assert!(!items[0].is_delete());
        assert!(items[1].is_delete());
    }

    #[test]
    fn test_forest_xml() {
        let trees = vec![
            ConfigTree::new("a", ConfigNode::leaf(1)),
            ConfigTree::new("b", ConfigNode::nil()),
        ];
        assert_eq!(forest_to_xml(&trees), "<a>1</a><b/>");
        assert_eq!(forest_to_json(&trees).unwrap(), r#"{"a":1,"b":[null]}"#);
    }

    fn name() -> impl Strategy<Value = String> {
        "[a-z]{1,6}"
    }

    fn scalar() -> impl Strategy<Value = ConfigNode> {
        prop_oneof![
            Just(ConfigNode::nil()),
            any::<i64>().prop_map(ConfigNode::leaf),
            "[a-z][a-z0-9<>&]{0,8}".prop_map(ConfigNode::leaf),
        ]
    }

    fn maybe_deleted(node: impl Strategy<Value = ConfigNode>) -> impl Strategy<Value = ConfigNode> {
        (node, proptest::bool::weighted(0.15))
            .prop_map(|(node, delete)| if delete { node.deleted() } else { node })
    }

    /// Trees of the shapes device payloads take: maps of leaves, maps and
    /// repeated values.
    fn config_node() -> impl Strategy<Value = ConfigNode> {
        maybe_deleted(scalar()).prop_recursive(4, 48, 4, |inner| {
            let member = prop_oneof![
                3 => inner.clone(),
                1 => maybe_deleted(
                    proptest::collection::vec(inner, 1..4).prop_map(ConfigNode::list)
                ),
            ];
            maybe_deleted(
                proptest::collection::vec((name(), member), 1..4)
                    .prop_map(|entries| ConfigNode::new(Value::Map(entries.into_iter().collect()))),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_xml_round_trip(root_name in name(), root in config_node()) {
            let tree = ConfigTree::new(root_name, root);
            let xml = tree.to_xml();
            let decoded = from_xml(&xml, &DecodeOptions::default()).unwrap();
            prop_assert!(decoded.equivalent(&tree), "{} decoded to {:?}", xml, decoded);
        }

        #[test]
        fn prop_json_round_trip(root_name in name(), root in config_node()) {
            let tree = ConfigTree::new(root_name, root);
            let json = tree.to_json().unwrap();
            let decoded = from_json(&json, &DecodeOptions::default()).unwrap();
            prop_assert_eq!(decoded.len(), 1);
            prop_assert!(decoded[0].equivalent(&tree), "{} decoded to {:?}", json, decoded);
        }
    }
}
