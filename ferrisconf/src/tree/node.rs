//! Schema-agnostic configuration tree values.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Text that is decoded as an integer leaf.
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[-+]?[0-9]+\z").expect("static regex"));

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// The element exists but has no content (`<create/>`).
    Nil,
    Int(i64),
    Str(String),
}

impl Scalar {
    /// Decode leaf text, coercing decimal digit runs to integers.
    ///
    /// Devices echo numeric leaves as text while callers usually write them
    /// as numbers; coercing both sides keeps them comparable. Values too
    /// large for an `i64` stay strings.
    pub fn from_text(text: &str) -> Scalar {
        let text = text.trim();
        if text.is_empty() {
            return Scalar::Nil;
        }
        if INTEGER.is_match(text) {
            if let Ok(n) = text.trim_start_matches('+').parse::<i64>() {
                return Scalar::Int(n);
            }
        }
        Scalar::Str(text.to_string())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Scalar::Nil)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Nil => Ok(()),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

/// A namespace declaration (`xmlns` or `xmlns:prefix`), or the module
/// qualifier of a JSON member name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub prefix: Option<String>,
    pub uri: String,
}

/// Sidecar data attached to a node. Never part of name lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    /// The source carried `operation="delete"`.
    pub delete: bool,
    pub namespaces: Vec<Namespace>,
    /// Prefix the element name was written with.
    pub prefix: Option<String>,
}

/// The shape of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Leaf(Scalar),
    /// Children by name. Comparison ignores order; insertion order is kept
    /// for serialization.
    Map(IndexMap<String, ConfigNode>),
    /// Repeated siblings sharing one element name. Comparison ignores order.
    List(Vec<ConfigNode>),
}

/// One node of a configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigNode {
    pub value: Value,
    pub meta: Meta,
}

impl ConfigNode {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            meta: Meta::default(),
        }
    }

    /// A nil-placeholder leaf.
    pub fn nil() -> Self {
        Self::new(Value::Leaf(Scalar::Nil))
    }

    pub fn leaf(scalar: impl Into<Scalar>) -> Self {
        Self::new(Value::Leaf(scalar.into()))
    }

    /// A map node from `(name, child)` pairs. Repeated names become a list
    /// of those siblings, as they do when decoding documents.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, ConfigNode)>) -> Self {
        Self::new(Value::Map(group_children(
            entries.into_iter().map(|(name, child)| (name.into(), child)),
        )))
    }

    pub fn list(items: impl IntoIterator<Item = ConfigNode>) -> Self {
        Self::new(Value::List(items.into_iter().collect()))
    }

    /// Mark this node for deletion.
    pub fn deleted(mut self) -> Self {
        self.meta.delete = true;
        self
    }

    pub fn with_namespace(mut self, prefix: Option<&str>, uri: &str) -> Self {
        self.meta.namespaces.push(Namespace {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
        self
    }

    pub fn is_delete(&self) -> bool {
        self.meta.delete
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.value, Value::Leaf(Scalar::Nil))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.value {
            Value::Leaf(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, ConfigNode>> {
        match &self.value {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigNode]> {
        match &self.value {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Child of a map node by name.
    pub fn get(&self, name: &str) -> Option<&ConfigNode> {
        self.as_map().and_then(|m| m.get(name))
    }

    /// Walk a `/`-separated path of map keys.
    pub fn at(&self, path: &str) -> Option<&ConfigNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.get(segment))
    }

    /// Structural equality ignoring map and list order and namespace
    /// metadata. Delete markers are significant.
    ///
    /// Documents cannot tell a one-item list from a single value, nor a
    /// delete-marked list from a list of delete-marked items, so both pairs
    /// compare equal.
    pub fn equivalent(&self, other: &ConfigNode) -> bool {
        if matches!(self.value, Value::List(_)) || matches!(other.value, Value::List(_)) {
            return same_items(&self.entries(), &other.entries());
        }
        if self.meta.delete != other.meta.delete {
            return false;
        }
        match (&self.value, &other.value) {
            (Value::Leaf(a), Value::Leaf(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.equivalent(w)))
            }
            _ => false,
        }
    }

    /// The items this node stands for when compared as a list.
    fn entries(&self) -> Vec<Cow<'_, ConfigNode>> {
        match &self.value {
            Value::List(items) => items
                .iter()
                .map(|item| {
                    if self.meta.delete && !item.meta.delete {
                        Cow::Owned(item.clone().deleted())
                    } else {
                        Cow::Borrowed(item)
                    }
                })
                .collect(),
            _ => vec![Cow::Borrowed(self)],
        }
    }
}

/// Multiset equality under [`ConfigNode::equivalent`].
fn same_items(a: &[Cow<'_, ConfigNode>], b: &[Cow<'_, ConfigNode>]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|item| {
        let found = (0..b.len()).find(|&i| !used[i] && item.equivalent(&b[i]));
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// Collect children by name. A name seen once keeps its child as is; a
/// repeated name maps to a list of exactly those siblings, in order.
pub(crate) fn group_children(
    entries: impl IntoIterator<Item = (String, ConfigNode)>,
) -> IndexMap<String, ConfigNode> {
    let mut grouped: IndexMap<String, Vec<ConfigNode>> = IndexMap::new();
    for (name, child) in entries {
        grouped.entry(name).or_default().push(child);
    }
    grouped
        .into_iter()
        .map(|(name, mut siblings)| {
            let node = if siblings.len() == 1 {
                siblings.remove(0)
            } else {
                ConfigNode::list(siblings)
            };
            (name, node)
        })
        .collect()
}

/// A named root element and its decoded content.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    pub name: String,
    pub root: ConfigNode,
}

impl ConfigTree {
    pub fn new(name: impl Into<String>, root: ConfigNode) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    pub fn equivalent(&self, other: &ConfigTree) -> bool {
        self.name == other.name && self.root.equivalent(&other.root)
    }
}

/// View several root trees as one map keyed by root name.
///
/// This is how documents with more than one top-level element (for example
/// the `data` of a get-config reply) are compared.
pub fn forest(trees: &[ConfigTree]) -> ConfigNode {
    ConfigNode::map(trees.iter().map(|t| (t.name.clone(), t.root.clone())))
}
