//! Decide whether a device already holds a desired configuration.
//!
//! Everything here is a pure function of two trees. The *target* is what a
//! caller wants to push; the *current* tree is what the device reports.
//! Under [`Mode::Merge`] the target only has to be contained in the current
//! tree. Under [`Mode::Replace`] the current tree must not carry anything
//! the target does not mention.
//!
//! Empty leaves in the target (`<create/>`) are existence requirements and
//! are satisfied by any content, or by no content at all, since devices do
//! not echo them. Entries carrying a delete marker are satisfied while the
//! device does *not* hold them.
//!
//! ```rust
//! use ferrisconf::reconcile::{in_sync_for_merge, in_sync_for_replace};
//! use ferrisconf::tree::ConfigNode;
//!
//! let current = ConfigNode::map([("vrf", ConfigNode::list([
//!     ConfigNode::map([("vrf-name", ConfigNode::leaf("BLUE"))]),
//!     ConfigNode::map([("vrf-name", ConfigNode::leaf("GREEN"))]),
//! ]))]);
//! let target = ConfigNode::map([("vrf", ConfigNode::list([
//!     ConfigNode::map([("vrf-name", ConfigNode::leaf("GREEN"))]),
//! ]))]);
//!
//! assert!(in_sync_for_merge(&target, &current));
//! assert!(!in_sync_for_replace(&target, &current));
//! ```

pub mod document;

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;

use crate::tree::{ConfigNode, ConfigTree, Scalar, Value, forest};

/// How a target would be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Merge,
    Replace,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Merge => f.write_str("merge"),
            Mode::Replace => f.write_str("replace"),
        }
    }
}

/// Anything that can be compared as a configuration tree.
///
/// A [`ConfigTree`] compares as a map holding its root under its name, so
/// root names must match. A slice of trees compares as a map of all roots.
pub trait Reconcilable {
    fn as_node(&self) -> Cow<'_, ConfigNode>;
}

impl Reconcilable for ConfigNode {
    fn as_node(&self) -> Cow<'_, ConfigNode> {
        Cow::Borrowed(self)
    }
}

impl Reconcilable for ConfigTree {
    fn as_node(&self) -> Cow<'_, ConfigNode> {
        Cow::Owned(forest(std::slice::from_ref(self)))
    }
}

impl Reconcilable for [ConfigTree] {
    fn as_node(&self) -> Cow<'_, ConfigNode> {
        Cow::Owned(forest(self))
    }
}

impl Reconcilable for Vec<ConfigTree> {
    fn as_node(&self) -> Cow<'_, ConfigNode> {
        self.as_slice().as_node()
    }
}

/// Whether applying `target` with `mode` would leave `current` unchanged.
pub fn satisfied_by(mode: Mode, target: &ConfigNode, current: &ConfigNode) -> bool {
    Walk::new(mode).node("", target, current)
}

pub fn in_sync_for_merge<T, C>(target: &T, current: &C) -> bool
where
    T: Reconcilable + ?Sized,
    C: Reconcilable + ?Sized,
{
    satisfied_by(Mode::Merge, &target.as_node(), &current.as_node())
}

pub fn in_sync_for_replace<T, C>(target: &T, current: &C) -> bool
where
    T: Reconcilable + ?Sized,
    C: Reconcilable + ?Sized,
{
    satisfied_by(Mode::Replace, &target.as_node(), &current.as_node())
}

/// Paths at which `current` does not satisfy `target`, e.g.
/// `/vrfs/vrf[0]` or `/srlg/interfaces`. Empty when in sync.
pub fn diff_paths<T, C>(mode: Mode, target: &T, current: &C) -> Vec<String>
where
    T: Reconcilable + ?Sized,
    C: Reconcilable + ?Sized,
{
    let mut paths = Vec::new();
    Walk::collecting(mode, &mut paths).node("", &target.as_node(), &current.as_node());
    paths
}

/// Recursive checker. When collecting it keeps going after the first
/// failure and records every unsatisfied path.
struct Walk<'a> {
    mode: Mode,
    unsatisfied: Option<&'a mut Vec<String>>,
}

impl<'a> Walk<'a> {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            unsatisfied: None,
        }
    }

    fn collecting(mode: Mode, paths: &'a mut Vec<String>) -> Self {
        Self {
            mode,
            unsatisfied: Some(paths),
        }
    }

    fn is_collecting(&self) -> bool {
        self.unsatisfied.is_some()
    }

    fn fail(&mut self, path: &str) -> bool {
        if let Some(paths) = self.unsatisfied.as_deref_mut() {
            paths.push(if path.is_empty() { "/".to_string() } else { path.to_string() });
        }
        false
    }

    fn node(&mut self, path: &str, target: &ConfigNode, current: &ConfigNode) -> bool {
        if target.is_nil() {
            return true;
        }
        match (&target.value, &current.value) {
            (Value::Leaf(a), Value::Leaf(b)) => a == b || self.fail(path),
            (Value::Map(t), Value::Map(c)) => self.map(path, t, c),
            (Value::List(t), Value::List(c)) => self.list(path, t, c, target.is_delete()),
            // A single value against repeated siblings, or the reverse, is
            // compared as a one-item list.
            (Value::List(t), _) => {
                self.list(path, t, std::slice::from_ref(current), target.is_delete())
            }
            (_, Value::List(c)) => self.list(path, std::slice::from_ref(target), c, false),
            _ => self.fail(path),
        }
    }

    fn map(
        &mut self,
        path: &str,
        target: &IndexMap<String, ConfigNode>,
        current: &IndexMap<String, ConfigNode>,
    ) -> bool {
        let mut ok = true;
        for (key, wanted) in target {
            let child_path = format!("{}/{}", path, key);
            let satisfied = match current.get(key) {
                Some(_) if wanted.is_delete() && !is_list(wanted) => self.fail(&child_path),
                Some(present) => self.node(&child_path, wanted, present),
                None => absent_is_fine(wanted) || self.fail(&child_path),
            };
            ok &= satisfied;
            if !ok && !self.is_collecting() {
                return false;
            }
        }

        if self.mode == Mode::Replace {
            for key in current.keys().filter(|k| !target.contains_key(*k)) {
                ok = self.fail(&format!("{}/{}", path, key));
                if !self.is_collecting() {
                    return false;
                }
            }
        }
        ok
    }

    fn list(
        &mut self,
        path: &str,
        target: &[ConfigNode],
        current: &[ConfigNode],
        all_deleted: bool,
    ) -> bool {
        let mut ok = true;
        let mut deletes = 0;
        for (i, wanted) in target.iter().enumerate() {
            let item_path = format!("{}[{}]", path, i);
            let satisfied = if all_deleted || wanted.is_delete() {
                deletes += 1;
                !current.iter().any(|c| identity_matches(wanted, c))
            } else {
                current.iter().any(|c| satisfied_by(self.mode, wanted, c))
            };
            if !satisfied {
                ok = self.fail(&item_path);
                if !self.is_collecting() {
                    return false;
                }
            }
        }

        if self.mode == Mode::Replace && current.len() != target.len() - deletes {
            ok = self.fail(path);
        }
        ok
    }
}

fn is_list(node: &ConfigNode) -> bool {
    matches!(node.value, Value::List(_))
}

/// A target key the device does not hold at all.
fn absent_is_fine(wanted: &ConfigNode) -> bool {
    wanted.is_nil() || only_deletes(wanted)
}

/// Whether `node` asks for nothing but removals, e.g. a `vrfs` container
/// whose only entry is delete-marked.
fn only_deletes(node: &ConfigNode) -> bool {
    if node.is_delete() {
        return true;
    }
    match &node.value {
        Value::List(items) => items.iter().all(|item| item.is_nil() || only_deletes(item)),
        Value::Map(children) => !children.is_empty() && children.values().all(only_deletes),
        Value::Leaf(_) => false,
    }
}

/// Member names that conventionally hold a list key.
fn is_key_name(name: &str) -> bool {
    matches!(name, "name" | "id") || name.ends_with("-name") || name.ends_with("-id")
}

/// The key a delete-marked entry is identified by: a non-empty scalar
/// member named like a key (`name`, `id`, `vrf-name`, ...), or failing
/// that the first non-empty scalar member.
fn identity_key(entry: &IndexMap<String, ConfigNode>) -> Option<(&str, &Scalar)> {
    let mut scalars = entry.iter().filter_map(|(name, child)| match child.as_scalar() {
        Some(scalar) if !scalar.is_nil() => Some((name.as_str(), scalar)),
        _ => None,
    });
    let first = scalars.next()?;
    if is_key_name(first.0) {
        return Some(first);
    }
    Some(scalars.find(|(name, _)| is_key_name(name)).unwrap_or(first))
}

/// Whether `candidate` on the device is the entry `entry` asks to delete.
fn identity_matches(entry: &ConfigNode, candidate: &ConfigNode) -> bool {
    match &entry.value {
        Value::Leaf(scalar) => candidate.as_scalar() == Some(scalar),
        Value::Map(members) => match identity_key(members) {
            Some((name, key)) => candidate
                .get(name)
                .and_then(ConfigNode::as_scalar)
                .is_some_and(|found| found == key),
            None => satisfied_by(Mode::Merge, entry, candidate),
        },
        Value::List(_) => satisfied_by(Mode::Merge, entry, candidate),
    }
}
