//! Recognition of list wrapper elements.
//!
//! Device schemas commonly wrap a repeated element in a container named
//! after its plural (`<vrfs><vrf/>…</vrfs>`). Decoding such a wrapper as a
//! list keeps one entry and many entries the same shape. The convention is
//! a property of the schema, not of NETCONF, so it is pluggable.

use std::fmt;
use std::sync::Arc;

/// Decides whether `parent` is a wrapper around repeated `child` elements.
pub trait ListRule: Send + Sync {
    fn is_list_wrapper(&self, parent: &str, child: &str) -> bool;
}

/// `child + "s" == parent`, e.g. `vrfs`/`vrf`, `interfaces`/`interface`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluralWrapper;

impl ListRule for PluralWrapper {
    fn is_list_wrapper(&self, parent: &str, child: &str) -> bool {
        parent.len() == child.len() + 1 && parent.starts_with(child) && parent.ends_with('s')
    }
}

/// Never treat an element as a wrapper; only repeated siblings form lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWrapper;

impl ListRule for NoWrapper {
    fn is_list_wrapper(&self, _parent: &str, _child: &str) -> bool {
        false
    }
}

/// Rule backed by a closure.
pub struct FnRule<F>(pub F);

impl<F> ListRule for FnRule<F>
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_list_wrapper(&self, parent: &str, child: &str) -> bool {
        (self.0)(parent, child)
    }
}

/// Options controlling document decoding.
#[derive(Clone)]
pub struct DecodeOptions {
    pub list_rule: Arc<dyn ListRule>,
    /// Keep namespace declarations as node metadata.
    pub keep_namespaces: bool,
}

impl DecodeOptions {
    pub fn with_rule(rule: impl ListRule + 'static) -> Self {
        Self {
            list_rule: Arc::new(rule),
            ..Self::default()
        }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            list_rule: Arc::new(PluralWrapper),
            keep_namespaces: true,
        }
    }
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("keep_namespaces", &self.keep_namespaces)
            .finish_non_exhaustive()
    }
}
