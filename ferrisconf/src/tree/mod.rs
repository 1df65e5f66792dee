//! Schema-agnostic configuration trees.
//!
//! Device configuration arrives as XML (NETCONF replies) or JSON (desired
//! state written by callers). Both decode into the same [`ConfigNode`]
//! shape: a leaf scalar, a map of named children, or a list of repeated
//! siblings. Delete markers and namespaces ride along as [`Meta`] and never
//! show up as children.
//!
//! # Example
//!
//! ```rust
//! use ferrisconf::tree::{ConfigTree, DecodeOptions, Scalar};
//!
//! let tree = ConfigTree::from_xml(
//!     "<vrfs><vrf><vrf-name>BLUE</vrf-name><create/></vrf></vrfs>",
//!     &DecodeOptions::default(),
//! )?;
//!
//! let vrfs = tree.root.get("vrf").and_then(|v| v.as_list()).unwrap();
//! assert_eq!(vrfs.len(), 1);
//! assert_eq!(vrfs[0].get("vrf-name").and_then(|n| n.as_scalar()), Some(&Scalar::from("BLUE")));
//! # Ok::<(), ferrisconf::tree::ParseError>(())
//! ```

mod decode;
mod element;
mod encode;
mod node;
mod rule;

pub use crate::error::ParseError;
pub use decode::{decode_element, from_json, from_xml, from_xml_fragment};
pub use element::{Attribute, Element, NETCONF_BASE_NS};
pub use encode::{forest_to_json, forest_to_xml};
pub use node::{ConfigNode, ConfigTree, Meta, Namespace, Scalar, Value, forest};
pub use rule::{DecodeOptions, FnRule, ListRule, NoWrapper, PluralWrapper};

impl ConfigTree {
    /// Decode an XML document with a single root element.
    pub fn from_xml(xml: &str, options: &DecodeOptions) -> Result<ConfigTree, ParseError> {
        decode::from_xml(xml, options)
    }

    /// Decode a JSON document; one tree per top-level member.
    pub fn from_json(json: &str, options: &DecodeOptions) -> Result<Vec<ConfigTree>, ParseError> {
        decode::from_json(json, options)
    }
}
