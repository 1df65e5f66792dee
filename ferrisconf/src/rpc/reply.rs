//! Parsing of `rpc-reply` messages.

use std::fmt;

use indexmap::IndexMap;
use log::trace;

use crate::error::{Error, ParseError};
use crate::tree::{ConfigTree, DecodeOptions, Element, decode_element, forest_to_xml};

/// One `rpc-error`, as an ordered map of its child elements.
///
/// Keys are element names such as `error-type`, `error-tag`,
/// `error-severity` and `error-message`. Values are the trimmed element
/// text; structured children (`error-info`) are kept as XML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcError {
    fields: IndexMap<String, String>,
}

impl RpcError {
    fn from_element(element: &Element, options: &DecodeOptions) -> Self {
        let fields = element
            .children
            .iter()
            .map(|child| {
                let value = if child.children.is_empty() {
                    child.trimmed_text().to_string()
                } else {
                    let trees: Vec<ConfigTree> = child
                        .children
                        .iter()
                        .map(|c| decode_element(c, options))
                        .collect();
                    forest_to_xml(&trees)
                };
                (child.name.clone(), value)
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn error_type(&self) -> Option<&str> {
        self.get("error-type")
    }

    pub fn tag(&self) -> Option<&str> {
        self.get("error-tag")
    }

    pub fn severity(&self) -> Option<&str> {
        self.get("error-severity")
    }

    pub fn message(&self) -> Option<&str> {
        self.get("error-message")
    }

    /// Fields in document order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.fields {
            writeln!(f, "{} => {}", key, value)?;
        }
        Ok(())
    }
}

/// The errors of one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcErrors(Vec<RpcError>);

impl RpcErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RpcError> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<RpcError> {
        self.0
    }
}

impl From<Vec<RpcError>> for RpcErrors {
    fn from(errors: Vec<RpcError>) -> Self {
        Self(errors)
    }
}

impl<'a> IntoIterator for &'a RpcErrors {
    type Item = &'a RpcError;
    type IntoIter = std::slice::Iter<'a, RpcError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RpcErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.0 {
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

/// A parsed `rpc-reply`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcReply {
    pub message_id: Option<String>,
    errors: RpcErrors,
    ok: bool,
    data: Vec<ConfigTree>,
}

/// Reply to a `get`.
pub type GetReply = RpcReply;
/// Reply to a `get-config`.
pub type GetConfigReply = RpcReply;
/// Reply to an `edit-config`.
pub type EditConfigReply = RpcReply;
/// Reply to a `commit`.
pub type CommitReply = RpcReply;

impl RpcReply {
    /// Parse a reply with the default decode options.
    pub fn parse(bytes: &[u8]) -> Result<RpcReply, ParseError> {
        Self::parse_with(bytes, &DecodeOptions::default())
    }

    /// Parse a reply, decoding the `data` section with `options`.
    pub fn parse_with(bytes: &[u8], options: &DecodeOptions) -> Result<RpcReply, ParseError> {
        let text = std::str::from_utf8(bytes)?;
        let root = Element::parse(text)?;
        if root.name != "rpc-reply" {
            return Err(ParseError::UnexpectedRoot {
                expected: "rpc-reply".to_string(),
                found: root.name,
            });
        }

        // Errors first: a reply may carry both errors and partial data.
        let errors: Vec<RpcError> = root
            .children_named("rpc-error")
            .map(|e| RpcError::from_element(e, options))
            .collect();

        let data: Vec<ConfigTree> = root
            .children_named("data")
            .flat_map(|d| d.children.iter())
            .map(|e| decode_element(e, options))
            .collect();

        let message_id = root
            .attributes
            .iter()
            .find(|a| a.name == "message-id")
            .map(|a| a.value.clone());

        trace!(
            "parsed rpc-reply (message-id {:?}): {} errors, {} data roots",
            message_id,
            errors.len(),
            data.len()
        );

        Ok(RpcReply {
            message_id,
            errors: errors.into(),
            ok: root.child("ok").is_some(),
            data,
        })
    }

    pub fn errors(&self) -> &RpcErrors {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// `<ok/>` was present.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Top-level elements of the `data` section.
    pub fn data(&self) -> &[ConfigTree] {
        &self.data
    }

    pub fn into_data(self) -> Vec<ConfigTree> {
        self.data
    }

    /// Every error field as a `key => value` line.
    pub fn errors_as_string(&self) -> String {
        self.errors.to_string()
    }

    /// The `data` section serialized back to XML.
    pub fn config_as_string(&self) -> String {
        forest_to_xml(&self.data)
    }

    /// Turn a reply carrying errors into [`Error::Rpc`].
    pub fn into_result(self, operation: &str) -> Result<RpcReply, Error> {
        if self.has_errors() {
            return Err(Error::Rpc {
                operation: operation.to_string(),
                errors: self.errors,
            });
        }
        Ok(self)
    }
}
