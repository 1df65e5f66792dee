//! Rendering of outbound NETCONF messages.
//!
//! The builders only produce XML bodies; framing is applied by the session
//! once the hello exchange has settled which framing the peer speaks.

use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;
use crate::tree::NETCONF_BASE_NS;

/// Capability announcing NETCONF 1.0 (end-of-message framing).
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// Capability announcing NETCONF 1.1 (chunked framing).
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// A configuration datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Datastore {
    #[default]
    Running,
    Candidate,
    Startup,
}

impl Datastore {
    pub fn as_str(self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datastore {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Datastore::Running),
            "candidate" => Ok(Datastore::Candidate),
            "startup" => Ok(Datastore::Startup),
            other => Err(SessionError::InvalidConfig {
                message: format!("unknown datastore '{}'", other),
            }),
        }
    }
}

/// The `default-operation` of an edit-config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DefaultOperation {
    #[default]
    Merge,
    Replace,
    None,
}

impl DefaultOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultOperation::Merge => "merge",
            DefaultOperation::Replace => "replace",
            DefaultOperation::None => "none",
        }
    }
}

impl fmt::Display for DefaultOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefaultOperation {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(DefaultOperation::Merge),
            "replace" => Ok(DefaultOperation::Replace),
            "none" => Ok(DefaultOperation::None),
            other => Err(SessionError::InvalidConfig {
                message: format!("unknown default operation '{}'", other),
            }),
        }
    }
}

/// An RPC operation and its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rpc<'a> {
    Get {
        filter: Option<&'a str>,
    },
    GetConfig {
        source: Datastore,
        filter: Option<&'a str>,
    },
    EditConfig {
        target: Datastore,
        default_operation: DefaultOperation,
        config: &'a str,
    },
    Commit,
    CloseSession,
}

impl Rpc<'_> {
    /// Operation element name, used in logs and error reports.
    pub fn name(&self) -> &'static str {
        match self {
            Rpc::Get { .. } => "get",
            Rpc::GetConfig { .. } => "get-config",
            Rpc::EditConfig { .. } => "edit-config",
            Rpc::Commit => "commit",
            Rpc::CloseSession => "close-session",
        }
    }

    /// Render the `<rpc>` element for `message_id`.
    pub fn render(&self, message_id: u64) -> String {
        let operation = match self {
            Rpc::Get { filter } => match non_empty(*filter) {
                Some(filter) => format!("<get>{}</get>", filter_element(filter)),
                None => "<get/>".to_string(),
            },
            Rpc::GetConfig { source, filter } => format!(
                "<get-config><source><{}/></source>{}</get-config>",
                source,
                non_empty(*filter).map(filter_element).unwrap_or_default()
            ),
            Rpc::EditConfig {
                target,
                default_operation,
                config,
            } => format!(
                "<edit-config><target><{}/></target>\
                 <default-operation>{}</default-operation>\
                 <config xmlns=\"{}\">{}</config></edit-config>",
                target, default_operation, NETCONF_BASE_NS, config
            ),
            Rpc::Commit => "<commit/>".to_string(),
            Rpc::CloseSession => "<close-session/>".to_string(),
        };
        format!(
            "<rpc message-id=\"{}\" xmlns=\"{}\">{}</rpc>",
            message_id, NETCONF_BASE_NS, operation
        )
    }
}

fn non_empty(filter: Option<&str>) -> Option<&str> {
    filter.filter(|f| !f.trim().is_empty())
}

fn filter_element(filter: &str) -> String {
    format!("<filter>{}</filter>", filter)
}

/// Client hello advertising both base versions.
pub fn hello() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <hello xmlns=\"{}\"><capabilities>\
         <capability>{}</capability>\
         <capability>{}</capability>\
         </capabilities></hello>",
        NETCONF_BASE_NS, BASE_1_0, BASE_1_1
    )
}

pub fn get(message_id: u64, filter: Option<&str>) -> String {
    Rpc::Get { filter }.render(message_id)
}

pub fn get_config(message_id: u64, source: Datastore, filter: Option<&str>) -> String {
    Rpc::GetConfig { source, filter }.render(message_id)
}

pub fn edit_config(
    message_id: u64,
    target: Datastore,
    default_operation: DefaultOperation,
    config: &str,
) -> String {
    Rpc::EditConfig {
        target,
        default_operation,
        config,
    }
    .render(message_id)
}

pub fn commit(message_id: u64) -> String {
    Rpc::Commit.render(message_id)
}

pub fn close_session(message_id: u64) -> String {
    Rpc::CloseSession.render(message_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Element;

    #[test]
    fn test_get_config_without_filter() {
        let body = get_config(1, Datastore::Running, None);
        assert_eq!(
            body,
            "<rpc message-id=\"1\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
             <get-config><source><running/></source></get-config></rpc>"
        );
        assert_eq!(get_config(1, Datastore::Running, Some("  \n")), body);
    }

    #[test]
    fn test_get_config_with_filter() {
        let body = get_config(
            7,
            Datastore::Running,
            Some("<vrfs xmlns=\"http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg\"/>"),
        );
        let root = Element::parse(&body).unwrap();
        assert_eq!(root.name, "rpc");
        let filter = root.child("get-config").and_then(|g| g.child("filter")).unwrap();
        assert_eq!(filter.children[0].name, "vrfs");
        assert!(body.contains("message-id=\"7\""));
    }

    #[test]
    fn test_get() {
        assert!(get(3, None).contains("<get/>"));
        assert!(get(3, Some("<srlg/>")).contains("<get><filter><srlg/></filter></get>"));
    }

    #[test]
    fn test_edit_config() {
        let body = edit_config(
            2,
            Datastore::Candidate,
            DefaultOperation::Replace,
            "<srlg><enable/></srlg>",
        );
        let root = Element::parse(&body).unwrap();
        let edit = root.child("edit-config").unwrap();
        assert!(edit.child("target").and_then(|t| t.child("candidate")).is_some());
        assert_eq!(edit.child("default-operation").unwrap().trimmed_text(), "replace");
        let config = edit.child("config").unwrap();
        assert_eq!(config.children[0].name, "srlg");
    }

    #[test]
    fn test_commit_and_close() {
        assert!(commit(4).ends_with("<commit/></rpc>"));
        assert!(close_session(5).contains("message-id=\"5\""));
        assert_eq!(Rpc::CloseSession.name(), "close-session");
    }

    #[test]
    fn test_hello_advertises_chunked() {
        let root = Element::parse(&hello()).unwrap();
        let capabilities: Vec<_> = root
            .child("capabilities")
            .unwrap()
            .children_named("capability")
            .map(|c| c.trimmed_text().to_string())
            .collect();
        assert_eq!(capabilities, vec![BASE_1_0, BASE_1_1]);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Candidate".parse::<Datastore>().unwrap(), Datastore::Candidate);
        assert_eq!("replace".parse::<DefaultOperation>().unwrap(), DefaultOperation::Replace);
        assert!("delete".parse::<DefaultOperation>().is_err());
        assert_eq!(DefaultOperation::None.to_string(), "none");
    }
}
