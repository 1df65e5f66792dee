//! # Ferrisconf
//!
//! Async NETCONF over SSH client for network device automation, with
//! configuration reconciliation.
//!
//! Ferrisconf keeps a persistent NETCONF session per device, speaks both
//! NETCONF framings, and decides whether a device's current configuration
//! already satisfies a desired one, so callers only push changes when
//! something actually differs.
//!
//! ## Features
//!
//! - Async SSH connections via russh, `netconf` subsystem
//! - NETCONF 1.1 chunked framing with 1.0 end-of-message fallback
//! - Lazy connect, idle teardown and transparent reconnect
//! - Schema-agnostic configuration trees from XML or JSON
//! - Merge and replace reconciliation with delete markers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrisconf::{DefaultOperation, SessionBuilder, reconcile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrisconf::Error> {
//!     let session = SessionBuilder::new("192.0.2.1")
//!         .username("admin")
//!         .password("secret")
//!         .build()?;
//!
//!     let desired = "<vrfs xmlns=\"http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg\">\
//!                    <vrf><vrf-name>BLUE</vrf-name><create/></vrf></vrfs>";
//!
//!     let current = session.get_config(Some(desired)).await?;
//!     if !reconcile::document::in_sync_for_merge(desired, &current.config_as_string())? {
//!         session.apply_config(DefaultOperation::Merge, desired).await?;
//!     }
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod framing;
pub mod reconcile;
pub mod rpc;
pub mod session;
pub mod transport;
pub mod tree;

// Re-export main types for convenience
pub use error::{Error, ErrorKind, Result};
pub use reconcile::{Mode, diff_paths, in_sync_for_merge, in_sync_for_replace};
pub use rpc::{Datastore, DefaultOperation, RpcReply};
pub use session::{
    Session, SessionBuilder, SessionKey, SessionOptions, SessionRegistry, connect_any,
    connect_first,
};
pub use transport::{AuthMethod, HostKeyVerification, SshConfig};
pub use tree::{ConfigNode, ConfigTree, DecodeOptions};
