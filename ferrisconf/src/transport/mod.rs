//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management,
//! handling connection setup, authentication, and the `netconf`
//! subsystem channel.

mod channel;
pub mod config;
mod ssh;

pub use channel::{Connector, NETCONF_SUBSYSTEM, NetconfChannel, SshChannel, SshConnector};
pub use config::{
    AuthMethod, DEFAULT_CONNECT_TIMEOUT, HostKeyVerification, NETCONF_PORT, SshConfig,
};
pub use ssh::SshTransport;
