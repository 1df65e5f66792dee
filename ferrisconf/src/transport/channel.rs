//! The byte channel a NETCONF session runs over.
//!
//! [`Connector`] opens channels and [`NetconfChannel`] moves raw framed
//! bytes. Sessions only talk to these traits, so they run over SSH in
//! production and over in-memory peers in tests.

use std::collections::VecDeque;
use std::future::Future;

use bytes::Bytes;
use log::{trace, warn};
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::config::SshConfig;
use super::ssh::SshTransport;
use crate::error::{Result, TransportError};

/// Name of the SSH subsystem carrying NETCONF.
pub const NETCONF_SUBSYSTEM: &str = "netconf";

/// A bidirectional byte channel.
pub trait NetconfChannel: Send {
    /// Write bytes to the peer.
    fn send(&mut self, data: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Next bytes from the peer; `None` once the peer closed the channel.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Close the channel and the connection under it.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens channels to one device.
pub trait Connector: Send + Sync + 'static {
    type Channel: NetconfChannel + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Channel>> + Send;

    /// Human readable target, for logs.
    fn target(&self) -> String;
}

/// Connects to the `netconf` subsystem over SSH.
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

impl Connector for SshConnector {
    type Channel = SshChannel;

    async fn connect(&self) -> Result<SshChannel> {
        let transport = SshTransport::connect(self.config.clone()).await?;
        let (channel, early) = transport.open_subsystem(NETCONF_SUBSYSTEM).await?;
        Ok(SshChannel {
            transport,
            channel,
            early: early.into(),
        })
    }

    fn target(&self) -> String {
        format!("{}@{}", self.config.username, self.config.socket_addr())
    }
}

/// The `netconf` subsystem channel of an SSH connection.
pub struct SshChannel {
    transport: SshTransport,
    channel: Channel<Msg>,
    /// Data that arrived while the subsystem request was pending.
    early: VecDeque<Bytes>,
}

impl NetconfChannel for SshChannel {
    async fn send(&mut self, data: Bytes) -> Result<()> {
        trace!("sending {} bytes", data.len());
        self.channel
            .data(&data[..])
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        if let Some(data) = self.early.pop_front() {
            return Ok(Some(data));
        }
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data }) => {
                    trace!("received {} bytes", data.len());
                    return Ok(Some(Bytes::copy_from_slice(&data[..])));
                }
                Some(ChannelMsg::ExtendedData { ref data, ext }) => {
                    warn!(
                        "{}: stderr ({}): {}",
                        self.transport.config().host,
                        ext,
                        String::from_utf8_lossy(&data[..]).trim()
                    );
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(other) => trace!("ignoring channel message {:?}", other),
            }
        }
    }

    async fn close(self) -> Result<()> {
        // The connection is torn down regardless of how the channel close goes.
        if let Err(e) = self.channel.close().await {
            trace!("channel close failed: {}", e);
        }
        self.transport.close().await
    }
}

/// Source of channel messages during subsystem setup.
pub(crate) trait ChannelEvents: Send {
    fn next_event(&mut self) -> impl Future<Output = Option<ChannelMsg>> + Send;
}

impl ChannelEvents for Channel<Msg> {
    async fn next_event(&mut self) -> Option<ChannelMsg> {
        self.wait().await
    }
}

/// Wait for the server to accept or refuse a `want_reply` subsystem
/// request. Data received before the answer is returned for replay.
pub(crate) async fn confirm_subsystem<E: ChannelEvents>(
    events: &mut E,
    subsystem: &str,
) -> Result<Vec<Bytes>> {
    let mut early = Vec::new();
    loop {
        match events.next_event().await {
            Some(ChannelMsg::Success) => {
                trace!("subsystem '{}' accepted", subsystem);
                return Ok(early);
            }
            Some(ChannelMsg::Failure)
            | Some(ChannelMsg::Eof)
            | Some(ChannelMsg::Close)
            | None => {
                return Err(TransportError::SubsystemFailed(subsystem.to_string()).into());
            }
            Some(ChannelMsg::Data { ref data }) => {
                early.push(Bytes::copy_from_slice(&data[..]));
            }
            Some(other) => trace!("ignoring channel message {:?} before subsystem reply", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use russh::CryptoVec;

    impl ChannelEvents for VecDeque<ChannelMsg> {
        async fn next_event(&mut self) -> Option<ChannelMsg> {
            self.pop_front()
        }
    }

    #[tokio::test]
    async fn test_subsystem_accepted() {
        let mut events = VecDeque::from([
            ChannelMsg::ExtendedData {
                data: CryptoVec::from_slice(b"banner"),
                ext: 1,
            },
            ChannelMsg::Success,
        ]);
        let early = confirm_subsystem(&mut events, NETCONF_SUBSYSTEM).await.unwrap();
        assert!(early.is_empty());
    }

    #[tokio::test]
    async fn test_subsystem_refused() {
        let mut events = VecDeque::from([ChannelMsg::Failure]);
        let err = confirm_subsystem(&mut events, NETCONF_SUBSYSTEM)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::SubsystemFailed(ref name)) if name == "netconf"
        ));
        assert!(!err.is_disconnect());
    }

    #[tokio::test]
    async fn test_channel_closed_before_reply() {
        let mut events = VecDeque::from([ChannelMsg::Eof]);
        let err = confirm_subsystem(&mut events, NETCONF_SUBSYSTEM)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::SubsystemFailed(_))));

        let mut events = VecDeque::new();
        assert!(confirm_subsystem(&mut events, NETCONF_SUBSYSTEM).await.is_err());
    }

    #[tokio::test]
    async fn test_data_before_success_is_kept() {
        let mut events = VecDeque::from([
            ChannelMsg::Data {
                data: CryptoVec::from_slice(b"<hello"),
            },
            ChannelMsg::Success,
        ]);
        let early = confirm_subsystem(&mut events, NETCONF_SUBSYSTEM).await.unwrap();
        assert_eq!(early, vec![Bytes::from_static(b"<hello")]);
    }
}
