//! Persistent NETCONF sessions.
//!
//! A [`Session`] owns at most one channel to a device and serializes every
//! request on it behind one async mutex. The channel is opened lazily on
//! the first request, closed by an idle watcher once nothing has been sent
//! for the configured idle timeout, and reopened transparently afterwards.
//! A request that finds the channel gone reconnects once and is retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrisconf::{DefaultOperation, SessionBuilder};
//!
//! # async fn example() -> Result<(), ferrisconf::Error> {
//! let session = SessionBuilder::new("192.0.2.1")
//!     .username("admin")
//!     .password("secret")
//!     .build()?;
//!
//! let reply = session.get_config(Some("<vrfs xmlns=\"http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg\"/>")).await?;
//! println!("{}", reply.config_as_string());
//!
//! session
//!     .apply_config(DefaultOperation::Merge, "<vrfs>...</vrfs>")
//!     .await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod reader;
mod registry;

#[cfg(test)]
pub(crate) mod mock;

pub use builder::{SessionBuilder, connect_any, connect_first};
pub use registry::{SessionKey, SessionRegistry};

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use self::reader::MessageReader;
use crate::error::{Result, SessionError};
use crate::framing::{Framing, encode_eom};
use crate::rpc::message::{self, Datastore, DefaultOperation, Rpc};
use crate::rpc::{CommitReply, EditConfigReply, GetConfigReply, GetReply, PeerHello, RpcReply};
use crate::transport::{Connector, NetconfChannel, SshConnector};
use crate::tree::DecodeOptions;

/// Default idle timeout before the watcher closes the session.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit on the wait for any part of a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Session behavior.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Close the session after this long without a request. `None` keeps
    /// it open until [`Session::close`].
    pub idle_timeout: Option<Duration>,

    /// Give up on a reply when the peer stays silent this long.
    pub reply_timeout: Option<Duration>,

    /// Reconnect and retry once when a request finds the channel gone.
    pub reconnect: bool,

    /// How reply data is decoded into trees.
    pub decode: DecodeOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            reply_timeout: Some(DEFAULT_REPLY_TIMEOUT),
            reconnect: true,
            decode: DecodeOptions::default(),
        }
    }
}

/// State guarded by the session mutex.
struct Inner<Ch> {
    channel: Option<Ch>,
    framing: Framing,
    reader: MessageReader,
    message_id: u64,
    last_activity: Instant,
    peer: Option<PeerHello>,
    watcher: Option<JoinHandle<()>>,
}

impl<Ch> Inner<Ch> {
    fn new() -> Self {
        Self {
            channel: None,
            framing: Framing::Chunked,
            reader: MessageReader::default(),
            message_id: 1,
            last_activity: Instant::now(),
            peer: None,
            watcher: None,
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl<Ch> Drop for Inner<Ch> {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

/// A NETCONF session with one device.
pub struct Session<C: Connector = SshConnector> {
    connector: C,
    options: SessionOptions,
    inner: Arc<Mutex<Inner<C::Channel>>>,
}

impl<C: Connector> Session<C> {
    /// Create a session. Nothing is connected until the first request or
    /// an explicit [`connect`](Self::connect).
    pub fn new(connector: C, options: SessionOptions) -> Self {
        Self {
            connector,
            options,
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open the channel and exchange hellos, unless already open.
    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.channel.is_none() {
            self.open(&mut inner).await?;
        }
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.channel.is_some()
    }

    /// The message-id the next request will carry.
    pub async fn message_id(&self) -> u64 {
        self.inner.lock().await.message_id
    }

    /// Capabilities announced by the peer, if connected.
    pub async fn peer_capabilities(&self) -> Option<Vec<String>> {
        let inner = self.inner.lock().await;
        inner.peer.as_ref().map(|peer| peer.capabilities.clone())
    }

    /// Send `rpc` and return the raw reply bytes.
    pub async fn request_raw(&self, rpc: Rpc<'_>) -> Result<Bytes> {
        let mut inner = self.inner.lock().await;
        self.exchange(&mut inner, rpc).await
    }

    /// Send `rpc` and parse its reply. Device-reported errors are part of
    /// the returned reply, not an `Err`.
    pub async fn request(&self, rpc: Rpc<'_>) -> Result<RpcReply> {
        let mut inner = self.inner.lock().await;
        let raw = self.exchange(&mut inner, rpc).await?;
        match RpcReply::parse_with(&raw, &self.options.decode) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(
                    "{}: unparseable reply to {}, dropping session",
                    self.connector.target(),
                    rpc.name()
                );
                discard(&mut inner).await;
                Err(e.into())
            }
        }
    }

    async fn checked(&self, rpc: Rpc<'_>) -> Result<RpcReply> {
        self.request(rpc).await?.into_result(rpc.name())
    }

    pub async fn get(&self, filter: Option<&str>) -> Result<GetReply> {
        self.checked(Rpc::Get { filter }).await
    }

    /// `get-config` from the running datastore.
    pub async fn get_config(&self, filter: Option<&str>) -> Result<GetConfigReply> {
        self.get_config_from(Datastore::Running, filter).await
    }

    pub async fn get_config_from(
        &self,
        source: Datastore,
        filter: Option<&str>,
    ) -> Result<GetConfigReply> {
        self.checked(Rpc::GetConfig { source, filter }).await
    }

    pub async fn edit_config(
        &self,
        target: Datastore,
        default_operation: DefaultOperation,
        config: &str,
    ) -> Result<EditConfigReply> {
        self.checked(Rpc::EditConfig {
            target,
            default_operation,
            config,
        })
        .await
    }

    pub async fn commit(&self) -> Result<CommitReply> {
        self.checked(Rpc::Commit).await
    }

    /// Edit the candidate datastore and commit it.
    pub async fn apply_config(
        &self,
        default_operation: DefaultOperation,
        config: &str,
    ) -> Result<CommitReply> {
        self.edit_config(Datastore::Candidate, default_operation, config)
            .await?;
        self.commit().await
    }

    /// Send close-session and close the channel. A closed session reopens
    /// on the next request.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.channel.is_none() {
            return Ok(());
        }
        debug!("{}: closing session", self.connector.target());
        shutdown(&mut inner, self.options.reply_timeout).await
    }

    /// One request with at most one reconnect.
    async fn exchange(&self, inner: &mut Inner<C::Channel>, rpc: Rpc<'_>) -> Result<Bytes> {
        match self.try_exchange(inner, rpc).await {
            Err(e) if e.is_disconnect() && self.options.reconnect => {
                warn!(
                    "{}: {} failed ({}), reconnecting",
                    self.connector.target(),
                    rpc.name(),
                    e
                );
                self.try_exchange(inner, rpc).await
            }
            other => other,
        }
    }

    async fn try_exchange(&self, inner: &mut Inner<C::Channel>, rpc: Rpc<'_>) -> Result<Bytes> {
        if inner.channel.is_none() {
            self.open(inner).await?;
        }
        let result = round_trip(inner, rpc, self.options.reply_timeout).await;
        if result.is_err() {
            discard(inner).await;
        }
        result
    }

    async fn open(&self, inner: &mut Inner<C::Channel>) -> Result<()> {
        let target = self.connector.target();
        debug!("{}: opening NETCONF session", target);

        let mut channel = self.connector.connect().await?;
        let mut reader = MessageReader::default();
        let peer = match hello_exchange(&mut channel, &mut reader, self.options.reply_timeout).await {
            Ok(peer) => peer,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    trace!("{}: closing after failed hello: {}", target, close_err);
                }
                return Err(e);
            }
        };

        let framing = peer.framing();
        debug!(
            "{}: session {} established, {:?} framing",
            target,
            peer.session_id.map_or_else(|| "?".to_string(), |id| id.to_string()),
            framing
        );

        inner.stop_watcher();
        inner.channel = Some(channel);
        inner.framing = framing;
        inner.reader = reader;
        inner.message_id = 1;
        inner.last_activity = Instant::now();
        inner.peer = Some(peer);

        if let Some(idle) = self.options.idle_timeout {
            inner.watcher = Some(tokio::spawn(watch_idle(
                Arc::downgrade(&self.inner),
                idle,
                self.options.reply_timeout,
            )));
        }
        Ok(())
    }
}

async fn hello_exchange<Ch: NetconfChannel>(
    channel: &mut Ch,
    reader: &mut MessageReader,
    timeout: Option<Duration>,
) -> Result<PeerHello> {
    channel.send(encode_eom(message::hello().as_bytes())).await?;
    let raw = reader.read(channel, Framing::EndOfMessage, timeout).await?;
    Ok(PeerHello::parse(&raw)?)
}

async fn round_trip<Ch: NetconfChannel>(
    inner: &mut Inner<Ch>,
    rpc: Rpc<'_>,
    timeout: Option<Duration>,
) -> Result<Bytes> {
    let Inner {
        channel,
        framing,
        reader,
        message_id,
        last_activity,
        ..
    } = inner;
    let channel = channel.as_mut().ok_or(SessionError::NotConnected)?;

    let body = rpc.render(*message_id);
    debug!(
        "sending {} (message-id {}, {} bytes)",
        rpc.name(),
        message_id,
        body.len()
    );
    channel.send(framing.encode(body.as_bytes())?).await?;

    let reply = reader.read(channel, *framing, timeout).await?;
    trace!("reply to message-id {}: {} bytes", message_id, reply.len());

    *message_id += 1;
    *last_activity = Instant::now();
    Ok(reply)
}

/// Drop a channel after a fatal error.
async fn discard<Ch: NetconfChannel>(inner: &mut Inner<Ch>) {
    inner.stop_watcher();
    inner.reader = MessageReader::default();
    inner.peer = None;
    if let Some(channel) = inner.channel.take() {
        if let Err(e) = channel.close().await {
            trace!("closing failed channel: {}", e);
        }
    }
}

/// Orderly teardown: close-session, drain its reply, close the channel.
async fn shutdown<Ch: NetconfChannel>(
    inner: &mut Inner<Ch>,
    reply_timeout: Option<Duration>,
) -> Result<()> {
    inner.stop_watcher();
    let Some(mut channel) = inner.channel.take() else {
        return Ok(());
    };

    let body = message::close_session(inner.message_id);
    if let Err(e) = say_goodbye(&mut channel, inner, &body, reply_timeout).await {
        warn!("close-session failed: {}", e);
    }
    inner.reader = MessageReader::default();
    inner.peer = None;
    channel.close().await
}

async fn say_goodbye<Ch: NetconfChannel>(
    channel: &mut Ch,
    inner: &mut Inner<Ch>,
    body: &str,
    reply_timeout: Option<Duration>,
) -> Result<()> {
    channel.send(inner.framing.encode(body.as_bytes())?).await?;
    inner.reader.read(channel, inner.framing, reply_timeout).await?;
    Ok(())
}

/// Closes the session once it has been idle for `idle`.
async fn watch_idle<Ch: NetconfChannel + 'static>(
    inner: Weak<Mutex<Inner<Ch>>>,
    idle: Duration,
    reply_timeout: Option<Duration>,
) {
    loop {
        let deadline = {
            let Some(strong) = inner.upgrade() else {
                return;
            };
            let guard = strong.lock().await;
            if guard.channel.is_none() {
                return;
            }
            guard.last_activity + idle
        };

        tokio::time::sleep_until(deadline).await;

        let Some(strong) = inner.upgrade() else {
            return;
        };
        let mut guard = strong.lock().await;
        if guard.channel.is_none() {
            return;
        }
        if guard.last_activity.elapsed() < idle {
            continue;
        }

        debug!("session idle for {:?}, closing", idle);
        // Detach rather than abort: this task is the watcher.
        guard.watcher.take();
        if let Err(e) = shutdown(&mut guard, reply_timeout).await {
            warn!("idle close failed: {}", e);
        }
        return;
    }
}
